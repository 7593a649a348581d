mod common;

use common::*;
use nostr::Keys;
use nostr_profile_sync::{
    ContactsChange, ContactsState, ExpiringCache, RelayState, StoredProfile, SyncConfig,
    SyncPhase, TrackOptions, TransportCommand, CONTACTS_KEY, RELAYS_KEY, USER_HEX_KEY,
};
use std::sync::Arc;
use std::time::Duration;

fn cache_view(harness: &Harness) -> ExpiringCache {
    ExpiringCache::with_clock(
        harness.storage.clone(),
        "__ttlCacheProfiles__",
        Duration::from_secs(86_400),
        harness.clock(),
    )
}

#[test]
fn cold_start_out_of_order_delivery() {
    let user = Keys::generate();
    let hex = user.public_key().to_hex();
    let harness = Harness::new(&hex);
    harness.init();
    let (sub_id, _) = harness.only_subscription();

    let metadata = metadata_event(&user, r#"{"name":"alice"}"#, 200);
    let relays = relay_list_event(&user, &[("wss://r1", Some("write"))], 100);
    harness.sync.handle_event(&sub_id, &metadata);
    harness.sync.handle_event(&sub_id, &relays);

    let stored = cache_view(&harness)
        .get_object::<StoredProfile>(&hex)
        .unwrap();
    assert_eq!(stored.profile, named("alice"));
    assert_eq!(stored.created_at, 200);

    assert_eq!(
        harness.sync.relays(),
        RelayState {
            read: vec![],
            write: vec!["wss://r1".to_string()],
            created_at: 100,
        }
    );
    assert_eq!(harness.fired(), vec![Fired::UserMetadata(named("alice"))]);
}

#[test]
fn metadata_last_write_wins_in_either_order() {
    for newer_first in [true, false] {
        let user = Keys::generate();
        let harness = Harness::new(&user.public_key().to_hex());
        harness.init();
        let (sub_id, _) = harness.only_subscription();

        let older = metadata_event(&user, r#"{"name":"old"}"#, 10);
        let newer = metadata_event(&user, r#"{"name":"new"}"#, 20);
        let order = if newer_first {
            [&newer, &older]
        } else {
            [&older, &newer]
        };
        for event in order {
            harness.sync.handle_event(&sub_id, event);
        }

        assert_eq!(
            harness.sync.profile(&user.public_key().to_hex()),
            Some(named("new"))
        );
        assert_eq!(
            harness.fired().last(),
            Some(&Fired::UserMetadata(named("new")))
        );
    }
}

#[test]
fn relay_and_contact_lists_last_write_wins() {
    let user = Keys::generate();
    let harness = Harness::new(&user.public_key().to_hex());
    harness.init();
    let (sub_id, _) = harness.only_subscription();
    let friends = new_hexes(2);

    harness.sync.handle_event(
        &sub_id,
        &relay_list_event(&user, &[("wss://new", None)], 50),
    );
    harness.sync.handle_event(
        &sub_id,
        &relay_list_event(&user, &[("wss://old", None)], 40),
    );
    harness.sync.handle_event(
        &sub_id,
        &contact_list_event(&user, &friends[..2], "", 50),
    );
    harness.sync.handle_event(
        &sub_id,
        &contact_list_event(&user, &friends[..1], "", 40),
    );

    let user_state = harness.sync.user();
    assert_eq!(user_state.relays.read, vec!["wss://new".to_string()]);
    assert_eq!(user_state.relays.write, vec!["wss://new".to_string()]);
    assert_eq!(user_state.contacts.list, friends);
    assert_eq!(harness.fired().len(), 1, "stale contact list fires nothing");
}

#[test]
fn duplicate_event_from_two_relays_applies_once() {
    let user = Keys::generate();
    let harness = Harness::new(&user.public_key().to_hex());
    harness.init();
    let (sub_id, request) = harness.only_subscription();
    let friends = new_hexes(3);

    let contacts = contact_list_event(&user, &friends, "", 10);
    harness.sync.handle_event(&sub_id, &contacts);
    harness.sync.handle_event(&sub_id, &contacts);

    assert_eq!(harness.fired().len(), 1);
    assert_eq!(harness.seen.len(), 1);

    let already_have = request.already_have_event.unwrap();
    assert!(already_have(&contacts.id, "wss://relay.damus.io"));
    assert!(!already_have(
        &metadata_event(&user, "{}", 1).id,
        "wss://nos.lol"
    ));
}

#[test]
fn contacts_change_reports_diff() {
    let user = Keys::generate();
    let harness = Harness::new(&user.public_key().to_hex());
    harness.init();
    let (sub_id, _) = harness.only_subscription();
    let h = new_hexes(4);
    let (a, b, c, d) = (&h[0], &h[1], &h[2], &h[3]);

    harness.sync.handle_event(
        &sub_id,
        &contact_list_event(&user, &[a.clone(), b.clone(), c.clone()], "", 1),
    );
    harness.sync.handle_event(
        &sub_id,
        &contact_list_event(&user, &[b.clone(), c.clone(), d.clone()], "", 2),
    );

    assert_eq!(
        harness.fired(),
        vec![
            Fired::Contacts(ContactsChange {
                list: vec![a.clone(), b.clone(), c.clone()],
                added: vec![a.clone(), b.clone(), c.clone()],
                removed: vec![],
            }),
            Fired::Contacts(ContactsChange {
                list: vec![b.clone(), c.clone(), d.clone()],
                added: vec![d.clone()],
                removed: vec![a.clone()],
            }),
        ]
    );

    let cached = cache_view(&harness)
        .get_object::<ContactsState>(CONTACTS_KEY)
        .unwrap();
    assert_eq!(cached.list, vec![b.clone(), c.clone(), d.clone()]);
    assert_eq!(cached.created_at, 2);
}

#[test]
fn malformed_metadata_keeps_previous_profile() {
    let user = Keys::generate();
    let harness = Harness::new(&user.public_key().to_hex());
    harness.init();
    let (sub_id, _) = harness.only_subscription();

    harness
        .sync
        .handle_event(&sub_id, &metadata_event(&user, r#"{"name":"ok"}"#, 1));
    harness
        .sync
        .handle_event(&sub_id, &metadata_event(&user, "{broken", 2));
    harness
        .sync
        .handle_event(&sub_id, &metadata_event(&user, "[]", 3));

    assert_eq!(
        harness.sync.profile(&user.public_key().to_hex()),
        Some(named("ok"))
    );
    assert_eq!(harness.fired(), vec![Fired::UserMetadata(named("ok"))]);
}

#[test]
fn events_from_other_authors_are_ignored() {
    let user = Keys::generate();
    let stranger = Keys::generate();
    let harness = Harness::new(&user.public_key().to_hex());
    harness.init();
    let (sub_id, _) = harness.only_subscription();

    harness
        .sync
        .handle_event(&sub_id, &metadata_event(&stranger, r#"{"name":"mallory"}"#, 5));
    harness
        .sync
        .handle_event("sub-unknown", &metadata_event(&user, r#"{"name":"x"}"#, 5));

    assert!(harness.fired().is_empty());
    assert!(harness.sync.profiles().is_empty());
}

#[test]
fn contact_list_relay_hints_seed_merged_relays() {
    let user = Keys::generate();
    let harness = Harness::new(&user.public_key().to_hex());
    harness.init();
    let (sub_id, _) = harness.only_subscription();

    let content = r#"{"wss://hint.example":{"read":true,"write":true}}"#;
    harness.sync.handle_event(
        &sub_id,
        &contact_list_event(&user, &new_hexes(1), content, 10),
    );

    assert!(harness
        .sync
        .merged_relays()
        .contains(&"wss://hint.example".to_string()));
    assert_eq!(harness.sync.merged_relays()[0], "wss://purplepag.es");
    let cached = cache_view(&harness)
        .get_object::<Vec<String>>(RELAYS_KEY)
        .unwrap();
    assert!(cached.contains(&"wss://hint.example".to_string()));
}

#[test]
fn explicit_relays_ignore_hints() {
    let user = Keys::generate();
    let harness = Harness::new(&user.public_key().to_hex());
    harness.sync.init(TrackOptions {
        user_relays: Some(vec!["wss://a".to_string(), "wss://b".to_string()]),
    });
    let (sub_id, _) = harness.only_subscription();

    let content = r#"{"wss://hint.example":{}}"#;
    harness.sync.handle_event(
        &sub_id,
        &contact_list_event(&user, &new_hexes(1), content, 10),
    );

    assert_eq!(
        harness.sync.merged_relays(),
        vec![
            "wss://purplepag.es".to_string(),
            "wss://a".to_string(),
            "wss://b".to_string()
        ]
    );
    assert_eq!(harness.sync.user().contacts.list.len(), 1);
}

#[test]
fn bootstrap_relays_are_not_stored_in_the_working_set() {
    let user = Keys::generate();
    let harness = Harness::new(&user.public_key().to_hex());
    harness.init();
    let (sub_id, _) = harness.only_subscription();

    harness
        .sync
        .handle_event(&sub_id, &contact_list_event(&user, &new_hexes(1), "{}", 10));
    assert_eq!(
        harness.sync.merged_relays(),
        vec!["wss://purplepag.es".to_string()]
    );
    assert_eq!(harness.sync.candidate_relays().len(), 16);
    assert_eq!(
        cache_view(&harness).get_object::<Vec<String>>(RELAYS_KEY),
        Some(vec!["wss://purplepag.es".to_string()])
    );

    harness.sync.handle_event(
        &sub_id,
        &relay_list_event(&user, &[("wss://r1", None), ("wss://r2", None)], 20),
    );
    let expected = vec![
        "wss://purplepag.es".to_string(),
        "wss://r1".to_string(),
        "wss://r2".to_string(),
    ];
    assert_eq!(harness.sync.candidate_relays(), expected);
    assert_eq!(harness.sync.merged_relays(), expected);
    assert_eq!(
        cache_view(&harness).get_object::<Vec<String>>(RELAYS_KEY),
        Some(expected)
    );
}

#[test]
fn relay_list_changes_next_subscription_relays() {
    let user = Keys::generate();
    let harness = Harness::new(&user.public_key().to_hex());
    harness.init();
    let (sub_id, _) = harness.only_subscription();
    harness.sync.handle_event(
        &sub_id,
        &relay_list_event(
            &user,
            &[("wss://read.example", Some("read")), ("wss://write.example", Some("write"))],
            10,
        ),
    );
    harness.sync.handle_event(&sub_id, &contact_list_event(&user, &new_hexes(1), "", 11));

    harness.sync.resolve_batch(&[]);
    let (_, request) = harness.only_subscription();
    assert_eq!(
        request.relay_urls,
        vec![
            "wss://purplepag.es".to_string(),
            "wss://read.example".to_string(),
            "wss://write.example".to_string(),
        ]
    );
}

#[test]
fn warm_cache_paints_first_and_skips_subscription() {
    let user = Keys::generate();
    let hex = user.public_key().to_hex();
    let friends = new_hexes(2);
    let storage = Arc::new(nostr_profile_sync::InMemoryStorage::new());

    {
        let first = Harness::with_storage(&hex, storage.clone(), SyncConfig::default());
        first.init();
        let (sub_id, _) = first.only_subscription();
        first
            .sync
            .handle_event(&sub_id, &metadata_event(&user, r#"{"name":"alice"}"#, 1));
        first
            .sync
            .handle_event(&sub_id, &contact_list_event(&user, &friends, "", 1));
    }

    let second = Harness::with_storage(&hex, storage, SyncConfig::default());
    second.init();

    assert_eq!(second.sync.phase(), SyncPhase::CacheHit);
    assert!(second.commands.subscriptions().is_empty());
    assert_eq!(
        second.fired(),
        vec![
            Fired::UserMetadata(named("alice")),
            Fired::Contacts(ContactsChange {
                list: friends.clone(),
                added: friends.clone(),
                removed: vec![],
            }),
        ]
    );

    second.sync.refresh();
    let (_, request) = second.only_subscription();
    assert_eq!(authors_of(&request), vec![hex]);
    assert_eq!(second.sync.phase(), SyncPhase::Subscribing);
}

#[test]
fn identity_switch_invalidates_identity_scoped_cache() {
    let first_user = Keys::generate();
    let second_user = Keys::generate();
    let first_hex = first_user.public_key().to_hex();
    let second_hex = second_user.public_key().to_hex();
    let harness = Harness::new(&first_hex);
    harness.init();
    let (first_sub, _) = harness.only_subscription();

    harness
        .sync
        .handle_event(&first_sub, &metadata_event(&first_user, r#"{"name":"one"}"#, 1));
    harness
        .sync
        .handle_event(&first_sub, &contact_list_event(&first_user, &new_hexes(2), "", 1));
    harness
        .sync
        .handle_event(&first_sub, &relay_list_event(&first_user, &[("wss://one", None)], 1));

    let cache = cache_view(&harness);
    assert!(cache.get(CONTACTS_KEY).is_some());
    assert!(cache.get(RELAYS_KEY).is_some());

    harness
        .sync
        .switch_identity(&second_hex, TrackOptions::default())
        .unwrap();

    assert!(cache.get(CONTACTS_KEY).is_none());
    assert!(cache.get(RELAYS_KEY).is_none());
    assert_eq!(cache.get(USER_HEX_KEY), Some(second_hex.clone()));
    assert!(cache.get_object::<StoredProfile>(&first_hex).is_some());

    let commands = harness.commands.drain();
    assert!(matches!(&commands[0], TransportCommand::Unsubscribe(id) if id == &first_sub));
    match &commands[1] {
        TransportCommand::Subscribe { request, .. } => {
            assert_eq!(authors_of(request), vec![second_hex.clone()]);
        }
        other => panic!("expected subscribe, got {:?}", other),
    }
    assert_eq!(harness.sync.hex(), second_hex);

    // Late delivery on the torn down subscription changes nothing.
    let before = harness.fired().len();
    harness
        .sync
        .handle_event(&first_sub, &metadata_event(&first_user, r#"{"name":"late"}"#, 9));
    assert_eq!(harness.fired().len(), before);
    assert!(harness.sync.profile(&first_hex).is_none());
}

#[test]
fn switching_to_same_identity_is_a_no_op() {
    let hex = Keys::generate().public_key().to_hex();
    let harness = Harness::new(&hex);
    harness.init();
    harness.commands.drain();

    harness
        .sync
        .switch_identity(&hex, TrackOptions::default())
        .unwrap();
    assert!(harness.commands.drain().is_empty());
    assert!(harness
        .sync
        .switch_identity("not-hex", TrackOptions::default())
        .is_err());
}

#[test]
fn expired_cache_behaves_as_cold() {
    let user = Keys::generate();
    let hex = user.public_key().to_hex();
    let storage = Arc::new(nostr_profile_sync::InMemoryStorage::new());
    let config = SyncConfig {
        cache_ttl_secs: 60,
        ..Default::default()
    };

    let first = Harness::with_storage(&hex, storage.clone(), config.clone());
    first.init();
    let (sub_id, _) = first.only_subscription();
    first
        .sync
        .handle_event(&sub_id, &contact_list_event(&user, &new_hexes(1), "", 1));

    // Same instant: warm.
    let warm = Harness::with_storage(&hex, storage.clone(), config.clone());
    warm.init();
    assert_eq!(warm.sync.phase(), SyncPhase::CacheHit);

    let cold = Harness::with_storage(&hex, storage, config);
    cold.advance_secs(61);
    cold.init();
    assert_eq!(cold.sync.phase(), SyncPhase::Subscribing);
    assert!(cold.fired().is_empty());
}

#[test]
fn clean_cache_clears_cache_and_seen_events() {
    let user = Keys::generate();
    let harness = Harness::new(&user.public_key().to_hex());
    harness.init();
    let (sub_id, _) = harness.only_subscription();
    harness
        .sync
        .handle_event(&sub_id, &metadata_event(&user, r#"{"name":"a"}"#, 1));
    assert_eq!(harness.seen.len(), 1);

    harness.sync.clean_cache();
    assert!(harness.seen.is_empty());
    assert!(harness.storage.is_empty());
}

#[test]
fn eose_moves_identity_subscription_live() {
    let harness = Harness::new(&Keys::generate().public_key().to_hex());
    harness.init();
    let (sub_id, _) = harness.only_subscription();
    assert_eq!(harness.sync.phase(), SyncPhase::Subscribing);

    harness.sync.handle_eose("sub-unknown");
    assert_eq!(harness.sync.phase(), SyncPhase::Subscribing);
    harness.sync.handle_eose(&sub_id);
    assert_eq!(harness.sync.phase(), SyncPhase::Live);
}
