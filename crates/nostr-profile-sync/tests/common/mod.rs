#![allow(dead_code)]

use nostr::{Event, EventBuilder, Keys, Kind, Tag, Timestamp};
use nostr_profile_sync::pubsub::test_utils::CommandReceiver;
use nostr_profile_sync::{
    ChannelTransport, Clock, ContactsChange, InMemoryStorage, ProfileContent, ProfileSync,
    SeenEvents, SubscriptionRequest, SyncCallbacks, SyncConfig, TrackOptions, CONTACT_LIST_KIND,
    METADATA_KIND, RELAY_LIST_KIND,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// One callback invocation, in firing order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fired {
    UserMetadata(ProfileContent),
    Contacts(ContactsChange),
    Profile(String, ProfileContent),
}

pub struct Harness {
    pub sync: Arc<ProfileSync>,
    pub commands: CommandReceiver,
    pub storage: Arc<InMemoryStorage>,
    pub seen: SeenEvents,
    pub fired: Arc<Mutex<Vec<Fired>>>,
    pub now: Arc<AtomicU64>,
}

impl Harness {
    pub fn new(hex: &str) -> Self {
        Self::with_storage(hex, Arc::new(InMemoryStorage::new()), SyncConfig::default())
    }

    pub fn with_storage(hex: &str, storage: Arc<InMemoryStorage>, config: SyncConfig) -> Self {
        let (transport, rx) = ChannelTransport::unbounded();
        let fired = Arc::new(Mutex::new(Vec::new()));
        let seen = SeenEvents::new();
        let now = Arc::new(AtomicU64::new(1_700_000_000_000));

        let clock_now = now.clone();
        let clock: Clock = Arc::new(move || clock_now.load(Ordering::SeqCst));

        let sync = ProfileSync::new_with_clock(
            hex,
            config,
            storage.clone(),
            Arc::new(transport),
            recording_callbacks(&fired),
            seen.clone(),
            clock,
        )
        .unwrap();

        Self {
            sync: Arc::new(sync),
            commands: CommandReceiver::new(rx),
            storage,
            seen,
            fired,
            now,
        }
    }

    pub fn init(&self) {
        self.sync.init(TrackOptions::default());
    }

    pub fn fired(&self) -> Vec<Fired> {
        self.fired.lock().unwrap().clone()
    }

    pub fn take_fired(&self) -> Vec<Fired> {
        std::mem::take(&mut *self.fired.lock().unwrap())
    }

    /// The single subscription opened since the last drain.
    pub fn only_subscription(&self) -> (String, SubscriptionRequest) {
        let mut subs = self.commands.subscriptions();
        assert_eq!(subs.len(), 1, "expected exactly one subscription");
        subs.remove(0)
    }

    pub fn clock(&self) -> Clock {
        let now = self.now.clone();
        Arc::new(move || now.load(Ordering::SeqCst))
    }

    pub fn advance_secs(&self, secs: u64) {
        self.now.fetch_add(secs * 1_000, Ordering::SeqCst);
    }
}

pub fn recording_callbacks(fired: &Arc<Mutex<Vec<Fired>>>) -> SyncCallbacks {
    let on_user = fired.clone();
    let on_contacts = fired.clone();
    let on_profile = fired.clone();
    SyncCallbacks::new()
        .on_user_metadata_changed(move |profile| {
            on_user
                .lock()
                .unwrap()
                .push(Fired::UserMetadata(profile.clone()));
        })
        .on_contacts_changed(move |change| {
            on_contacts
                .lock()
                .unwrap()
                .push(Fired::Contacts(change.clone()));
        })
        .on_profile_changed(move |hex, profile| {
            on_profile
                .lock()
                .unwrap()
                .push(Fired::Profile(hex.to_string(), profile.clone()));
        })
}

pub fn signed(keys: &Keys, kind: u32, content: &str, tags: Vec<Vec<String>>, created_at: u64) -> Event {
    let tags: Vec<Tag> = tags.iter().map(|t| Tag::parse(t).unwrap()).collect();
    EventBuilder::new(Kind::from(kind as u16), content)
        .tags(tags)
        .custom_created_at(Timestamp::from(created_at))
        .build(keys.public_key())
        .sign_with_keys(keys)
        .unwrap()
}

pub fn metadata_event(keys: &Keys, content: &str, created_at: u64) -> Event {
    signed(keys, METADATA_KIND, content, Vec::new(), created_at)
}

pub fn contact_list_event(keys: &Keys, follows: &[String], content: &str, created_at: u64) -> Event {
    let tags = follows
        .iter()
        .map(|hex| vec!["p".to_string(), hex.clone()])
        .collect();
    signed(keys, CONTACT_LIST_KIND, content, tags, created_at)
}

/// `(url, direction)` pairs; `None` means both directions.
pub fn relay_list_event(keys: &Keys, relays: &[(&str, Option<&str>)], created_at: u64) -> Event {
    let tags = relays
        .iter()
        .map(|(url, direction)| {
            let mut tag = vec!["r".to_string(), url.to_string()];
            if let Some(direction) = direction {
                tag.push(direction.to_string());
            }
            tag
        })
        .collect();
    signed(keys, RELAY_LIST_KIND, "", tags, created_at)
}

pub fn named(name: &str) -> ProfileContent {
    ProfileContent {
        name: name.to_string(),
        ..Default::default()
    }
}

pub fn new_hexes(count: usize) -> Vec<String> {
    (0..count)
        .map(|_| Keys::generate().public_key().to_hex())
        .collect()
}

pub fn authors_of(request: &SubscriptionRequest) -> Vec<String> {
    request
        .filter
        .authors
        .as_ref()
        .map(|authors| authors.iter().map(|a| a.to_hex()).collect())
        .unwrap_or_default()
}
