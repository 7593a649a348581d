//! Coordinator for one tracked identity.
//!
//! [`ProfileSync`] serves the identity's profile, contact list and relays from
//! the [`ExpiringCache`] first, opens subscriptions through a
//! [`SubscriptionTransport`] when the cache is cold, and resolves contact
//! profiles in bounded batches. Events come back through
//! [`ProfileSync::handle_event`] and [`ProfileSync::handle_eose`]; every
//! accepted change is reported through [`SyncCallbacks`].
//!
//! State is guarded by a single mutex. Callbacks run after it is released, so
//! they may call back into the coordinator.

use crate::callbacks::Notification;
use crate::classifier::{self, EventKind};
use crate::pubsub::{build_filter, AlreadyHaveEvent, SubscriptionRequest};
use crate::relays::{merge_relays, merge_working_set, RelayDefaults};
use crate::user_state::{SubscriptionPurpose, UserSnapshot, UserState};
use crate::utils::{is_hex, pubkey_from_hex, system_clock, Clock};
use crate::{
    Contact, ContactsChange, ContactsState, Error, ExpiringCache, ProfileContent, RelayState,
    Result, SeenEvents, StorageAdapter, StoredProfile, SubscriptionTransport, SyncCallbacks,
    SyncConfig, SyncPhase, CONTACTS_KEY, CONTACT_LIST_KIND, METADATA_KIND, RELAYS_KEY,
    RELAY_LIST_KIND, USER_HEX_KEY,
};
use nostr::{Event, EventId, PublicKey};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, trace, warn};

/// Per-identity options supplied by the caller.
#[derive(Debug, Clone, Default)]
pub struct TrackOptions {
    /// Relays the caller already knows for this identity. When set, relay
    /// hints embedded in contact lists are ignored.
    pub user_relays: Option<Vec<String>>,
}

pub struct ProfileSync {
    state: Mutex<UserState>,
    seen: SeenEvents,
    cache: ExpiringCache,
    transport: Arc<dyn SubscriptionTransport>,
    callbacks: SyncCallbacks,
    config: SyncConfig,
    clock: Clock,
}

impl ProfileSync {
    pub fn new(
        hex: &str,
        config: SyncConfig,
        storage: Arc<dyn StorageAdapter>,
        transport: Arc<dyn SubscriptionTransport>,
        callbacks: SyncCallbacks,
        seen: SeenEvents,
    ) -> Result<Self> {
        Self::new_with_clock(hex, config, storage, transport, callbacks, seen, system_clock())
    }

    pub fn new_with_clock(
        hex: &str,
        config: SyncConfig,
        storage: Arc<dyn StorageAdapter>,
        transport: Arc<dyn SubscriptionTransport>,
        callbacks: SyncCallbacks,
        seen: SeenEvents,
        clock: Clock,
    ) -> Result<Self> {
        validate_hex(hex)?;
        config.validate()?;
        let cache = ExpiringCache::with_clock(
            storage,
            &config.cache_namespace,
            config.cache_ttl(),
            clock.clone(),
        );
        Ok(Self {
            state: Mutex::new(UserState::new(hex.to_string())),
            seen,
            cache,
            transport,
            callbacks,
            config,
            clock,
        })
    }

    /// Loads the identity from cache, firing callbacks for what was found,
    /// and subscribes to its metadata, contact list and relay list unless
    /// both the identity marker and contact list were already cached.
    ///
    /// Does nothing if already initialized.
    pub fn init(&self, options: TrackOptions) {
        let notifications = {
            let mut state = self.lock();
            if state.phase() != SyncPhase::Uninitialized {
                return;
            }
            self.load_cached(&mut state, options)
        };
        self.callbacks.dispatch(notifications);
    }

    /// Opens the identity subscription even if the cache was warm.
    pub fn refresh(&self) {
        let mut state = self.lock();
        if matches!(state.phase(), SyncPhase::Subscribing | SyncPhase::Live | SyncPhase::TornDown) {
            return;
        }
        self.open_user_subscription(&mut state);
    }

    /// Tears down the current identity and starts tracking `hex`.
    pub fn switch_identity(&self, hex: &str, options: TrackOptions) -> Result<()> {
        validate_hex(hex)?;
        let notifications = {
            let mut state = self.lock();
            if state.hex() == hex && state.phase() != SyncPhase::TornDown {
                return Ok(());
            }
            debug!(from = state.hex(), to = hex, "switching tracked identity");
            self.teardown(&mut state);
            *state = UserState::new(hex.to_string());
            self.load_cached(&mut state, options)
        };
        self.callbacks.dispatch(notifications);
        Ok(())
    }

    /// Closes every open subscription and forgets in-flight markers.
    pub fn close(&self) {
        let mut state = self.lock();
        self.teardown(&mut state);
        state.set_phase(SyncPhase::TornDown);
    }

    /// Drops everything the cache holds and forgets which events were seen.
    pub fn clean_cache(&self) {
        self.cache.clear();
        self.seen.clear();
    }

    pub fn handle_event(&self, sub_id: &str, event: &Event) {
        let notifications = {
            let mut state = self.lock();
            let Some(purpose) = state.subscription(sub_id).cloned() else {
                trace!(sub_id, "event for unknown subscription");
                return;
            };
            let author = event.pubkey.to_hex();
            let expected_author = match &purpose {
                SubscriptionPurpose::User => author == state.hex(),
                SubscriptionPurpose::Metadata(authors) => authors.contains(&author),
            };
            if !expected_author {
                trace!(sub_id, author = %author, "event from unexpected author");
                return;
            }
            if !self.seen.insert(event.id) {
                trace!(id = %event.id, "duplicate event");
                return;
            }
            match purpose {
                SubscriptionPurpose::User => self.apply_user_event(&mut state, event),
                SubscriptionPurpose::Metadata(_) => {
                    self.apply_metadata(&mut state, &author, event, true)
                }
            }
        };
        self.callbacks.dispatch(notifications);
    }

    pub fn handle_eose(&self, sub_id: &str) {
        let mut state = self.lock();
        let purpose = state.subscription(sub_id).cloned();
        match purpose {
            Some(SubscriptionPurpose::User) => {
                if state.phase() == SyncPhase::Subscribing {
                    state.set_phase(SyncPhase::Live);
                }
                debug!(sub_id, "identity backlog delivered");
            }
            Some(SubscriptionPurpose::Metadata(_)) => {
                let cleared = state.clear_in_flight(sub_id);
                state.remove_subscription(sub_id);
                if let Err(e) = self.transport.unsubscribe(sub_id) {
                    warn!(sub_id, error = %e, "unsubscribe failed");
                }
                debug!(sub_id, cleared, "metadata batch done");
            }
            None => trace!(sub_id, "eose for unknown subscription"),
        }
    }

    /// Requests metadata for the next contacts without a known profile.
    ///
    /// At most `batch_size` authors go into one subscription. Contacts that
    /// are not valid hex, already resolved, in flight, or listed in `exclude`
    /// are skipped. Contacts found in the cache are reported immediately and
    /// do not count towards the batch. The batch subscription is closed once
    /// its backlog is delivered.
    pub fn resolve_batch(&self, exclude: &[String]) {
        let notifications = {
            let mut state = self.lock();
            if state.phase() == SyncPhase::TornDown {
                return;
            }
            let exclude: HashSet<&str> = exclude.iter().map(String::as_str).collect();
            let now = (self.clock)();
            let timeout = self.config.in_flight_timeout();
            let mut notifications = Vec::new();
            let mut candidates = Vec::new();
            let mut authors = Vec::new();

            for hex in state.contacts().list.clone() {
                if candidates.len() >= self.config.batch_size {
                    break;
                }
                if !is_hex(&hex)
                    || exclude.contains(hex.as_str())
                    || state.profile(&hex).is_some()
                    || state.is_in_flight(&hex, now, timeout)
                {
                    continue;
                }
                if let Some(stored) = self.cache.get_object::<StoredProfile>(&hex) {
                    trace!(hex = %hex, "contact profile from cache");
                    self.restore_profile(&mut state, &hex, stored, &mut notifications);
                    continue;
                }
                let Ok(pubkey) = pubkey_from_hex(&hex) else {
                    debug!(hex = %hex, "contact is not a valid public key");
                    continue;
                };
                candidates.push(hex);
                authors.push(pubkey);
            }

            if !candidates.is_empty() {
                self.open_metadata_subscription(&mut state, candidates, authors, now);
            }
            notifications
        };
        self.callbacks.dispatch(notifications);
    }

    /// Single-author variant of [`ProfileSync::resolve_batch`], for when one
    /// contact becomes visible.
    pub fn resolve_one(&self, hex: &str) {
        if !is_hex(hex) {
            return;
        }
        let notifications = {
            let mut state = self.lock();
            let now = (self.clock)();
            if state.phase() == SyncPhase::TornDown
                || state.profile(hex).is_some()
                || state.is_in_flight(hex, now, self.config.in_flight_timeout())
            {
                return;
            }
            let mut notifications = Vec::new();
            if let Some(stored) = self.cache.get_object::<StoredProfile>(hex) {
                debug!(hex, "profile cache hit");
                self.restore_profile(&mut state, hex, stored, &mut notifications);
            } else if let Ok(pubkey) = pubkey_from_hex(hex) {
                debug!(hex, "profile cache miss");
                self.open_metadata_subscription(&mut state, vec![hex.to_string()], vec![pubkey], now);
            }
            notifications
        };
        self.callbacks.dispatch(notifications);
    }

    pub fn hex(&self) -> String {
        self.lock().hex().to_string()
    }

    pub fn phase(&self) -> SyncPhase {
        self.lock().phase()
    }

    pub fn user(&self) -> UserSnapshot {
        self.lock().snapshot()
    }

    pub fn relays(&self) -> RelayState {
        self.lock().relays().clone()
    }

    /// Relays learned so far, without the bootstrap fallback applied by
    /// [`ProfileSync::candidate_relays`] when the set is too small.
    pub fn merged_relays(&self) -> Vec<String> {
        self.lock().merged_relays().to_vec()
    }

    /// Relay urls the next subscription would be sent to.
    pub fn candidate_relays(&self) -> Vec<String> {
        let state = self.lock();
        self.candidates_for(&state)
    }

    pub fn profile(&self, hex: &str) -> Option<ProfileContent> {
        self.lock().profile(hex).map(|s| s.profile.clone())
    }

    pub fn profiles(&self) -> HashMap<String, StoredProfile> {
        self.lock().profiles().clone()
    }

    /// Contact list with whatever profiles are resolved so far.
    pub fn contacts(&self) -> Vec<Contact> {
        let state = self.lock();
        state
            .contacts()
            .list
            .iter()
            .map(|hex| match state.profile(hex) {
                Some(stored) => Contact::Known(hex.clone(), stored.profile.clone()),
                None => Contact::Unknown(hex.clone()),
            })
            .collect()
    }

    pub fn in_flight_count(&self) -> usize {
        self.lock().in_flight_count()
    }

    fn lock(&self) -> MutexGuard<'_, UserState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn relay_defaults(&self) -> RelayDefaults<'_> {
        RelayDefaults {
            discovery_relay: &self.config.discovery_relay,
            bootstrap: &self.config.default_relays,
            min_relays: self.config.min_relays,
        }
    }

    fn candidates_for(&self, state: &UserState) -> Vec<String> {
        merge_relays(&self.relay_defaults(), state.relays(), state.merged_relays(), &[])
    }

    fn remerge_relays(&self, state: &mut UserState, extra: &[String]) {
        let merged = merge_working_set(
            &self.relay_defaults(),
            state.relays(),
            state.merged_relays(),
            extra,
        );
        self.cache.set_object(RELAYS_KEY, &merged);
        state.set_merged_relays(merged);
    }

    fn already_have(&self) -> AlreadyHaveEvent {
        let seen = self.seen.clone();
        Arc::new(move |id: &EventId, _relay_url: &str| seen.contains(id))
    }

    fn load_cached(&self, state: &mut UserState, options: TrackOptions) -> Vec<Notification> {
        state.set_phase(SyncPhase::CacheChecking);
        let hex = state.hex().to_string();
        let mut notifications = Vec::new();

        let cached_user = self.cache.get(USER_HEX_KEY);
        if cached_user.as_deref().is_some_and(|cached| cached != hex) {
            debug!(hex = %hex, "tracked identity changed, dropping cached contacts and relays");
            self.cache.delete(CONTACTS_KEY);
            self.cache.delete(RELAYS_KEY);
        }
        self.cache.set(USER_HEX_KEY, hex.clone());

        if let Some(stored) = self.cache.get_object::<StoredProfile>(&hex) {
            debug!(hex = %hex, "cache hit for user metadata");
            notifications.push(Notification::UserMetadata(stored.profile.clone()));
            state.set_profile(&hex, stored);
        }

        let cached_contacts = self.cache.get_object::<ContactsState>(CONTACTS_KEY);
        if let Some(contacts) = cached_contacts.as_ref().filter(|c| !c.list.is_empty()) {
            debug!(hex = %hex, count = contacts.list.len(), "cache hit for contacts");
            notifications.push(Notification::Contacts(ContactsChange {
                list: contacts.list.clone(),
                added: contacts.list.clone(),
                removed: Vec::new(),
            }));
            state.restore_contacts(contacts.clone());
        }

        if let Some(cached_relays) = self.cache.get_object::<Vec<String>>(RELAYS_KEY) {
            let merged = merge_working_set(
                &self.relay_defaults(),
                state.relays(),
                state.merged_relays(),
                &cached_relays,
            );
            state.set_merged_relays(merged);
        }
        if let Some(user_relays) = options.user_relays {
            state.set_explicit_relays();
            self.remerge_relays(state, &user_relays);
        }

        if cached_contacts.is_some() && cached_user.is_some() {
            debug!(hex = %hex, "cache is warm, not subscribing");
            state.set_phase(SyncPhase::CacheHit);
        } else {
            self.open_user_subscription(state);
        }
        notifications
    }

    fn open_user_subscription(&self, state: &mut UserState) {
        let hex = state.hex().to_string();
        let pubkey = match pubkey_from_hex(&hex) {
            Ok(pubkey) => pubkey,
            Err(e) => {
                warn!(hex = %hex, error = %e, "cannot subscribe for identity");
                return;
            }
        };
        let request = SubscriptionRequest {
            relay_urls: self.candidates_for(state),
            filter: build_filter()
                .kinds(vec![METADATA_KIND, CONTACT_LIST_KIND, RELAY_LIST_KIND])
                .authors(vec![pubkey])
                .build(),
            skip_verification: self.config.skip_verification,
            already_have_event: Some(self.already_have()),
        };
        let relay_count = request.relay_urls.len();
        match self.transport.subscribe(request) {
            Ok(sub_id) => {
                debug!(hex = %hex, sub_id = %sub_id, relay_count, "subscribed to identity");
                state.track_subscription(&sub_id, SubscriptionPurpose::User);
                state.set_phase(SyncPhase::Subscribing);
            }
            Err(e) => warn!(hex = %hex, error = %e, "identity subscription failed"),
        }
    }

    fn open_metadata_subscription(
        &self,
        state: &mut UserState,
        hexes: Vec<String>,
        authors: Vec<PublicKey>,
        now: u64,
    ) {
        let request = SubscriptionRequest {
            relay_urls: self.candidates_for(state),
            filter: build_filter()
                .kinds(vec![METADATA_KIND])
                .authors(authors)
                .build(),
            skip_verification: self.config.skip_verification,
            already_have_event: Some(self.already_have()),
        };
        match self.transport.subscribe(request) {
            Ok(sub_id) => {
                debug!(sub_id = %sub_id, count = hexes.len(), "subscribed to contact metadata");
                state.mark_in_flight(&hexes, &sub_id, now);
                state.track_subscription(&sub_id, SubscriptionPurpose::Metadata(hexes));
            }
            Err(e) => warn!(count = hexes.len(), error = %e, "metadata subscription failed"),
        }
    }

    fn teardown(&self, state: &mut UserState) {
        for sub_id in state.take_subscriptions() {
            if let Err(e) = self.transport.unsubscribe(&sub_id) {
                warn!(sub_id = %sub_id, error = %e, "unsubscribe failed");
            }
        }
    }

    fn restore_profile(
        &self,
        state: &mut UserState,
        hex: &str,
        stored: StoredProfile,
        notifications: &mut Vec<Notification>,
    ) {
        notifications.push(Notification::Profile(hex.to_string(), stored.profile.clone()));
        if hex == state.hex() {
            notifications.push(Notification::UserMetadata(stored.profile.clone()));
        }
        state.set_profile(hex, stored);
    }

    fn apply_user_event(&self, state: &mut UserState, event: &Event) -> Vec<Notification> {
        match EventKind::of(event) {
            Some(EventKind::Metadata) => {
                let hex = state.hex().to_string();
                self.apply_metadata(state, &hex, event, false)
            }
            Some(EventKind::ContactList) => self.apply_contact_list(state, event),
            Some(EventKind::RelayList) => {
                self.apply_relay_list(state, event);
                Vec::new()
            }
            None => Vec::new(),
        }
    }

    /// `notify_profile` is set for contact metadata subscriptions, which
    /// report through `on_profile_changed` as well.
    fn apply_metadata(
        &self,
        state: &mut UserState,
        hex: &str,
        event: &Event,
        notify_profile: bool,
    ) -> Vec<Notification> {
        let stored = match classifier::parse_metadata(event, state.profile(hex)) {
            Ok(Some(stored)) => stored,
            Ok(None) => {
                trace!(hex, created_at = event.created_at.as_u64(), "stale metadata");
                return Vec::new();
            }
            Err(e) => {
                debug!(hex, id = %event.id, error = %e, "dropping malformed metadata");
                return Vec::new();
            }
        };
        debug!(hex, created_at = stored.created_at, "metadata updated");
        self.cache.set_object(hex, &stored);

        let mut notifications = Vec::new();
        if notify_profile {
            notifications.push(Notification::Profile(hex.to_string(), stored.profile.clone()));
        }
        if hex == state.hex() {
            notifications.push(Notification::UserMetadata(stored.profile.clone()));
        }
        state.set_profile(hex, stored);
        notifications
    }

    fn apply_contact_list(&self, state: &mut UserState, event: &Event) -> Vec<Notification> {
        let created_at = event.created_at.as_u64();
        if !state.has_explicit_relays() && state.take_hint_slot(created_at) {
            match classifier::parse_relay_hints(&event.content) {
                Ok(hints) => {
                    debug!(count = hints.len(), "relay hints from contact list");
                    self.remerge_relays(state, &hints);
                }
                Err(e) => trace!(error = %e, "contact list carries no relay hints"),
            }
        }

        let Some(contacts) = classifier::parse_contact_list(event, state.contacts()) else {
            trace!(created_at, "stale contact list");
            return Vec::new();
        };
        let change = state.replace_contacts(contacts);
        self.cache.set_object(CONTACTS_KEY, state.contacts());
        debug!(
            count = change.list.len(),
            added = change.added.len(),
            removed = change.removed.len(),
            "contacts updated"
        );
        vec![Notification::Contacts(change)]
    }

    fn apply_relay_list(&self, state: &mut UserState, event: &Event) {
        match classifier::parse_relay_list(event, state.relays()) {
            Ok(Some(relays)) => {
                debug!(
                    read = relays.read.len(),
                    write = relays.write.len(),
                    "relay list updated"
                );
                state.set_relays(relays);
                self.remerge_relays(state, &[]);
            }
            Ok(None) => trace!("stale relay list"),
            Err(e) => debug!(id = %event.id, error = %e, "dropping malformed relay list"),
        }
    }
}

fn validate_hex(hex: &str) -> Result<()> {
    if !is_hex(hex) {
        return Err(Error::InvalidHex(hex.to_string()));
    }
    pubkey_from_hex(hex).map(|_| ())
}
