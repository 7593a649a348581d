use crate::classifier::diff_contacts;
use crate::{ContactsChange, ContactsState, RelayState, StoredProfile};
use std::collections::HashMap;
use std::time::Duration;

/// Lifecycle of the tracked identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Uninitialized,
    CacheChecking,
    /// Cache was warm; no subscription was opened.
    CacheHit,
    /// Subscription for the identity's own events is open, backlog pending.
    Subscribing,
    /// Backlog delivered; only live events follow.
    Live,
    TornDown,
}

/// What an open subscription was opened for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SubscriptionPurpose {
    /// Metadata, contacts and relays of the tracked identity.
    User,
    /// Metadata of the listed authors.
    Metadata(Vec<String>),
}

#[derive(Debug, Clone)]
struct InFlight {
    sub_id: String,
    since_ms: u64,
}

/// Read-only copy of the tracked identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserSnapshot {
    pub hex: String,
    pub relays: RelayState,
    pub contacts: ContactsState,
}

pub(crate) struct UserState {
    hex: String,
    phase: SyncPhase,
    relays: RelayState,
    contacts: ContactsState,
    merged_relays: Vec<String>,
    explicit_relays: bool,
    latest_hint_at: u64,
    profiles: HashMap<String, StoredProfile>,
    in_flight: HashMap<String, InFlight>,
    subscriptions: HashMap<String, SubscriptionPurpose>,
}

impl UserState {
    pub(crate) fn new(hex: String) -> Self {
        Self {
            hex,
            phase: SyncPhase::Uninitialized,
            relays: RelayState::default(),
            contacts: ContactsState::default(),
            merged_relays: Vec::new(),
            explicit_relays: false,
            latest_hint_at: 0,
            profiles: HashMap::new(),
            in_flight: HashMap::new(),
            subscriptions: HashMap::new(),
        }
    }

    pub(crate) fn hex(&self) -> &str {
        &self.hex
    }

    pub(crate) fn phase(&self) -> SyncPhase {
        self.phase
    }

    pub(crate) fn set_phase(&mut self, phase: SyncPhase) {
        self.phase = phase;
    }

    pub(crate) fn relays(&self) -> &RelayState {
        &self.relays
    }

    pub(crate) fn contacts(&self) -> &ContactsState {
        &self.contacts
    }

    pub(crate) fn merged_relays(&self) -> &[String] {
        &self.merged_relays
    }

    pub(crate) fn snapshot(&self) -> UserSnapshot {
        UserSnapshot {
            hex: self.hex.clone(),
            relays: self.relays.clone(),
            contacts: self.contacts.clone(),
        }
    }

    pub(crate) fn profile(&self, hex: &str) -> Option<&StoredProfile> {
        self.profiles.get(hex)
    }

    pub(crate) fn profiles(&self) -> &HashMap<String, StoredProfile> {
        &self.profiles
    }

    pub(crate) fn set_relays(&mut self, relays: RelayState) {
        self.relays = relays;
    }

    pub(crate) fn set_merged_relays(&mut self, merged: Vec<String>) {
        self.merged_relays = merged;
    }

    /// Set when the caller supplied its own relay list; contact list relay
    /// hints are ignored from then on.
    pub(crate) fn set_explicit_relays(&mut self) {
        self.explicit_relays = true;
    }

    pub(crate) fn has_explicit_relays(&self) -> bool {
        self.explicit_relays
    }

    /// Hints from a contact list at `created_at` are only taken once, and only
    /// if newer than the last contact list that seeded relays.
    pub(crate) fn take_hint_slot(&mut self, created_at: u64) -> bool {
        if created_at <= self.latest_hint_at {
            return false;
        }
        self.latest_hint_at = created_at;
        true
    }

    /// Loads cached contacts without diffing.
    pub(crate) fn restore_contacts(&mut self, contacts: ContactsState) {
        self.contacts = contacts;
    }

    /// Replaces the membership and reports what changed against the old one.
    pub(crate) fn replace_contacts(&mut self, contacts: ContactsState) -> ContactsChange {
        let (added, removed) = diff_contacts(&self.contacts.list, &contacts.list);
        self.contacts = contacts;
        ContactsChange {
            list: self.contacts.list.clone(),
            added,
            removed,
        }
    }

    pub(crate) fn set_profile(&mut self, hex: &str, stored: StoredProfile) {
        self.profiles.insert(hex.to_string(), stored);
    }

    pub(crate) fn track_subscription(&mut self, sub_id: &str, purpose: SubscriptionPurpose) {
        self.subscriptions.insert(sub_id.to_string(), purpose);
    }

    pub(crate) fn subscription(&self, sub_id: &str) -> Option<&SubscriptionPurpose> {
        self.subscriptions.get(sub_id)
    }

    pub(crate) fn remove_subscription(&mut self, sub_id: &str) -> Option<SubscriptionPurpose> {
        self.subscriptions.remove(sub_id)
    }

    /// Drops every subscription and in-flight marker, returning the ids to close.
    pub(crate) fn take_subscriptions(&mut self) -> Vec<String> {
        self.in_flight.clear();
        self.subscriptions.drain().map(|(id, _)| id).collect()
    }

    pub(crate) fn mark_in_flight(&mut self, hexes: &[String], sub_id: &str, now_ms: u64) {
        for hex in hexes {
            self.in_flight.insert(
                hex.clone(),
                InFlight {
                    sub_id: sub_id.to_string(),
                    since_ms: now_ms,
                },
            );
        }
    }

    /// True while a metadata subscription for `hex` is pending. Markers older
    /// than `timeout` no longer count.
    pub(crate) fn is_in_flight(&self, hex: &str, now_ms: u64, timeout: Option<Duration>) -> bool {
        let Some(marker) = self.in_flight.get(hex) else {
            return false;
        };
        match timeout {
            Some(timeout) => now_ms.saturating_sub(marker.since_ms) < timeout.as_millis() as u64,
            None => true,
        }
    }

    /// Clears the markers owned by `sub_id`; markers re-set by a newer
    /// subscription stay.
    pub(crate) fn clear_in_flight(&mut self, sub_id: &str) -> usize {
        let before = self.in_flight.len();
        self.in_flight.retain(|_, marker| marker.sub_id != sub_id);
        before - self.in_flight.len()
    }

    pub(crate) fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }
}
