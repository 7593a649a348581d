//! Profile, contact list and relay list synchronization for Nostr clients.
//!
//! [`ProfileSync`] tracks one identity: it serves metadata (kind 0), the
//! follow list (kind 3) and the NIP-65 relay list (kind 10002) from an
//! [`ExpiringCache`], subscribes through a [`SubscriptionTransport`] when the
//! cache is cold, resolves contact profiles in bounded batches, and reports
//! changes through [`SyncCallbacks`].

pub mod callbacks;
pub mod classifier;
pub mod config;
pub mod error;
pub mod file_storage;
pub mod profile_sync;
pub mod pubsub;
pub mod relays;
pub mod seen_events;
pub mod storage;
pub mod ttl_cache;
pub mod types;
pub mod user_state;
pub mod utils;

pub use callbacks::{
    ContactsChange, OnContactsChanged, OnProfileChanged, OnUserMetadataChanged, SyncCallbacks,
};
pub use classifier::EventKind;
pub use config::SyncConfig;
pub use error::{Error, Result};
pub use file_storage::FileStorage;
pub use profile_sync::{ProfileSync, TrackOptions};
pub use pubsub::{
    build_filter, AlreadyHaveEvent, ChannelTransport, FilterBuilder, SubscriptionRequest,
    SubscriptionTransport, TransportCommand,
};
pub use relays::{merge_relays, merge_working_set, RelayDefaults, RelayState};
pub use seen_events::SeenEvents;
pub use storage::{InMemoryStorage, StorageAdapter};
pub use ttl_cache::ExpiringCache;
pub use types::*;
pub use user_state::{SyncPhase, UserSnapshot};
pub use utils::{is_hex, pubkey_from_hex, Clock};
