//! Time-to-live layer over a [`StorageAdapter`].
//!
//! Every entry is written as an envelope carrying its absolute expiry. Reads
//! of expired entries behave as misses and delete the entry. Storage errors
//! never surface: a failed read is a miss, a failed write is logged and
//! dropped.

use crate::utils::{system_clock, Clock};
use crate::StorageAdapter;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Envelope {
    value: String,
    expires_at: u64,
}

#[derive(Clone)]
pub struct ExpiringCache {
    storage: Arc<dyn StorageAdapter>,
    prefix: String,
    ttl_millis: u64,
    clock: Clock,
}

impl ExpiringCache {
    pub fn new(storage: Arc<dyn StorageAdapter>, namespace: &str, ttl: Duration) -> Self {
        Self::with_clock(storage, namespace, ttl, system_clock())
    }

    pub fn with_clock(
        storage: Arc<dyn StorageAdapter>,
        namespace: &str,
        ttl: Duration,
        clock: Clock,
    ) -> Self {
        Self {
            storage,
            prefix: format!("{}/", namespace),
            ttl_millis: ttl.as_millis() as u64,
            clock,
        }
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_millis)
    }

    fn key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let full_key = self.key(key);
        let raw = match self.storage.get(&full_key) {
            Ok(raw) => raw?,
            Err(e) => {
                warn!(key, error = %e, "cache read failed");
                return None;
            }
        };
        let envelope = match serde_json::from_str::<Envelope>(&raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                debug!(key, error = %e, "dropping unreadable cache entry");
                self.remove(&full_key);
                return None;
            }
        };
        if envelope.expires_at <= (self.clock)() {
            debug!(key, "cache entry expired");
            self.remove(&full_key);
            return None;
        }
        Some(envelope.value)
    }

    pub fn get_object<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.get(key)?;
        match serde_json::from_str(&value) {
            Ok(obj) => Some(obj),
            Err(e) => {
                debug!(key, error = %e, "cache entry has unexpected shape");
                None
            }
        }
    }

    pub fn set(&self, key: &str, value: impl Into<String>) {
        let envelope = Envelope {
            value: value.into(),
            expires_at: (self.clock)().saturating_add(self.ttl_millis),
        };
        let serialized = match serde_json::to_string(&envelope) {
            Ok(serialized) => serialized,
            Err(e) => {
                warn!(key, error = %e, "cache envelope serialization failed");
                return;
            }
        };
        if let Err(e) = self.storage.put(&self.key(key), serialized) {
            warn!(key, error = %e, "cache write failed");
        }
    }

    pub fn set_object<T: Serialize>(&self, key: &str, value: &T) {
        match serde_json::to_string(value) {
            Ok(serialized) => self.set(key, serialized),
            Err(e) => warn!(key, error = %e, "cache value serialization failed"),
        }
    }

    pub fn delete(&self, key: &str) {
        self.remove(&self.key(key));
    }

    /// Removes every entry in this cache's namespace.
    pub fn clear(&self) {
        match self.storage.list(&self.prefix) {
            Ok(keys) => {
                debug!(count = keys.len(), "clearing cache");
                for key in keys {
                    self.remove(&key);
                }
            }
            Err(e) => warn!(error = %e, "cache clear failed"),
        }
    }

    fn remove(&self, full_key: &str) {
        if let Err(e) = self.storage.del(full_key) {
            warn!(key = full_key, error = %e, "cache delete failed");
        }
    }
}
