use crate::{Error, Result, DEFAULT_RELAYS, DISCOVERY_RELAY, MAX_BATCH_SIZE};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Tunables for [`crate::ProfileSync`] and its cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Lifetime of every cache entry, in seconds.
    pub cache_ttl_secs: u64,

    /// Key prefix for everything the cache writes.
    pub cache_namespace: String,

    /// Always first in the merged relay list.
    pub discovery_relay: String,

    /// Bootstrap relays used when fewer than `min_relays` are known.
    pub default_relays: Vec<String>,

    pub min_relays: usize,

    /// Upper bound on authors per batch metadata subscription.
    pub batch_size: usize,

    /// Passed through to the transport.
    pub skip_verification: bool,

    /// In-flight markers older than this are ignored. `None` keeps them
    /// until EOSE.
    pub in_flight_timeout_secs: Option<u64>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: 60 * 60 * 24,
            cache_namespace: "__ttlCacheProfiles__".to_string(),
            discovery_relay: DISCOVERY_RELAY.to_string(),
            default_relays: DEFAULT_RELAYS.iter().map(|r| r.to_string()).collect(),
            min_relays: 2,
            batch_size: MAX_BATCH_SIZE,
            skip_verification: false,
            in_flight_timeout_secs: Some(60),
        }
    }
}

impl SyncConfig {
    /// Load from a JSON file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config file: {}", e)))?;
        let config: SyncConfig = serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse config file: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)
            .map_err(|e| Error::Config(format!("Failed to write config file: {}", e)))
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 || self.batch_size > MAX_BATCH_SIZE {
            return Err(Error::Config(format!(
                "batch_size must be between 1 and {}",
                MAX_BATCH_SIZE
            )));
        }
        if self.cache_ttl_secs == 0 {
            return Err(Error::Config("cache_ttl_secs must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn in_flight_timeout(&self) -> Option<Duration> {
        self.in_flight_timeout_secs.map(Duration::from_secs)
    }
}
