use serde::{Deserialize, Serialize};

pub const METADATA_KIND: u32 = 0;
pub const CONTACT_LIST_KIND: u32 = 3;
pub const RELAY_LIST_KIND: u32 = 10002;

/// Relay every merged candidate list starts with.
pub const DISCOVERY_RELAY: &str = "wss://purplepag.es";

/// Bootstrap relays, used when fewer than two relays are otherwise known.
pub const DEFAULT_RELAYS: &[&str] = &[
    "wss://relay.nostr.band",
    "wss://relay.damus.io",
    "wss://nostr-pub.wellorder.net",
    "wss://nostr.mom",
    "wss://eden.nostr.land",
    "wss://nos.lol",
    "wss://relay.snort.social",
    "wss://nostr-relay.untethr.me",
    "wss://nostr.zebedee.social",
    "wss://offchain.pub",
    "wss://nostr.fmt.wiz.biz",
    "wss://nostr-relay.wlvs.space",
    "wss://relay.realsearch.cc",
    "wss://relay.nostrgraph.net",
    "wss://relay.minds.com/nostr/v1/ws",
];

pub const MAX_BATCH_SIZE: usize = 20;

pub const USER_HEX_KEY: &str = "userHex";
pub const CONTACTS_KEY: &str = "contacts";
pub const RELAYS_KEY: &str = "relays";

/// Parsed kind 0 content. Fields the author left out are empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileContent {
    pub name: String,
    pub display_name: String,
    pub username: String,
    pub picture: String,
    pub banner: String,
    pub about: String,
    pub nip05: String,
    pub lud06: String,
    pub lud16: String,
    pub website: String,
}

impl ProfileContent {
    /// Best human readable name: display name, then username, then name.
    pub fn username(&self) -> &str {
        [&self.display_name, &self.username, &self.name]
            .into_iter()
            .find(|s| !s.is_empty())
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Profile plus the `created_at` of the event it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredProfile {
    pub profile: ProfileContent,
    pub created_at: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactsState {
    pub list: Vec<String>,
    pub created_at: u64,
}

/// A followed identity, with its profile once resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Contact {
    Known(String, ProfileContent),
    Unknown(String),
}

impl Contact {
    pub fn hex(&self) -> &str {
        match self {
            Contact::Known(hex, _) | Contact::Unknown(hex) => hex,
        }
    }

    pub fn profile(&self) -> Option<&ProfileContent> {
        match self {
            Contact::Known(_, profile) => Some(profile),
            Contact::Unknown(_) => None,
        }
    }
}
