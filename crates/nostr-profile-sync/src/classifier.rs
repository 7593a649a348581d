//! Interpretation of metadata, contact list and relay list events.
//!
//! The `parse_*` functions return `Ok(None)` when the event is well formed
//! but should not replace what is already held (older, equal timestamp, or a
//! different kind), and `Err` when the payload cannot be read.

use crate::relays::OrderedSet;
use crate::{
    ContactsState, Error, ProfileContent, RelayState, Result, StoredProfile, CONTACT_LIST_KIND,
    METADATA_KIND, RELAY_LIST_KIND,
};
use nostr::{Event, Kind};
use serde_json::{Map, Value};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Metadata,
    ContactList,
    RelayList,
}

impl EventKind {
    pub fn of(event: &Event) -> Option<Self> {
        [Self::Metadata, Self::ContactList, Self::RelayList]
            .into_iter()
            .find(|k| k.kind() == event.kind)
    }

    pub fn kind(self) -> Kind {
        let raw = match self {
            Self::Metadata => METADATA_KIND,
            Self::ContactList => CONTACT_LIST_KIND,
            Self::RelayList => RELAY_LIST_KIND,
        };
        Kind::from(raw as u16)
    }
}

pub fn tag_values(event: &Event) -> Vec<Vec<String>> {
    event.tags.iter().map(|t| t.clone().to_vec()).collect()
}

/// `["r", url]` serves both directions, `["r", url, "read" | "write"]` one.
pub fn parse_relay_tags(tags: &[Vec<String>], created_at: u64) -> Result<RelayState> {
    let mut read = OrderedSet::default();
    let mut write = OrderedSet::default();
    for tag in tags {
        let url = tag
            .get(1)
            .ok_or_else(|| Error::InvalidEvent("relay tag without url".to_string()))?;
        match tag.get(2).map(String::as_str) {
            Some("read") => {
                read.push(url);
            }
            Some("write") => {
                write.push(url);
            }
            _ => {
                read.push(url);
                write.push(url);
            }
        }
    }
    Ok(RelayState {
        read: read.into_vec(),
        write: write.into_vec(),
        created_at,
    })
}

pub fn parse_relay_list(event: &Event, current: &RelayState) -> Result<Option<RelayState>> {
    let created_at = event.created_at.as_u64();
    if EventKind::of(event) != Some(EventKind::RelayList) || created_at <= current.created_at {
        return Ok(None);
    }
    parse_relay_tags(&tag_values(event), created_at).map(Some)
}

/// Reads a kind 0 JSON object. Unknown keys are ignored and anything that is
/// not a string reads as empty.
pub fn parse_profile_content(content: &str) -> Result<ProfileContent> {
    let value: Value = serde_json::from_str(content)
        .map_err(|e| Error::InvalidEvent(format!("profile content: {}", e)))?;
    let Value::Object(map) = value else {
        return Err(Error::InvalidEvent(
            "profile content is not an object".to_string(),
        ));
    };

    let field = |key: &str| -> String {
        map.get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };
    let mut display_name = field("display_name");
    if display_name.is_empty() {
        display_name = field("displayName");
    }

    Ok(ProfileContent {
        name: field("name"),
        display_name,
        username: field("username"),
        picture: field("picture"),
        banner: field("banner"),
        about: field("about"),
        nip05: field("nip05"),
        lud06: field("lud06"),
        lud16: field("lud16"),
        website: field("website"),
    })
}

pub fn parse_metadata(
    event: &Event,
    stored: Option<&StoredProfile>,
) -> Result<Option<StoredProfile>> {
    let created_at = event.created_at.as_u64();
    if EventKind::of(event) != Some(EventKind::Metadata) {
        return Ok(None);
    }
    if stored.is_some_and(|s| created_at <= s.created_at) {
        return Ok(None);
    }
    Ok(Some(StoredProfile {
        profile: parse_profile_content(&event.content)?,
        created_at,
    }))
}

/// Hex keys of `p` tags, first occurrence wins.
pub fn filter_follows(tags: &[Vec<String>]) -> Vec<String> {
    let mut follows = OrderedSet::default();
    for tag in tags {
        if let [marker, hex, ..] = tag.as_slice() {
            if marker == "p" {
                follows.push(hex);
            }
        }
    }
    follows.into_vec()
}

pub fn parse_contact_list(event: &Event, current: &ContactsState) -> Option<ContactsState> {
    let created_at = event.created_at.as_u64();
    if EventKind::of(event) != Some(EventKind::ContactList) || created_at <= current.created_at {
        return None;
    }
    Some(ContactsState {
        list: filter_follows(&tag_values(event)),
        created_at,
    })
}

/// Relay URLs a kind 3 event lists as the keys of its JSON content.
pub fn parse_relay_hints(content: &str) -> Result<Vec<String>> {
    let map: Map<String, Value> = serde_json::from_str(content)
        .map_err(|e| Error::InvalidEvent(format!("relay hints: {}", e)))?;
    Ok(map.into_iter().map(|(url, _)| url).collect())
}

/// `(added, removed)` between two memberships, in list order.
pub fn diff_contacts(old: &[String], new: &[String]) -> (Vec<String>, Vec<String>) {
    let old_set: HashSet<&String> = old.iter().collect();
    let new_set: HashSet<&String> = new.iter().collect();
    let added = new.iter().filter(|h| !old_set.contains(h)).cloned().collect();
    let removed = old.iter().filter(|h| !new_set.contains(h)).cloned().collect();
    (added, removed)
}
