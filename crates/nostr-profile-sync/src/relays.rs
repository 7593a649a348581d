use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A user's declared NIP-65 relays. Replaced wholesale, never merged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayState {
    pub read: Vec<String>,
    pub write: Vec<String>,
    pub created_at: u64,
}

/// Inputs that do not change between merges: the discovery relay that always
/// leads, and the bootstrap list used when too few relays are known.
#[derive(Debug, Clone)]
pub struct RelayDefaults<'a> {
    pub discovery_relay: &'a str,
    pub bootstrap: &'a [String],
    pub min_relays: usize,
}

/// Ordered union of the discovery relay, read relays, write relays,
/// `previously_merged` and `extra`, keeping the first occurrence of each.
/// This is the working set that gets stored; it never holds bootstrap relays
/// unless something else listed them.
pub fn merge_working_set(
    defaults: &RelayDefaults<'_>,
    known: &RelayState,
    previously_merged: &[String],
    extra: &[String],
) -> Vec<String> {
    let mut merged = OrderedSet::default();
    merged.push(defaults.discovery_relay);
    merged.extend(&known.read);
    merged.extend(&known.write);
    merged.extend(previously_merged);
    merged.extend(extra);
    merged.into_vec()
}

/// [`merge_working_set`] plus the bootstrap list when fewer than
/// `min_relays` entries result. Used for a subscription's relay urls.
pub fn merge_relays(
    defaults: &RelayDefaults<'_>,
    known: &RelayState,
    previously_merged: &[String],
    extra: &[String],
) -> Vec<String> {
    let mut merged = OrderedSet::default();
    merged.extend(&merge_working_set(defaults, known, previously_merged, extra));
    if merged.len() < defaults.min_relays {
        merged.extend(defaults.bootstrap);
    }
    merged.into_vec()
}

/// Insertion-ordered set of strings.
#[derive(Default)]
pub(crate) struct OrderedSet {
    seen: HashSet<String>,
    items: Vec<String>,
}

impl OrderedSet {
    pub(crate) fn push(&mut self, item: &str) -> bool {
        if self.seen.contains(item) {
            return false;
        }
        self.seen.insert(item.to_string());
        self.items.push(item.to_string());
        true
    }

    pub(crate) fn extend<'a>(&mut self, items: impl IntoIterator<Item = &'a String>) {
        for item in items {
            self.push(item);
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.items.len()
    }

    pub(crate) fn into_vec(self) -> Vec<String> {
        self.items
    }
}
