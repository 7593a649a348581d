use nostr::EventId;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

/// Event ids already handed to business logic.
///
/// Clones share the same set, so one instance can back several
/// [`crate::ProfileSync`] coordinators. Grows until [`SeenEvents::clear`].
#[derive(Clone, Default)]
pub struct SeenEvents {
    ids: Arc<Mutex<HashSet<EventId>>>,
}

impl SeenEvents {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `id`. Returns `false` if it was already recorded.
    pub fn insert(&self, id: EventId) -> bool {
        self.ids().insert(id)
    }

    pub fn contains(&self, id: &EventId) -> bool {
        self.ids().contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids().len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids().is_empty()
    }

    pub fn clear(&self) {
        self.ids().clear();
    }

    fn ids(&self) -> MutexGuard<'_, HashSet<EventId>> {
        self.ids.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
