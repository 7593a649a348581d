use crate::ProfileContent;
use std::fmt;
use std::sync::Arc;

pub type OnProfileChanged = Arc<dyn Fn(&str, &ProfileContent) + Send + Sync>;
pub type OnContactsChanged = Arc<dyn Fn(&ContactsChange) + Send + Sync>;
pub type OnUserMetadataChanged = Arc<dyn Fn(&ProfileContent) + Send + Sync>;

/// A new contact list together with its difference to the previous one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactsChange {
    pub list: Vec<String>,
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

/// Consumer hooks. Unset hooks are skipped.
#[derive(Clone, Default)]
pub struct SyncCallbacks {
    pub on_profile_changed: Option<OnProfileChanged>,
    pub on_contacts_changed: Option<OnContactsChanged>,
    pub on_user_metadata_changed: Option<OnUserMetadataChanged>,
}

impl SyncCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_profile_changed(
        mut self,
        f: impl Fn(&str, &ProfileContent) + Send + Sync + 'static,
    ) -> Self {
        self.on_profile_changed = Some(Arc::new(f));
        self
    }

    pub fn on_contacts_changed(mut self, f: impl Fn(&ContactsChange) + Send + Sync + 'static) -> Self {
        self.on_contacts_changed = Some(Arc::new(f));
        self
    }

    pub fn on_user_metadata_changed(
        mut self,
        f: impl Fn(&ProfileContent) + Send + Sync + 'static,
    ) -> Self {
        self.on_user_metadata_changed = Some(Arc::new(f));
        self
    }

    pub(crate) fn dispatch(&self, notifications: Vec<Notification>) {
        for notification in notifications {
            match notification {
                Notification::Profile(hex, profile) => {
                    if let Some(cb) = &self.on_profile_changed {
                        cb(&hex, &profile);
                    }
                }
                Notification::Contacts(change) => {
                    if let Some(cb) = &self.on_contacts_changed {
                        cb(&change);
                    }
                }
                Notification::UserMetadata(profile) => {
                    if let Some(cb) = &self.on_user_metadata_changed {
                        cb(&profile);
                    }
                }
            }
        }
    }
}

impl fmt::Debug for SyncCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncCallbacks")
            .field("on_profile_changed", &self.on_profile_changed.is_some())
            .field("on_contacts_changed", &self.on_contacts_changed.is_some())
            .field("on_user_metadata_changed", &self.on_user_metadata_changed.is_some())
            .finish()
    }
}

/// Collected while state is locked, dispatched once the lock is released.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Notification {
    Profile(String, ProfileContent),
    Contacts(ContactsChange),
    UserMetadata(ProfileContent),
}
