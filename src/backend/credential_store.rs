//! Persistent credential store seam
//!
//! Persistence itself is a collaborator's job; the core only consults it
//! for the skip-provisioning fast path and hands it validated credentials.

use std::sync::{Arc, Mutex};

use crate::core::types::WifiCredentials;

/// Key-value store holding at most one set of WiFi credentials
///
/// Object-safe and synchronous so the coordinator can hold it as a trait
/// object without caring which storage backs it.
pub trait CredentialStore: Send + Sync {
    fn get(&self) -> Option<WifiCredentials>;
    fn put(&self, credentials: &WifiCredentials);
    fn erase(&self);
}

/// In-memory credential store for testing
#[derive(Default)]
pub struct MockCredentialStore {
    inner: Mutex<Option<WifiCredentials>>,
}

impl MockCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store pre-seeded with credentials
    pub fn with_credentials(credentials: WifiCredentials) -> Arc<Self> {
        let store = Self::new();
        store.put(&credentials);
        Arc::new(store)
    }
}

impl CredentialStore for MockCredentialStore {
    fn get(&self) -> Option<WifiCredentials> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn put(&self, credentials: &WifiCredentials) {
        *self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(credentials.clone());
    }

    fn erase(&self) {
        *self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = None;
    }
}
