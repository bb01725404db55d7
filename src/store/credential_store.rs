use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::config::settings::{StoreConfig, StoreKind};
use crate::store::kv::{FileKv, KeyValueStore, MemoryKv};
use crate::utils::constants::{ACCESS_KEY, REFRESH_KEY};

/// The persisted credential pair. Both halves are present or neither is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Session {
    Empty,
    Populated {
        access_token: String,
        refresh_token: String,
    },
}

impl Session {
    fn from_parts(access_token: String, refresh_token: String) -> Self {
        if access_token.is_empty() || refresh_token.is_empty() {
            Session::Empty
        } else {
            Session::Populated {
                access_token,
                refresh_token,
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Session::Empty)
    }

    pub fn access_token(&self) -> &str {
        match self {
            Session::Empty => "",
            Session::Populated { access_token, .. } => access_token,
        }
    }

    pub fn refresh_token(&self) -> &str {
        match self {
            Session::Empty => "",
            Session::Populated { refresh_token, .. } => refresh_token,
        }
    }
}

/// Typed accessor over the durable medium. Cheap to clone; clones share the medium.
///
/// Medium failures never surface: they are logged and read as "no credential".
/// Compound operations hold one lock, so readers in this process never see a
/// half-written pair.
#[derive(Clone)]
pub struct CredentialStore {
    medium: Arc<dyn KeyValueStore>,
    lock: Arc<Mutex<()>>,
    access_key: String,
    refresh_key: String,
}

impl CredentialStore {
    pub fn new(medium: Arc<dyn KeyValueStore>) -> Self {
        Self::with_keys(medium, ACCESS_KEY, REFRESH_KEY)
    }

    pub fn with_keys(medium: Arc<dyn KeyValueStore>, access_key: &str, refresh_key: &str) -> Self {
        Self {
            medium,
            lock: Arc::new(Mutex::new(())),
            access_key: access_key.to_owned(),
            refresh_key: refresh_key.to_owned(),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryKv::new()))
    }

    pub fn from_config(config: &StoreConfig) -> Self {
        let medium: Arc<dyn KeyValueStore> = match (config.kind, &config.path) {
            (StoreKind::File, Some(path)) => Arc::new(FileKv::new(path)),
            _ => Arc::new(MemoryKv::new()),
        };
        Self::with_keys(medium, &config.access_key, &config.refresh_key)
    }

    pub fn get_access(&self) -> String {
        self.session().access_token().to_owned()
    }

    pub fn get_refresh(&self) -> String {
        self.session().refresh_token().to_owned()
    }

    pub fn session(&self) -> Session {
        let _guard = self.lock.lock();
        Session::from_parts(self.read(&self.access_key), self.read(&self.refresh_key))
    }

    /// Overwrites both credentials. A pair with an empty half clears the session instead.
    pub fn set(&self, access_token: &str, refresh_token: &str) {
        if access_token.is_empty() || refresh_token.is_empty() {
            warn!("refusing to store a partial session, clearing instead");
            self.clear();
            return;
        }
        let _guard = self.lock.lock();
        // refresh first: an interrupted write then reads back as a stale but complete pair
        self.write(&self.refresh_key, refresh_token);
        self.write(&self.access_key, access_token);
        debug!("session stored");
    }

    pub fn clear(&self) {
        let _guard = self.lock.lock();
        self.remove(&self.access_key);
        self.remove(&self.refresh_key);
        debug!("session cleared");
    }

    fn read(&self, key: &str) -> String {
        self.medium
            .get(key)
            .inspect_err(|err| warn!("credential store read '{}' failed: {}", key, err))
            .ok()
            .flatten()
            .unwrap_or_default()
    }

    fn write(&self, key: &str, value: &str) {
        let _ = self
            .medium
            .set(key, value)
            .inspect_err(|err| warn!("credential store write '{}' failed: {}", key, err));
    }

    fn remove(&self, key: &str) {
        let _ = self
            .medium
            .delete(key)
            .inspect_err(|err| warn!("credential store delete '{}' failed: {}", key, err));
    }
}
