//! Expiring credential storage.
//!
//! The browser build of UniHub kept its tokens in cookies; here the same
//! contract is a JSON state file plus an in-memory map. Every entry carries
//! an explicit retention tier and optional expiry, so what the cookie layer
//! used to infer from "which jar holds the value" is now a plain field.
//!
//! The store never returns errors: absence is `None`, storage trouble
//! degrades to memory-only operation and gets logged.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Credential file name in the state directory
const STORE_FILE: &str = "credentials.json";

/// Storage key for the access token (always session-scoped; the JWT's own
/// expiry bounds its usable life).
pub const ACCESS_TOKEN_KEY: &str = "access_token";

/// Storage key for the refresh token.
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";

/// Storage key for the mirrored user profile.
pub const PROFILE_KEY: &str = "profile";

/// How long a value is kept around.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetentionTier {
    /// No recorded expiry; the value's own semantics bound its life.
    Session,
    /// Explicit multi-day expiry recorded on the entry.
    Long,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredEntry {
    value: String,
    tier: RetentionTier,
    expires_at: Option<DateTime<Utc>>,
}

impl StoredEntry {
    fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expiry) => Utc::now() >= expiry,
            None => false,
        }
    }
}

pub struct CredentialStore {
    path: Option<PathBuf>,
    entries: Mutex<HashMap<String, StoredEntry>>,
}

impl CredentialStore {
    /// Open the store backed by `credentials.json` under `state_dir`.
    /// A missing or unreadable file is a fresh store, not an error.
    pub fn open(state_dir: &Path) -> Self {
        let path = state_dir.join(STORE_FILE);
        let mut entries = match std::fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<HashMap<String, StoredEntry>>(&contents) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(error = %e, "Credential file unreadable, starting fresh");
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };

        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired());
        if entries.len() < before {
            debug!(purged = before - entries.len(), "Dropped expired credentials");
        }

        Self {
            path: Some(path),
            entries: Mutex::new(entries),
        }
    }

    /// A store with no file backing. Used by tests and by environments
    /// where no writable state directory exists.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            entries: Mutex::new(HashMap::new()),
        }
    }

    // A poisoned lock only means a writer panicked mid-update; the map
    // itself is still usable, and this store promises not to panic.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, StoredEntry>> {
        self.entries.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Get the live value under `name`. Expired entries read as absent and
    /// are purged on observation.
    pub fn get(&self, name: &str) -> Option<String> {
        let mut entries = self.lock();
        match entries.get(name) {
            Some(entry) if entry.is_expired() => {
                debug!(name, "Credential expired, purging");
                entries.remove(name);
                self.persist(&entries);
                None
            }
            Some(entry) => Some(entry.value.clone()),
            None => None,
        }
    }

    /// Store `value` under `name`. `retention_days: Some(d)` records a
    /// long-tier entry expiring in `d` days; `None` records a session-tier
    /// entry with no expiry of its own. Replaces any existing entry.
    pub fn set(&self, name: &str, value: &str, retention_days: Option<u32>) {
        let entry = StoredEntry {
            value: value.to_string(),
            tier: match retention_days {
                Some(_) => RetentionTier::Long,
                None => RetentionTier::Session,
            },
            expires_at: retention_days.map(|days| Utc::now() + Duration::days(days as i64)),
        };

        let mut entries = self.lock();
        entries.insert(name.to_string(), entry);
        self.persist(&entries);
    }

    /// Remove the entry under `name`. Deleting an absent name is a no-op.
    pub fn delete(&self, name: &str) {
        let mut entries = self.lock();
        if entries.remove(name).is_some() {
            self.persist(&entries);
        }
    }

    /// The stored retention tier, if a live entry exists.
    pub fn tier_of(&self, name: &str) -> Option<RetentionTier> {
        let entries = self.lock();
        entries
            .get(name)
            .filter(|entry| !entry.is_expired())
            .map(|entry| entry.tier)
    }

    /// The recorded expiry of a live entry, if it has one.
    pub fn expires_at(&self, name: &str) -> Option<DateTime<Utc>> {
        let entries = self.lock();
        entries
            .get(name)
            .filter(|entry| !entry.is_expired())
            .and_then(|entry| entry.expires_at)
    }

    /// Best-effort write-through. Failure degrades to memory-only.
    fn persist(&self, entries: &HashMap<String, StoredEntry>) {
        let Some(ref path) = self.path else {
            return;
        };

        if let Some(parent) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                warn!(error = %e, "Cannot create state directory, credentials stay in memory");
                return;
            }
        }

        match serde_json::to_string_pretty(entries) {
            Ok(contents) => {
                if let Err(e) = std::fs::write(path, contents) {
                    warn!(error = %e, "Failed to persist credentials");
                }
            }
            Err(e) => warn!(error = %e, "Failed to serialize credentials"),
        }
    }
}
