//! Credentials Module
//!
//! Supplies bearer tokens to the crawl client and rotates them when the
//! remote service reports an exhausted quota (HTTP 402).
//!
//! A [`KeyRing`] holds a primary key plus ordered backups. When a key is
//! reported exhausted the ring advances to the next key that has not been
//! exhausted yet. With a [`KeyRingStorage`] attached the ring state survives
//! restarts, encrypted at rest.

pub mod storage;

pub use storage::KeyRingStorage;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{error, info, warn};

use crate::types::key_hint;

/// Name under which the crawler key is reported and persisted
pub const CRAWLER_KEY_NAME: &str = "WEBCRAWLER_API_KEY";

/// Source of bearer tokens, with a hook for quota exhaustion
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Token to authenticate the next request, if any is usable
    fn bearer_token(&self) -> Option<String>;

    /// Called when `exhausted` hit its quota. Returns true when a different,
    /// not yet exhausted token is now active.
    async fn rotate(&self, exhausted: &str) -> bool;
}

/// Serializable ring state, shared with the storage layer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRingState {
    pub name: String,
    pub keys: Vec<String>,
    pub active: usize,
    #[serde(default)]
    pub exhausted: Vec<usize>,
}

impl KeyRingState {
    fn active_key(&self) -> Option<&String> {
        self.keys
            .get(self.active)
            .filter(|_| !self.exhausted.contains(&self.active))
    }

    fn mark_exhausted(&mut self, index: usize) {
        if !self.exhausted.contains(&index) {
            self.exhausted.push(index);
        }
    }

    fn next_available(&self) -> Option<usize> {
        (0..self.keys.len()).find(|i| !self.exhausted.contains(i))
    }
}

/// Format check for a single key
#[derive(Debug, Clone, Serialize)]
pub struct KeyStatus {
    pub hint: String,
    pub valid_format: bool,
    pub active: bool,
    pub exhausted: bool,
}

/// Primary + backup keys with rotation on quota exhaustion
pub struct KeyRing {
    state: RwLock<KeyRingState>,
    storage: Option<KeyRingStorage>,
}

impl KeyRing {
    /// Build a ring from a primary key and its backups. Blank and duplicate
    /// keys are dropped, order is kept.
    pub fn new(name: impl Into<String>, primary: &str, backups: &[String]) -> Self {
        let mut keys: Vec<String> = Vec::new();
        for key in std::iter::once(primary).chain(backups.iter().map(String::as_str)) {
            let key = key.trim();
            if !key.is_empty() && !keys.iter().any(|k| k == key) {
                keys.push(key.to_string());
            }
        }

        Self {
            state: RwLock::new(KeyRingState {
                name: name.into(),
                keys,
                active: 0,
                exhausted: Vec::new(),
            }),
            storage: None,
        }
    }

    /// A ring with one key and nothing to rotate to
    pub fn single(name: impl Into<String>, key: &str) -> Self {
        Self::new(name, key, &[])
    }

    /// Restore ring state from `storage` when it still describes the same
    /// configured keys, otherwise start fresh. Rotations are persisted.
    pub async fn restore(
        storage: KeyRingStorage,
        name: impl Into<String>,
        primary: &str,
        backups: &[String],
    ) -> anyhow::Result<Self> {
        let fresh = Self::new(name, primary, backups);
        let configured = fresh.snapshot();

        let state = match storage.load().await? {
            Some(saved) if saved.name == configured.name && saved.keys == configured.keys => {
                info!(
                    name = %saved.name,
                    active = saved.active,
                    exhausted = saved.exhausted.len(),
                    "Restored key ring state"
                );
                saved
            }
            Some(_) => {
                warn!("Stored key ring does not match configured keys, starting fresh");
                configured
            }
            None => configured,
        };

        Ok(Self {
            state: RwLock::new(state),
            storage: Some(storage),
        })
    }

    pub fn snapshot(&self) -> KeyRingState {
        self.read().clone()
    }

    pub fn len(&self) -> usize {
        self.read().keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().keys.is_empty()
    }

    /// Per-key format report; keys are only ever shown as hints
    pub fn validate(&self) -> Vec<KeyStatus> {
        let state = self.read();
        state
            .keys
            .iter()
            .enumerate()
            .map(|(i, key)| KeyStatus {
                hint: key_hint(key),
                valid_format: is_valid_key_format(key),
                active: i == state.active,
                exhausted: state.exhausted.contains(&i),
            })
            .collect()
    }

    /// Human-readable summary for the CLI
    pub fn report(&self) -> String {
        let name = self.read().name.clone();
        let mut report = format!("Key ring: {}\n", name);
        for (i, status) in self.validate().iter().enumerate() {
            report.push_str(&format!(
                "  [{}] {} {}{}{}\n",
                i,
                status.hint,
                if status.valid_format { "valid" } else { "invalid format" },
                if status.active { ", active" } else { "" },
                if status.exhausted { ", exhausted" } else { "" },
            ));
        }
        report
    }

    async fn persist(&self, state: KeyRingState) {
        if let Some(storage) = &self.storage {
            if let Err(e) = storage.save(&state).await {
                error!(error = %e, "Failed to persist key ring");
            }
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, KeyRingState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, KeyRingState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl CredentialProvider for KeyRing {
    fn bearer_token(&self) -> Option<String> {
        self.read().active_key().cloned()
    }

    async fn rotate(&self, exhausted: &str) -> bool {
        let (rotated, snapshot) = {
            let mut state = self.write();

            let Some(index) = state.keys.iter().position(|k| k == exhausted) else {
                warn!(key = %key_hint(exhausted), "Rotation requested for a key not in the ring");
                return state.active_key().is_some();
            };

            state.mark_exhausted(index);
            if state.active != index && state.active_key().is_some() {
                // Someone already moved past this key
                return true;
            }

            match state.next_available() {
                Some(next) => {
                    info!(
                        name = %state.name,
                        from = %key_hint(exhausted),
                        to = %key_hint(&state.keys[next]),
                        "Rotating API key after quota exhaustion"
                    );
                    state.active = next;
                    (true, state.clone())
                }
                None => {
                    error!(name = %state.name, "No backup keys left to rotate to");
                    (false, state.clone())
                }
            }
        };

        self.persist(snapshot).await;
        rotated
    }
}

/// Keys are at least 16 characters of ASCII letters, digits and dashes
pub fn is_valid_key_format(key: &str) -> bool {
    key.len() >= 16 && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backups() -> Vec<String> {
        vec!["backup-key-0000000001".to_string(), "backup-key-0000000002".to_string()]
    }

    #[tokio::test]
    async fn test_rotation_walks_backups_in_order() {
        let ring = KeyRing::new(CRAWLER_KEY_NAME, "primary-key-00000001", &backups());
        assert_eq!(ring.bearer_token().as_deref(), Some("primary-key-00000001"));

        assert!(ring.rotate("primary-key-00000001").await);
        assert_eq!(ring.bearer_token().as_deref(), Some("backup-key-0000000001"));

        assert!(ring.rotate("backup-key-0000000001").await);
        assert_eq!(ring.bearer_token().as_deref(), Some("backup-key-0000000002"));

        assert!(!ring.rotate("backup-key-0000000002").await);
        assert_eq!(ring.bearer_token(), None);
    }

    #[tokio::test]
    async fn test_stale_rotation_is_idempotent() {
        let ring = KeyRing::new(CRAWLER_KEY_NAME, "primary-key-00000001", &backups());
        assert!(ring.rotate("primary-key-00000001").await);
        // A second report for the same key must not skip the fresh backup
        assert!(ring.rotate("primary-key-00000001").await);
        assert_eq!(ring.bearer_token().as_deref(), Some("backup-key-0000000001"));
    }

    #[tokio::test]
    async fn test_single_key_cannot_rotate() {
        let ring = KeyRing::single(CRAWLER_KEY_NAME, "only-key-0000000001");
        assert!(!ring.rotate("only-key-0000000001").await);
        assert!(ring.bearer_token().is_none());
    }

    #[test]
    fn test_blank_and_duplicate_keys_dropped() {
        let ring = KeyRing::new(
            CRAWLER_KEY_NAME,
            "primary-key-00000001",
            &["".to_string(), "primary-key-00000001".to_string(), " extra-key-000000001 ".to_string()],
        );
        assert_eq!(ring.len(), 2);
        assert_eq!(ring.snapshot().keys[1], "extra-key-000000001");
    }

    #[test]
    fn test_validate_and_report_mask_keys() {
        let ring = KeyRing::new(CRAWLER_KEY_NAME, "primary-key-00000001", &["short!".to_string()]);
        let statuses = ring.validate();
        assert!(statuses[0].valid_format);
        assert!(statuses[0].active);
        assert!(!statuses[1].valid_format);

        let report = ring.report();
        assert!(report.contains("••••0001"));
        assert!(!report.contains("primary-key-00000001"));
    }

    #[test]
    fn test_key_format() {
        assert!(is_valid_key_format("b0a58413f6d2d8acb2bd"));
        assert!(is_valid_key_format("webcrawler-backup-key-1"));
        assert!(!is_valid_key_format("too-short"));
        assert!(!is_valid_key_format("has spaces in the key value"));
    }
}
