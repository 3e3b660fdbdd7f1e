//! Key Ring Storage
//!
//! Encrypted file-based persistence for the key ring, so rotations survive
//! restarts. API keys are encrypted with AES-256-GCM; the ring metadata
//! (active index, exhausted indices) is stored in the clear.

use super::KeyRingState;
use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, warn};

const KEYRING_FILE: &str = "keyring.json";
const ENCRYPTION_KEY_FILE: &str = ".keyring_key";
const NONCE_SIZE: usize = 12;

/// Encrypted key ring file manager
#[derive(Debug, Clone)]
pub struct KeyRingStorage {
    keyring_path: PathBuf,
    key_path: PathBuf,
}

impl KeyRingStorage {
    /// Storage under the XDG data directory (or `~/.local/share`)
    pub fn new() -> Self {
        let base_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                std::env::var("HOME")
                    .map(|h| PathBuf::from(h).join(".local/share"))
                    .unwrap_or_else(|_| PathBuf::from("."))
            })
            .join("faceless-crawler");

        Self::with_path(base_dir)
    }

    pub fn with_path(base_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        Self {
            keyring_path: base_dir.join(KEYRING_FILE),
            key_path: base_dir.join(ENCRYPTION_KEY_FILE),
        }
    }

    pub fn keyring_path(&self) -> &Path {
        &self.keyring_path
    }

    async fn ensure_dir(&self) -> anyhow::Result<()> {
        if let Some(parent) = self.keyring_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    async fn get_or_create_key(&self) -> anyhow::Result<[u8; 32]> {
        self.ensure_dir().await?;

        if fs::try_exists(&self.key_path).await? {
            let key_data = fs::read(&self.key_path).await?;
            let key_bytes = BASE64.decode(&key_data)?;
            if key_bytes.len() == 32 {
                let mut key = [0u8; 32];
                key.copy_from_slice(&key_bytes);
                return Ok(key);
            }
            warn!("Key ring encryption key is malformed, generating a new one");
        }

        let key: [u8; 32] = rand::random();
        fs::write(&self.key_path, BASE64.encode(key)).await?;

        restrict_permissions(&self.key_path).await?;

        info!("Generated new encryption key for key ring");
        Ok(key)
    }

    fn encrypt(&self, plaintext: &str, key: &[u8; 32]) -> anyhow::Result<String> {
        let cipher = Aes256Gcm::new_from_slice(key)
            .map_err(|e| anyhow::anyhow!("Invalid encryption key: {}", e))?;
        let nonce_bytes: [u8; NONCE_SIZE] = rand::random();
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| anyhow::anyhow!("Encryption failed: {}", e))?;

        let mut combined = nonce_bytes.to_vec();
        combined.extend(ciphertext);
        Ok(BASE64.encode(&combined))
    }

    fn decrypt(&self, encrypted: &str, key: &[u8; 32]) -> anyhow::Result<String> {
        let combined = BASE64.decode(encrypted)?;
        if combined.len() < NONCE_SIZE {
            return Err(anyhow::anyhow!("Invalid encrypted data"));
        }

        let (nonce_bytes, ciphertext) = combined.split_at(NONCE_SIZE);
        let cipher = Aes256Gcm::new_from_slice(key)
            .map_err(|e| anyhow::anyhow!("Invalid encryption key: {}", e))?;
        let nonce = Nonce::from_slice(nonce_bytes);

        let plaintext = cipher
            .decrypt(nonce, ciphertext)
            .map_err(|e| anyhow::anyhow!("Decryption failed: {}", e))?;

        String::from_utf8(plaintext).map_err(Into::into)
    }

    /// Load the saved ring. `None` when nothing was saved yet or the keys
    /// can no longer be decrypted.
    pub async fn load(&self) -> anyhow::Result<Option<KeyRingState>> {
        if !fs::try_exists(&self.keyring_path).await? {
            return Ok(None);
        }

        let key = self.get_or_create_key().await?;
        let content = fs::read_to_string(&self.keyring_path).await?;
        let mut state: KeyRingState = serde_json::from_str(&content)?;

        let mut keys = Vec::with_capacity(state.keys.len());
        for encrypted in &state.keys {
            match self.decrypt(encrypted, &key) {
                Ok(decrypted) => keys.push(decrypted),
                Err(e) => {
                    warn!("Failed to decrypt stored key ring, it may be corrupted: {}", e);
                    return Ok(None);
                }
            }
        }
        state.keys = keys;

        info!("Loaded key ring from {:?}", self.keyring_path);
        Ok(Some(state))
    }

    pub async fn save(&self, state: &KeyRingState) -> anyhow::Result<()> {
        self.ensure_dir().await?;
        let key = self.get_or_create_key().await?;

        let mut encrypted = state.clone();
        encrypted.keys = state
            .keys
            .iter()
            .map(|k| self.encrypt(k, &key))
            .collect::<anyhow::Result<_>>()?;

        let content = serde_json::to_string_pretty(&encrypted)?;
        fs::write(&self.keyring_path, content).await?;
        restrict_permissions(&self.keyring_path).await?;

        info!("Saved key ring to {:?}", self.keyring_path);
        Ok(())
    }
}

/// Owner read/write only
async fn restrict_permissions(path: &Path) -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        fs::set_permissions(path, perms).await?;
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}

impl Default for KeyRingStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::{CredentialProvider, KeyRing, CRAWLER_KEY_NAME};
    use tempfile::TempDir;

    fn sample_state() -> KeyRingState {
        KeyRingState {
            name: CRAWLER_KEY_NAME.to_string(),
            keys: vec!["primary-key-00000001".to_string(), "backup-key-0000000001".to_string()],
            active: 1,
            exhausted: vec![0],
        }
    }

    #[tokio::test]
    async fn test_keyring_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let storage = KeyRingStorage::with_path(temp_dir.path());

        assert!(storage.load().await.unwrap().is_none());

        storage.save(&sample_state()).await.unwrap();
        let loaded = storage.load().await.unwrap().unwrap();
        assert_eq!(loaded, sample_state());
    }

    #[tokio::test]
    async fn test_keys_are_encrypted_on_disk() {
        let temp_dir = TempDir::new().unwrap();
        let storage = KeyRingStorage::with_path(temp_dir.path());
        storage.save(&sample_state()).await.unwrap();

        let raw = std::fs::read_to_string(storage.keyring_path()).unwrap();
        assert!(!raw.contains("primary-key-00000001"));
        assert!(raw.contains(CRAWLER_KEY_NAME));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_files_are_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let storage = KeyRingStorage::with_path(temp_dir.path());
        storage.save(&sample_state()).await.unwrap();

        let mode = |path: &Path| std::fs::metadata(path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode(storage.keyring_path()), 0o600);
        assert_eq!(mode(&temp_dir.path().join(ENCRYPTION_KEY_FILE)), 0o600);
    }

    #[tokio::test]
    async fn test_encryption() {
        let temp_dir = TempDir::new().unwrap();
        let storage = KeyRingStorage::with_path(temp_dir.path());

        let key = storage.get_or_create_key().await.unwrap();
        let encrypted = storage.encrypt("secret-api-key-12345", &key).unwrap();
        assert_ne!(encrypted, "secret-api-key-12345");
        assert_eq!(storage.decrypt(&encrypted, &key).unwrap(), "secret-api-key-12345");
    }

    #[tokio::test]
    async fn test_rotation_survives_restart() {
        let temp_dir = TempDir::new().unwrap();
        let backups = vec!["backup-key-0000000001".to_string()];

        let ring = KeyRing::restore(
            KeyRingStorage::with_path(temp_dir.path()),
            CRAWLER_KEY_NAME,
            "primary-key-00000001",
            &backups,
        )
        .await
        .unwrap();
        assert!(ring.rotate("primary-key-00000001").await);

        let restored = KeyRing::restore(
            KeyRingStorage::with_path(temp_dir.path()),
            CRAWLER_KEY_NAME,
            "primary-key-00000001",
            &backups,
        )
        .await
        .unwrap();
        assert_eq!(restored.bearer_token().as_deref(), Some("backup-key-0000000001"));

        // Changing the configured keys discards the stale state
        let reconfigured = KeyRing::restore(
            KeyRingStorage::with_path(temp_dir.path()),
            CRAWLER_KEY_NAME,
            "new-primary-key-0001",
            &backups,
        )
        .await
        .unwrap();
        assert_eq!(reconfigured.bearer_token().as_deref(), Some("new-primary-key-0001"));
    }
}
