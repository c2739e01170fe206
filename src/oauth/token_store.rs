//! Token Storage (component G): `OAuthToken`s keyed by `(user_id, provider_type)`,
//! encrypted at rest. AES-256-GCM with an Argon2 key derived from machine identity
//! (hostname, username, machine-id), written through temp-file-then-rename at 0600,
//! with a version tag on the envelope so a future format change can migrate forward.

use crate::error::AppError;
use crate::oauth::types::OAuthToken;
use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use argon2::password_hash::{rand_core::OsRng, SaltString};
use argon2::{Argon2, PasswordHasher};
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use tokio::fs;
use tokio::sync::RwLock;

/// Key a token is stored under.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TokenKey {
    pub user_id: String,
    pub provider_type: String,
}

impl TokenKey {
    pub fn new(user_id: impl Into<String>, provider_type: impl Into<String>) -> Self {
        Self { user_id: user_id.into(), provider_type: provider_type.into() }
    }

    fn as_storage_key(&self) -> String {
        format!("{}\u{1}{}", self.user_id, self.provider_type)
    }

    fn from_storage_key(key: &str) -> Option<Self> {
        let (user_id, provider_type) = key.split_once('\u{1}')?;
        Some(Self { user_id: user_id.to_string(), provider_type: provider_type.to_string() })
    }
}

fn get_machine_id() -> String {
    #[cfg(target_os = "macos")]
    {
        if let Ok(output) = std::process::Command::new("ioreg")
            .args(["-rd1", "-c", "IOPlatformExpertDevice"])
            .output()
        {
            let stdout = String::from_utf8_lossy(&output.stdout);
            for line in stdout.lines() {
                if line.contains("IOPlatformUUID") {
                    if let Some(uuid) = line.split('"').nth(3) {
                        return uuid.to_string();
                    }
                }
            }
        }
    }

    #[cfg(target_os = "linux")]
    {
        if let Ok(id) = std::fs::read_to_string("/etc/machine-id") {
            let id = id.trim().to_string();
            if !id.is_empty() {
                return id;
            }
        }
    }

    String::new()
}

pub struct TokenStore {
    storage_path: PathBuf,
    tokens: RwLock<HashMap<String, OAuthToken>>,
    encryption_key: Vec<u8>,
    salt: SaltString,
}

#[derive(Debug, Serialize, Deserialize)]
struct TokenStorage {
    version: String,
    #[serde(default)]
    salt: Option<String>,
    tokens: HashMap<String, EncryptedToken>,
}

#[derive(Debug, Serialize, Deserialize)]
struct EncryptedToken {
    access_token: String,
    refresh_token: Option<String>,
    expires_at: i64,
    token_type: String,
    scope: String,
    provider_type: String,
    created_at: i64,
    last_refreshed_at: i64,
    #[serde(default)]
    metadata: HashMap<String, serde_json::Value>,
}

impl TokenStore {
    pub async fn new(storage_path: PathBuf) -> Result<Self, AppError> {
        let (encryption_key, salt) = if storage_path.exists() {
            let content = fs::read_to_string(&storage_path)
                .await
                .map_err(|e| AppError::Config(format!("failed to read token file: {}", e)))?;
            let storage: TokenStorage = serde_json::from_str(&content)
                .map_err(|e| AppError::Config(format!("failed to parse token file: {}", e)))?;

            let salt_str = storage.salt.ok_or_else(|| {
                AppError::Config("token file format outdated; re-authorize to regenerate it".to_string())
            })?;
            let salt = SaltString::from_b64(&salt_str)
                .map_err(|e| AppError::Config(format!("invalid salt format: {}", e)))?;

            if storage.version != "1.0" {
                return Err(AppError::Config(format!("unsupported token file version '{}'", storage.version)));
            }
            let key = Self::derive_encryption_key(&salt)?;
            (key, salt)
        } else {
            let salt = SaltString::generate(&mut OsRng);
            let key = Self::derive_encryption_key(&salt)?;
            (key, salt)
        };

        let mut store = Self { storage_path, tokens: RwLock::new(HashMap::new()), encryption_key, salt };

        if store.storage_path.exists() {
            store.load_tokens().await?;
        }

        Ok(store)
    }

    fn derive_encryption_key(salt: &SaltString) -> Result<Vec<u8>, AppError> {
        let hostname = hostname::get()
            .map_err(|e| AppError::Config(format!("failed to get hostname: {}", e)))?
            .to_string_lossy()
            .to_string();
        let username = std::env::var("USER").or_else(|_| std::env::var("USERNAME")).unwrap_or_else(|_| "unknown".to_string());
        let machine_id = get_machine_id();
        let password = format!("{}:{}:{}", hostname, username, machine_id);

        let argon2 = Argon2::default();
        let password_hash = argon2
            .hash_password(password.as_bytes(), salt)
            .map_err(|e| AppError::Config(format!("failed to derive encryption key: {}", e)))?;
        let hash_bytes = password_hash
            .hash
            .ok_or_else(|| AppError::Config("failed to extract hash bytes".to_string()))?;
        Ok(hash_bytes.as_bytes()[..32].to_vec())
    }

    pub async fn save_token(&self, key: &TokenKey, token: &OAuthToken) -> Result<(), AppError> {
        {
            let mut tokens = self.tokens.write().await;
            tokens.insert(key.as_storage_key(), token.clone());
        }
        self.save_tokens().await
    }

    pub async fn get_token(&self, key: &TokenKey) -> Result<OAuthToken, AppError> {
        let tokens = self.tokens.read().await;
        tokens
            .get(&key.as_storage_key())
            .cloned()
            .ok_or_else(|| AppError::Config(format!("no token found for {}/{}", key.user_id, key.provider_type)))
    }

    pub async fn delete_token(&self, key: &TokenKey) -> Result<(), AppError> {
        {
            let mut tokens = self.tokens.write().await;
            tokens.remove(&key.as_storage_key());
        }
        self.save_tokens().await
    }

    /// The distinct set of user ids with at least one saved token.
    pub async fn all_user_ids(&self) -> Vec<String> {
        let tokens = self.tokens.read().await;
        let mut ids: Vec<String> = tokens
            .keys()
            .filter_map(|k| TokenKey::from_storage_key(k))
            .map(|k| k.user_id)
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }

    /// The set of provider types with a saved token for `user_id`.
    pub async fn list_providers(&self, user_id: &str) -> Vec<String> {
        let tokens = self.tokens.read().await;
        tokens
            .keys()
            .filter_map(|k| TokenKey::from_storage_key(k))
            .filter(|k| k.user_id == user_id)
            .map(|k| k.provider_type)
            .collect()
    }

    /// Removes every token whose tracked expiry has already passed.
    pub async fn cleanup_expired(&self) -> Result<usize, AppError> {
        let now = Utc::now().timestamp();
        let removed;
        {
            let mut tokens = self.tokens.write().await;
            let before = tokens.len();
            tokens.retain(|_, token| token.expires_at == 0 || token.expires_at > now);
            removed = before - tokens.len();
        }
        if removed > 0 {
            self.save_tokens().await?;
        }
        Ok(removed)
    }

    async fn load_tokens(&mut self) -> Result<(), AppError> {
        let content = fs::read_to_string(&self.storage_path)
            .await
            .map_err(|e| AppError::Config(format!("failed to read token file: {}", e)))?;
        let storage: TokenStorage = serde_json::from_str(&content)
            .map_err(|e| AppError::Config(format!("failed to parse token file: {}", e)))?;

        let mut tokens = HashMap::new();
        for (key, encrypted) in storage.tokens {
            let token = OAuthToken {
                access_token: self.decrypt(&encrypted.access_token)?,
                refresh_token: encrypted.refresh_token.map(|t| self.decrypt(&t)).transpose()?,
                expires_at: encrypted.expires_at,
                token_type: encrypted.token_type,
                scope: encrypted.scope,
                provider_type: encrypted.provider_type,
                created_at: encrypted.created_at,
                last_refreshed_at: encrypted.last_refreshed_at,
                metadata: encrypted.metadata,
            };
            tokens.insert(key, token);
        }

        *self.tokens.write().await = tokens;
        Ok(())
    }

    async fn save_tokens(&self) -> Result<(), AppError> {
        let tokens = self.tokens.read().await;

        let mut encrypted_tokens = HashMap::new();
        for (key, token) in tokens.iter() {
            let encrypted = EncryptedToken {
                access_token: self.encrypt(&token.access_token)?,
                refresh_token: token.refresh_token.as_ref().map(|t| self.encrypt(t)).transpose()?,
                expires_at: token.expires_at,
                token_type: token.token_type.clone(),
                scope: token.scope.clone(),
                provider_type: token.provider_type.clone(),
                created_at: token.created_at,
                last_refreshed_at: token.last_refreshed_at,
                metadata: token.metadata.clone(),
            };
            encrypted_tokens.insert(key.clone(), encrypted);
        }

        let storage = TokenStorage { version: "1.0".to_string(), salt: Some(self.salt.to_string()), tokens: encrypted_tokens };
        let content = serde_json::to_string_pretty(&storage)?;

        if let Some(parent) = self.storage_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let tmp_path = self.storage_path.with_extension("json.tmp");
        fs::write(&tmp_path, &content).await?;
        fs::set_permissions(&tmp_path, std::fs::Permissions::from_mode(0o600)).await?;
        fs::rename(&tmp_path, &self.storage_path).await?;

        Ok(())
    }

    fn encrypt(&self, plaintext: &str) -> Result<String, AppError> {
        let cipher = Aes256Gcm::new_from_slice(&self.encryption_key)
            .map_err(|e| AppError::Config(format!("failed to create cipher: {}", e)))?;

        let mut rng = rand::thread_rng();
        let nonce_bytes: [u8; 12] = rng.gen();
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| AppError::Config(format!("encryption failed: {}", e)))?;

        Ok(format!("{}:{}", STANDARD.encode(nonce_bytes), STANDARD.encode(&ciphertext)))
    }

    fn decrypt(&self, ciphertext: &str) -> Result<String, AppError> {
        let cipher = Aes256Gcm::new_from_slice(&self.encryption_key)
            .map_err(|e| AppError::Config(format!("failed to create cipher: {}", e)))?;

        let parts: Vec<&str> = ciphertext.split(':').collect();
        if parts.len() != 2 {
            return Err(AppError::Config("invalid ciphertext format".to_string()));
        }

        let nonce_bytes = STANDARD
            .decode(parts[0])
            .map_err(|e| AppError::Config(format!("failed to decode nonce: {}", e)))?;
        if nonce_bytes.len() != 12 {
            return Err(AppError::Config("invalid nonce length".to_string()));
        }
        let ciphertext_bytes = STANDARD
            .decode(parts[1])
            .map_err(|e| AppError::Config(format!("failed to decode ciphertext: {}", e)))?;

        let nonce = Nonce::from_slice(&nonce_bytes);
        let plaintext = cipher
            .decrypt(nonce, ciphertext_bytes.as_ref())
            .map_err(|e| AppError::Config(format!("decryption failed: {}", e)))?;

        String::from_utf8(plaintext).map_err(|e| AppError::Config(format!("decrypted data is not valid utf-8: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn create_test_store() -> (TokenStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let storage_path = temp_dir.path().join("test_tokens.json");
        let store = TokenStore::new(storage_path).await.unwrap();
        (store, temp_dir)
    }

    fn create_test_token(expires_at: i64) -> OAuthToken {
        OAuthToken {
            access_token: "test_access_token".to_string(),
            refresh_token: Some("test_refresh_token".to_string()),
            expires_at,
            token_type: "Bearer".to_string(),
            scope: "api".to_string(),
            provider_type: "anthropic".to_string(),
            created_at: Utc::now().timestamp(),
            last_refreshed_at: Utc::now().timestamp(),
            metadata: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn save_and_get_token() {
        let (store, _dir) = create_test_store().await;
        let key = TokenKey::new("alice", "anthropic");
        let token = create_test_token(Utc::now().timestamp() + 3600);

        store.save_token(&key, &token).await.unwrap();
        let retrieved = store.get_token(&key).await.unwrap();
        assert_eq!(retrieved.access_token, token.access_token);
    }

    #[tokio::test]
    async fn distinct_users_same_provider_do_not_collide() {
        let (store, _dir) = create_test_store().await;
        let alice = TokenKey::new("alice", "anthropic");
        let bob = TokenKey::new("bob", "anthropic");

        store.save_token(&alice, &create_test_token(0)).await.unwrap();
        store.save_token(&bob, &create_test_token(0)).await.unwrap();

        assert!(store.get_token(&alice).await.is_ok());
        assert!(store.get_token(&bob).await.is_ok());
        assert_eq!(store.list_providers("alice").await, vec!["anthropic".to_string()]);
    }

    #[tokio::test]
    async fn delete_token_removes_it() {
        let (store, _dir) = create_test_store().await;
        let key = TokenKey::new("alice", "anthropic");
        store.save_token(&key, &create_test_token(0)).await.unwrap();
        store.delete_token(&key).await.unwrap();
        assert!(store.get_token(&key).await.is_err());
    }

    #[tokio::test]
    async fn cleanup_expired_removes_only_past_expiry() {
        let (store, _dir) = create_test_store().await;
        let now = Utc::now().timestamp();
        store.save_token(&TokenKey::new("alice", "anthropic"), &create_test_token(now - 10)).await.unwrap();
        store.save_token(&TokenKey::new("alice", "openai"), &create_test_token(now + 10_000)).await.unwrap();

        let removed = store.cleanup_expired().await.unwrap();
        assert_eq!(removed, 1);
        assert!(store.get_token(&TokenKey::new("alice", "anthropic")).await.is_err());
        assert!(store.get_token(&TokenKey::new("alice", "openai")).await.is_ok());
    }

    #[tokio::test]
    async fn persists_across_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let storage_path = temp_dir.path().join("persistent_tokens.json");
        let key = TokenKey::new("alice", "anthropic");

        let store = TokenStore::new(storage_path.clone()).await.unwrap();
        store.save_token(&key, &create_test_token(0)).await.unwrap();

        let store2 = TokenStore::new(storage_path).await.unwrap();
        let retrieved = store2.get_token(&key).await.unwrap();
        assert_eq!(retrieved.access_token, "test_access_token");
    }

    #[tokio::test]
    async fn encryption_round_trips_with_random_nonce() {
        let (store, _dir) = create_test_store().await;
        let plaintext = "sensitive_token_data";
        let encrypted1 = store.encrypt(plaintext).unwrap();
        let encrypted2 = store.encrypt(plaintext).unwrap();
        assert_ne!(encrypted1, encrypted2);
        assert_eq!(store.decrypt(&encrypted1).unwrap(), plaintext);
        assert_eq!(store.decrypt(&encrypted2).unwrap(), plaintext);
    }
}
