//! Model List Manager (component C): per-provider cached model lists, keyed by
//! provider UUID. One JSON document per provider under `models/<uuid>.json`. No
//! real teacher implementation exists for this (`handlers/models.rs::list_models`
//! is a stub); the in-memory map-by-key shape is grounded on `registry.rs`'s
//! `ProviderRegistry`, and the on-disk atomic-write shape on `pricing/loader.rs`'s
//! `save_backup`.

use crate::error::AppError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ModelListDocument {
    api_base: String,
    models: Vec<String>,
    last_updated: DateTime<Utc>,
}

pub struct ModelListManager {
    dir: PathBuf,
    cache: RwLock<HashMap<Uuid, ModelListDocument>>,
}

impl ModelListManager {
    /// Loads every `models/<uuid>.json` file under `dir` into the in-memory cache.
    /// Malformed entries are skipped with a warning rather than failing startup.
    pub async fn init(dir: &Path) -> Result<Self, AppError> {
        tokio::fs::create_dir_all(dir).await?;

        let mut cache = HashMap::new();
        let mut entries = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else { continue };
            let Some(ext) = path.extension().and_then(|s| s.to_str()) else { continue };
            if ext != "json" {
                continue;
            }
            let Ok(provider_id) = Uuid::parse_str(stem) else { continue };

            match tokio::fs::read_to_string(&path).await {
                Ok(raw) => match serde_json::from_str::<ModelListDocument>(&raw) {
                    Ok(doc) => {
                        cache.insert(provider_id, doc);
                    }
                    Err(e) => tracing::warn!("skipping malformed model list {}: {}", path.display(), e),
                },
                Err(e) => tracing::warn!("failed to read model list {}: {}", path.display(), e),
            }
        }

        Ok(Self { dir: dir.to_path_buf(), cache: RwLock::new(cache) })
    }

    pub async fn save(&self, provider_uuid: Uuid, api_base: impl Into<String>, models: Vec<String>) -> Result<(), AppError> {
        let doc = ModelListDocument { api_base: api_base.into(), models, last_updated: Utc::now() };

        let pretty = serde_json::to_string_pretty(&doc)?;
        let path = self.path_for(provider_uuid);
        let tmp_path = path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, pretty).await?;
        tokio::fs::rename(&tmp_path, &path).await?;

        self.cache.write().await.insert(provider_uuid, doc);
        Ok(())
    }

    pub async fn get(&self, provider_uuid: Uuid) -> Option<Vec<String>> {
        self.cache.read().await.get(&provider_uuid).map(|d| d.models.clone())
    }

    pub async fn has(&self, provider_uuid: Uuid) -> bool {
        self.cache.read().await.contains_key(&provider_uuid)
    }

    pub async fn remove(&self, provider_uuid: Uuid) -> Result<(), AppError> {
        self.cache.write().await.remove(&provider_uuid);
        let path = self.path_for(provider_uuid);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// `(api_base, last_updated, exists)`.
    pub async fn info(&self, provider_uuid: Uuid) -> (Option<String>, Option<DateTime<Utc>>, bool) {
        match self.cache.read().await.get(&provider_uuid) {
            Some(doc) => (Some(doc.api_base.clone()), Some(doc.last_updated), true),
            None => (None, None, false),
        }
    }

    fn path_for(&self, provider_uuid: Uuid) -> PathBuf {
        self.dir.join(format!("{}.json", provider_uuid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn save_then_get_round_trips() {
        let dir = TempDir::new().unwrap();
        let manager = ModelListManager::init(dir.path()).await.unwrap();
        let provider = Uuid::new_v4();

        manager.save(provider, "https://api.openai.com", vec!["gpt-4o".to_string()]).await.unwrap();
        assert!(manager.has(provider).await);
        assert_eq!(manager.get(provider).await, Some(vec!["gpt-4o".to_string()]));

        let (api_base, last_updated, exists) = manager.info(provider).await;
        assert_eq!(api_base.as_deref(), Some("https://api.openai.com"));
        assert!(last_updated.is_some());
        assert!(exists);
    }

    #[tokio::test]
    async fn remove_deletes_file_and_cache_entry() {
        let dir = TempDir::new().unwrap();
        let manager = ModelListManager::init(dir.path()).await.unwrap();
        let provider = Uuid::new_v4();

        manager.save(provider, "https://api.openai.com", vec!["gpt-4o".to_string()]).await.unwrap();
        manager.remove(provider).await.unwrap();

        assert!(!manager.has(provider).await);
        assert!(!dir.path().join(format!("{}.json", provider)).exists());
    }

    #[tokio::test]
    async fn remove_missing_provider_is_not_an_error() {
        let dir = TempDir::new().unwrap();
        let manager = ModelListManager::init(dir.path()).await.unwrap();
        assert!(manager.remove(Uuid::new_v4()).await.is_ok());
    }

    #[tokio::test]
    async fn init_reloads_previously_saved_entries() {
        let dir = TempDir::new().unwrap();
        let provider = Uuid::new_v4();
        {
            let manager = ModelListManager::init(dir.path()).await.unwrap();
            manager.save(provider, "https://api.openai.com", vec!["gpt-4o".to_string()]).await.unwrap();
        }

        let reopened = ModelListManager::init(dir.path()).await.unwrap();
        assert!(reopened.has(provider).await);
    }

    #[tokio::test]
    async fn info_on_unknown_provider_reports_not_exists() {
        let dir = TempDir::new().unwrap();
        let manager = ModelListManager::init(dir.path()).await.unwrap();
        let (api_base, last_updated, exists) = manager.info(Uuid::new_v4()).await;
        assert!(api_base.is_none());
        assert!(last_updated.is_none());
        assert!(!exists);
    }
}
