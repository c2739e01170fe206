//! Template Registry (component A): the catalogue of known upstream providers.
//! Three-tier resolution on init — embedded fallback, then a fresh local cache,
//! then a conditional remote fetch — grounded on `pricing/loader.rs`'s
//! download+hash+backup pattern and `pricing/updater.rs`'s check-and-update loop,
//! adapted from a hash-comparison scheme to ETag conditional GET.

use crate::error::AppError;
use crate::models::domain::ProviderTemplate;
use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const EMBEDDED_TEMPLATES_JSON: &str = include_str!("templates_embedded.json");
const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);
const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);
/// Used when neither an exact model match nor a `provider:*` wildcard is found.
const GLOBAL_DEFAULT_MAX_TOKENS: u64 = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelSource {
    Api,
    Remote,
    Embedded,
}

#[derive(Debug, Serialize, Deserialize)]
struct TemplateCacheFile {
    registry: Vec<ProviderTemplate>,
    cached_at: DateTime<Utc>,
    version: u32,
    etag: Option<String>,
}

const CACHE_SCHEMA_VERSION: u32 = 1;

pub struct TemplateRegistry {
    embedded: Vec<ProviderTemplate>,
    current: ArcSwap<Vec<ProviderTemplate>>,
    source: ArcSwap<ModelSource>,
    cache_path: PathBuf,
    remote_url: Option<String>,
    ttl: Duration,
    etag: Mutex<Option<String>>,
    http: reqwest::Client,
}

impl TemplateRegistry {
    /// Loads the embedded catalogue, then tries the on-disk cache, then (if
    /// configured and the cache is stale) a conditional fetch against `remote_url`.
    pub async fn init(cache_dir: &Path, remote_url: Option<String>) -> Result<Self, AppError> {
        Self::init_with_ttl(cache_dir, remote_url, DEFAULT_CACHE_TTL).await
    }

    pub async fn init_with_ttl(
        cache_dir: &Path,
        remote_url: Option<String>,
        ttl: Duration,
    ) -> Result<Self, AppError> {
        let embedded: Vec<ProviderTemplate> = serde_json::from_str(EMBEDDED_TEMPLATES_JSON)
            .map_err(|e| AppError::Config(format!("embedded template catalogue is malformed: {}", e)))?;

        let http = reqwest::Client::builder()
            .timeout(DEFAULT_FETCH_TIMEOUT)
            .build()
            .map_err(AppError::HttpRequest)?;

        let cache_path = cache_dir.join("template_cache.json");

        let registry = Self {
            embedded: embedded.clone(),
            current: ArcSwap::from_pointee(embedded),
            source: ArcSwap::from_pointee(ModelSource::Embedded),
            cache_path,
            remote_url,
            ttl,
            etag: Mutex::new(None),
            http,
        };

        registry.bootstrap().await;
        Ok(registry)
    }

    async fn bootstrap(&self) {
        if let Some(cached) = self.load_cache_file().await {
            let fresh = Utc::now().signed_duration_since(cached.cached_at).to_std().unwrap_or(Duration::MAX) <= self.ttl;
            if fresh {
                self.current.store(Arc::new(cached.registry));
                self.source.store(Arc::new(ModelSource::Remote));
                *self.etag.lock().await = cached.etag;
                return;
            }
            *self.etag.lock().await = cached.etag;
        }

        if self.remote_url.is_some() {
            if let Err(e) = self.refresh().await {
                warn!("template registry remote refresh failed, keeping embedded fallback: {}", e);
            }
        }
    }

    /// Fetches the remote catalogue with a conditional GET; on 304 keeps the
    /// current registry, on 200 replaces it and overwrites the cache atomically,
    /// on any failure keeps whatever was already loaded (never errors out to the
    /// caller — the embedded fallback always remains usable).
    pub async fn refresh(&self) -> Result<bool, AppError> {
        let Some(url) = self.remote_url.clone() else {
            return Ok(false);
        };

        let mut request = self.http.get(&url);
        if let Some(etag) = self.etag.lock().await.clone() {
            request = request.header(reqwest::header::IF_NONE_MATCH, etag);
        }

        let response = request.send().await.map_err(AppError::HttpRequest)?;

        if response.status() == reqwest::StatusCode::NOT_MODIFIED {
            debug!("template registry: remote catalogue unchanged (304)");
            return Ok(false);
        }

        if !response.status().is_success() {
            return Err(AppError::Config(format!(
                "template registry fetch failed: HTTP {}",
                response.status()
            )));
        }

        let new_etag = response
            .headers()
            .get(reqwest::header::ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let body = response.text().await.map_err(AppError::HttpRequest)?;
        let templates: Vec<ProviderTemplate> = serde_json::from_str(&body)
            .map_err(|e| AppError::Config(format!("remote template catalogue is malformed: {}", e)))?;

        self.current.store(Arc::new(templates.clone()));
        self.source.store(Arc::new(ModelSource::Remote));
        *self.etag.lock().await = new_etag.clone();

        self.save_cache_file(&templates, new_etag).await?;
        info!("template registry: remote catalogue refreshed ({} templates)", self.current.load().len());
        Ok(true)
    }

    pub fn get(&self, id: &str) -> Option<ProviderTemplate> {
        self.current.load().iter().find(|t| t.id == id).cloned()
    }

    pub fn list(&self) -> Vec<ProviderTemplate> {
        self.current.load().as_ref().clone()
    }

    pub fn effective_source(&self) -> ModelSource {
        **self.source.load()
    }

    /// Tier 1: `live_models`, if the template flags API discovery supported and the
    /// caller already attempted it and got a non-empty result. Tier 2: the loaded
    /// template's models. Tier 3: the embedded template's models.
    pub fn models_for(&self, provider_template_id: &str, live_models: Option<Vec<String>>) -> (Vec<String>, ModelSource) {
        if let Some(template) = self.get(provider_template_id) {
            if template.supports_models_endpoint {
                if let Some(live) = live_models {
                    if !live.is_empty() {
                        return (live, ModelSource::Api);
                    }
                }
            }
            if !template.models.is_empty() {
                return (template.models, ModelSource::Remote);
            }
        }

        let embedded = self.embedded.iter().find(|t| t.id == provider_template_id);
        match embedded {
            Some(t) => (t.models.clone(), ModelSource::Embedded),
            None => (Vec::new(), ModelSource::Embedded),
        }
    }

    /// Fallback chain: exact model match -> `provider:*` wildcard -> global default.
    pub fn max_tokens(&self, provider_template_id: &str, model: &str) -> u64 {
        let Some(template) = self.get(provider_template_id) else {
            return GLOBAL_DEFAULT_MAX_TOKENS;
        };
        if let Some(limit) = template.model_limits.get(model) {
            return *limit;
        }
        let wildcard = format!("{}:*", provider_template_id);
        if let Some(limit) = template.model_limits.get(&wildcard) {
            return *limit;
        }
        GLOBAL_DEFAULT_MAX_TOKENS
    }

    async fn load_cache_file(&self) -> Option<TemplateCacheFile> {
        let raw = tokio::fs::read_to_string(&self.cache_path).await.ok()?;
        let file: TemplateCacheFile = serde_json::from_str(&raw).ok()?;
        if file.version != CACHE_SCHEMA_VERSION {
            return None;
        }
        Some(file)
    }

    async fn save_cache_file(&self, templates: &[ProviderTemplate], etag: Option<String>) -> Result<(), AppError> {
        let file = TemplateCacheFile {
            registry: templates.to_vec(),
            cached_at: Utc::now(),
            version: CACHE_SCHEMA_VERSION,
            etag,
        };
        let pretty = serde_json::to_string_pretty(&file)?;
        let tmp_path = self.cache_path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, pretty).await?;
        tokio::fs::rename(&tmp_path, &self.cache_path).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn embedded_catalogue_loads_without_remote() {
        let dir = TempDir::new().unwrap();
        let registry = TemplateRegistry::init(dir.path(), None).await.unwrap();
        assert_eq!(registry.effective_source(), ModelSource::Embedded);
        assert!(registry.get("openai").is_some());
        assert!(registry.get("nonexistent").is_none());
    }

    #[test]
    fn max_tokens_fallback_chain() {
        let embedded: Vec<ProviderTemplate> = serde_json::from_str(EMBEDDED_TEMPLATES_JSON).unwrap();
        let openai = embedded.iter().find(|t| t.id == "openai").unwrap();
        assert_eq!(*openai.model_limits.get("gpt-4o").unwrap(), 128000);
        assert_eq!(*openai.model_limits.get("openai:*").unwrap(), 128000);
    }

    #[tokio::test]
    async fn models_for_falls_back_to_embedded_when_template_unknown() {
        let dir = TempDir::new().unwrap();
        let registry = TemplateRegistry::init(dir.path(), None).await.unwrap();
        let (models, source) = registry.models_for("made-up-provider", None);
        assert!(models.is_empty());
        assert_eq!(source, ModelSource::Embedded);
    }

    #[tokio::test]
    async fn models_for_prefers_live_when_supported_and_nonempty() {
        let dir = TempDir::new().unwrap();
        let registry = TemplateRegistry::init(dir.path(), None).await.unwrap();
        let (models, source) = registry.models_for("openai", Some(vec!["gpt-5".to_string()]));
        assert_eq!(models, vec!["gpt-5".to_string()]);
        assert_eq!(source, ModelSource::Api);
    }

    #[tokio::test]
    async fn stale_cache_without_remote_url_keeps_embedded() {
        let dir = TempDir::new().unwrap();
        let stale = TemplateCacheFile {
            registry: vec![],
            cached_at: Utc::now() - chrono::Duration::days(10),
            version: CACHE_SCHEMA_VERSION,
            etag: Some("stale-etag".to_string()),
        };
        tokio::fs::write(dir.path().join("template_cache.json"), serde_json::to_string(&stale).unwrap())
            .await
            .unwrap();

        let registry = TemplateRegistry::init(dir.path(), None).await.unwrap();
        assert_eq!(registry.effective_source(), ModelSource::Embedded);
    }
}
