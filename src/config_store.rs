//! Configuration Store (component D): the durable aggregate of providers, rules,
//! and flags. Every mutator serializes through `writer_lock` and persists the whole
//! document atomically (write to `*.tmp`, rename over the target); readers take a
//! lock-free `ArcSwap` snapshot. Grounded on the teacher's `config.rs` validation
//! idiom and `signals.rs::reload_config()`'s atomic swap-on-reload discipline.

use crate::error::AppError;
use crate::models::domain::{LbTactic, Provider, Rule};
use arc_swap::ArcSwap;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Upper bound a provider's configured timeout is clamped to (§4.D "Clamp timeouts").
const MAX_TIMEOUT_SECONDS: u64 = 24 * 60 * 60;
/// `<home>/.tingly-box` default server port assigned on first bootstrap.
const DEFAULT_SERVER_PORT: u16 = 12580;
/// Watcher debounce window (§4.D "Watcher").
pub const RELOAD_DEBOUNCE: std::time::Duration = std::time::Duration::from_millis(500);

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ConfigDocument {
    #[serde(default)]
    pub providers: Vec<Provider>,
    #[serde(default)]
    pub rules: Vec<Rule>,
    #[serde(default)]
    pub flags: Flags,
    /// Rule served when a request's model name matches no rule's `request_model`
    /// (Router falls back to it rather than rejecting the request).
    #[serde(default)]
    pub default_rule_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Flags {
    pub server_port: u16,
    pub jwt_secret: String,
    pub user_token: String,
    pub model_token: String,
    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub verbose: bool,
    /// Runtime-only; never persisted (§4.D contract).
    #[serde(skip)]
    pub open_browser: bool,
}

impl Default for Flags {
    fn default() -> Self {
        Self {
            server_port: DEFAULT_SERVER_PORT,
            jwt_secret: generate_secret(),
            user_token: generate_secret(),
            model_token: generate_secret(),
            debug: false,
            verbose: false,
            open_browser: false,
        }
    }
}

fn generate_secret() -> String {
    use rand::RngCore;
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex_encode(&bytes)
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

pub struct ConfigStore {
    path: PathBuf,
    current: ArcSwap<ConfigDocument>,
    writer_lock: Mutex<()>,
    last_applied_mtime: Mutex<Option<SystemTime>>,
}

impl ConfigStore {
    /// Ensures the config directory (and `models`, `log`, `state` subdirectories)
    /// exist at mode 0700, loads the aggregate (bootstrapping defaults if absent),
    /// runs migrations, and persists if anything changed.
    pub async fn init(config_dir: &Path) -> Result<Self, AppError> {
        ensure_dir(config_dir, 0o700)?;
        ensure_dir(&config_dir.join("models"), 0o700)?;
        ensure_dir(&config_dir.join("log"), 0o700)?;
        ensure_dir(&config_dir.join("state"), 0o700)?;

        let path = config_dir.join("config.json");
        let mtime = file_mtime(&path);

        let (document, changed) = if path.exists() {
            let raw = tokio::fs::read_to_string(&path).await?;
            let mut value: Value = serde_json::from_str(&raw)
                .map_err(|e| AppError::Schema(format!("malformed config.json: {}", e)))?;
            let migrated = migrate_document(&mut value);
            let mut document: ConfigDocument = serde_json::from_value(value)
                .map_err(|e| AppError::Schema(format!("config.json does not match schema: {}", e)))?;
            let defaulted = fill_missing_defaults(&mut document);
            (document, migrated || defaulted)
        } else {
            (bootstrap_document(), true)
        };

        let store = Self {
            path,
            current: ArcSwap::from_pointee(document),
            writer_lock: Mutex::new(()),
            last_applied_mtime: Mutex::new(mtime),
        };

        if changed {
            store.persist_locked(&store.current.load()).await?;
        }

        Ok(store)
    }

    pub fn snapshot(&self) -> Arc<ConfigDocument> {
        self.current.load_full()
    }

    // -- Providers --------------------------------------------------------

    pub async fn add_provider(&self, provider: Provider) -> Result<(), AppError> {
        provider.validate()?;
        let _guard = self.writer_lock.lock().await;
        let mut doc = (*self.current.load_full()).clone();
        doc.providers.push(provider);
        self.publish(doc).await
    }

    pub fn get_provider_by_uuid(&self, id: Uuid) -> Option<Provider> {
        self.current.load().providers.iter().find(|p| p.id == id).cloned()
    }

    pub fn get_provider_by_name(&self, name: &str) -> Option<Provider> {
        self.current.load().providers.iter().find(|p| p.name == name).cloned()
    }

    pub fn list_providers(&self) -> Vec<Provider> {
        self.current.load().providers.clone()
    }

    pub async fn update_provider(&self, updated: Provider) -> Result<(), AppError> {
        updated.validate()?;
        let _guard = self.writer_lock.lock().await;
        let mut doc = (*self.current.load_full()).clone();
        let slot = doc
            .providers
            .iter_mut()
            .find(|p| p.id == updated.id)
            .ok_or_else(|| AppError::Config(format!("provider {} not found", updated.id)))?;
        *slot = updated;
        self.publish(doc).await
    }

    pub async fn delete_provider(&self, id: Uuid) -> Result<(), AppError> {
        let _guard = self.writer_lock.lock().await;
        let mut doc = (*self.current.load_full()).clone();
        let before = doc.providers.len();
        doc.providers.retain(|p| p.id != id);
        if doc.providers.len() == before {
            return Err(AppError::Config(format!("provider {} not found", id)));
        }
        self.publish(doc).await
    }

    // -- Rules --------------------------------------------------------

    pub async fn add_rule(&self, rule: Rule) -> Result<(), AppError> {
        let _guard = self.writer_lock.lock().await;
        let mut doc = (*self.current.load_full()).clone();
        doc.rules.push(rule);
        self.publish(doc).await
    }

    pub fn get_rule_by_request_model(&self, request_model: &str) -> Option<Rule> {
        self.current
            .load()
            .rules
            .iter()
            .find(|r| r.active && r.request_model == request_model)
            .cloned()
    }

    pub fn get_rule_by_uuid(&self, id: Uuid) -> Option<Rule> {
        self.current.load().rules.iter().find(|r| r.id == id).cloned()
    }

    pub fn list_rules(&self) -> Vec<Rule> {
        self.current.load().rules.clone()
    }

    /// Persists the rule in place, including cursor advances from the
    /// Load-Balancing Engine — rule cursor updates go through this write lock
    /// (spec §5: "strong consistency at low throughput").
    pub async fn update_rule(&self, updated: Rule) -> Result<(), AppError> {
        let _guard = self.writer_lock.lock().await;
        let mut doc = (*self.current.load_full()).clone();
        let slot = doc
            .rules
            .iter_mut()
            .find(|r| r.id == updated.id)
            .ok_or_else(|| AppError::Config(format!("rule {} not found", updated.id)))?;
        *slot = updated;
        self.publish(doc).await
    }

    pub async fn delete_rule(&self, id: Uuid) -> Result<(), AppError> {
        let _guard = self.writer_lock.lock().await;
        let mut doc = (*self.current.load_full()).clone();
        let before = doc.rules.len();
        doc.rules.retain(|r| r.id != id);
        if doc.rules.len() == before {
            return Err(AppError::Config(format!("rule {} not found", id)));
        }
        if doc.default_rule_id == Some(id) {
            doc.default_rule_id = None;
        }
        self.publish(doc).await
    }

    pub async fn set_default_rule(&self, id: Uuid) -> Result<(), AppError> {
        let _guard = self.writer_lock.lock().await;
        let mut doc = (*self.current.load_full()).clone();
        if !doc.rules.iter().any(|r| r.id == id) {
            return Err(AppError::Config(format!("rule {} not found", id)));
        }
        doc.default_rule_id = Some(id);
        self.publish(doc).await
    }

    pub fn get_default_rule(&self) -> Option<Rule> {
        let doc = self.current.load();
        let id = doc.default_rule_id?;
        doc.rules.iter().find(|r| r.id == id).cloned()
    }

    // -- Watcher-driven reload --------------------------------------------------------

    /// Re-parses the document under the write lock. Rejects reloads whose mtime
    /// hasn't advanced since the last applied one (debounce guard).
    pub async fn reload(&self) -> Result<bool, AppError> {
        let _guard = self.writer_lock.lock().await;

        let mtime = file_mtime(&self.path);
        {
            let mut last = self.last_applied_mtime.lock().await;
            if mtime.is_some() && mtime == *last {
                return Ok(false);
            }
            *last = mtime;
        }

        let raw = tokio::fs::read_to_string(&self.path).await?;
        let mut value: Value = serde_json::from_str(&raw)
            .map_err(|e| AppError::Schema(format!("malformed config.json: {}", e)))?;
        migrate_document(&mut value);
        let document: ConfigDocument = serde_json::from_value(value)
            .map_err(|e| AppError::Schema(format!("config.json does not match schema: {}", e)))?;

        self.current.store(Arc::new(document));
        Ok(true)
    }

    async fn publish(&self, doc: ConfigDocument) -> Result<(), AppError> {
        self.persist_locked(&doc).await?;
        self.current.store(Arc::new(doc));
        Ok(())
    }

    /// Caller must already hold `writer_lock`. Writes to `*.tmp` then renames over
    /// the target so readers never observe a partial document.
    async fn persist_locked(&self, doc: &ConfigDocument) -> Result<(), AppError> {
        let pretty = serde_json::to_string_pretty(doc)?;
        let tmp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, pretty).await?;
        set_permissions(&tmp_path, 0o600)?;
        tokio::fs::rename(&tmp_path, &self.path).await?;

        let mtime = file_mtime(&self.path);
        *self.last_applied_mtime.lock().await = mtime;
        Ok(())
    }
}

fn bootstrap_document() -> ConfigDocument {
    ConfigDocument {
        providers: Vec::new(),
        rules: vec![default_tingly_rule()],
        flags: Flags::default(),
        default_rule_id: None,
    }
}

fn default_tingly_rule() -> Rule {
    Rule::new("tingly")
}

/// Fills any missing required defaults (tokens, secret, port) in place; returns
/// whether anything changed.
fn fill_missing_defaults(doc: &mut ConfigDocument) -> bool {
    let mut changed = false;
    if doc.flags.jwt_secret.is_empty() {
        doc.flags.jwt_secret = generate_secret();
        changed = true;
    }
    if doc.flags.user_token.is_empty() {
        doc.flags.user_token = generate_secret();
        changed = true;
    }
    if doc.flags.model_token.is_empty() {
        doc.flags.model_token = generate_secret();
        changed = true;
    }
    if doc.flags.server_port == 0 {
        doc.flags.server_port = DEFAULT_SERVER_PORT;
        changed = true;
    }
    changed
}

// ---- Migrations (ordered, idempotent; operate on the raw JSON document before
// typed parsing since the v1 shape a pre-migration document carries is not
// representable in the v2 typed structs — §9 "back-references" redesign note). ----

fn migrate_document(value: &mut Value) -> bool {
    let mut changed = false;
    changed |= migrate_rules_schema_1(value);
    changed |= migrate_providers_v1_to_v2(value);
    changed |= clamp_timeouts(value);
    changed
}

/// Assigns a UUID to any rule missing one; defaults `lb_tactic` if uninitialized.
fn migrate_rules_schema_1(value: &mut Value) -> bool {
    let mut changed = false;
    let Some(rules) = value.get_mut("rules").and_then(Value::as_array_mut) else {
        return false;
    };
    for rule in rules.iter_mut() {
        let Some(obj) = rule.as_object_mut() else { continue };
        let needs_id = !obj.get("id").map(|v| v.is_string() && !v.as_str().unwrap_or("").is_empty()).unwrap_or(false);
        if needs_id {
            obj.insert("id".to_string(), Value::String(Uuid::new_v4().to_string()));
            changed = true;
        }
        if !obj.contains_key("lb_tactic") || obj.get("lb_tactic").map(Value::is_null).unwrap_or(true) {
            obj.insert(
                "lb_tactic".to_string(),
                serde_json::json!({"type": "round_robin", "request_threshold": LbTactic::DEFAULT_REQUEST_THRESHOLD}),
            );
            changed = true;
        }
    }
    changed
}

/// If the v2 `providers` list is empty but a v1 `providers_v1` map exists, synthesize
/// v2 providers from v1 entries and rewrite any rule service referencing a v1
/// provider *name* to point at the new UUID instead.
fn migrate_providers_v1_to_v2(value: &mut Value) -> bool {
    let v2_is_empty = value
        .get("providers")
        .and_then(Value::as_array)
        .map(|a| a.is_empty())
        .unwrap_or(true);

    let Some(v1_map) = value.get("providers_v1").and_then(Value::as_object).cloned() else {
        return false;
    };
    if !v2_is_empty || v1_map.is_empty() {
        return false;
    }

    let now = Utc::now().to_rfc3339();
    let mut name_to_uuid: HashMap<String, String> = HashMap::new();
    let mut v2_providers = Vec::new();

    for (name, entry) in v1_map.iter() {
        let id = Uuid::new_v4().to_string();
        name_to_uuid.insert(name.clone(), id.clone());

        let api_base = entry.get("api_base").and_then(Value::as_str).unwrap_or_default();
        let token = entry.get("token").and_then(Value::as_str).unwrap_or_default();
        let enabled = entry.get("enabled").and_then(Value::as_bool).unwrap_or(false);

        v2_providers.push(serde_json::json!({
            "id": id,
            "name": name,
            "api_base": api_base,
            "api_style": "openai",
            "token": token,
            "enabled": enabled,
            "proxy_url": null,
            "timeout_seconds": 1800,
            "tags": [],
            "models": [],
            "last_updated": now,
            "oauth_provider": null,
        }));
    }

    value["providers"] = Value::Array(v2_providers);

    if let Some(rules) = value.get_mut("rules").and_then(Value::as_array_mut) {
        for rule in rules.iter_mut() {
            let Some(services) = rule.get_mut("services").and_then(Value::as_array_mut) else { continue };
            for service in services.iter_mut() {
                let Some(provider_field) = service.get("provider").and_then(Value::as_str) else { continue };
                if let Some(uuid) = name_to_uuid.get(provider_field) {
                    service["provider"] = Value::String(uuid.clone());
                }
            }
        }
    }

    true
}

fn clamp_timeouts(value: &mut Value) -> bool {
    let mut changed = false;
    if let Some(providers) = value.get_mut("providers").and_then(Value::as_array_mut) {
        for provider in providers.iter_mut() {
            if let Some(timeout) = provider.get("timeout_seconds").and_then(Value::as_u64) {
                if timeout > MAX_TIMEOUT_SECONDS {
                    provider["timeout_seconds"] = Value::from(MAX_TIMEOUT_SECONDS);
                    changed = true;
                }
            }
        }
    }
    changed
}

// ---- Filesystem helpers ----

fn ensure_dir(path: &Path, mode: u32) -> Result<(), AppError> {
    std::fs::create_dir_all(path)?;
    set_permissions(path, mode)
}

#[cfg(unix)]
fn set_permissions(path: &Path, mode: u32) -> Result<(), AppError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_permissions(_path: &Path, _mode: u32) -> Result<(), AppError> {
    Ok(())
}

fn file_mtime(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).ok().and_then(|m| m.modified().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn init_bootstraps_default_rule_and_persists_0600() {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::init(dir.path()).await.unwrap();
        let doc = store.snapshot();
        assert_eq!(doc.rules.len(), 1);
        assert_eq!(doc.rules[0].request_model, "tingly");
        assert_eq!(doc.flags.server_port, DEFAULT_SERVER_PORT);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let meta = std::fs::metadata(dir.path().join("config.json")).unwrap();
            assert_eq!(meta.permissions().mode() & 0o777, 0o600);
        }
    }

    /// Invariant 7 — save -> read-from-disk -> parse yields an equal document.
    #[tokio::test]
    async fn persistence_round_trips() {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::init(dir.path()).await.unwrap();

        let provider = Provider {
            id: Uuid::new_v4(),
            name: "openai".to_string(),
            api_base: "https://api.openai.com".to_string(),
            api_style: crate::models::domain::ApiStyle::OpenAi,
            token: "sk-test".to_string(),
            enabled: true,
            proxy_url: None,
            timeout_seconds: 300,
            tags: vec![],
            models: vec![],
            last_updated: Utc::now(),
            oauth_provider: None,
        };
        store.add_provider(provider.clone()).await.unwrap();

        let raw = tokio::fs::read_to_string(dir.path().join("config.json")).await.unwrap();
        let reparsed: ConfigDocument = serde_json::from_str(&raw).unwrap();
        assert_eq!(reparsed.providers.len(), 1);
        assert_eq!(reparsed.providers[0].name, "openai");
    }

    /// S3 — Provider v1→v2 migration.
    #[tokio::test]
    async fn s3_provider_v1_to_v2_migration() {
        let dir = TempDir::new().unwrap();
        let raw = serde_json::json!({
            "providers": [],
            "providers_v1": {
                "openai": {"name": "openai", "api_base": "https://api.openai.com", "token": "k", "enabled": true}
            },
            "rules": [
                {"request_model": "tingly", "services": [{"provider": "openai", "model": "gpt-4"}]}
            ],
            "flags": {"server_port": 12580, "jwt_secret": "s", "user_token": "u", "model_token": "m"}
        });
        tokio::fs::write(dir.path().join("config.json"), raw.to_string()).await.unwrap();
        // ensure_dir's 0700 subdirectories happen inside init(); write config.json first so init() sees it.

        let store = ConfigStore::init(dir.path()).await.unwrap();
        let doc = store.snapshot();

        assert_eq!(doc.providers.len(), 1);
        assert_eq!(doc.providers[0].timeout_seconds, 1800);
        let provider_id = doc.providers[0].id;
        assert_eq!(doc.rules[0].services[0].provider, provider_id);
    }

    #[tokio::test]
    async fn migration_is_idempotent() {
        let mut value = serde_json::json!({
            "rules": [{"request_model": "tingly"}]
        });
        let first = migrate_document(&mut value);
        let second = migrate_document(&mut value);
        assert!(first);
        assert!(!second);
    }

    #[tokio::test]
    async fn reload_rejects_unchanged_mtime() {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::init(dir.path()).await.unwrap();
        let applied = store.reload().await.unwrap();
        assert!(!applied, "mtime hasn't advanced since init's own write");
    }

    #[tokio::test]
    async fn add_provider_rejects_empty_required_fields() {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::init(dir.path()).await.unwrap();
        let bad = Provider {
            id: Uuid::new_v4(),
            name: String::new(),
            api_base: String::new(),
            api_style: crate::models::domain::ApiStyle::OpenAi,
            token: String::new(),
            enabled: true,
            proxy_url: None,
            timeout_seconds: 300,
            tags: vec![],
            models: vec![],
            last_updated: Utc::now(),
            oauth_provider: None,
        };
        assert!(store.add_provider(bad).await.is_err());
    }
}
