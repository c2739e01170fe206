use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Process bootstrap settings: log level, bind overrides, where the on-disk
/// config directory lives, whether to fork. Orthogonal to and sits above
/// [`crate::config_store::ConfigDocument`], which owns the business data
/// (providers/rules/flags) this process serves.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProcessConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default = "default_log_format")]
    pub log_format: String,

    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port override; falls back to the config document's `flags.server_port`.
    #[serde(default)]
    pub port: Option<u16>,

    #[serde(default = "default_config_dir")]
    pub config_dir: PathBuf,

    #[serde(default)]
    pub daemonize: bool,

    /// OAuth providers this gateway can authenticate upstream requests through.
    #[serde(default)]
    pub oauth_providers: Vec<OAuthProviderConfig>,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
            host: default_host(),
            port: None,
            config_dir: default_config_dir(),
            daemonize: false,
            oauth_providers: Vec::new(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".llm-gateway")
}

/// Which OAuth dance a provider speaks, and whether PKCE is layered on top.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum OAuthMethod {
    Standard,
    Pkce,
    DeviceCode,
    DeviceCodePkce,
}

impl OAuthMethod {
    pub fn uses_pkce(self) -> bool {
        matches!(self, OAuthMethod::Pkce | OAuthMethod::DeviceCodePkce)
    }

    pub fn is_device_code(self) -> bool {
        matches!(self, OAuthMethod::DeviceCode | OAuthMethod::DeviceCodePkce)
    }
}

fn default_oauth_method() -> OAuthMethod {
    OAuthMethod::Pkce
}

/// Body encoding the token endpoint expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenBodyFormat {
    Form,
    Json,
}

fn default_token_body_format() -> TokenBodyFormat {
    TokenBodyFormat::Form
}

/// OAuth provider configuration for upstream authentication
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OAuthProviderConfig {
    /// Unique name for this OAuth provider
    pub name: String,
    /// OAuth client ID
    pub client_id: String,
    /// OAuth client secret (optional for PKCE flow)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    /// Authorization endpoint URL
    pub auth_url: String,
    /// Token endpoint URL
    pub token_url: String,
    /// Device-authorization endpoint URL (RFC 8628); required when `method` is a device-code variant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_auth_url: Option<String>,
    /// Redirect URI for OAuth callback
    pub redirect_uri: String,
    #[serde(default = "default_oauth_method")]
    pub method: OAuthMethod,
    #[serde(default = "default_token_body_format")]
    pub token_body_format: TokenBodyFormat,
    /// OAuth scopes
    pub scopes: Vec<String>,
    /// Custom headers for token exchange requests (optional)
    #[serde(default)]
    pub custom_headers: HashMap<String, String>,
}

/// Loads process bootstrap settings from `config.toml` (if present), then
/// environment variables prefixed `LLM_GATEWAY__`, each layer overriding the
/// last. Never touches the on-disk business document; that's [`crate::config_store::ConfigStore::init`].
pub fn load_config() -> anyhow::Result<ProcessConfig> {
    let config = config::Config::builder()
        .add_source(config::File::with_name("config").required(false))
        .add_source(config::Environment::with_prefix("LLM_GATEWAY").separator("__"))
        .build()?;

    let cfg: ProcessConfig = config.try_deserialize().unwrap_or_default();
    Ok(cfg)
}
