//! Core data model shared by the Configuration Store, Load-Balancing Engine, Stats
//! Store, and Template Registry: providers, rules, services and their stats, and the
//! load-balancing tactic a rule applies to its services.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Wire protocol family a provider speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiStyle {
    OpenAi,
    Anthropic,
}

/// An addressable upstream endpoint. Identity is the UUID, not the name — renaming a
/// provider must never lose its model cache or stats, both of which are keyed by UUID.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provider {
    pub id: Uuid,
    pub name: String,
    pub api_base: String,
    pub api_style: ApiStyle,
    pub token: String,
    pub enabled: bool,
    #[serde(default)]
    pub proxy_url: Option<String>,
    /// Seconds; clamped to an upper bound by the Configuration Store's migrations.
    pub timeout_seconds: u64,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub models: Vec<String>,
    pub last_updated: DateTime<Utc>,
    #[serde(default)]
    pub oauth_provider: Option<String>,
}

impl Provider {
    /// `name`, `api_base`, `token` must be non-empty when `enabled`; checked on add/update.
    pub fn validate(&self) -> Result<(), crate::error::AppError> {
        if !self.enabled {
            return Ok(());
        }
        if self.name.trim().is_empty() {
            return Err(crate::error::AppError::Config("provider name must not be empty".into()));
        }
        if self.api_base.trim().is_empty() {
            return Err(crate::error::AppError::Config("provider api_base must not be empty".into()));
        }
        if self.token.trim().is_empty() {
            return Err(crate::error::AppError::Config("provider token must not be empty".into()));
        }
        Ok(())
    }
}

/// Tagged variant selecting the Load-Balancing Engine's tactic for a rule. The
/// discriminator (`type`) is explicit on the wire so an unknown future variant
/// decodes to round-robin-with-defaults instead of a hard parse failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LbTactic {
    RoundRobin { request_threshold: u64 },
    TokenBased { token_threshold: u64 },
    Hybrid { request_threshold: u64, token_threshold: u64 },
    Random,
}

impl Default for LbTactic {
    fn default() -> Self {
        Self::RoundRobin { request_threshold: Self::DEFAULT_REQUEST_THRESHOLD }
    }
}

impl LbTactic {
    pub const DEFAULT_REQUEST_THRESHOLD: u64 = 100;
    pub const DEFAULT_TOKEN_THRESHOLD: u64 = 10_000;

    pub fn round_robin_default() -> Self {
        Self::RoundRobin { request_threshold: Self::DEFAULT_REQUEST_THRESHOLD }
    }
}

/// Deserializing an unrecognized `type` discriminator must not be fatal: fall back to
/// round-robin with defaults (spec §4.E "Decoding policy", §7 Schema errors).
pub fn decode_tactic_lenient(value: serde_json::Value) -> LbTactic {
    serde_json::from_value(value).unwrap_or_else(|_| LbTactic::round_robin_default())
}

/// Sliding-window counters for one (provider, model) pair. `service_id` is the
/// composite key `"<provider-uuid>:<model>"`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceStats {
    pub service_id: String,
    pub request_count: u64,
    pub last_used: Option<DateTime<Utc>>,
    pub window_start: DateTime<Utc>,
    pub window_request_count: u64,
    pub window_input_tokens: u64,
    pub window_output_tokens: u64,
    pub time_window: u64,
}

impl ServiceStats {
    pub fn new(service_id: impl Into<String>, time_window: u64, now: DateTime<Utc>) -> Self {
        Self {
            service_id: service_id.into(),
            request_count: 0,
            last_used: None,
            window_start: now,
            window_request_count: 0,
            window_input_tokens: 0,
            window_output_tokens: 0,
            time_window,
        }
    }

    pub fn window_tokens_consumed(&self) -> u64 {
        self.window_input_tokens + self.window_output_tokens
    }

    /// Resets window fields if the window has elapsed, then records one usage.
    /// Lifetime `request_count` never resets.
    pub fn record_usage(&mut self, input_tokens: u64, output_tokens: u64, now: DateTime<Utc>) {
        self.roll_window_if_elapsed(now);

        self.request_count += 1;
        self.window_request_count += 1;
        self.window_input_tokens += input_tokens;
        self.window_output_tokens += output_tokens;
        self.last_used = Some(now);
    }

    /// Applies the rollover invariant without recording usage; used by the
    /// Load-Balancing Engine to read up-to-date window counters before selecting.
    pub fn roll_window_if_elapsed(&mut self, now: DateTime<Utc>) {
        let elapsed = (now - self.window_start).num_seconds().max(0) as u64;
        if elapsed >= self.time_window {
            self.window_start = now;
            self.window_request_count = 0;
            self.window_input_tokens = 0;
            self.window_output_tokens = 0;
        }
    }
}

/// One (provider, model) pair participating in a rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
    pub provider: Uuid,
    pub model: String,
    #[serde(default = "Service::default_weight")]
    pub weight: u32,
    #[serde(default = "Service::default_active")]
    pub active: bool,
    #[serde(default = "Service::default_time_window")]
    pub time_window: u64,
    #[serde(skip)]
    pub stats: ServiceStats,
}

impl Service {
    fn default_weight() -> u32 {
        1
    }
    fn default_active() -> bool {
        true
    }
    fn default_time_window() -> u64 {
        60
    }

    /// The key Stats Store rows and `ServiceStats::service_id` are keyed by.
    pub fn stats_key(&self) -> String {
        format!("{}:{}", self.provider, self.model)
    }
}

/// A selection policy mapping a client-facing request model name to a set of Services.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub request_model: String,
    #[serde(default)]
    pub response_model: Option<String>,
    #[serde(default)]
    pub services: Vec<Service>,
    #[serde(default)]
    pub lb_tactic: LbTactic,
    #[serde(default)]
    pub current_service_index: usize,
    #[serde(default = "Rule::default_active")]
    pub active: bool,
}

impl Rule {
    fn default_active() -> bool {
        true
    }

    pub fn new(request_model: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            request_model: request_model.into(),
            response_model: None,
            services: Vec::new(),
            lb_tactic: LbTactic::round_robin_default(),
            current_service_index: 0,
            active: true,
        }
    }

    /// Services with `active=true`, in original order. The common preamble every
    /// tactic starts from (spec §4.E).
    pub fn active_services(&self) -> Vec<&Service> {
        self.services.iter().filter(|s| s.active).collect()
    }
}

/// Catalogue entry for a known upstream provider (Template Registry, component A).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderTemplate {
    pub id: String,
    pub name: String,
    pub base_url_openai: Option<String>,
    pub base_url_anthropic: Option<String>,
    #[serde(default)]
    pub models: Vec<String>,
    #[serde(default)]
    pub model_limits: HashMap<String, u64>,
    #[serde(default)]
    pub supports_models_endpoint: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_stats_rollover_resets_window_not_lifetime() {
        let t0 = Utc::now();
        let mut stats = ServiceStats::new("p:m", 60, t0);
        stats.record_usage(100, 200, t0);
        assert_eq!(stats.request_count, 1);
        assert_eq!(stats.window_tokens_consumed(), 300);

        let t1 = t0 + chrono::Duration::seconds(61);
        stats.record_usage(10, 20, t1);
        assert_eq!(stats.request_count, 2);
        assert_eq!(stats.window_request_count, 1);
        assert_eq!(stats.window_tokens_consumed(), 30);
    }

    #[test]
    fn service_stats_no_rollover_within_window() {
        let t0 = Utc::now();
        let mut stats = ServiceStats::new("p:m", 60, t0);
        stats.record_usage(100, 200, t0);
        let t1 = t0 + chrono::Duration::seconds(30);
        stats.record_usage(10, 20, t1);
        assert_eq!(stats.request_count, 2);
        assert_eq!(stats.window_request_count, 2);
        assert_eq!(stats.window_tokens_consumed(), 330);
    }

    #[test]
    fn unknown_tactic_discriminator_decodes_to_round_robin_default() {
        let value = serde_json::json!({"type": "quantum_leap"});
        let tactic = decode_tactic_lenient(value);
        assert!(matches!(tactic, LbTactic::RoundRobin { request_threshold } if request_threshold == LbTactic::DEFAULT_REQUEST_THRESHOLD));
    }

    #[test]
    fn provider_validate_requires_fields_when_enabled() {
        let mut p = Provider {
            id: Uuid::new_v4(),
            name: String::new(),
            api_base: "https://api.example.com".into(),
            api_style: ApiStyle::OpenAi,
            token: "k".into(),
            enabled: true,
            proxy_url: None,
            timeout_seconds: 300,
            tags: vec![],
            models: vec![],
            last_updated: Utc::now(),
            oauth_provider: None,
        };
        assert!(p.validate().is_err());
        p.name = "openai".into();
        assert!(p.validate().is_ok());
        p.enabled = false;
        p.name = String::new();
        assert!(p.validate().is_ok());
    }
}
