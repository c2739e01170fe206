//! Thin dispatcher (component H, spec §4.H): resolve a rule, ask the
//! Load-Balancing Engine for a service, forward, then report usage. Routing
//! itself carries no state — rule lookup and the round-robin cursor live in
//! the Configuration Store; selection math lives in `load_balancer`.

use crate::config_store::ConfigStore;
use crate::error::AppError;
use crate::load_balancer::LoadBalancer;
use crate::models::domain::{Rule, Service};
use crate::stats::StatsStore;
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

/// A resolved service a request should be forwarded to, plus the rule it came
/// from (needed to persist the load balancer's cursor advance).
#[derive(Debug, Clone)]
pub struct Dispatch {
    pub rule_id: Uuid,
    pub service: Service,
}

pub struct ModelRouter {
    config_store: Arc<ConfigStore>,
    stats: Arc<StatsStore>,
}

impl ModelRouter {
    pub fn new(config_store: Arc<ConfigStore>, stats: Arc<StatsStore>) -> Self {
        Self { config_store, stats }
    }

    /// Steps 1-2 of §4.H: resolve `request_model` to a rule (falling back to the
    /// document's default rule when no rule's `request_model` matches), then ask
    /// the engine to pick a service. The winning rule is persisted afterward so
    /// the cursor advance and rolled stats window are not lost.
    pub async fn dispatch(&self, request_model: &str) -> Result<Dispatch, AppError> {
        let mut rule = self.resolve_rule(request_model)?;
        let rule_id = rule.id;

        let now = Utc::now();
        let service = LoadBalancer::select(&mut rule, now).ok_or_else(|| {
            AppError::NoHealthyInstances(format!("rule '{}' has no healthy services", rule.request_model))
        })?;

        self.config_store.update_rule(rule).await?;

        Ok(Dispatch { rule_id, service })
    }

    fn resolve_rule(&self, request_model: &str) -> Result<Rule, AppError> {
        if let Some(rule) = self.config_store.get_rule_by_request_model(request_model) {
            return Ok(rule);
        }
        if let Some(rule) = self.config_store.get_default_rule() {
            return Ok(rule);
        }
        Err(AppError::ModelNotFound(format!(
            "no rule matches request model '{}' and no default rule is configured",
            request_model
        )))
    }

    /// Step 4 of §4.H: called after the forwarded request completes.
    pub async fn record_usage(&self, dispatch: &Dispatch, input_tokens: u64, output_tokens: u64) -> Result<(), AppError> {
        self.stats
            .record_usage(
                dispatch.service.provider,
                &dispatch.service.model,
                dispatch.service.time_window,
                input_tokens,
                output_tokens,
            )
            .await?;
        Ok(())
    }
}
