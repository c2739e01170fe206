//! Load-Balancing Engine: given a rule, pick the next service using one of four
//! tactics. Stateless by design — all state it reads or advances (the cursor, the
//! per-service window counters) lives on the `Rule`/`Service` the caller hands in;
//! the engine itself owns nothing.

use crate::models::domain::{LbTactic, Rule, Service};
use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rand::Rng;

pub struct LoadBalancer;

impl LoadBalancer {
    /// Select a service for `rule`, advancing its cursor if the tactic calls for it.
    /// Returns `None` iff the rule has no active services.
    pub fn select(rule: &mut Rule, now: DateTime<Utc>) -> Option<Service> {
        let active: Vec<usize> = rule
            .services
            .iter()
            .enumerate()
            .filter(|(_, s)| s.active)
            .map(|(i, _)| i)
            .collect();

        if active.is_empty() {
            return None;
        }

        // Idempotent: applies the §3 rollover invariant before any tactic reads counters.
        for &i in &active {
            rule.services[i].stats.roll_window_if_elapsed(now);
        }

        match rule.lb_tactic.clone() {
            LbTactic::RoundRobin { request_threshold } => {
                Self::select_round_robin(rule, &active, request_threshold)
            }
            LbTactic::TokenBased { token_threshold } => {
                Self::select_token_based(rule, &active, token_threshold)
            }
            LbTactic::Hybrid { request_threshold, token_threshold } => {
                Self::select_hybrid(rule, &active, request_threshold, token_threshold)
            }
            LbTactic::Random => Self::select_random(rule, &active),
        }
    }

    /// Burst-stable affinity until the current slot crosses its request threshold,
    /// then rotates exactly one slot. `active` indexes into `rule.services`.
    fn select_round_robin(rule: &mut Rule, active: &[usize], request_threshold: u64) -> Option<Service> {
        let n = active.len();
        let i = rule.current_service_index % n;
        let idx = active[i];

        if rule.services[idx].stats.window_request_count < request_threshold {
            return Some(rule.services[idx].clone());
        }

        rule.current_service_index = (rule.current_service_index + 1) % n;
        let new_idx = active[rule.current_service_index % n];
        Some(rule.services[new_idx].clone())
    }

    /// Stays on the current slot under threshold; otherwise picks the service with
    /// the strictly minimum window token count (ties: first by iteration order).
    /// Never advances the cursor.
    fn select_token_based(rule: &Rule, active: &[usize], token_threshold: u64) -> Option<Service> {
        let n = active.len();
        let cur_idx = active[rule.current_service_index % n];

        if rule.services[cur_idx].stats.window_tokens_consumed() < token_threshold {
            return Some(rule.services[cur_idx].clone());
        }

        let min_idx = *active
            .iter()
            .min_by_key(|&&idx| rule.services[idx].stats.window_tokens_consumed())?;
        Some(rule.services[min_idx].clone())
    }

    /// Stays on the current slot only if it is under *both* thresholds; otherwise
    /// scores every active service as `requests * 10 + tokens` and returns the
    /// minimum (tokens dominate, requests break near-zero-token ties).
    fn select_hybrid(
        rule: &Rule,
        active: &[usize],
        request_threshold: u64,
        token_threshold: u64,
    ) -> Option<Service> {
        let n = active.len();
        let cur_idx = active[rule.current_service_index % n];
        let cur = &rule.services[cur_idx].stats;

        if cur.window_request_count < request_threshold && cur.window_tokens_consumed() < token_threshold {
            return Some(rule.services[cur_idx].clone());
        }

        let min_idx = *active.iter().min_by_key(|&&idx| {
            let s = &rule.services[idx].stats;
            s.window_request_count * 10 + s.window_tokens_consumed()
        })?;
        Some(rule.services[min_idx].clone())
    }

    /// Weighted draw over active services using `weight` as discrete probability
    /// mass; uniform draw if all weights are zero. Never advances the cursor.
    fn select_random(rule: &Rule, active: &[usize]) -> Option<Service> {
        let total_weight: u32 = active.iter().map(|&idx| rule.services[idx].weight).sum();
        let mut rng = rand::thread_rng();

        if total_weight == 0 {
            let &idx = active.choose(&mut rng)?;
            return Some(rule.services[idx].clone());
        }

        let mut draw = rng.gen_range(0..total_weight);
        for &idx in active {
            let weight = rule.services[idx].weight;
            if draw < weight {
                return Some(rule.services[idx].clone());
            }
            draw -= weight;
        }

        active.last().map(|&idx| rule.services[idx].clone())
    }
}
