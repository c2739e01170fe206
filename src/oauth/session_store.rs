//! User-facing status for an authorization attempt (§4.F.5), polled by a client
//! while the user completes the flow in a browser or on a second device.

use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Default session TTL: 10 minutes.
pub const SESSION_TTL_SECONDS: i64 = 600;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Pending,
    Success,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub session_id: String,
    pub status: SessionStatus,
    pub provider: String,
    pub user_id: String,
    pub created_at: i64,
    pub expires_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_uuid: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Default)]
pub struct SessionStore {
    entries: DashMap<String, SessionState>,
}

impl SessionStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self { entries: DashMap::new() })
    }

    pub fn create_pending(&self, session_id: String, provider: String, user_id: String, now: i64) -> SessionState {
        let state = SessionState {
            session_id: session_id.clone(),
            status: SessionStatus::Pending,
            provider,
            user_id,
            created_at: now,
            expires_at: now + SESSION_TTL_SECONDS,
            provider_uuid: None,
            error: None,
        };
        self.entries.insert(session_id, state.clone());
        state
    }

    pub fn mark_success(&self, session_id: &str, provider_uuid: Option<Uuid>) {
        if let Some(mut entry) = self.entries.get_mut(session_id) {
            entry.status = SessionStatus::Success;
            entry.provider_uuid = provider_uuid;
        }
    }

    pub fn mark_failed(&self, session_id: &str, error: String) {
        if let Some(mut entry) = self.entries.get_mut(session_id) {
            entry.status = SessionStatus::Failed;
            entry.error = Some(error);
        }
    }

    pub fn get(&self, session_id: &str) -> Option<SessionState> {
        self.entries.get(session_id).map(|e| e.clone())
    }

    pub fn sweep_expired(&self, now: i64) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, v| v.expires_at > now);
        before - self.entries.len()
    }
}

/// Spawns a sweeper that clears expired sessions once a minute.
pub fn start_session_sweeper(store: Arc<SessionStore>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            let now = Utc::now().timestamp();
            let removed = store.sweep_expired(now);
            if removed > 0 {
                tracing::debug!(removed, "swept expired oauth sessions");
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_transitions_to_success() {
        let store = SessionStore::new();
        store.create_pending("s1".to_string(), "anthropic".to_string(), "u".to_string(), 0);
        let uuid = Uuid::new_v4();
        store.mark_success("s1", Some(uuid));
        let state = store.get("s1").unwrap();
        assert_eq!(state.status, SessionStatus::Success);
        assert_eq!(state.provider_uuid, Some(uuid));
    }

    #[test]
    fn pending_transitions_to_failed_with_error() {
        let store = SessionStore::new();
        store.create_pending("s1".to_string(), "anthropic".to_string(), "u".to_string(), 0);
        store.mark_failed("s1", "token exchange failed".to_string());
        let state = store.get("s1").unwrap();
        assert_eq!(state.status, SessionStatus::Failed);
        assert_eq!(state.error.as_deref(), Some("token exchange failed"));
    }

    #[test]
    fn sweep_removes_only_expired_sessions() {
        let store = SessionStore::new();
        store.create_pending("fresh".to_string(), "p".to_string(), "u".to_string(), 10_000);
        store.create_pending("stale".to_string(), "p".to_string(), "u".to_string(), 0);
        assert_eq!(store.sweep_expired(500), 1);
        assert!(store.get("fresh").is_some());
        assert!(store.get("stale").is_none());
    }
}
