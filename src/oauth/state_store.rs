//! State tracking for in-flight authorization-code exchanges (§4.F.5). Entries
//! are one-shot: `take` removes them so a replayed callback can't reuse a state.

use crate::error::AppError;
use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Default state TTL: 10 minutes.
pub const STATE_TTL_SECONDS: i64 = 600;

#[derive(Debug, Clone)]
pub struct StateData {
    pub state: String,
    pub user_id: String,
    pub provider_type: String,
    pub expires_at: i64,
    pub code_verifier: Option<String>,
    pub redirect_uri: String,
    pub session_id: String,
    pub name: Option<String>,
    pub redirect_to: Option<String>,
    /// The upstream Provider this login is for, threaded through to the session
    /// on success so a poller can tell which provider now has a live token.
    pub provider_uuid: Option<Uuid>,
}

#[derive(Default)]
pub struct StateStore {
    entries: DashMap<String, StateData>,
}

impl StateStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self { entries: DashMap::new() })
    }

    pub fn insert(&self, data: StateData) {
        self.entries.insert(data.state.clone(), data);
    }

    /// Looks up and removes the entry for `state` (one-shot). `StateExpired` if
    /// found but past `expires_at`; `InvalidState` if not found at all.
    pub fn take(&self, state: &str, now: i64) -> Result<StateData, AppError> {
        let (_, data) = self.entries.remove(state).ok_or_else(AppError::invalid_state)?;
        if data.expires_at <= now {
            return Err(AppError::state_expired());
        }
        Ok(data)
    }

    pub fn sweep_expired(&self, now: i64) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, v| v.expires_at > now);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Spawns a sweeper that clears expired state rows once a minute.
pub fn start_state_sweeper(store: Arc<StateStore>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            let now = Utc::now().timestamp();
            let removed = store.sweep_expired(now);
            if removed > 0 {
                tracing::debug!(removed, "swept expired oauth state entries");
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(state: &str, expires_at: i64) -> StateData {
        StateData {
            state: state.to_string(),
            user_id: "u".to_string(),
            provider_type: "anthropic".to_string(),
            expires_at,
            code_verifier: Some("verifier".to_string()),
            redirect_uri: "http://localhost:1455/callback".to_string(),
            session_id: "s1".to_string(),
            name: None,
            redirect_to: None,
            provider_uuid: None,
        }
    }

    #[test]
    fn take_is_one_shot() {
        let store = StateStore::new();
        store.insert(data("abc", 1_000));
        assert!(store.take("abc", 500).is_ok());
        let err = store.take("abc", 500).unwrap_err();
        assert!(matches!(err, AppError::OAuth { kind: crate::error::OAuthErrorKind::InvalidState, .. }));
    }

    #[test]
    fn take_rejects_expired_state() {
        let store = StateStore::new();
        store.insert(data("abc", 100));
        let err = store.take("abc", 500).unwrap_err();
        assert!(matches!(err, AppError::OAuth { kind: crate::error::OAuthErrorKind::StateExpired, .. }));
    }

    #[test]
    fn take_rejects_unknown_state() {
        let store = StateStore::new();
        let err = store.take("nope", 0).unwrap_err();
        assert!(matches!(err, AppError::OAuth { kind: crate::error::OAuthErrorKind::InvalidState, .. }));
    }

    #[test]
    fn sweep_only_removes_expired() {
        let store = StateStore::new();
        store.insert(data("a", 100));
        store.insert(data("b", 10_000));
        assert_eq!(store.sweep_expired(500), 1);
        assert_eq!(store.len(), 1);
    }
}
