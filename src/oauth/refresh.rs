use crate::oauth::manager::OAuthManager;
use crate::oauth::token_store::{TokenKey, TokenStore};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

/// Proactive-refresh sweeper tick. Distinct from `TokenExpiryBuffer` (5 min,
/// §4.F.3's on-demand `get_token` threshold) and `REFRESH_WITHIN_SECONDS`
/// below (the sweeper's own look-ahead window) — three separate knobs.
const SWEEP_INTERVAL_SECONDS: u64 = 5;
const REFRESH_WITHIN_SECONDS: i64 = 600;

/// Starts the background task that proactively refreshes tokens nearing
/// expiry, independent of the inline refresh `OAuthManager::get_token` does
/// on demand.
pub fn start_auto_refresh_task(token_store: Arc<TokenStore>, oauth_manager: Arc<OAuthManager>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(SWEEP_INTERVAL_SECONDS));

        loop {
            interval.tick().await;

            for user_id in token_store.all_user_ids().await {
                for provider_type in token_store.list_providers(&user_id).await {
                    let key = TokenKey::new(&user_id, &provider_type);
                    let token = match token_store.get_token(&key).await {
                        Ok(t) => t,
                        Err(_) => continue,
                    };

                    let now = Utc::now().timestamp();
                    if !token.expired_in(REFRESH_WITHIN_SECONDS, now) {
                        continue;
                    }

                    match oauth_manager.refresh_token(&user_id, &provider_type).await {
                        Ok(_) => {
                            tracing::info!(user_id = %user_id, provider = %provider_type, "token auto-refreshed");
                        }
                        Err(e) => {
                            tracing::error!(user_id = %user_id, provider = %provider_type, error = %e, "token auto-refresh failed");
                        }
                    }
                }
            }
        }
    });
}
