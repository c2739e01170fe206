//! Owns the authorization-code+PKCE and device-code flows end to end: issuing
//! auth URLs/device codes, validating callbacks, and keeping tokens fresh.
//! Token bytes themselves live in `TokenStore`; state/session bookkeeping lives
//! in `StateStore`/`SessionStore`.

use crate::config::OAuthProviderConfig;
use crate::error::{AppError, OAuthErrorKind};
use crate::oauth::device::{self, DeviceCodeData};
use crate::oauth::pkce::generate_pkce_params;
use crate::oauth::providers::{AnthropicOAuthProvider, GoogleOAuthProvider, OAuthProvider};
use crate::oauth::session_store::{SessionState, SessionStore};
use crate::oauth::state_store::{StateData, StateStore, STATE_TTL_SECONDS};
use crate::oauth::token_store::{TokenKey, TokenStore};
use crate::oauth::types::OAuthToken;
use chrono::Utc;
use dashmap::DashMap;
use reqwest::Client;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Expiry-buffer below which `get_token` proactively refreshes rather than
/// handing back a token that's about to die mid-request.
const TOKEN_EXPIRY_BUFFER_SECONDS: i64 = 300;

pub struct OAuthManager {
    providers: HashMap<String, Box<dyn OAuthProvider>>,
    configs: HashMap<String, OAuthProviderConfig>,
    token_store: Arc<TokenStore>,
    state_store: Arc<StateStore>,
    session_store: Arc<SessionStore>,
    refresh_locks: Arc<DashMap<(String, String), Arc<Mutex<()>>>>,
    http: Client,
}

impl OAuthManager {
    pub fn new(
        oauth_configs: Vec<OAuthProviderConfig>,
        token_store: Arc<TokenStore>,
        state_store: Arc<StateStore>,
        session_store: Arc<SessionStore>,
    ) -> Self {
        let mut providers: HashMap<String, Box<dyn OAuthProvider>> = HashMap::new();
        let mut configs = HashMap::new();

        for config in oauth_configs {
            let provider: Box<dyn OAuthProvider> = match config.name.as_str() {
                "anthropic" => Box::new(AnthropicOAuthProvider::new(config.clone())),
                "gemini-cli" | "antigravity" => Box::new(GoogleOAuthProvider::new(config.clone())),
                _ => {
                    tracing::warn!(provider = %config.name, "unknown OAuth provider, using default Google implementation");
                    Box::new(GoogleOAuthProvider::new(config.clone()))
                }
            };
            providers.insert(config.name.clone(), provider);
            configs.insert(config.name.clone(), config);
        }

        Self {
            providers,
            configs,
            token_store,
            state_store,
            session_store,
            refresh_locks: Arc::new(DashMap::new()),
            http: Client::new(),
        }
    }

    pub fn get_provider(&self, provider_type: &str) -> Result<&dyn OAuthProvider, AppError> {
        self.providers
            .get(provider_type)
            .map(|b| b.as_ref())
            .ok_or_else(|| AppError::OAuth {
                kind: OAuthErrorKind::InvalidProvider,
                message: format!("OAuth provider '{}' not found", provider_type),
            })
    }

    fn get_config(&self, provider_type: &str) -> Result<&OAuthProviderConfig, AppError> {
        self.configs.get(provider_type).ok_or_else(|| AppError::OAuth {
            kind: OAuthErrorKind::ProviderNotConfigured,
            message: format!("OAuth provider '{}' not configured", provider_type),
        })
    }

    /// §4.F.1 step 1: builds the authorization URL, registers a one-shot
    /// `StateData` entry, and opens a pending session a client can poll.
    pub fn get_auth_url(
        &self,
        user_id: &str,
        provider_type: &str,
        redirect_to: Option<String>,
        name: Option<String>,
        session_id: Option<String>,
        provider_uuid: Option<Uuid>,
    ) -> Result<(String, String), AppError> {
        let provider = self.get_provider(provider_type)?;
        let config = self.get_config(provider_type)?;

        let pkce = generate_pkce_params();
        let url = provider.get_authorization_url(&pkce.code_challenge, &pkce.state)?;

        let now = Utc::now().timestamp();
        let session_id = session_id.unwrap_or_else(|| Uuid::new_v4().to_string());

        self.session_store.create_pending(session_id.clone(), provider_type.to_string(), user_id.to_string(), now);

        self.state_store.insert(StateData {
            state: pkce.state,
            user_id: user_id.to_string(),
            provider_type: provider_type.to_string(),
            expires_at: now + STATE_TTL_SECONDS,
            code_verifier: Some(pkce.code_verifier),
            redirect_uri: config.redirect_uri.clone(),
            session_id: session_id.clone(),
            name,
            redirect_to,
            provider_uuid,
        });

        Ok((url, session_id))
    }

    /// §4.F.1 step 2: validates the callback against its `StateData`, exchanges
    /// the code, persists the token, and resolves the session either way.
    pub async fn handle_callback(
        &self,
        code: Option<String>,
        state: Option<String>,
        error: Option<String>,
    ) -> Result<SessionState, AppError> {
        let state_str = state.ok_or_else(AppError::invalid_state)?;
        let now = Utc::now().timestamp();
        let state_data = self.state_store.take(&state_str, now)?;

        let fail = |session_store: &SessionStore, message: String, err: AppError| {
            session_store.mark_failed(&state_data.session_id, message);
            err
        };

        if let Some(err) = error.filter(|e| !e.is_empty()) {
            return Err(fail(
                &self.session_store,
                err.clone(),
                AppError::OAuth { kind: OAuthErrorKind::InvalidCallback, message: err },
            ));
        }

        let code = match code {
            Some(c) => c,
            None => {
                return Err(fail(
                    &self.session_store,
                    "callback carried no authorization code".to_string(),
                    AppError::OAuth { kind: OAuthErrorKind::InvalidCode, message: "missing code".to_string() },
                ));
            }
        };

        let provider = self.get_provider(&state_data.provider_type)?;
        let code_verifier = state_data.code_verifier.clone().unwrap_or_default();

        let token = match provider.exchange_code(&code, &code_verifier).await {
            Ok(token) => token,
            Err(e) => return Err(fail(&self.session_store, e.to_string(), e)),
        };

        let key = TokenKey::new(&state_data.user_id, &state_data.provider_type);
        self.token_store.save_token(&key, &token).await?;

        self.session_store.mark_success(&state_data.session_id, state_data.provider_uuid);

        Ok(self.session_store.get(&state_data.session_id).expect("session just written"))
    }

    /// §4.F.2 step 1.
    pub async fn initiate_device_login(
        &self,
        user_id: &str,
        provider_type: &str,
        name: Option<String>,
    ) -> Result<DeviceCodeData, AppError> {
        let provider = self.get_provider(provider_type)?;
        let config = self.get_config(provider_type)?;
        device::initiate_device_code_flow(config, provider.hooks(), &self.http, user_id, name).await
    }

    /// §4.F.2 step 2.
    pub async fn complete_device_login(&self, provider_type: &str, data: &DeviceCodeData) -> Result<OAuthToken, AppError> {
        let provider = self.get_provider(provider_type)?;
        let config = self.get_config(provider_type)?;
        let token = device::poll_for_token(config, provider.hooks(), data, &self.http).await?;

        let key = TokenKey::new(&data.user_id, provider_type);
        self.token_store.save_token(&key, &token).await?;
        Ok(token)
    }

    /// §4.F.3: returns the stored token if it's not about to expire, refreshing
    /// it (or falling back to the still-technically-valid old token) otherwise.
    pub async fn get_token(&self, user_id: &str, provider_type: &str) -> Result<OAuthToken, AppError> {
        let key = TokenKey::new(user_id, provider_type);
        let token = self.token_store.get_token(&key).await?;

        let now = Utc::now().timestamp();
        if !token.expired_in(TOKEN_EXPIRY_BUFFER_SECONDS, now) {
            return Ok(token);
        }

        tracing::info!(user_id, provider = provider_type, "token expiring soon, refreshing");
        self.refresh_token(user_id, provider_type).await
    }

    /// §4.F.3 refresh, serialized per `(user_id, provider_type)` so concurrent
    /// callers don't both hit the token endpoint for the same credential.
    pub async fn refresh_token(&self, user_id: &str, provider_type: &str) -> Result<OAuthToken, AppError> {
        let lock_key = (user_id.to_string(), provider_type.to_string());
        let lock = self.refresh_locks.entry(lock_key).or_insert_with(|| Arc::new(Mutex::new(()))).clone();
        let _guard = lock.lock().await;

        let key = TokenKey::new(user_id, provider_type);
        let old_token = self.token_store.get_token(&key).await?;

        let now = Utc::now().timestamp();
        if !old_token.expired_in(TOKEN_EXPIRY_BUFFER_SECONDS, now) {
            // Another task already refreshed it while we waited for the lock.
            return Ok(old_token);
        }

        let refresh_token = match old_token.refresh_token.clone() {
            Some(rt) => rt,
            None => {
                return Err(AppError::OAuth {
                    kind: OAuthErrorKind::NoRefreshToken,
                    message: format!("no refresh token available for '{}'", provider_type),
                });
            }
        };

        let provider = self.get_provider(provider_type)?;

        match provider.refresh_token(&refresh_token).await {
            Ok(new_token) => {
                self.token_store.save_token(&key, &new_token).await?;
                tracing::info!(
                    user_id,
                    provider = provider_type,
                    old_expires_at = old_token.expires_at,
                    new_expires_at = new_token.expires_at,
                    "token refreshed"
                );
                Ok(new_token)
            }
            Err(e) => {
                if old_token.valid(now) {
                    tracing::warn!(user_id, provider = provider_type, error = %e, "refresh failed, old token still valid");
                    Ok(old_token)
                } else {
                    Err(e)
                }
            }
        }
    }
}
