use crate::error::AppError;
use crate::oauth::hooks::ProviderHooks;
use crate::oauth::types::{OAuthToken, OAuthTokenResponse};
use async_trait::async_trait;
use std::collections::HashMap;

/// OAuth provider trait for different OAuth implementations
#[async_trait]
pub trait OAuthProvider: Send + Sync {
    /// Get the authorization URL for the OAuth flow
    fn get_authorization_url(
        &self,
        code_challenge: &str,
        state: &str,
    ) -> Result<String, AppError>;

    /// Exchange authorization code for access token
    async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
    ) -> Result<OAuthToken, AppError>;

    /// Refresh an access token using refresh token
    async fn refresh_token(&self, refresh_token: &str) -> Result<OAuthToken, AppError>;

    /// The provider-type key tokens issued by this provider are stored under.
    fn provider_type(&self) -> &str;

    /// This provider's quirk hooks, reused by the device-code flow which shares
    /// the same before_auth/before_token/after_token surface.
    fn hooks(&self) -> &dyn ProviderHooks;
}

/// Convert OAuth token response to OAuthToken
pub fn token_response_to_oauth_token(
    response: OAuthTokenResponse,
    provider_type: &str,
    now: i64,
) -> OAuthToken {
    let mut metadata = HashMap::new();
    if let Some(v) = response.organization {
        metadata.insert("organization".to_string(), v);
    }
    if let Some(v) = response.account {
        metadata.insert("account".to_string(), v);
    }
    if let Some(v) = response.subscription_info {
        metadata.insert("subscription_info".to_string(), v);
    }

    OAuthToken {
        access_token: response.access_token,
        refresh_token: response.refresh_token,
        expires_at: now + response.expires_in,
        token_type: response.token_type,
        scope: response.scope.unwrap_or_default(),
        provider_type: provider_type.to_string(),
        created_at: now,
        last_refreshed_at: now,
        metadata,
    }
}
