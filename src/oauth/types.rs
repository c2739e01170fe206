use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// An OAuth token together with the identity it was issued for. Keyed in storage
/// by `(user_id, provider_type)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthToken {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Token expiration timestamp (Unix timestamp); zero means "no expiry tracked".
    pub expires_at: i64,
    pub token_type: String,
    pub scope: String,
    pub provider_type: String,
    pub created_at: i64,
    pub last_refreshed_at: i64,
    /// Vendor-specific extras: email, project_id, api_key, organization, account,
    /// subscription_info, etc.
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl OAuthToken {
    /// `access_token` is non-empty AND (`expires_at` is zero OR now < expires_at).
    pub fn valid(&self, now: i64) -> bool {
        !self.access_token.is_empty() && (self.expires_at == 0 || now < self.expires_at)
    }

    /// True iff `expires_at` is tracked and `now + within_seconds` crosses it.
    pub fn expired_in(&self, within_seconds: i64, now: i64) -> bool {
        self.expires_at != 0 && now + within_seconds > self.expires_at
    }
}

/// Query parameters the browser redirect to `/callback` carries.
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthAuthorizationResponse {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// OAuth token response from provider
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthTokenResponse {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: i64,
    pub token_type: String,
    pub scope: Option<String>,
    #[serde(default)]
    pub organization: Option<serde_json::Value>,
    #[serde(default)]
    pub account: Option<serde_json::Value>,
    #[serde(default)]
    pub subscription_info: Option<serde_json::Value>,
}
