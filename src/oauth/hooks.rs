//! Per-provider quirk capability interface (§4.F.4). Formalizes what
//! `oauth/providers/anthropic.rs`'s `.append_pair("code", "true")` and Google's
//! userinfo-enrichment previously did ad hoc inline. `before_auth`/`before_token`
//! only edit the params/headers handed to them; `after_token` is the only hook
//! permitted to perform I/O (fetching userinfo from a side endpoint).

use crate::error::AppError;
use crate::oauth::types::OAuthToken;
use async_trait::async_trait;
use std::collections::HashMap;

#[async_trait]
pub trait ProviderHooks: Send + Sync {
    /// Mutate the authorization-URL query parameters before they're appended
    /// (e.g. `access_type=offline`, `prompt=consent`, Anthropic's `code=true`).
    fn before_auth(&self, _params: &mut HashMap<String, String>) {}

    /// Mutate the token-request form body and headers before the request is sent.
    fn before_token(&self, _body: &mut HashMap<String, String>, _headers: &mut HashMap<String, String>) {}

    /// Enrich a freshly issued token with vendor metadata (e.g. fetch userinfo).
    /// Returns the metadata to merge into `OAuthToken::metadata`; default is a no-op.
    async fn after_token(&self, _access_token: &str, _http: &reqwest::Client) -> Result<HashMap<String, serde_json::Value>, AppError> {
        Ok(HashMap::new())
    }
}

pub struct NoopHooks;

#[async_trait]
impl ProviderHooks for NoopHooks {}

/// Merges `after_token` metadata into a token in place.
pub async fn apply_after_token(hooks: &dyn ProviderHooks, http: &reqwest::Client, token: &mut OAuthToken) -> Result<(), AppError> {
    let extra = hooks.after_token(&token.access_token, http).await?;
    token.metadata.extend(extra);
    Ok(())
}
