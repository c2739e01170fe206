use crate::config::OAuthProviderConfig;
use crate::error::AppError;
use crate::oauth::hooks::ProviderHooks;
use crate::oauth::providers::traits::{OAuthProvider, token_response_to_oauth_token};
use crate::oauth::types::{OAuthToken, OAuthTokenResponse};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use std::collections::HashMap;

/// Anthropic OAuth provider implementation. The `code=true` query parameter and
/// the Anthropic-specific request headers are quirks formalized as a `hooks`
/// capability rather than hardcoded here, per the provider-hooks redesign.
pub struct AnthropicOAuthProvider {
    config: OAuthProviderConfig,
    client: Client,
    hooks: Box<dyn ProviderHooks>,
}

impl AnthropicOAuthProvider {
    pub fn new(config: OAuthProviderConfig) -> Self {
        Self {
            config,
            client: Client::new(),
            hooks: Box::new(AnthropicHooks),
        }
    }
}

/// Anthropic requires a literal `code=true` query param on the auth URL and a
/// browser-mimicking `Content-Type` on token requests.
struct AnthropicHooks;

impl ProviderHooks for AnthropicHooks {
    fn before_auth(&self, params: &mut HashMap<String, String>) {
        params.insert("code".to_string(), "true".to_string());
    }

    fn before_token(&self, _body: &mut HashMap<String, String>, headers: &mut HashMap<String, String>) {
        headers.insert("Content-Type".to_string(), "application/json".to_string());
    }
}

#[async_trait]
impl OAuthProvider for AnthropicOAuthProvider {
    fn get_authorization_url(
        &self,
        code_challenge: &str,
        state: &str,
    ) -> Result<String, AppError> {
        let mut url = url::Url::parse(&self.config.auth_url)
            .map_err(|e| AppError::Config(format!("invalid auth URL: {}", e)))?;

        let mut extra = HashMap::new();
        self.hooks.before_auth(&mut extra);

        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("client_id", &self.config.client_id)
                .append_pair("redirect_uri", &self.config.redirect_uri)
                .append_pair("response_type", "code")
                .append_pair("code_challenge", code_challenge)
                .append_pair("code_challenge_method", "S256")
                .append_pair("state", state)
                .append_pair("scope", &self.config.scopes.join(" "));
            for (k, v) in &extra {
                query.append_pair(k, v);
            }
        }

        Ok(url.to_string())
    }

    async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
    ) -> Result<OAuthToken, AppError> {
        let mut params = HashMap::new();
        params.insert("grant_type".to_string(), "authorization_code".to_string());
        params.insert("code".to_string(), code.to_string());
        params.insert("redirect_uri".to_string(), self.config.redirect_uri.clone());
        params.insert("client_id".to_string(), self.config.client_id.clone());
        params.insert("code_verifier".to_string(), code_verifier.to_string());

        let mut headers = self.config.custom_headers.clone();
        self.hooks.before_token(&mut params, &mut headers);

        let mut request_builder = self.client.post(&self.config.token_url).form(&params);
        for (key, value) in &headers {
            request_builder = request_builder.header(key, value);
        }

        let response = request_builder.send().await.map_err(AppError::HttpRequest)?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::token_exchange_failed(status, error_text.len()));
        }

        let token_response: OAuthTokenResponse = response
            .json()
            .await
            .map_err(AppError::HttpRequest)?;

        let now = Utc::now().timestamp();
        Ok(token_response_to_oauth_token(token_response, self.provider_type(), now))
    }

    async fn refresh_token(&self, refresh_token: &str) -> Result<OAuthToken, AppError> {
        let mut params = HashMap::new();
        params.insert("grant_type".to_string(), "refresh_token".to_string());
        params.insert("refresh_token".to_string(), refresh_token.to_string());
        params.insert("client_id".to_string(), self.config.client_id.clone());

        let mut headers = self.config.custom_headers.clone();
        self.hooks.before_token(&mut params, &mut headers);

        let mut request_builder = self.client.post(&self.config.token_url).form(&params);
        for (key, value) in &headers {
            request_builder = request_builder.header(key, value);
        }

        let response = request_builder.send().await.map_err(AppError::HttpRequest)?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::token_exchange_failed(status, error_text.len()));
        }

        let token_response: OAuthTokenResponse = response
            .json()
            .await
            .map_err(AppError::HttpRequest)?;

        let now = Utc::now().timestamp();
        Ok(token_response_to_oauth_token(token_response, self.provider_type(), now))
    }

    fn provider_type(&self) -> &str {
        &self.config.name
    }

    fn hooks(&self) -> &dyn ProviderHooks {
        self.hooks.as_ref()
    }
}

