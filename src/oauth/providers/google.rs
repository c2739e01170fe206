use crate::config::OAuthProviderConfig;
use crate::error::AppError;
use crate::oauth::hooks::{NoopHooks, ProviderHooks};
use crate::oauth::providers::traits::{OAuthProvider, token_response_to_oauth_token};
use crate::oauth::types::{OAuthToken, OAuthTokenResponse};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use std::collections::HashMap;

/// Google OAuth provider implementation.
/// Supports gemini-cli and antigravity OAuth applications.
pub struct GoogleOAuthProvider {
    config: OAuthProviderConfig,
    client: Client,
    hooks: Box<dyn ProviderHooks>,
}

impl GoogleOAuthProvider {
    pub fn new(config: OAuthProviderConfig) -> Self {
        let hooks: Box<dyn ProviderHooks> = match config.name.as_str() {
            "gemini-cli" | "antigravity" => Box::new(GoogleHooks),
            _ => Box::new(NoopHooks),
        };
        Self { config, client: Client::new(), hooks }
    }
}

/// gemini-cli/antigravity want offline access and a forced consent screen, plus
/// the account's userinfo attached to the issued token.
struct GoogleHooks;

#[async_trait]
impl ProviderHooks for GoogleHooks {
    fn before_auth(&self, params: &mut HashMap<String, String>) {
        params.insert("access_type".to_string(), "offline".to_string());
        params.insert("prompt".to_string(), "consent".to_string());
    }

    async fn after_token(&self, access_token: &str, http: &reqwest::Client) -> Result<HashMap<String, serde_json::Value>, AppError> {
        let mut metadata = HashMap::new();
        let response = http
            .get("https://www.googleapis.com/oauth2/v2/userinfo")
            .bearer_auth(access_token)
            .send()
            .await;

        if let Ok(response) = response {
            if response.status().is_success() {
                if let Ok(userinfo) = response.json::<serde_json::Value>().await {
                    if let Some(email) = userinfo.get("email") {
                        metadata.insert("email".to_string(), email.clone());
                    }
                }
            }
        }
        Ok(metadata)
    }
}

#[async_trait]
impl OAuthProvider for GoogleOAuthProvider {
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

        if let Some(ref secret) = self.config.client_secret {
            params.insert("client_secret".to_string(), secret.clone());
        }

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
        let mut token = token_response_to_oauth_token(token_response, self.provider_type(), now);
        crate::oauth::hooks::apply_after_token(self.hooks.as_ref(), &self.client, &mut token).await?;
        Ok(token)
    }

    async fn refresh_token(&self, refresh_token: &str) -> Result<OAuthToken, AppError> {
        let mut params = HashMap::new();
        params.insert("grant_type".to_string(), "refresh_token".to_string());
        params.insert("refresh_token".to_string(), refresh_token.to_string());
        params.insert("client_id".to_string(), self.config.client_id.clone());

        if let Some(ref secret) = self.config.client_secret {
            params.insert("client_secret".to_string(), secret.clone());
        }

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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_authorization_url() {
        let config = OAuthProviderConfig {
            name: "gemini-cli".to_string(),
            client_id: "test_client_id".to_string(),
            client_secret: None,
            auth_url: "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
            token_url: "https://oauth2.googleapis.com/token".to_string(),
            device_auth_url: None,
            redirect_uri: "https://codeassist.google.com/authcode".to_string(),
            method: crate::config::OAuthMethod::Pkce,
            token_body_format: crate::config::TokenBodyFormat::Form,
            scopes: vec!["https://www.googleapis.com/auth/cloud-platform".to_string()],
            custom_headers: HashMap::new(),
        };

        let provider = GoogleOAuthProvider::new(config);
        let url = provider
            .get_authorization_url("test_challenge", "test_state")
            .unwrap();

        assert!(url.contains("client_id=test_client_id"));
        assert!(url.contains("code_challenge=test_challenge"));
        assert!(url.contains("code_challenge_method=S256"));
        assert!(url.contains("state=test_state"));
        assert!(url.contains("access_type=offline"));
        assert!(url.contains("prompt=consent"));
    }

    #[test]
    fn unrecognized_provider_name_gets_noop_hooks() {
        let config = OAuthProviderConfig {
            name: "some-other-google-app".to_string(),
            client_id: "id".to_string(),
            client_secret: None,
            auth_url: "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
            token_url: "https://oauth2.googleapis.com/token".to_string(),
            device_auth_url: None,
            redirect_uri: "https://example.com/callback".to_string(),
            method: crate::config::OAuthMethod::Pkce,
            token_body_format: crate::config::TokenBodyFormat::Form,
            scopes: vec![],
            custom_headers: HashMap::new(),
        };
        let provider = GoogleOAuthProvider::new(config);
        let url = provider.get_authorization_url("c", "s").unwrap();
        assert!(!url.contains("access_type=offline"));
    }
}
