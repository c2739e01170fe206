//! RFC 8628 device-authorization-grant flow (§4.F.2): an unattended device
//! obtains a code the user approves on another screen, then polls until the
//! token endpoint stops saying `authorization_pending`.

use crate::config::{OAuthProviderConfig, TokenBodyFormat};
use crate::error::{AppError, DeviceCodeErrorKind};
use crate::oauth::hooks::ProviderHooks;
use crate::oauth::pkce::generate_pkce_params;
use crate::oauth::providers::traits::token_response_to_oauth_token;
use crate::oauth::types::{OAuthToken, OAuthTokenResponse};
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

/// Hard ceiling on total poll time, independent of the server's own `expires_in`.
pub const POLL_CEILING_SECONDS: u64 = 120;
const DEFAULT_POLL_INTERVAL_SECONDS: u64 = 5;

#[derive(Debug, Clone)]
pub struct DeviceCodeData {
    pub device_code: String,
    pub user_code: String,
    pub verification_uri: String,
    pub verification_uri_complete: Option<String>,
    pub expires_in: i64,
    pub interval: u64,
    pub code_verifier: Option<String>,
    pub user_id: String,
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DeviceAuthorizationResponse {
    device_code: String,
    user_code: String,
    verification_uri: String,
    #[serde(default)]
    verification_uri_complete: Option<String>,
    expires_in: i64,
    #[serde(default)]
    interval: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct DeviceTokenErrorResponse {
    error: String,
}

pub async fn initiate_device_code_flow(
    config: &OAuthProviderConfig,
    hooks: &dyn ProviderHooks,
    http: &Client,
    user_id: &str,
    name: Option<String>,
) -> Result<DeviceCodeData, AppError> {
    let device_auth_url = config
        .device_auth_url
        .as_ref()
        .ok_or_else(|| AppError::Config(format!("provider '{}' has no device_auth_url configured", config.name)))?;

    let mut params = HashMap::new();
    params.insert("client_id".to_string(), config.client_id.clone());
    params.insert("scope".to_string(), config.scopes.join(" "));

    let code_verifier = if config.method.uses_pkce() {
        let pkce = generate_pkce_params();
        params.insert("code_challenge".to_string(), pkce.code_challenge);
        params.insert("code_challenge_method".to_string(), "S256".to_string());
        Some(pkce.code_verifier)
    } else {
        None
    };

    hooks.before_auth(&mut params);

    let response = http
        .post(device_auth_url)
        .form(&params)
        .send()
        .await
        .map_err(AppError::HttpRequest)?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(AppError::token_exchange_failed(status, body.len()));
    }

    let parsed: DeviceAuthorizationResponse = response.json().await.map_err(AppError::HttpRequest)?;

    Ok(DeviceCodeData {
        device_code: parsed.device_code,
        user_code: parsed.user_code,
        verification_uri: parsed.verification_uri,
        verification_uri_complete: parsed.verification_uri_complete,
        expires_in: parsed.expires_in,
        interval: parsed.interval.unwrap_or(DEFAULT_POLL_INTERVAL_SECONDS),
        code_verifier,
        user_id: user_id.to_string(),
        name,
    })
}

/// Polls the token endpoint at `data.interval` until success, a terminal
/// device-code error, or `POLL_CEILING_SECONDS` elapses.
pub async fn poll_for_token(
    config: &OAuthProviderConfig,
    hooks: &dyn ProviderHooks,
    data: &DeviceCodeData,
    http: &Client,
) -> Result<OAuthToken, AppError> {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(POLL_CEILING_SECONDS);
    let mut tick = Duration::from_secs(data.interval.max(1));

    loop {
        tokio::time::sleep(tick).await;

        if tokio::time::Instant::now() >= deadline {
            return Err(AppError::DeviceCode(DeviceCodeErrorKind::PollingTimeout));
        }

        let mut params = HashMap::new();
        params.insert("grant_type".to_string(), "urn:ietf:params:oauth:grant-type:device_code".to_string());
        params.insert("device_code".to_string(), data.device_code.clone());
        params.insert("client_id".to_string(), config.client_id.clone());
        if let Some(ref verifier) = data.code_verifier {
            params.insert("code_verifier".to_string(), verifier.clone());
        }

        let mut headers = config.custom_headers.clone();
        hooks.before_token(&mut params, &mut headers);

        let mut builder = http.post(&config.token_url);
        builder = match config.token_body_format {
            TokenBodyFormat::Form => builder.form(&params),
            TokenBodyFormat::Json => builder.json(&params),
        };
        for (key, value) in &headers {
            builder = builder.header(key, value);
        }

        let response = builder.send().await.map_err(AppError::HttpRequest)?;
        let status = response.status();

        if status.is_success() {
            let token_response: OAuthTokenResponse = response.json().await.map_err(AppError::HttpRequest)?;
            let now = Utc::now().timestamp();
            return Ok(token_response_to_oauth_token(token_response, &config.name, now));
        }

        let body = response.text().await.unwrap_or_default();
        let error_code = serde_json::from_str::<DeviceTokenErrorResponse>(&body).map(|e| e.error).unwrap_or_default();

        let kind = match error_code.as_str() {
            "authorization_pending" => {
                tick = Duration::from_secs(data.interval.max(1));
                continue;
            }
            "slow_down" => {
                tick += Duration::from_secs(DEFAULT_POLL_INTERVAL_SECONDS);
                continue;
            }
            "access_denied" => DeviceCodeErrorKind::AccessDenied,
            "expired_token" => DeviceCodeErrorKind::ExpiredToken,
            _ => return Err(AppError::token_exchange_failed(status, body.len())),
        };

        return Err(AppError::DeviceCode(kind));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OAuthMethod;
    use crate::oauth::hooks::NoopHooks;

    fn config(device_auth_url: Option<&str>) -> OAuthProviderConfig {
        OAuthProviderConfig {
            name: "test-device".to_string(),
            client_id: "client".to_string(),
            client_secret: None,
            auth_url: "https://example.com/authorize".to_string(),
            token_url: "https://example.com/token".to_string(),
            device_auth_url: device_auth_url.map(|s| s.to_string()),
            redirect_uri: "http://localhost:1455/callback".to_string(),
            method: OAuthMethod::DeviceCodePkce,
            token_body_format: TokenBodyFormat::Form,
            scopes: vec!["api".to_string()],
            custom_headers: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn initiate_without_device_auth_url_is_a_config_error() {
        let config = config(None);
        let http = Client::new();
        let err = initiate_device_code_flow(&config, &NoopHooks, &http, "u", None).await.unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[test]
    fn default_interval_is_five_seconds_when_server_omits_it() {
        let parsed: DeviceAuthorizationResponse = serde_json::from_str(
            r#"{"device_code":"dc","user_code":"ABCD-EFGH","verification_uri":"https://example.com/device","expires_in":600}"#,
        )
        .unwrap();
        assert_eq!(parsed.interval, None);
        assert_eq!(parsed.interval.unwrap_or(DEFAULT_POLL_INTERVAL_SECONDS), 5);
    }
}
