use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt;

/// Crate-wide error type. Every component returns `Result<_, AppError>` at its public
/// boundary so callers can match on a kind instead of re-parsing a string.
#[derive(Debug)]
pub enum AppError {
    /// Missing/empty required fields, unknown UUID/name, invalid config directory.
    Config(String),
    /// Malformed persisted document, unknown tactic discriminator.
    Schema(String),
    /// Empty active service set for a rule.
    Selection(String),
    /// Authentication error at the router boundary.
    Unauthorized(String),
    /// Model routing error (no matching rule / no enabled provider).
    ModelNotFound(String),
    /// Provider disabled or has no enabled instances.
    ProviderDisabled(String),
    /// Protocol conversion error.
    ConversionError(String),
    /// Upstream API error, preserving the upstream status code.
    UpstreamError { status: StatusCode, message: String },
    /// OAuth authorization-code/PKCE flow error.
    OAuth { kind: OAuthErrorKind, message: String },
    /// RFC 8628 device-code flow error.
    DeviceCode(DeviceCodeErrorKind),
    /// No healthy provider instances available.
    NoHealthyInstances(String),
    /// HTTP request error (preserves reqwest::Error for health/upstream-status detection).
    HttpRequest(reqwest::Error),
    /// sqlx error, used by the Stats Store and Template Registry cache.
    Database(sqlx::Error),
    /// Filesystem I/O error (config persistence, token store, model list).
    Io(std::io::Error),
    /// Internal/unexpected error.
    InternalError(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OAuthErrorKind {
    InvalidState,
    StateExpired,
    InvalidCode,
    TokenExchangeFailed,
    NoRefreshToken,
    ProviderNotConfigured,
    InvalidProvider,
    InvalidCallback,
    SessionNotFound,
    SessionExpired,
}

impl OAuthErrorKind {
    fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidState => "invalid_state",
            Self::StateExpired => "state_expired",
            Self::InvalidCode => "invalid_code",
            Self::TokenExchangeFailed => "token_exchange_failed",
            Self::NoRefreshToken => "no_refresh_token",
            Self::ProviderNotConfigured => "provider_not_configured",
            Self::InvalidProvider => "invalid_provider",
            Self::InvalidCallback => "invalid_callback",
            Self::SessionNotFound => "session_not_found",
            Self::SessionExpired => "session_expired",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceCodeErrorKind {
    AuthorizationPending,
    SlowDown,
    AccessDenied,
    ExpiredToken,
    PollingTimeout,
}

impl DeviceCodeErrorKind {
    fn as_str(&self) -> &'static str {
        match self {
            Self::AuthorizationPending => "authorization_pending",
            Self::SlowDown => "slow_down",
            Self::AccessDenied => "access_denied",
            Self::ExpiredToken => "expired_token",
            Self::PollingTimeout => "polling_timeout",
        }
    }

    /// Transient errors mean the poller should keep ticking; terminal errors end the flow.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::AuthorizationPending | Self::SlowDown)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "configuration error: {}", msg),
            Self::Schema(msg) => write!(f, "schema error: {}", msg),
            Self::Selection(msg) => write!(f, "selection error: {}", msg),
            Self::Unauthorized(msg) => write!(f, "unauthorized: {}", msg),
            Self::ModelNotFound(msg) => write!(f, "model not found: {}", msg),
            Self::ProviderDisabled(msg) => write!(f, "provider disabled: {}", msg),
            Self::ConversionError(msg) => write!(f, "conversion error: {}", msg),
            Self::UpstreamError { status, message } => {
                write!(f, "upstream error ({}): {}", status, message)
            }
            Self::OAuth { kind, message } => {
                write!(f, "oauth error ({}): {}", kind.as_str(), message)
            }
            Self::DeviceCode(kind) => write!(f, "device code error: {}", kind.as_str()),
            Self::NoHealthyInstances(msg) => write!(f, "no healthy instances: {}", msg),
            Self::HttpRequest(err) => write!(f, "http request error: {}", err),
            Self::Database(err) => write!(f, "database error: {}", err),
            Self::Io(err) => write!(f, "i/o error: {}", err),
            Self::InternalError(msg) => write!(f, "internal error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::HttpRequest(err) => Some(err),
            Self::Database(err) => Some(err),
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            Self::Config(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
            Self::Schema(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
            Self::Selection(msg) => (StatusCode::BAD_GATEWAY, msg.clone()),
            Self::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            Self::ModelNotFound(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            Self::ProviderDisabled(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg.clone()),
            Self::ConversionError(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            Self::UpstreamError { status, message } => (*status, message.clone()),
            Self::OAuth { message, .. } => (StatusCode::BAD_REQUEST, message.clone()),
            Self::DeviceCode(kind) => (StatusCode::BAD_REQUEST, kind.as_str().to_string()),
            Self::NoHealthyInstances(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg.clone()),
            Self::HttpRequest(err) => (StatusCode::BAD_GATEWAY, err.to_string()),
            Self::Database(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
            Self::Io(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
            Self::InternalError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        // Never echo Authorization headers or raw tokens into an error body.
        let body = Json(json!({
            "error": {
                "message": error_message,
                "type": error_type_name(&self),
            }
        }));

        (status, body).into_response()
    }
}

fn error_type_name(error: &AppError) -> &'static str {
    match error {
        AppError::Config(_) => "config_error",
        AppError::Schema(_) => "schema_error",
        AppError::Selection(_) => "selection_error",
        AppError::Unauthorized(_) => "unauthorized",
        AppError::ModelNotFound(_) => "model_not_found",
        AppError::ProviderDisabled(_) => "provider_disabled",
        AppError::ConversionError(_) => "conversion_error",
        AppError::UpstreamError { .. } => "upstream_error",
        AppError::OAuth { .. } => "oauth_error",
        AppError::DeviceCode(_) => "device_code_error",
        AppError::NoHealthyInstances(_) => "no_healthy_instances",
        AppError::HttpRequest(_) => "http_request_error",
        AppError::Database(_) => "database_error",
        AppError::Io(_) => "io_error",
        AppError::InternalError(_) => "internal_error",
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::InternalError(err.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        Self::HttpRequest(err)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::ConversionError(format!("JSON error: {}", err))
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database(err)
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl AppError {
    pub fn invalid_state() -> Self {
        Self::OAuth {
            kind: OAuthErrorKind::InvalidState,
            message: "state parameter not recognized".to_string(),
        }
    }

    pub fn state_expired() -> Self {
        Self::OAuth {
            kind: OAuthErrorKind::StateExpired,
            message: "authorization state has expired".to_string(),
        }
    }

    pub fn session_expired() -> Self {
        Self::OAuth {
            kind: OAuthErrorKind::SessionExpired,
            message: "authorization session has expired".to_string(),
        }
    }

    pub fn token_exchange_failed(status: StatusCode, body_len: usize) -> Self {
        Self::OAuth {
            kind: OAuthErrorKind::TokenExchangeFailed,
            message: format!("token endpoint returned {} ({} byte body)", status, body_len),
        }
    }
}
