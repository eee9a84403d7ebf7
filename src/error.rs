//! Error types shared by the sync, reconciliation and upload flows.
//!
//! Every remote adapter maps its failures onto [`SiteError`] so callers can
//! apply one degrade policy regardless of which backend is configured.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::models::AssetClass;

#[derive(Debug, thiserror::Error)]
pub enum SiteError {
    #[error("service unreachable: {0}")]
    Unreachable(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Validation(String),

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("{0}")]
    Timeout(String),

    #[error("{} upload failed: {reason}", class.label())]
    RequiredAsset { class: AssetClass, reason: String },

    #[error("not signed in")]
    Unauthenticated,

    #[error("local storage error: {0}")]
    LocalStore(#[from] sled::Error),
}

impl SiteError {
    /// Network-ish failures that a later attempt might not hit.
    pub fn is_transient(&self) -> bool {
        matches!(self, SiteError::Unreachable(_) | SiteError::Timeout(_))
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            SiteError::Unreachable(_) => StatusCode::BAD_GATEWAY,
            SiteError::PermissionDenied(_) => StatusCode::FORBIDDEN,
            SiteError::NotFound(_) => StatusCode::NOT_FOUND,
            SiteError::Validation(_) | SiteError::UnsupportedFormat(_) => StatusCode::BAD_REQUEST,
            SiteError::Malformed(_) => StatusCode::BAD_GATEWAY,
            SiteError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            SiteError::RequiredAsset { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            SiteError::Unauthenticated => StatusCode::UNAUTHORIZED,
            SiteError::LocalStore(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<reqwest::Error> for SiteError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            SiteError::Timeout(format!("request timed out: {}", e))
        } else if e.is_decode() {
            SiteError::Malformed(e.to_string())
        } else {
            SiteError::Unreachable(e.to_string())
        }
    }
}

impl From<serde_json::Error> for SiteError {
    fn from(e: serde_json::Error) -> Self {
        SiteError::Malformed(e.to_string())
    }
}

impl IntoResponse for SiteError {
    fn into_response(self) -> Response {
        (self.status_code(), self.to_string()).into_response()
    }
}

/// Errors raised while reading configuration from the environment.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value {value:?} for {key}")]
    Invalid { key: &'static str, value: String },
}

pub type SiteResult<T> = Result<T, SiteError>;
