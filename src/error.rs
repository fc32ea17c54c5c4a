use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Top-level error type for the entire application
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Signer error: {0}")]
    Signer(#[from] SignerError),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Unsupported rail: {0}")]
    UnsupportedRail(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Errors crossing the signer trust boundary, as seen by the worker.
///
/// Auth and policy rejections are deliberate signer decisions and must never
/// be retried; rate limiting and transport faults are transient.
#[derive(Error, Debug)]
pub enum SignerError {
    #[error("Signer rejected authentication")]
    AuthFailure,

    #[error("Signer policy violation: {0}")]
    PolicyViolation(String),

    #[error("Signer rate limited")]
    RateLimited,

    #[error("Signer transport failure: {0}")]
    Transport(String),
}

/// Distinct policy rejection reasons, checked in order by the signer.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyViolation {
    #[error("shared secret not configured")]
    SecretNotConfigured,

    #[error("custody address not configured")]
    CustodyNotConfigured,

    #[error("network mismatch")]
    NetworkMismatch,

    #[error("from address does not match custody address")]
    AddressMismatch,

    #[error("amount exceeds ceiling")]
    AmountOverCeiling,

    #[error("intent expired")]
    IntentExpired,
}

impl PolicyViolation {
    pub fn as_code(&self) -> &'static str {
        match self {
            PolicyViolation::SecretNotConfigured => "SECRET_NOT_CONFIGURED",
            PolicyViolation::CustodyNotConfigured => "CUSTODY_NOT_CONFIGURED",
            PolicyViolation::NetworkMismatch => "NETWORK_MISMATCH",
            PolicyViolation::AddressMismatch => "ADDRESS_MISMATCH",
            PolicyViolation::AmountOverCeiling => "AMOUNT_OVER_CEILING",
            PolicyViolation::IntentExpired => "INTENT_EXPIRED",
        }
    }
}

/// Settlement provider errors
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    #[error("Provider request timed out")]
    Timeout,

    #[error("Broadcast rejected by rail: {0}")]
    BroadcastRejected(String),

    #[error("Unexpected provider response: {0}")]
    Malformed(String),
}

/// API error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, message, details) = match &self {
            AppError::InvalidRequest(msg) => (
                StatusCode::BAD_REQUEST,
                "INVALID_REQUEST",
                msg.clone(),
                None,
            ),
            AppError::UnsupportedRail(rail) => (
                StatusCode::BAD_REQUEST,
                "UNSUPPORTED_RAIL",
                format!("Rail is not supported: {}", rail),
                Some(serde_json::json!({ "rail": rail })),
            ),
            AppError::NotFound(what) => (
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                format!("Not found: {}", what),
                None,
            ),
            AppError::InvalidTransition { from, to } => (
                StatusCode::CONFLICT,
                "INVALID_TRANSITION",
                format!("Invalid state transition: {} -> {}", from, to),
                Some(serde_json::json!({ "from": from, "to": to })),
            ),
            AppError::Signer(SignerError::AuthFailure) => (
                StatusCode::UNAUTHORIZED,
                "SIGNER_AUTH_FAILURE",
                "Signer rejected authentication".to_string(),
                None,
            ),
            AppError::Signer(SignerError::PolicyViolation(reason)) => (
                StatusCode::FORBIDDEN,
                "SIGNER_POLICY_VIOLATION",
                format!("Signer policy violation: {}", reason),
                Some(serde_json::json!({ "reason": reason })),
            ),
            AppError::Signer(SignerError::RateLimited) => (
                StatusCode::TOO_MANY_REQUESTS,
                "SIGNER_RATE_LIMITED",
                "Signing rate limit exceeded".to_string(),
                None,
            ),
            AppError::Database(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "DATABASE_ERROR",
                "A database error occurred".to_string(),
                None,
            ),
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
                None,
            ),
        };

        let body = Json(ErrorResponse {
            error: message,
            error_code: error_code.to_string(),
            details,
        });

        (status, body).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        AppError::Internal(format!("Error converting: {:?}", error))
    }
}

impl From<rust_decimal::Error> for AppError {
    fn from(error: rust_decimal::Error) -> Self {
        AppError::InvalidRequest(format!("Decimal conversion error: {:?}", error))
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            ProviderError::Timeout
        } else {
            ProviderError::Unavailable(format!("HTTP request error: {}", error))
        }
    }
}

impl From<sqlx::migrate::MigrateError> for AppError {
    fn from(error: sqlx::migrate::MigrateError) -> Self {
        AppError::Internal(format!("Migration error: {:?}", error))
    }
}

/// Result type alias for the application
pub type AppResult<T> = Result<T, AppError>;
