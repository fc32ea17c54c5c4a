use super::mac::verify_mac;
use super::messages::{SignAudit, SignRequest, SignResponse, MAC_HEADER, POLICY_VERSION};
use crate::config::SignerConfig;
use crate::error::{AppError, ErrorResponse, PolicyViolation};
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::Utc;
use ed25519_dalek::{Signer, SigningKey};
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::num::NonZeroU32;
use std::sync::Arc;
use tracing::{info, warn};

/// Rejection from the signing gate. Auth and policy rejections carry
/// distinct reasons; none of them leak key material.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignerRejection {
    Auth,
    Policy(PolicyViolation),
    RateLimited,
}

impl IntoResponse for SignerRejection {
    fn into_response(self) -> Response {
        let (status, error_code, message, details) = match self {
            SignerRejection::Auth => (
                StatusCode::UNAUTHORIZED,
                "SIGNER_AUTH_FAILURE",
                "Invalid request authentication".to_string(),
                None,
            ),
            SignerRejection::Policy(violation) => (
                StatusCode::FORBIDDEN,
                "SIGNER_POLICY_VIOLATION",
                format!("Policy violation: {}", violation),
                Some(serde_json::json!({ "reason": violation.as_code() })),
            ),
            SignerRejection::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                "SIGNER_RATE_LIMITED",
                "Signing rate limit exceeded".to_string(),
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

/// State for the custody-isolated signer.
///
/// Holds the only copy of the signing key. The service never initiates
/// outbound calls, never retries, and keeps no per-request state beyond the
/// rate window: a pure request/response policy gate plus signing primitive.
#[derive(Clone)]
pub struct SignerState {
    shared_secret: Option<Arc<str>>,
    custody_address: Option<Arc<str>>,
    network: Arc<str>,
    amount_ceiling_atomic: i64,
    signing_key: Option<Arc<SigningKey>>,
    limiter: Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
}

impl SignerState {
    pub fn from_config(config: &SignerConfig) -> Result<Self, AppError> {
        let signing_key = match &config.private_key_b64 {
            Some(b64) => {
                let bytes = BASE64.decode(b64).map_err(|e| {
                    AppError::Config(format!("SIGNER_PRIVATE_KEY is not valid base64: {}", e))
                })?;
                let seed: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
                    AppError::Config("SIGNER_PRIVATE_KEY must decode to 32 bytes".to_string())
                })?;
                Some(Arc::new(SigningKey::from_bytes(&seed)))
            }
            None => None,
        };

        let per_minute = NonZeroU32::new(config.rate_limit_per_minute.max(1))
            .expect("clamped to at least one request per minute");

        Ok(Self {
            shared_secret: config.shared_secret.as_deref().map(Arc::from),
            custody_address: config.custody_address.as_deref().map(Arc::from),
            network: Arc::from(config.network.as_str()),
            amount_ceiling_atomic: config.amount_ceiling_atomic,
            signing_key,
            limiter: Arc::new(RateLimiter::direct(Quota::per_minute(per_minute))),
        })
    }
}

pub fn signer_app(state: SignerState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/sign", post(sign))
        .with_state(state)
}

async fn healthz() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// The signing gate. Checks run in a fixed order, each with its own
/// rejection reason: configuration, authentication, then the policy
/// envelope, then the rate ceiling.
async fn sign(
    State(state): State<SignerState>,
    headers: HeaderMap,
    Json(request): Json<SignRequest>,
) -> Result<Json<SignResponse>, SignerRejection> {
    let secret = state
        .shared_secret
        .as_deref()
        .ok_or(SignerRejection::Policy(PolicyViolation::SecretNotConfigured))?;

    let (custody_address, signing_key) = match (&state.custody_address, &state.signing_key) {
        (Some(address), Some(key)) => (address.as_ref(), key),
        _ => return Err(SignerRejection::Policy(PolicyViolation::CustodyNotConfigured)),
    };

    // Authentication: recompute the MAC over what was actually received.
    // Any tampered byte in the intent or payload fails here.
    let provided_mac = headers
        .get(MAC_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(SignerRejection::Auth)?;

    let unsigned_payload = BASE64
        .decode(&request.unsigned_tx_b64)
        .map_err(|_| SignerRejection::Auth)?;

    let canonical = request
        .intent
        .canonical_bytes(request.job_id, &unsigned_payload);
    if !verify_mac(secret, &canonical, provided_mac) {
        warn!(job_id = request.job_id, "signing request failed authentication");
        return Err(SignerRejection::Auth);
    }

    if request.intent.network != *state.network {
        return Err(SignerRejection::Policy(PolicyViolation::NetworkMismatch));
    }

    if request.intent.from_address != custody_address {
        return Err(SignerRejection::Policy(PolicyViolation::AddressMismatch));
    }

    if request.intent.amount_atomic > state.amount_ceiling_atomic {
        warn!(
            job_id = request.job_id,
            amount_atomic = request.intent.amount_atomic,
            ceiling = state.amount_ceiling_atomic,
            "signing request over amount ceiling"
        );
        return Err(SignerRejection::Policy(PolicyViolation::AmountOverCeiling));
    }

    // Bounds the replay window: a captured request dies with its intent.
    if request.intent.is_expired(Utc::now()) {
        return Err(SignerRejection::Policy(PolicyViolation::IntentExpired));
    }

    if state.limiter.check().is_err() {
        return Err(SignerRejection::RateLimited);
    }

    let signature = signing_key.sign(&unsigned_payload);

    let audit = SignAudit {
        job_id: request.job_id,
        refund_id: request.intent.refund_id,
        network: request.intent.network.clone(),
        amount_atomic: request.intent.amount_atomic,
        policy_version: POLICY_VERSION.to_string(),
        signed_at: Utc::now(),
    };

    info!(
        job_id = request.job_id,
        refund_id = %request.intent.refund_id,
        amount_atomic = request.intent.amount_atomic,
        "signed settlement payload"
    );

    Ok(Json(SignResponse {
        signed_tx_b64: BASE64.encode(signature.to_bytes()),
        audit,
    }))
}
