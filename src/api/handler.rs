use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use super::models::*;
use crate::{
    error::{AppError, AppResult},
    ledger::{LedgerRepository, NewRefund, SettlementEvent},
    queue::JobQueue,
    settlement::SettlementEngine,
};

/// Distinguished request header for the idempotency key; takes precedence
/// over the body field when both are present.
pub const IDEMPOTENCY_HEADER: &str = "idempotency-key";

/// Effective idempotency key for a create request: the distinguished header
/// wins over the body field; an unreadable header value falls back to the
/// body.
fn resolve_idempotency_key(headers: &HeaderMap, body_key: Option<String>) -> Option<String> {
    headers
        .get(IDEMPOTENCY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or(body_key)
}

#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<LedgerRepository>,
    pub queue: Arc<JobQueue>,
    pub engine: Arc<SettlementEngine>,
    pub rail_network: Arc<str>,
}

/// Create an instant refund (idempotent per merchant + key)
/// POST /v1/refunds/instant
pub async fn create_instant_refund(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<InstantRefundRequest>,
) -> AppResult<Json<RefundReceipt>> {
    request
        .validate()
        .map_err(|e| AppError::InvalidRequest(e.to_string()))?;

    if request.rail != *state.rail_network {
        return Err(AppError::UnsupportedRail(request.rail));
    }

    let amount = normalize_amount(request.amount)?;

    let idempotency_key = resolve_idempotency_key(&headers, request.idempotency_key);

    let (refund, created) = state
        .ledger
        .create_refund(
            NewRefund {
                merchant_id: request.merchant_id,
                order_id: request.order_id,
                customer_id: request.customer_id,
                amount,
                currency: request.currency,
                rail: request.rail,
                reason: request.reason,
                idempotency_key,
            },
            true,
        )
        .await?;

    if !created {
        info!(refund_id = %refund.refund_id, "idempotent replay, returning existing refund");
    }

    Ok(Json(RefundReceipt::from_refund(refund)))
}

/// Look up a refund by id
/// GET /v1/refunds/:refund_id
pub async fn get_refund(
    State(state): State<AppState>,
    Path(refund_id): Path<Uuid>,
) -> AppResult<Json<RefundReceipt>> {
    let refund = state
        .ledger
        .get_refund(refund_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("refund {}", refund_id)))?;

    Ok(Json(RefundReceipt::from_refund(refund)))
}

/// Audit trail for a refund, oldest first
/// GET /v1/refunds/:refund_id/events
pub async fn list_refund_events(
    State(state): State<AppState>,
    Path(refund_id): Path<Uuid>,
) -> AppResult<Json<Vec<SettlementEvent>>> {
    state
        .ledger
        .get_refund(refund_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("refund {}", refund_id)))?;

    Ok(Json(state.ledger.list_events(refund_id).await?))
}

/// Poll the rail for confirmations and finalize settled refunds
/// POST /v1/refunds/refresh
pub async fn refresh(State(state): State<AppState>) -> AppResult<Json<RefreshResponse>> {
    let updated = state.engine.process_pending_refunds().await?;
    Ok(Json(RefreshResponse { updated }))
}

/// Liveness probe
/// GET /health
pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_idempotency_header_wins_over_body() {
        let mut headers = HeaderMap::new();
        headers.insert(IDEMPOTENCY_HEADER, HeaderValue::from_static("K-header"));
        assert_eq!(
            resolve_idempotency_key(&headers, Some("K-body".to_string())),
            Some("K-header".to_string())
        );
    }

    #[test]
    fn test_idempotency_body_is_fallback() {
        let headers = HeaderMap::new();
        assert_eq!(
            resolve_idempotency_key(&headers, Some("K-body".to_string())),
            Some("K-body".to_string())
        );
    }

    #[test]
    fn test_idempotency_absent_everywhere() {
        assert_eq!(resolve_idempotency_key(&HeaderMap::new(), None), None);
    }

    #[test]
    fn test_idempotency_unreadable_header_falls_back_to_body() {
        let mut headers = HeaderMap::new();
        headers.insert(
            IDEMPOTENCY_HEADER,
            HeaderValue::from_bytes(&[0xff, 0xfe]).unwrap(),
        );
        assert_eq!(
            resolve_idempotency_key(&headers, Some("K-body".to_string())),
            Some("K-body".to_string())
        );
    }
}
