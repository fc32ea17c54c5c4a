use crate::error::{AppError, AppResult};
use crate::ledger::{Refund, RefundStatus};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// API request from merchant/POS to initiate an instant refund.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct InstantRefundRequest {
    #[validate(length(min = 1, max = 128, message = "merchant_id is required"))]
    pub merchant_id: String,

    #[validate(length(min = 1, max = 128, message = "order_id is required"))]
    pub order_id: String,

    #[validate(length(min = 1, max = 128, message = "customer_id is required"))]
    pub customer_id: String,

    /// Exact-precision amount; floats are rejected at the type level.
    pub amount: Decimal,

    #[validate(length(min = 1, max = 16, message = "currency is required"))]
    pub currency: String,

    #[validate(length(min = 1, max = 32, message = "rail is required"))]
    pub rail: String,

    pub reason: Option<String>,

    /// Body-level idempotency key; the request header wins when both are
    /// present.
    pub idempotency_key: Option<String>,
}

/// API response returned after refund creation or lookup.
#[derive(Debug, Clone, Serialize)]
pub struct RefundReceipt {
    pub refund_id: Uuid,
    pub status: RefundStatus,
    pub merchant_id: String,
    pub order_id: String,
    pub customer_id: String,
    pub amount: String,
    pub currency: String,
    pub rail: String,
    pub created_at: DateTime<Utc>,
    pub receipt_message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settlement_reference: Option<String>,
}

impl RefundReceipt {
    pub fn from_refund(refund: Refund) -> Self {
        let receipt_message = receipt_message_for(refund.status).to_string();
        Self {
            refund_id: refund.refund_id,
            status: refund.status,
            merchant_id: refund.merchant_id,
            order_id: refund.order_id,
            customer_id: refund.customer_id,
            amount: format!("{:.2}", refund.amount),
            currency: refund.currency,
            rail: refund.rail,
            created_at: refund.created_at,
            receipt_message,
            settlement_reference: refund.settlement_reference,
        }
    }
}

fn receipt_message_for(status: RefundStatus) -> &'static str {
    match status {
        RefundStatus::Created => {
            "Refund approved and initiated instantly. Customer should see a pending \
             credit shortly; final settlement will confirm."
        }
        RefundStatus::PendingSettlement => "Refund initiated; settlement pending.",
        RefundStatus::Settled => "Refund settled successfully.",
        RefundStatus::Failed => "Refund failed; review settlement events.",
    }
}

/// Response from the refresh endpoint: how many refunds advanced to
/// `settled`. Individual failures are never reported here.
#[derive(Debug, Clone, Serialize)]
pub struct RefreshResponse {
    pub updated: u64,
}

/// Normalize a requested amount to two decimal places, rejecting anything
/// non-positive. Sub-cent precision rounds half-to-even, matching how the
/// receipt renders it.
pub fn normalize_amount(amount: Decimal) -> AppResult<Decimal> {
    if amount <= Decimal::ZERO {
        return Err(AppError::InvalidRequest(
            "amount must be positive".to_string(),
        ));
    }
    Ok(amount.round_dp(2))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_normalize_amount_two_decimal_places() {
        assert_eq!(normalize_amount(dec!(10)).unwrap(), dec!(10.00));
        assert_eq!(normalize_amount(dec!(10.005)).unwrap(), dec!(10.00));
        assert_eq!(normalize_amount(dec!(10.015)).unwrap(), dec!(10.02));
    }

    #[test]
    fn test_normalize_amount_rejects_non_positive() {
        assert!(normalize_amount(dec!(0)).is_err());
        assert!(normalize_amount(dec!(-5.00)).is_err());
    }

    #[test]
    fn test_amount_deserializes_from_string() {
        // Exact-precision wire format: amounts arrive as strings.
        let req: InstantRefundRequest = serde_json::from_value(serde_json::json!({
            "merchant_id": "M1",
            "order_id": "O1",
            "customer_id": "C1",
            "amount": "10.00",
            "currency": "KAS",
            "rail": "kaspa",
        }))
        .unwrap();
        assert_eq!(req.amount, dec!(10.00));
        assert!(req.idempotency_key.is_none());
    }

    #[test]
    fn test_validation_rejects_empty_ids() {
        let req = InstantRefundRequest {
            merchant_id: String::new(),
            order_id: "O1".to_string(),
            customer_id: "C1".to_string(),
            amount: dec!(10.00),
            currency: "KAS".to_string(),
            rail: "kaspa".to_string(),
            reason: None,
            idempotency_key: None,
        };
        assert!(req.validate().is_err());
    }
}
