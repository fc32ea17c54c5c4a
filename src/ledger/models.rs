use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, Type};
use std::fmt;
use uuid::Uuid;

/// Refund lifecycle status.
///
/// Moves forward only: `created -> pending_settlement -> settled`, with
/// `failed` reachable from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[sqlx(type_name = "refund_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RefundStatus {
    Created,
    PendingSettlement,
    Settled,
    Failed,
}

impl fmt::Display for RefundStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl RefundStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefundStatus::Created => "created",
            RefundStatus::PendingSettlement => "pending_settlement",
            RefundStatus::Settled => "settled",
            RefundStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RefundStatus::Settled | RefundStatus::Failed)
    }

    /// The forward-only transition law. Same-state is not a legal transition
    /// here; the repository treats it as a no-op before consulting this.
    pub fn can_transition_to(&self, next: RefundStatus) -> bool {
        match (self, next) {
            (RefundStatus::Created, RefundStatus::PendingSettlement) => true,
            (RefundStatus::PendingSettlement, RefundStatus::Settled) => true,
            (current, RefundStatus::Failed) => !current.is_terminal(),
            _ => false,
        }
    }
}

/// Refund entity - one merchant refund attempt, owned by the ledger.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Refund {
    pub refund_id: Uuid,
    pub merchant_id: String,
    pub order_id: String,
    pub customer_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub rail: String,
    pub reason: Option<String>,
    pub idempotency_key: Option<String>,
    pub status: RefundStatus,
    pub settlement_reference: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Append-only audit trail row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SettlementEvent {
    pub id: i64,
    pub refund_id: Uuid,
    pub event_type: String,
    pub payload: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// Event types written to the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    Created,
    MarkedPending,
    Signed,
    Broadcast,
    Settled,
    Failed,
    Reclaimed,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Created => "CREATED",
            EventType::MarkedPending => "MARKED_PENDING",
            EventType::Signed => "SIGNED",
            EventType::Broadcast => "BROADCAST",
            EventType::Settled => "SETTLED",
            EventType::Failed => "FAILED",
            EventType::Reclaimed => "RECLAIMED",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_transitions_allowed() {
        assert!(RefundStatus::Created.can_transition_to(RefundStatus::PendingSettlement));
        assert!(RefundStatus::PendingSettlement.can_transition_to(RefundStatus::Settled));
    }

    #[test]
    fn test_failed_reachable_from_non_terminal() {
        assert!(RefundStatus::Created.can_transition_to(RefundStatus::Failed));
        assert!(RefundStatus::PendingSettlement.can_transition_to(RefundStatus::Failed));
        assert!(!RefundStatus::Settled.can_transition_to(RefundStatus::Failed));
        assert!(!RefundStatus::Failed.can_transition_to(RefundStatus::Failed));
    }

    #[test]
    fn test_backward_transitions_rejected() {
        assert!(!RefundStatus::PendingSettlement.can_transition_to(RefundStatus::Created));
        assert!(!RefundStatus::Settled.can_transition_to(RefundStatus::PendingSettlement));
        assert!(!RefundStatus::Created.can_transition_to(RefundStatus::Settled));
        assert!(!RefundStatus::Failed.can_transition_to(RefundStatus::Created));
    }

    #[test]
    fn test_status_wire_names() {
        assert_eq!(RefundStatus::PendingSettlement.as_str(), "pending_settlement");
        assert_eq!(
            serde_json::to_value(RefundStatus::PendingSettlement).unwrap(),
            serde_json::json!("pending_settlement")
        );
    }
}
