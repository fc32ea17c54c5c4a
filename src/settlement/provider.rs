use crate::error::ProviderError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Fee estimate returned before settling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeQuote {
    pub rail: String,
    pub network: String,
    pub estimated_fee_atomic: i64,
    pub currency: String,
}

/// Result of submitting a settlement to the rail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementReceipt {
    pub settlement_reference: String,
    pub deposit_address: String,
    pub network: String,
    pub submitted_at: DateTime<Utc>,
}

/// Settlement state as reported by the rail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum SettlementStatus {
    Pending { confirmations: u32 },
    Confirmed,
    Error { message: String },
}

/// Interface to a settlement rail.
///
/// Fee computation, address derivation and finality policy all live behind
/// this seam; the worker and refresh path are written against the trait
/// only. An adapter is chosen once at configuration time, never per request.
#[async_trait]
pub trait SettlementProvider: Send + Sync {
    /// Rail network this adapter settles on (compared against refund rails
    /// and signing intents).
    fn network(&self) -> &str;

    /// Atomic units per whole currency unit on this rail.
    fn atomic_factor(&self) -> i64 {
        100_000_000
    }

    /// Fee estimate plus any metadata needed before settling.
    async fn quote(&self, amount: Decimal, currency: &str) -> Result<FeeQuote, ProviderError>;

    /// Rail-specific payout destination for a customer.
    async fn payout_address(&self, customer_id: &str) -> Result<String, ProviderError>;

    /// Perform (or stub) settlement and return the settlement reference.
    async fn settle(
        &self,
        refund_id: Uuid,
        amount_atomic: i64,
        currency: &str,
    ) -> Result<SettlementReceipt, ProviderError>;

    /// Settlement status by reference.
    async fn status(&self, settlement_reference: &str) -> Result<SettlementStatus, ProviderError>;
}

/// Closed set of supported provider adapters, resolved once at bootstrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Hosted,
    Stub,
}

impl std::str::FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hosted" => Ok(ProviderKind::Hosted),
            "stub" => Ok(ProviderKind::Stub),
            other => Err(format!("unknown settlement provider: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_provider_kind_parsing() {
        assert_eq!(ProviderKind::from_str("hosted").unwrap(), ProviderKind::Hosted);
        assert_eq!(ProviderKind::from_str("STUB").unwrap(), ProviderKind::Stub);
        assert!(ProviderKind::from_str("paypal").is_err());
    }

    #[test]
    fn test_status_wire_shape() {
        let pending = SettlementStatus::Pending { confirmations: 3 };
        assert_eq!(
            serde_json::to_value(&pending).unwrap(),
            serde_json::json!({ "state": "pending", "confirmations": 3 })
        );
        assert_eq!(
            serde_json::to_value(SettlementStatus::Confirmed).unwrap(),
            serde_json::json!({ "state": "confirmed" })
        );
    }
}
