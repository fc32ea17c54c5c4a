use super::provider::{FeeQuote, SettlementProvider, SettlementReceipt, SettlementStatus};
use crate::error::ProviderError;
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use uuid::Uuid;

/// Deterministic in-process rail adapter for development and tests.
///
/// Produces realistic settlement references, charges a flat fee, and
/// reports every known reference as confirmed on the first status check.
pub struct StubRailProvider {
    network: String,
}

impl StubRailProvider {
    pub fn new(network: String) -> Self {
        Self { network }
    }
}

#[async_trait]
impl SettlementProvider for StubRailProvider {
    fn network(&self) -> &str {
        &self.network
    }

    async fn quote(&self, _amount: Decimal, currency: &str) -> Result<FeeQuote, ProviderError> {
        Ok(FeeQuote {
            rail: self.network.clone(),
            network: self.network.clone(),
            estimated_fee_atomic: 1,
            currency: currency.to_string(),
        })
    }

    async fn payout_address(&self, customer_id: &str) -> Result<String, ProviderError> {
        Ok(format!("{}:dev-{}", self.network, customer_id))
    }

    async fn settle(
        &self,
        _refund_id: Uuid,
        amount_atomic: i64,
        _currency: &str,
    ) -> Result<SettlementReceipt, ProviderError> {
        if amount_atomic <= 0 {
            return Err(ProviderError::BroadcastRejected(
                "non-positive settlement amount".to_string(),
            ));
        }

        Ok(SettlementReceipt {
            settlement_reference: format!("{}_{}", self.network, Uuid::new_v4().simple()),
            deposit_address: format!("{}:dev-demo-address", self.network),
            network: self.network.clone(),
            submitted_at: Utc::now(),
        })
    }

    async fn status(&self, settlement_reference: &str) -> Result<SettlementStatus, ProviderError> {
        if settlement_reference.starts_with(&format!("{}_", self.network)) {
            Ok(SettlementStatus::Confirmed)
        } else {
            Ok(SettlementStatus::Error {
                message: format!("unknown settlement reference: {}", settlement_reference),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn provider() -> StubRailProvider {
        StubRailProvider::new("kaspa".to_string())
    }

    #[tokio::test]
    async fn test_settle_produces_network_prefixed_reference() {
        let receipt = provider()
            .settle(Uuid::new_v4(), 1_000_000_000, "KAS")
            .await
            .unwrap();
        assert!(receipt.settlement_reference.starts_with("kaspa_"));
        assert_eq!(receipt.network, "kaspa");
    }

    #[tokio::test]
    async fn test_settle_rejects_non_positive_amount() {
        let err = provider().settle(Uuid::new_v4(), 0, "KAS").await.unwrap_err();
        assert!(matches!(err, ProviderError::BroadcastRejected(_)));
    }

    #[tokio::test]
    async fn test_status_confirms_known_references() {
        let p = provider();
        let receipt = p.settle(Uuid::new_v4(), 42, "KAS").await.unwrap();
        assert_eq!(
            p.status(&receipt.settlement_reference).await.unwrap(),
            SettlementStatus::Confirmed
        );
        assert!(matches!(
            p.status("bogus_ref").await.unwrap(),
            SettlementStatus::Error { .. }
        ));
    }

    #[tokio::test]
    async fn test_quote_carries_currency_through() {
        let quote = provider().quote(dec!(10.00), "KAS").await.unwrap();
        assert_eq!(quote.currency, "KAS");
        assert_eq!(quote.network, "kaspa");
    }
}
