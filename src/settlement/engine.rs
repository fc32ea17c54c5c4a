use super::provider::{SettlementProvider, SettlementStatus};
use crate::error::AppResult;
use crate::ledger::{LedgerRepository, RefundStatus};
use crate::queue::JobQueue;
use std::sync::Arc;
use tracing::{info, warn};

const REFRESH_BATCH_LIMIT: i64 = 50;

/// Refresh path: polls the rail for confirmation of broadcast settlements
/// and finalizes the ledger. Runs on demand (the refresh endpoint) and the
/// claim loop never touches it.
pub struct SettlementEngine {
    ledger: Arc<LedgerRepository>,
    queue: Arc<JobQueue>,
    provider: Arc<dyn SettlementProvider>,
}

impl SettlementEngine {
    pub fn new(
        ledger: Arc<LedgerRepository>,
        queue: Arc<JobQueue>,
        provider: Arc<dyn SettlementProvider>,
    ) -> Self {
        Self {
            ledger,
            queue,
            provider,
        }
    }

    /// Check pending refunds against the rail and advance those that have
    /// confirmed. Returns the number of refunds moved to `settled`.
    ///
    /// Status-check failures are transient by definition here: the refund
    /// stays pending and the next refresh tries again. Individual failures
    /// are never surfaced to the caller, only logged and recorded.
    pub async fn process_pending_refunds(&self) -> AppResult<u64> {
        let pending = self
            .ledger
            .list_pending_for_settlement(REFRESH_BATCH_LIMIT)
            .await?;

        let mut updated = 0u64;
        for refund in pending {
            // Refunds still in `created` are the worker's responsibility;
            // only broadcast settlements have anything to poll.
            if refund.status != RefundStatus::PendingSettlement {
                continue;
            }
            let Some(reference) = refund.settlement_reference.as_deref() else {
                continue;
            };

            match self.provider.status(reference).await {
                Ok(SettlementStatus::Confirmed) => {
                    self.ledger
                        .transition_state(refund.refund_id, RefundStatus::Settled, None)
                        .await?;
                    if let Some(job) = self.queue.broadcast_job_for_refund(refund.refund_id).await?
                    {
                        self.queue.mark_confirmed(job.job_id).await?;
                    }
                    info!(refund_id = %refund.refund_id, reference, "refund settled");
                    updated += 1;
                }
                Ok(SettlementStatus::Pending { confirmations }) => {
                    info!(
                        refund_id = %refund.refund_id,
                        reference,
                        confirmations,
                        "settlement still pending"
                    );
                }
                Ok(SettlementStatus::Error { message }) => {
                    warn!(refund_id = %refund.refund_id, reference, message = %message, "rail reported status error");
                }
                Err(e) => {
                    warn!(refund_id = %refund.refund_id, reference, error = %e, "status check failed");
                }
            }
        }

        Ok(updated)
    }
}
