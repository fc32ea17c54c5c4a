use super::provider::SettlementProvider;
use crate::config::Config;
use crate::error::{AppError, AppResult, ProviderError, SignerError};
use crate::ledger::{EventType, LedgerRepository, Refund, RefundStatus};
use crate::queue::{JobQueue, SettlementJob};
use crate::signing::{SignerClient, TransactionIntent};
use chrono::{Duration as ChronoDuration, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// How a pipeline failure should be handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Retryable,
    Permanent,
}

/// Retry policy knobs, split out of `Config` so the classification logic is
/// testable without an environment.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    pub max_attempts: i32,
}

impl RetryPolicy {
    /// Exponential backoff: `base * 2^attempts`, capped. `attempts` is the
    /// count of failures before this one, so the first retry waits `base`.
    pub fn backoff_for(&self, attempts: i32) -> Duration {
        let exp = attempts.clamp(0, 30) as u32;
        let backoff = self
            .backoff_base
            .checked_mul(2u32.saturating_pow(exp))
            .unwrap_or(self.backoff_max);
        backoff.min(self.backoff_max)
    }

    /// Whether the failure now being recorded exhausts the attempt budget.
    pub fn exhausts_attempts(&self, attempts_before_failure: i32) -> bool {
        attempts_before_failure + 1 >= self.max_attempts
    }
}

/// Classify a pipeline failure. Deliberate signer refusals and rail
/// rejections of the payload must never be retried; everything transient
/// is retried with backoff until the attempt budget runs out.
pub fn classify_failure(error: &AppError) -> FailureKind {
    match error {
        AppError::Signer(SignerError::AuthFailure)
        | AppError::Signer(SignerError::PolicyViolation(_))
        | AppError::Provider(ProviderError::BroadcastRejected(_))
        | AppError::NotFound(_)
        | AppError::InvalidRequest(_)
        | AppError::UnsupportedRail(_)
        | AppError::InvalidTransition { .. }
        | AppError::Config(_) => FailureKind::Permanent,

        AppError::Signer(SignerError::RateLimited)
        | AppError::Signer(SignerError::Transport(_))
        | AppError::Provider(ProviderError::Unavailable(_))
        | AppError::Provider(ProviderError::Timeout)
        | AppError::Provider(ProviderError::Malformed(_))
        | AppError::Database(_)
        | AppError::Internal(_) => FailureKind::Retryable,
    }
}

/// Settlement worker: repeatedly claims one job and drives it through the
/// pipeline (intent, signature, submission, broadcast bookkeeping).
///
/// Replicas of this loop share nothing but the database; the atomic claim
/// is the only mutual exclusion in the system.
pub struct SettlementWorker {
    ledger: Arc<LedgerRepository>,
    queue: Arc<JobQueue>,
    provider: Arc<dyn SettlementProvider>,
    signer: SignerClient,
    retry: RetryPolicy,
    poll_interval: Duration,
    custody_address: String,
    intent_ttl: ChronoDuration,
}

impl SettlementWorker {
    pub fn new(
        config: &Config,
        ledger: Arc<LedgerRepository>,
        queue: Arc<JobQueue>,
        provider: Arc<dyn SettlementProvider>,
        signer: SignerClient,
    ) -> Self {
        Self {
            ledger,
            queue,
            provider,
            signer,
            retry: RetryPolicy {
                backoff_base: Duration::from_secs(config.retry_backoff_base_seconds),
                backoff_max: Duration::from_secs(config.retry_backoff_max_seconds),
                max_attempts: config.worker_max_attempts,
            },
            poll_interval: Duration::from_secs(config.worker_poll_seconds),
            custody_address: config.custody_address.clone(),
            intent_ttl: ChronoDuration::seconds(config.intent_ttl_seconds),
        }
    }

    /// Claim-and-process loop. Sleeps for the poll interval when the queue
    /// is empty; there is no busy spin.
    pub async fn run(&self) {
        info!("settlement worker started");
        loop {
            match self.queue.claim_next().await {
                Ok(Some(job)) => {
                    if let Err(e) = self.handle_claimed_job(&job).await {
                        // Bookkeeping itself failed; the job stays
                        // processing until the lease reaper returns it.
                        error!(job_id = job.job_id, error = %e, "failed to record job outcome");
                    }
                }
                Ok(None) => {
                    tokio::time::sleep(self.poll_interval).await;
                }
                Err(e) => {
                    error!(error = %e, "claim failed");
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }
    }

    /// Run one claimed job through the pipeline and record the outcome.
    pub async fn handle_claimed_job(&self, job: &SettlementJob) -> AppResult<()> {
        match self.process_job(job).await {
            Ok(()) => Ok(()),
            Err(e) => self.record_failure(job, e).await,
        }
    }

    async fn record_failure(&self, job: &SettlementJob, error: AppError) -> AppResult<()> {
        let reason = error.to_string();
        match classify_failure(&error) {
            FailureKind::Permanent => {
                self.queue
                    .mark_permanent_failure(job.job_id, job.refund_id, &reason)
                    .await
            }
            FailureKind::Retryable if self.retry.exhausts_attempts(job.attempts) => {
                let reason = format!(
                    "max attempts ({}) exhausted; last error: {}",
                    self.retry.max_attempts, reason
                );
                self.queue
                    .mark_permanent_failure(job.job_id, job.refund_id, &reason)
                    .await
            }
            FailureKind::Retryable => {
                let backoff = self.retry.backoff_for(job.attempts);
                self.queue
                    .mark_retryable(job.job_id, &reason, backoff)
                    .await?;
                Ok(())
            }
        }
    }

    async fn process_job(&self, job: &SettlementJob) -> AppResult<()> {
        let refund = self
            .ledger
            .get_refund(job.refund_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("refund {}", job.refund_id)))?;

        // A terminal refund has nothing left to settle; close the job out
        // instead of re-running the pipeline.
        if refund.status == RefundStatus::Settled {
            warn!(job_id = job.job_id, refund_id = %refund.refund_id, "refund already settled");
            return self.queue.mark_confirmed(job.job_id).await;
        }
        if refund.status == RefundStatus::Failed {
            return Err(AppError::InvalidRequest(
                "refund already failed; job is stale".to_string(),
            ));
        }

        let intent = self.build_intent(&refund).await?;
        let unsigned_payload = intent.unsigned_payload();

        let signed = self
            .signer
            .sign(job.job_id, &intent, &unsigned_payload)
            .await
            .map_err(AppError::Signer)?;

        self.ledger
            .record_event(
                refund.refund_id,
                EventType::Signed,
                serde_json::to_value(&signed.audit)
                    .map_err(|e| AppError::Internal(e.to_string()))?,
            )
            .await?;

        let quote = self
            .provider
            .quote(refund.amount, &refund.currency)
            .await
            .map_err(AppError::Provider)?;
        info!(
            job_id = job.job_id,
            refund_id = %refund.refund_id,
            estimated_fee_atomic = quote.estimated_fee_atomic,
            "settlement fee quoted"
        );

        let receipt = self
            .provider
            .settle(refund.refund_id, intent.amount_atomic, &refund.currency)
            .await
            .map_err(AppError::Provider)?;

        self.queue
            .mark_broadcast(job.job_id, refund.refund_id, &receipt.settlement_reference)
            .await?;

        info!(
            job_id = job.job_id,
            refund_id = %refund.refund_id,
            settlement_reference = %receipt.settlement_reference,
            "settlement broadcast"
        );
        Ok(())
    }

    async fn build_intent(&self, refund: &Refund) -> AppResult<TransactionIntent> {
        let to_address = self
            .provider
            .payout_address(&refund.customer_id)
            .await
            .map_err(AppError::Provider)?;

        let amount_atomic = to_atomic(refund.amount, self.provider.atomic_factor())?;

        Ok(TransactionIntent {
            refund_id: refund.refund_id,
            network: self.provider.network().to_string(),
            from_address: self.custody_address.clone(),
            to_address,
            amount_atomic,
            expires_at: Utc::now() + self.intent_ttl,
            idempotency_key: refund.idempotency_key.clone(),
        })
    }

    /// Periodic lease sweep returning crashed workers' jobs to the queue.
    pub async fn run_reaper(queue: Arc<JobQueue>, lease: Duration) {
        let sweep_every = Duration::from_secs((lease.as_secs() / 2).max(1));
        loop {
            tokio::time::sleep(sweep_every).await;
            if let Err(e) = queue.reap_stuck(lease).await {
                error!(error = %e, "lease sweep failed");
            }
        }
    }
}

/// Convert a decimal amount to the rail's smallest unit, exactly.
///
/// Settlement drift is not acceptable: any fractional remainder after
/// scaling is an error, not a rounding opportunity.
pub fn to_atomic(amount: Decimal, atomic_factor: i64) -> AppResult<i64> {
    let scaled = amount
        .checked_mul(Decimal::from(atomic_factor))
        .ok_or_else(|| AppError::InvalidRequest("amount overflow".to_string()))?;

    if scaled.fract() != Decimal::ZERO {
        return Err(AppError::InvalidRequest(format!(
            "amount {} does not scale exactly to atomic units",
            amount
        )));
    }

    scaled
        .to_i64()
        .filter(|v| *v > 0)
        .ok_or_else(|| AppError::InvalidRequest(format!("amount {} out of range", amount)))
}
