use super::models::*;
use crate::error::AppResult;
use crate::ledger::models::{EventType, RefundStatus};
use crate::ledger::repository::LedgerRepository;
use sqlx::{PgPool, Postgres, Transaction};
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

const JOB_COLUMNS: &str =
    "job_id, refund_id, state, attempts, next_run_at, locked_at, last_error, created_at, updated_at";

/// Diagnostic text on a job row is capped so a pathological error chain
/// cannot bloat the table.
const MAX_ERROR_LEN: usize = 2000;

/// Persistent settlement work queue.
///
/// Multiple worker replicas share this queue with no coordination beyond
/// `claim_next`; every mutation that also touches the owning refund happens
/// in a single transaction.
pub struct JobQueue {
    pub pool: PgPool,
}

impl JobQueue {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn enqueue(&self, refund_id: Uuid) -> AppResult<SettlementJob> {
        let mut tx = self.pool.begin().await?;
        let job = Self::enqueue_in_tx(&mut tx, refund_id).await?;
        tx.commit().await?;

        info!(job_id = job.job_id, refund_id = %refund_id, "settlement job enqueued");
        Ok(job)
    }

    pub(crate) async fn enqueue_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        refund_id: Uuid,
    ) -> AppResult<SettlementJob> {
        let job = sqlx::query_as::<_, SettlementJob>(&format!(
            r#"
            INSERT INTO settlement_jobs (refund_id, state, next_run_at)
            VALUES ($1, 'queued', NOW())
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(refund_id)
        .fetch_one(&mut **tx)
        .await?;

        Ok(job)
    }

    /// Atomically claim the single oldest eligible job, if any.
    ///
    /// `FOR UPDATE SKIP LOCKED` makes this safe under concurrent workers:
    /// the row lock taken by the select is held until the update commits,
    /// and other claimers skip the locked row instead of blocking on it.
    /// Exactly one caller can win a given job; everyone else sees `None` or
    /// a different row. This is the only concurrency primitive the system
    /// needs.
    pub async fn claim_next(&self) -> AppResult<Option<SettlementJob>> {
        let job = sqlx::query_as::<_, SettlementJob>(&format!(
            r#"
            WITH next_job AS (
                SELECT job_id
                FROM settlement_jobs
                WHERE state IN ('queued', 'failed_retryable')
                  AND next_run_at <= NOW()
                ORDER BY next_run_at ASC, job_id ASC
                FOR UPDATE SKIP LOCKED
                LIMIT 1
            )
            UPDATE settlement_jobs j
            SET state = 'processing',
                locked_at = NOW(),
                updated_at = NOW()
            FROM next_job
            WHERE j.job_id = next_job.job_id
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .fetch_optional(&self.pool)
        .await?;

        Ok(job)
    }

    /// Record a successful broadcast: job goes to `broadcast`, the owning
    /// refund to `pending_settlement` with its settlement reference. One
    /// transaction, so the two rows cannot diverge.
    pub async fn mark_broadcast(
        &self,
        job_id: i64,
        refund_id: Uuid,
        settlement_reference: &str,
    ) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            UPDATE settlement_jobs
            SET state = 'broadcast',
                locked_at = NULL,
                last_error = NULL,
                updated_at = NOW()
            WHERE job_id = $1
            "#,
        )
        .bind(job_id)
        .execute(&mut *tx)
        .await?;

        LedgerRepository::transition_in_tx(
            &mut tx,
            refund_id,
            RefundStatus::PendingSettlement,
            Some(settlement_reference),
        )
        .await?;

        LedgerRepository::record_event_in_tx(
            &mut tx,
            refund_id,
            EventType::Broadcast,
            serde_json::json!({
                "job_id": job_id,
                "settlement_reference": settlement_reference,
            }),
        )
        .await?;

        tx.commit().await?;

        info!(
            job_id,
            refund_id = %refund_id,
            settlement_reference,
            "job broadcast"
        );
        Ok(())
    }

    /// Record a transient failure: the job becomes claimable again once the
    /// caller-supplied backoff elapses. The backoff policy lives with the
    /// worker; this only stores the result.
    pub async fn mark_retryable(
        &self,
        job_id: i64,
        error: &str,
        backoff: Duration,
    ) -> AppResult<SettlementJob> {
        let job = sqlx::query_as::<_, SettlementJob>(&format!(
            r#"
            UPDATE settlement_jobs
            SET state = 'failed_retryable',
                attempts = attempts + 1,
                next_run_at = NOW() + make_interval(secs => $2),
                locked_at = NULL,
                last_error = $3,
                updated_at = NOW()
            WHERE job_id = $1
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(job_id)
        .bind(backoff.as_secs_f64())
        .bind(truncate_error(error))
        .fetch_one(&self.pool)
        .await?;

        warn!(
            job_id,
            attempts = job.attempts,
            backoff_seconds = backoff.as_secs(),
            error,
            "job failed, will retry"
        );
        Ok(job)
    }

    /// Terminal failure: the job can never be claimed again and the owning
    /// refund is failed, in one transaction.
    pub async fn mark_permanent_failure(
        &self,
        job_id: i64,
        refund_id: Uuid,
        reason: &str,
    ) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            UPDATE settlement_jobs
            SET state = 'failed_permanent',
                locked_at = NULL,
                last_error = $2,
                updated_at = NOW()
            WHERE job_id = $1
            "#,
        )
        .bind(job_id)
        .bind(truncate_error(reason))
        .execute(&mut *tx)
        .await?;

        LedgerRepository::transition_in_tx(&mut tx, refund_id, RefundStatus::Failed, None).await?;

        tx.commit().await?;

        warn!(job_id, refund_id = %refund_id, reason, "job failed permanently");
        Ok(())
    }

    /// Advance a broadcast job once the rail confirms it. Driven by the
    /// refresh path, never by the claim loop.
    pub async fn mark_confirmed(&self, job_id: i64) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE settlement_jobs
            SET state = 'confirmed',
                updated_at = NOW()
            WHERE job_id = $1 AND state = 'broadcast'
            "#,
        )
        .bind(job_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Return jobs whose worker died mid-processing to the queue.
    ///
    /// A crashed worker leaves `processing` with a stale `locked_at`; once
    /// the lease expires the job is claimable again. The attempt counter is
    /// bumped so a payload that keeps killing workers still runs into the
    /// max-attempts ceiling.
    pub async fn reap_stuck(&self, lease: Duration) -> AppResult<u64> {
        let mut tx = self.pool.begin().await?;

        let reclaimed = sqlx::query_as::<_, SettlementJob>(&format!(
            r#"
            UPDATE settlement_jobs
            SET state = 'queued',
                attempts = attempts + 1,
                locked_at = NULL,
                last_error = 'reclaimed: processing lease expired',
                updated_at = NOW()
            WHERE state = 'processing'
              AND locked_at < NOW() - make_interval(secs => $1)
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(lease.as_secs_f64())
        .fetch_all(&mut *tx)
        .await?;

        for job in &reclaimed {
            LedgerRepository::record_event_in_tx(
                &mut tx,
                job.refund_id,
                EventType::Reclaimed,
                serde_json::json!({ "job_id": job.job_id, "attempts": job.attempts }),
            )
            .await?;
        }

        tx.commit().await?;

        let count = reclaimed.len() as u64;
        if count > 0 {
            warn!(reclaimed = count, "reclaimed stuck settlement jobs");
        }
        Ok(count)
    }

    pub async fn get_job(&self, job_id: i64) -> AppResult<Option<SettlementJob>> {
        let job = sqlx::query_as::<_, SettlementJob>(&format!(
            "SELECT {JOB_COLUMNS} FROM settlement_jobs WHERE job_id = $1"
        ))
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(job)
    }

    /// Most recent job for a refund, for diagnostics.
    pub async fn job_for_refund(&self, refund_id: Uuid) -> AppResult<Option<SettlementJob>> {
        let job = sqlx::query_as::<_, SettlementJob>(&format!(
            r#"
            SELECT {JOB_COLUMNS} FROM settlement_jobs
            WHERE refund_id = $1
            ORDER BY job_id DESC
            LIMIT 1
            "#
        ))
        .bind(refund_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(job)
    }

    /// Broadcast jobs for refunds awaiting confirmation, used by the
    /// refresh path to close out the cycle.
    pub async fn broadcast_job_for_refund(
        &self,
        refund_id: Uuid,
    ) -> AppResult<Option<SettlementJob>> {
        let job = sqlx::query_as::<_, SettlementJob>(&format!(
            r#"
            SELECT {JOB_COLUMNS} FROM settlement_jobs
            WHERE refund_id = $1 AND state = 'broadcast'
            ORDER BY job_id DESC
            LIMIT 1
            "#
        ))
        .bind(refund_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(job)
    }
}

fn truncate_error(error: &str) -> String {
    if error.len() <= MAX_ERROR_LEN {
        return error.to_string();
    }
    // Cut on a char boundary; error text is diagnostic only.
    let mut end = MAX_ERROR_LEN;
    while !error.is_char_boundary(end) {
        end -= 1;
    }
    error[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_error_short_text_unchanged() {
        assert_eq!(truncate_error("boom"), "boom");
    }

    #[test]
    fn test_truncate_error_caps_length() {
        let long = "x".repeat(MAX_ERROR_LEN + 500);
        assert_eq!(truncate_error(&long).len(), MAX_ERROR_LEN);
    }

    #[test]
    fn test_truncate_error_respects_char_boundaries() {
        let long = "é".repeat(MAX_ERROR_LEN);
        let truncated = truncate_error(&long);
        assert!(truncated.len() <= MAX_ERROR_LEN);
        assert!(truncated.chars().all(|c| c == 'é'));
    }
}
