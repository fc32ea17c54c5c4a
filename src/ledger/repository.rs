use super::models::*;
use crate::error::{AppError, AppResult};
use crate::queue::JobQueue;
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::info;
use uuid::Uuid;

const REFUND_COLUMNS: &str = "refund_id, merchant_id, order_id, customer_id, amount, currency, \
     rail, reason, idempotency_key, status, settlement_reference, created_at, updated_at";

/// Parameters for a refund creation attempt.
#[derive(Debug, Clone)]
pub struct NewRefund {
    pub merchant_id: String,
    pub order_id: String,
    pub customer_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub rail: String,
    pub reason: Option<String>,
    pub idempotency_key: Option<String>,
}

/// Ledger repository - the source of truth for refunds and their audit trail.
pub struct LedgerRepository {
    pub pool: PgPool,
}

impl LedgerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn begin_tx(&self) -> AppResult<Transaction<'static, Postgres>> {
        Ok(self.pool.begin().await?)
    }

    /// Create a refund, or return the existing row when the idempotency key
    /// has been seen before for this merchant.
    ///
    /// The partial unique index on `(merchant_id, idempotency_key)` resolves
    /// concurrent identical requests: the insert uses `ON CONFLICT DO
    /// NOTHING` and the loser of the race re-selects the winner's row. An
    /// idempotent replay emits no event and enqueues no job.
    ///
    /// Returns the row plus whether it was newly created.
    pub async fn create_refund(
        &self,
        new: NewRefund,
        enqueue_settlement: bool,
    ) -> AppResult<(Refund, bool)> {
        let mut tx = self.pool.begin().await?;

        let refund_id = Uuid::new_v4();
        let inserted = sqlx::query_as::<_, Refund>(&format!(
            r#"
            INSERT INTO refunds (
                refund_id, merchant_id, order_id, customer_id, amount,
                currency, rail, reason, idempotency_key
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (merchant_id, idempotency_key) WHERE idempotency_key IS NOT NULL
            DO NOTHING
            RETURNING {REFUND_COLUMNS}
            "#
        ))
        .bind(refund_id)
        .bind(&new.merchant_id)
        .bind(&new.order_id)
        .bind(&new.customer_id)
        .bind(new.amount)
        .bind(&new.currency)
        .bind(&new.rail)
        .bind(&new.reason)
        .bind(&new.idempotency_key)
        .fetch_optional(&mut *tx)
        .await?;

        let refund = match inserted {
            Some(refund) => refund,
            None => {
                // Lost the race (or a replay): hand back the original row
                // untouched. No event, no job.
                tx.rollback().await?;

                let key = new
                    .idempotency_key
                    .as_deref()
                    .ok_or_else(|| AppError::Internal("insert returned no row".to_string()))?;
                let existing = self.find_by_idempotency_key(&new.merchant_id, key).await?;
                return existing
                    .map(|refund| (refund, false))
                    .ok_or_else(|| AppError::Internal("idempotency row vanished".to_string()));
            }
        };

        Self::record_event_in_tx(
            &mut tx,
            refund.refund_id,
            EventType::Created,
            serde_json::json!({ "note": "refund created" }),
        )
        .await?;

        if enqueue_settlement {
            JobQueue::enqueue_in_tx(&mut tx, refund.refund_id).await?;
        }

        tx.commit().await?;

        info!(refund_id = %refund.refund_id, merchant_id = %refund.merchant_id, "refund created");
        Ok((refund, true))
    }

    pub async fn get_refund(&self, refund_id: Uuid) -> AppResult<Option<Refund>> {
        let refund = sqlx::query_as::<_, Refund>(&format!(
            "SELECT {REFUND_COLUMNS} FROM refunds WHERE refund_id = $1"
        ))
        .bind(refund_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(refund)
    }

    async fn find_by_idempotency_key(
        &self,
        merchant_id: &str,
        idempotency_key: &str,
    ) -> AppResult<Option<Refund>> {
        let refund = sqlx::query_as::<_, Refund>(&format!(
            r#"
            SELECT {REFUND_COLUMNS} FROM refunds
            WHERE merchant_id = $1 AND idempotency_key = $2
            LIMIT 1
            "#
        ))
        .bind(merchant_id)
        .bind(idempotency_key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(refund)
    }

    /// Refunds still awaiting settlement, oldest first. Used by the refresh
    /// path only; the worker claims work through the job queue.
    pub async fn list_pending_for_settlement(&self, limit: i64) -> AppResult<Vec<Refund>> {
        let refunds = sqlx::query_as::<_, Refund>(&format!(
            r#"
            SELECT {REFUND_COLUMNS} FROM refunds
            WHERE status IN ('created', 'pending_settlement')
            ORDER BY created_at ASC
            LIMIT $1
            "#
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(refunds)
    }

    /// Advance a refund along the forward-only lifecycle, appending an audit
    /// event. Transitioning to the current state is a no-op; anything not
    /// permitted by the transition law is an `InvalidTransition` error.
    pub async fn transition_state(
        &self,
        refund_id: Uuid,
        new_state: RefundStatus,
        settlement_reference: Option<&str>,
    ) -> AppResult<Refund> {
        let mut tx = self.pool.begin().await?;
        let refund =
            Self::transition_in_tx(&mut tx, refund_id, new_state, settlement_reference).await?;
        tx.commit().await?;
        Ok(refund)
    }

    /// Transaction-scoped transition, shared with the job queue so that job
    /// and refund state never diverge.
    pub(crate) async fn transition_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        refund_id: Uuid,
        new_state: RefundStatus,
        settlement_reference: Option<&str>,
    ) -> AppResult<Refund> {
        let current = sqlx::query_as::<_, Refund>(&format!(
            "SELECT {REFUND_COLUMNS} FROM refunds WHERE refund_id = $1 FOR UPDATE"
        ))
        .bind(refund_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("refund {}", refund_id)))?;

        if current.status == new_state {
            return Ok(current);
        }

        if !current.status.can_transition_to(new_state) {
            return Err(AppError::InvalidTransition {
                from: current.status.to_string(),
                to: new_state.to_string(),
            });
        }

        let refund = sqlx::query_as::<_, Refund>(&format!(
            r#"
            UPDATE refunds
            SET status = $2,
                settlement_reference = COALESCE($3, settlement_reference),
                updated_at = NOW()
            WHERE refund_id = $1
            RETURNING {REFUND_COLUMNS}
            "#
        ))
        .bind(refund_id)
        .bind(new_state)
        .bind(settlement_reference)
        .fetch_one(&mut **tx)
        .await?;

        let event_type = match new_state {
            RefundStatus::PendingSettlement => EventType::MarkedPending,
            RefundStatus::Settled => EventType::Settled,
            RefundStatus::Failed => EventType::Failed,
            RefundStatus::Created => EventType::Created,
        };
        Self::record_event_in_tx(
            tx,
            refund_id,
            event_type,
            serde_json::json!({
                "from": current.status.as_str(),
                "to": new_state.as_str(),
                "settlement_reference": settlement_reference,
            }),
        )
        .await?;

        Ok(refund)
    }

    pub async fn record_event(
        &self,
        refund_id: Uuid,
        event_type: EventType,
        payload: serde_json::Value,
    ) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;
        Self::record_event_in_tx(&mut tx, refund_id, event_type, payload).await?;
        tx.commit().await?;
        Ok(())
    }

    pub(crate) async fn record_event_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        refund_id: Uuid,
        event_type: EventType,
        payload: serde_json::Value,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO settlement_events (refund_id, event_type, payload)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(refund_id)
        .bind(event_type.as_str())
        .bind(payload)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    /// Full audit trail for one refund, oldest first.
    pub async fn list_events(&self, refund_id: Uuid) -> AppResult<Vec<SettlementEvent>> {
        let events = sqlx::query_as::<_, SettlementEvent>(
            r#"
            SELECT id, refund_id, event_type, payload, created_at
            FROM settlement_events
            WHERE refund_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(refund_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(events)
    }
}
