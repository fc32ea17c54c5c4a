use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, Type};
use std::fmt;
use uuid::Uuid;

/// Settlement job state machine.
///
/// `queued -> processing -> {broadcast, failed_retryable, failed_permanent}`;
/// a `failed_retryable` job becomes claimable again once `next_run_at`
/// elapses; `broadcast` is advanced to `confirmed` by the refresh path only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[sqlx(type_name = "job_state", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Processing,
    Broadcast,
    Confirmed,
    FailedRetryable,
    FailedPermanent,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::Processing => "processing",
            JobState::Broadcast => "broadcast",
            JobState::Confirmed => "confirmed",
            JobState::FailedRetryable => "failed_retryable",
            JobState::FailedPermanent => "failed_permanent",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Confirmed | JobState::FailedPermanent)
    }

    pub fn is_claimable(&self) -> bool {
        matches!(self, JobState::Queued | JobState::FailedRetryable)
    }
}

/// One settlement attempt cycle for a refund, owned by the job queue.
///
/// A job in `processing` is held by exactly one worker; mutual exclusion
/// comes from the atomic claim, not from anything in this struct.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SettlementJob {
    pub job_id: i64,
    pub refund_id: Uuid,
    pub state: JobState,
    pub attempts: i32,
    pub next_run_at: DateTime<Utc>,
    pub locked_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claimable_states() {
        assert!(JobState::Queued.is_claimable());
        assert!(JobState::FailedRetryable.is_claimable());
        assert!(!JobState::Processing.is_claimable());
        assert!(!JobState::Broadcast.is_claimable());
        assert!(!JobState::FailedPermanent.is_claimable());
    }

    #[test]
    fn test_terminal_states() {
        assert!(JobState::Confirmed.is_terminal());
        assert!(JobState::FailedPermanent.is_terminal());
        assert!(!JobState::FailedRetryable.is_terminal());
        assert!(!JobState::Broadcast.is_terminal());
    }
}
