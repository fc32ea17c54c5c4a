use super::intent::TransactionIntent;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Header carrying the request MAC.
pub const MAC_HEADER: &str = "x-signer-mac";

/// Version tag echoed in every audit record so policy changes are traceable
/// after the fact.
pub const POLICY_VERSION: &str = "1";

/// Body of a signing request. Authentication rides in the MAC header, not
/// in the body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignRequest {
    pub job_id: i64,
    pub intent: TransactionIntent,
    pub unsigned_tx_b64: String,
}

/// Successful signing response: the signature plus an audit record the
/// worker persists on the refund's event trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignResponse {
    pub signed_tx_b64: String,
    pub audit: SignAudit,
}

/// What the signer attests to having signed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignAudit {
    pub job_id: i64,
    pub refund_id: Uuid,
    pub network: String,
    pub amount_atomic: i64,
    pub policy_version: String,
    pub signed_at: DateTime<Utc>,
}
