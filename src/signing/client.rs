use super::intent::TransactionIntent;
use super::mac::compute_mac;
use super::messages::{SignRequest, SignResponse, MAC_HEADER};
use crate::error::SignerError;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

const SIGN_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct RejectionBody {
    #[serde(default)]
    error: String,
    #[serde(default)]
    details: Option<serde_json::Value>,
}

/// Worker-side client for the delegated signing protocol.
///
/// Computes the request MAC over the canonical bytes and classifies signer
/// rejections so the worker can tell permanent refusals from transient
/// faults. A timeout is indistinguishable from any other transport error.
pub struct SignerClient {
    client: reqwest::Client,
    url: String,
    shared_secret: Option<String>,
}

impl SignerClient {
    pub fn new(url: String, shared_secret: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
            shared_secret,
        }
    }

    pub async fn sign(
        &self,
        job_id: i64,
        intent: &TransactionIntent,
        unsigned_payload: &[u8],
    ) -> Result<SignResponse, SignerError> {
        let secret = self.shared_secret.as_deref().ok_or_else(|| {
            SignerError::PolicyViolation("shared secret not configured".to_string())
        })?;

        let mac = compute_mac(secret, &intent.canonical_bytes(job_id, unsigned_payload));
        let request = SignRequest {
            job_id,
            intent: intent.clone(),
            unsigned_tx_b64: BASE64.encode(unsigned_payload),
        };

        debug!(job_id, refund_id = %intent.refund_id, "requesting signature");

        let resp = self
            .client
            .post(&self.url)
            .header(MAC_HEADER, mac)
            .json(&request)
            .timeout(SIGN_TIMEOUT)
            .send()
            .await
            .map_err(|e| SignerError::Transport(e.to_string()))?;

        match resp.status() {
            StatusCode::OK => resp
                .json::<SignResponse>()
                .await
                .map_err(|e| SignerError::Transport(format!("malformed sign response: {}", e))),
            StatusCode::UNAUTHORIZED => Err(SignerError::AuthFailure),
            StatusCode::FORBIDDEN => {
                let reason = resp
                    .json::<RejectionBody>()
                    .await
                    .ok()
                    .map(|body| {
                        body.details
                            .as_ref()
                            .and_then(|d| d.get("reason"))
                            .and_then(|r| r.as_str())
                            .map(str::to_string)
                            .unwrap_or(body.error)
                    })
                    .unwrap_or_else(|| "policy violation".to_string());
                Err(SignerError::PolicyViolation(reason))
            }
            StatusCode::TOO_MANY_REQUESTS => Err(SignerError::RateLimited),
            other => Err(SignerError::Transport(format!(
                "signer returned unexpected status {}",
                other
            ))),
        }
    }
}
