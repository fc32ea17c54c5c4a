use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Short-lived value object describing exactly what the worker is asking
/// the signer to authorize. Never persisted; it exists for the duration of
/// one signing round-trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionIntent {
    pub refund_id: Uuid,
    pub network: String,
    pub from_address: String,
    pub to_address: String,
    pub amount_atomic: i64,
    pub expires_at: DateTime<Utc>,
    pub idempotency_key: Option<String>,
}

impl TransactionIntent {
    /// Canonical byte encoding of `(job_id, intent, unsigned_payload)`.
    ///
    /// This is the exact string the MAC authenticates on both sides of the
    /// trust boundary. Each field is length-prefixed (`len:value`) in a
    /// fixed order with the payload hex-encoded, so the encoding is
    /// injective: no field value can shift the boundary of the next one,
    /// and any altered byte anywhere in the request yields different
    /// canonical bytes. Expiry participates at whole-second resolution.
    pub fn canonical_bytes(&self, job_id: i64, unsigned_payload: &[u8]) -> Vec<u8> {
        let fields = [
            job_id.to_string(),
            self.refund_id.to_string(),
            self.network.clone(),
            self.from_address.clone(),
            self.to_address.clone(),
            self.amount_atomic.to_string(),
            self.expires_at.timestamp().to_string(),
            self.idempotency_key.clone().unwrap_or_default(),
            hex::encode(unsigned_payload),
        ];

        let mut out = Vec::new();
        for field in fields {
            out.extend_from_slice(field.len().to_string().as_bytes());
            out.push(b':');
            out.extend_from_slice(field.as_bytes());
        }
        out
    }

    /// Unsigned payload bytes handed to the signer.
    ///
    /// The rail-specific wire format belongs to the rail SDK; a stable JSON
    /// rendering of the intent stands in for it here.
    pub fn unsigned_payload(&self) -> Vec<u8> {
        format!(
            "{{\"refund_id\":\"{}\",\"network\":\"{}\",\"from\":\"{}\",\"to\":\"{}\",\"amount_atomic\":{}}}",
            self.refund_id, self.network, self.from_address, self.to_address, self.amount_atomic,
        )
        .into_bytes()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn intent() -> TransactionIntent {
        TransactionIntent {
            refund_id: Uuid::parse_str("6f9619ff-8b86-d011-b42d-00c04fc964ff").unwrap(),
            network: "kaspa".to_string(),
            from_address: "kaspa:custody".to_string(),
            to_address: "kaspa:payout".to_string(),
            amount_atomic: 1_000_000_000,
            expires_at: Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
            idempotency_key: Some("K1".to_string()),
        }
    }

    #[test]
    fn test_canonical_bytes_deterministic() {
        let payload = intent().unsigned_payload();
        assert_eq!(
            intent().canonical_bytes(7, &payload),
            intent().canonical_bytes(7, &payload)
        );
    }

    #[test]
    fn test_canonical_bytes_cover_every_field() {
        let base = intent();
        let payload = base.unsigned_payload();
        let reference = base.canonical_bytes(7, &payload);

        let mut tampered = base.clone();
        tampered.amount_atomic += 1;
        assert_ne!(tampered.canonical_bytes(7, &payload), reference);

        let mut tampered = base.clone();
        tampered.to_address = "kaspa:attacker".to_string();
        assert_ne!(tampered.canonical_bytes(7, &payload), reference);

        let mut tampered = base.clone();
        tampered.network = "kaspa-testnet".to_string();
        assert_ne!(tampered.canonical_bytes(7, &payload), reference);

        let mut tampered = base.clone();
        tampered.expires_at += chrono::Duration::seconds(1);
        assert_ne!(tampered.canonical_bytes(7, &payload), reference);

        let mut tampered = base.clone();
        tampered.idempotency_key = None;
        assert_ne!(tampered.canonical_bytes(7, &payload), reference);

        // Different job id, identical intent.
        assert_ne!(base.canonical_bytes(8, &payload), reference);

        // Any payload byte flip.
        let mut flipped = payload.clone();
        flipped[0] ^= 0x01;
        assert_ne!(base.canonical_bytes(7, &flipped), reference);
    }

    #[test]
    fn test_canonical_bytes_field_boundaries_unambiguous() {
        // A delimiter character inside one field must not collide with the
        // same bytes split across two fields.
        let payload = intent().unsigned_payload();

        let mut a = intent();
        a.from_address = "kaspa:custody\nkaspa:payout".to_string();
        a.to_address = "x".to_string();

        let mut b = intent();
        b.from_address = "kaspa:custody".to_string();
        b.to_address = "kaspa:payout\nx".to_string();

        assert_ne!(a.canonical_bytes(7, &payload), b.canonical_bytes(7, &payload));
    }

    #[test]
    fn test_expiry_check() {
        let i = intent();
        assert!(!i.is_expired(i.expires_at - chrono::Duration::seconds(1)));
        assert!(i.is_expired(i.expires_at));
        assert!(i.is_expired(i.expires_at + chrono::Duration::seconds(1)));
    }
}
