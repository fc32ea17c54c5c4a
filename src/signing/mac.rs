//! Keyed message authentication for signing requests.
//!
//! The worker and signer share a secret out-of-band; every signing request
//! carries an HMAC-SHA256 over the canonical request bytes. There is no
//! session or bearer-token state on either side.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Compute the hex-encoded request MAC.
pub fn compute_mac(secret: &str, canonical: &[u8]) -> String {
    // HMAC-SHA256 accepts keys of any size per RFC 2104.
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC-SHA256 accepts any key size");
    mac.update(canonical);
    hex::encode(mac.finalize().into_bytes())
}

/// Verify a hex-encoded request MAC in constant time.
pub fn verify_mac(secret: &str, canonical: &[u8], provided_hex: &str) -> bool {
    let Ok(provided) = hex::decode(provided_hex) else {
        return false;
    };

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC-SHA256 accepts any key size");
    mac.update(canonical);
    mac.verify_slice(&provided).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mac_roundtrip() {
        let mac = compute_mac("secret", b"canonical request bytes");
        assert_eq!(mac.len(), 64); // SHA256 = 32 bytes = 64 hex chars
        assert!(verify_mac("secret", b"canonical request bytes", &mac));
    }

    #[test]
    fn test_mac_rejects_wrong_secret() {
        let mac = compute_mac("secret", b"payload");
        assert!(!verify_mac("other-secret", b"payload", &mac));
    }

    #[test]
    fn test_mac_rejects_tampered_bytes() {
        let mac = compute_mac("secret", b"payload");
        assert!(!verify_mac("secret", b"payloae", &mac));
    }

    #[test]
    fn test_mac_rejects_garbage_hex() {
        assert!(!verify_mac("secret", b"payload", "not-hex-at-all"));
        assert!(!verify_mac("secret", b"payload", ""));
    }
}
