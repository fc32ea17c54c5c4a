//! End-to-end tests for the delegated signer service: authentication,
//! policy gate ordering, rate limiting, and signature validity.

use axum_test::TestServer;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{Duration, Utc};
use ed25519_dalek::{Signature, SigningKey, Verifier};
use uuid::Uuid;

use instant_refund::config::SignerConfig;
use instant_refund::signing::mac::compute_mac;
use instant_refund::signing::{
    signer_app, SignRequest, SignResponse, SignerState, TransactionIntent, MAC_HEADER,
    POLICY_VERSION,
};

const SECRET: &str = "test-shared-secret";
const CUSTODY: &str = "kaspa:test-custody";
const SEED: [u8; 32] = [7u8; 32];

fn test_config() -> SignerConfig {
    SignerConfig {
        bind_address: "127.0.0.1:0".to_string(),
        shared_secret: Some(SECRET.to_string()),
        custody_address: Some(CUSTODY.to_string()),
        network: "kaspa".to_string(),
        amount_ceiling_atomic: 10_000_000_000,
        rate_limit_per_minute: 60,
        private_key_b64: Some(BASE64.encode(SEED)),
    }
}

fn test_server(config: &SignerConfig) -> TestServer {
    let state = SignerState::from_config(config).expect("signer state");
    TestServer::new(signer_app(state)).expect("test server")
}

fn test_intent() -> TransactionIntent {
    TransactionIntent {
        refund_id: Uuid::new_v4(),
        network: "kaspa".to_string(),
        from_address: CUSTODY.to_string(),
        to_address: "kaspa:payout-1".to_string(),
        amount_atomic: 1_000_000_000,
        expires_at: Utc::now() + Duration::seconds(120),
        idempotency_key: Some("order-1-refund".to_string()),
    }
}

fn signed_request(job_id: i64, intent: &TransactionIntent) -> (SignRequest, String) {
    let payload = intent.unsigned_payload();
    let mac = compute_mac(SECRET, &intent.canonical_bytes(job_id, &payload));
    let request = SignRequest {
        job_id,
        intent: intent.clone(),
        unsigned_tx_b64: BASE64.encode(&payload),
    };
    (request, mac)
}

fn reason_of(body: &serde_json::Value) -> &str {
    body["details"]["reason"].as_str().unwrap_or_default()
}

#[tokio::test]
async fn test_sign_happy_path_returns_verifiable_signature() {
    let server = test_server(&test_config());
    let intent = test_intent();
    let (request, mac) = signed_request(42, &intent);

    let response = server
        .post("/sign")
        .add_header(MAC_HEADER, &mac)
        .json(&request)
        .await;
    response.assert_status_ok();

    let body: SignResponse = response.json();
    assert_eq!(body.audit.job_id, 42);
    assert_eq!(body.audit.refund_id, intent.refund_id);
    assert_eq!(body.audit.amount_atomic, intent.amount_atomic);
    assert_eq!(body.audit.policy_version, POLICY_VERSION);

    // The signature must verify against the configured key over exactly the
    // unsigned payload bytes.
    let sig_bytes = BASE64.decode(&body.signed_tx_b64).expect("b64 signature");
    let signature = Signature::from_slice(&sig_bytes).expect("signature bytes");
    let verifying_key = SigningKey::from_bytes(&SEED).verifying_key();
    assert!(verifying_key
        .verify(&intent.unsigned_payload(), &signature)
        .is_ok());
}

#[tokio::test]
async fn test_missing_mac_header_is_unauthorized() {
    let server = test_server(&test_config());
    let (request, _mac) = signed_request(1, &test_intent());

    let response = server.post("/sign").json(&request).await;
    response.assert_status_unauthorized();
}

#[tokio::test]
async fn test_wrong_secret_is_unauthorized() {
    let server = test_server(&test_config());
    let intent = test_intent();
    let payload = intent.unsigned_payload();
    let mac = compute_mac("some-other-secret", &intent.canonical_bytes(1, &payload));
    let request = SignRequest {
        job_id: 1,
        intent,
        unsigned_tx_b64: BASE64.encode(&payload),
    };

    let response = server
        .post("/sign")
        .add_header(MAC_HEADER, &mac)
        .json(&request)
        .await;
    response.assert_status_unauthorized();
}

#[tokio::test]
async fn test_tampered_intent_is_unauthorized() {
    let server = test_server(&test_config());
    let intent = test_intent();
    let (mut request, mac) = signed_request(1, &intent);

    // MAC was computed before the amount changed.
    request.intent.amount_atomic += 1;

    let response = server
        .post("/sign")
        .add_header(MAC_HEADER, &mac)
        .json(&request)
        .await;
    response.assert_status_unauthorized();
}

#[tokio::test]
async fn test_tampered_payload_is_unauthorized() {
    let server = test_server(&test_config());
    let intent = test_intent();
    let (mut request, mac) = signed_request(1, &intent);

    let mut payload = intent.unsigned_payload();
    payload[0] ^= 0x01;
    request.unsigned_tx_b64 = BASE64.encode(&payload);

    let response = server
        .post("/sign")
        .add_header(MAC_HEADER, &mac)
        .json(&request)
        .await;
    response.assert_status_unauthorized();
}

#[tokio::test]
async fn test_network_mismatch_is_forbidden() {
    let server = test_server(&test_config());
    let mut intent = test_intent();
    intent.network = "kaspa-testnet".to_string();
    let (request, mac) = signed_request(1, &intent);

    let response = server
        .post("/sign")
        .add_header(MAC_HEADER, &mac)
        .json(&request)
        .await;
    response.assert_status_forbidden();
    assert_eq!(reason_of(&response.json()), "NETWORK_MISMATCH");
}

#[tokio::test]
async fn test_foreign_from_address_is_forbidden() {
    let server = test_server(&test_config());
    let mut intent = test_intent();
    intent.from_address = "kaspa:not-custody".to_string();
    let (request, mac) = signed_request(1, &intent);

    let response = server
        .post("/sign")
        .add_header(MAC_HEADER, &mac)
        .json(&request)
        .await;
    response.assert_status_forbidden();
    assert_eq!(reason_of(&response.json()), "ADDRESS_MISMATCH");
}

#[tokio::test]
async fn test_amount_over_ceiling_is_forbidden() {
    let mut config = test_config();
    config.amount_ceiling_atomic = 500;
    let server = test_server(&config);

    let mut intent = test_intent();
    intent.amount_atomic = 501;
    let (request, mac) = signed_request(1, &intent);

    let response = server
        .post("/sign")
        .add_header(MAC_HEADER, &mac)
        .json(&request)
        .await;
    response.assert_status_forbidden();
    assert_eq!(reason_of(&response.json()), "AMOUNT_OVER_CEILING");
}

#[tokio::test]
async fn test_expired_intent_is_forbidden() {
    let server = test_server(&test_config());
    let mut intent = test_intent();
    intent.expires_at = Utc::now() - Duration::seconds(1);
    let (request, mac) = signed_request(1, &intent);

    let response = server
        .post("/sign")
        .add_header(MAC_HEADER, &mac)
        .json(&request)
        .await;
    response.assert_status_forbidden();
    assert_eq!(reason_of(&response.json()), "INTENT_EXPIRED");
}

#[tokio::test]
async fn test_missing_shared_secret_refuses_to_sign() {
    let mut config = test_config();
    config.shared_secret = None;
    let server = test_server(&config);
    let (request, mac) = signed_request(1, &test_intent());

    let response = server
        .post("/sign")
        .add_header(MAC_HEADER, &mac)
        .json(&request)
        .await;
    response.assert_status_forbidden();
    assert_eq!(reason_of(&response.json()), "SECRET_NOT_CONFIGURED");
}

#[tokio::test]
async fn test_missing_custody_config_refuses_to_sign() {
    let mut config = test_config();
    config.private_key_b64 = None;
    let server = test_server(&config);
    let (request, mac) = signed_request(1, &test_intent());

    let response = server
        .post("/sign")
        .add_header(MAC_HEADER, &mac)
        .json(&request)
        .await;
    response.assert_status_forbidden();
    assert_eq!(reason_of(&response.json()), "CUSTODY_NOT_CONFIGURED");
}

#[tokio::test]
async fn test_rate_limit_rejects_excess_requests() {
    let mut config = test_config();
    config.rate_limit_per_minute = 2;
    let server = test_server(&config);

    for job_id in 1..=2i64 {
        let (request, mac) = signed_request(job_id, &test_intent());
        let response = server
            .post("/sign")
            .add_header(MAC_HEADER, &mac)
            .json(&request)
            .await;
        response.assert_status_ok();
    }

    let (request, mac) = signed_request(3, &test_intent());
    let response = server
        .post("/sign")
        .add_header(MAC_HEADER, &mac)
        .json(&request)
        .await;
    assert_eq!(response.status_code(), 429);
}

#[tokio::test]
async fn test_healthz() {
    let server = test_server(&test_config());
    let response = server.get("/healthz").await;
    response.assert_status_ok();
}
