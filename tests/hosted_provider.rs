//! Tests for the hosted rail adapter against a mocked indexer.

use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use instant_refund::error::ProviderError;
use instant_refund::settlement::{HostedRailProvider, SettlementProvider, SettlementStatus};

fn provider(base_url: String, confirmations_required: u32) -> HostedRailProvider {
    HostedRailProvider::new(
        base_url,
        Some("test-api-key".to_string()),
        "kaspa".to_string(),
        confirmations_required,
    )
}

#[tokio::test]
async fn test_status_confirmed_at_threshold() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/tx/abc123"))
        .and(header("authorization", "Bearer test-api-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "confirmations": 3,
        })))
        .mount(&mock_server)
        .await;

    let provider = provider(mock_server.uri(), 3);
    let status = provider.status("kaspa_abc123").await.unwrap();
    assert_eq!(status, SettlementStatus::Confirmed);
}

#[tokio::test]
async fn test_status_pending_below_threshold() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/tx/abc123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "confirmations": 1,
        })))
        .mount(&mock_server)
        .await;

    let provider = provider(mock_server.uri(), 3);
    let status = provider.status("kaspa_abc123").await.unwrap();
    assert_eq!(status, SettlementStatus::Pending { confirmations: 1 });
}

#[tokio::test]
async fn test_status_missing_confirmations_field_defaults_to_zero() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/tx/abc123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
        .mount(&mock_server)
        .await;

    let provider = provider(mock_server.uri(), 1);
    let status = provider.status("kaspa_abc123").await.unwrap();
    assert_eq!(status, SettlementStatus::Pending { confirmations: 0 });
}

#[tokio::test]
async fn test_status_indexer_error_is_unavailable() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/tx/abc123"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&mock_server)
        .await;

    let provider = provider(mock_server.uri(), 1);
    let error = provider.status("kaspa_abc123").await.unwrap_err();
    assert!(matches!(error, ProviderError::Unavailable(_)));
}

#[tokio::test]
async fn test_status_strips_network_prefix_from_reference() {
    let mock_server = MockServer::start().await;

    // Only the txid portion of the reference reaches the indexer.
    Mock::given(method("GET"))
        .and(path("/tx/deadbeef"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "confirmations": 5,
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let provider = provider(mock_server.uri(), 1);
    let status = provider.status("kaspa_deadbeef").await.unwrap();
    assert_eq!(status, SettlementStatus::Confirmed);
}

#[tokio::test]
async fn test_settle_produces_prefixed_reference() {
    let provider = provider("http://localhost:1".to_string(), 1);
    let receipt = provider
        .settle(uuid::Uuid::new_v4(), 1_000_000_000, "KAS")
        .await
        .unwrap();

    assert!(receipt.settlement_reference.starts_with("kaspa_"));
    assert_eq!(receipt.network, "kaspa");
}

#[tokio::test]
async fn test_settle_rejects_non_positive_amount() {
    let provider = provider("http://localhost:1".to_string(), 1);
    let error = provider.settle(uuid::Uuid::new_v4(), 0, "KAS").await.unwrap_err();
    assert!(matches!(error, ProviderError::BroadcastRejected(_)));
}

#[tokio::test]
async fn test_health_reports_ok() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&mock_server)
        .await;

    let provider = provider(mock_server.uri(), 1);
    let health = provider.health().await;
    assert!(health.ok);
    assert_eq!(health.network, "kaspa");
}

#[tokio::test]
async fn test_health_reports_failure() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    let provider = provider(mock_server.uri(), 1);
    let health = provider.health().await;
    assert!(!health.ok);
    assert!(health.error.is_some());
}
