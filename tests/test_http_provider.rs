//! Integration tests for the HTTP mail provider
//!
//! Tests behavioral contracts against a mock mail API:
//! - request shape and bearer authentication
//! - status code classification into transient and permanent outcomes
//! - provider timeouts

use alert_mailer::mail::providers::{HttpMailConfig, HttpMailTransport};
use alert_mailer::mail::{DeliveryOutcome, MailDispatcher, MailTransport, Mailer, ProviderError};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_config(base_url: &str) -> HttpMailConfig {
    HttpMailConfig {
        endpoint: format!("{base_url}/v1/send"),
        api_key: Some("test-api-key".to_string()),
        from: "alerts@example.com".to_string(),
        timeout: Duration::from_secs(5),
    }
}

async fn dispatch_with_status(status: u16, body: &str) -> DeliveryOutcome {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/send"))
        .respond_with(ResponseTemplate::new(status).set_body_string(body))
        .mount(&mock_server)
        .await;

    let transport = Arc::new(HttpMailTransport::new(test_config(&mock_server.uri())).unwrap());
    let dispatcher = MailDispatcher::new(transport, Duration::from_secs(5));
    dispatcher.send("a@b.com", "Storm Warning", "body").await
}

#[tokio::test]
async fn test_sends_json_document_with_bearer_auth() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/send"))
        .and(header("Authorization", "Bearer test-api-key"))
        .and(body_json(json!({
            "from": "alerts@example.com",
            "to": "a@b.com",
            "subject": "Storm Warning",
            "text": "Severe weather approaching"
        })))
        .respond_with(ResponseTemplate::new(202).set_body_json(json!({"id": "msg-1"})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let transport = HttpMailTransport::new(test_config(&mock_server.uri())).unwrap();
    transport
        .send_text("a@b.com", "Storm Warning", "Severe weather approaching")
        .await
        .unwrap();
}

#[tokio::test]
async fn test_server_errors_are_transient() {
    for status in [500, 502, 503] {
        let outcome = dispatch_with_status(status, "upstream unavailable").await;
        assert!(
            matches!(outcome, DeliveryOutcome::TransientFailure(_)),
            "{status} should be transient, got {outcome:?}"
        );
    }
}

#[tokio::test]
async fn test_rate_limit_is_transient() {
    let outcome = dispatch_with_status(429, "slow down").await;
    assert!(matches!(outcome, DeliveryOutcome::TransientFailure(_)));
}

#[tokio::test]
async fn test_auth_failure_is_permanent() {
    let outcome = dispatch_with_status(401, "invalid api key").await;
    assert!(matches!(outcome, DeliveryOutcome::PermanentFailure(_)));
}

#[tokio::test]
async fn test_rejected_recipient_is_permanent() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(422).set_body_string(r#"{"error":"invalid recipient"}"#),
        )
        .mount(&mock_server)
        .await;

    let transport = HttpMailTransport::new(test_config(&mock_server.uri())).unwrap();
    let error = transport.send_text("a@b.com", "s", "b").await.unwrap_err();
    assert!(matches!(error, ProviderError::InvalidRecipient(_)));
    assert!(error.is_permanent());
}

#[tokio::test]
async fn test_slow_provider_times_out_as_transient() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&mock_server)
        .await;

    let transport = Arc::new(HttpMailTransport::new(test_config(&mock_server.uri())).unwrap());
    let dispatcher = MailDispatcher::new(transport, Duration::from_millis(100));
    let outcome = dispatcher.send("a@b.com", "s", "b").await;
    assert!(matches!(outcome, DeliveryOutcome::TransientFailure(_)));
}

#[tokio::test]
async fn test_unreachable_endpoint_is_transient() {
    let config = HttpMailConfig {
        endpoint: "http://127.0.0.1:1/v1/send".to_string(),
        api_key: None,
        from: "alerts@example.com".to_string(),
        timeout: Duration::from_secs(2),
    };
    let transport = Arc::new(HttpMailTransport::new(config).unwrap());
    let dispatcher = MailDispatcher::new(transport, Duration::from_secs(5));

    let outcome = dispatcher.send("a@b.com", "s", "b").await;
    assert!(matches!(outcome, DeliveryOutcome::TransientFailure(_)));
}
