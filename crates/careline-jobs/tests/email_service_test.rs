//! HTTP email service tests against a mock endpoint.

use careline_jobs::{EmailPayload, EmailService, Error, HttpEmailService};
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn reminder() -> EmailPayload {
    EmailPayload {
        to: "pat@example.com".into(),
        from: "care@example.com".into(),
        subject: "Reminder".into(),
        body_text: "Please check in".into(),
    }
}

#[tokio::test]
async fn test_email_is_posted_as_json() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/send"))
        .and(header("Content-Type", "application/json"))
        .and(body_json(serde_json::json!({
            "to": "pat@example.com",
            "from": "care@example.com",
            "subject": "Reminder",
            "body_text": "Please check in"
        })))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&mock_server)
        .await;

    let service = HttpEmailService::new(format!("{}/send", mock_server.uri())).unwrap();
    let result = service.send(&reminder()).await;
    assert!(result.is_ok(), "send should succeed: {:?}", result.err());
}

#[tokio::test]
async fn test_non_success_status_is_upstream_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/send"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&mock_server)
        .await;

    let service = HttpEmailService::new(format!("{}/send", mock_server.uri())).unwrap();
    let err = service.send(&reminder()).await.unwrap_err();
    match err {
        Error::Upstream(msg) => assert_eq!(msg, "email service returned 503"),
        other => panic!("expected upstream error, got {:?}", other),
    }
}
