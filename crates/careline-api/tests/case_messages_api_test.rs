//! HTTP tests for the case messaging routes.
//!
//! The router is driven in-process with `tower::ServiceExt::oneshot` over
//! the in-memory store, with the event bus in synchronous mode so listener
//! side effects are visible when a response returns.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use careline_api::{router, AppState, PassthroughMediaUrlSigner};
use careline_core::memory::MemoryStore;
use careline_core::{
    register_listeners, AnalyticsForwarder, AssignmentStatus, CaseStatus, EventBus,
    EventBusConfig, MessageComposer, RoleType, TracingAnalyticsLogger,
};

// =============================================================================
// Fixtures
// =============================================================================

const PATIENT_ACCOUNT: i64 = 100;
const DOCTOR_ACCOUNT: i64 = 200;
const CC_ACCOUNT: i64 = 300;
const OTHER_PATIENT_ACCOUNT: i64 = 400;

struct TestApp {
    app: Router,
    mem: MemoryStore,
    case_id: i64,
    doctor_id: i64,
}

impl TestApp {
    async fn new() -> Self {
        let mem = MemoryStore::new();
        let patient = mem.add_patient(PATIENT_ACCOUNT, "Pat", "Jones");
        let doctor = mem.add_doctor(DOCTOR_ACCOUNT, "Dana", "Reyes");
        let cc = mem.add_doctor(CC_ACCOUNT, "Casey", "Moore");
        mem.add_patient(OTHER_PATIENT_ACCOUNT, "Sam", "Hill");

        let case = mem.add_case(patient.id, "acne");
        mem.set_case_status(case.id, CaseStatus::Claimed);
        mem.assign(case.id, doctor.id, RoleType::Doctor, AssignmentStatus::Active);
        mem.assign(case.id, cc.id, RoleType::CareCoordinator, AssignmentStatus::Active);

        let store = mem.store();
        let bus = Arc::new(EventBus::new(EventBusConfig::testing()));
        let composer = Arc::new(MessageComposer::new(store.clone(), bus.clone()));
        register_listeners(&bus, store.clone(), composer.clone()).await;
        Arc::new(
            AnalyticsForwarder::new(Arc::new(TracingAnalyticsLogger))
                .with_store(Arc::new(mem.clone())),
        )
        .register(&bus)
        .await;

        let signer = Arc::new(PassthroughMediaUrlSigner::new(Duration::from_secs(900)));
        let state = AppState::new(store, bus, composer, signer, "careline");

        Self {
            app: router(state),
            mem,
            case_id: case.id,
            doctor_id: doctor.id,
        }
    }

    async fn send(
        &self,
        method: &str,
        uri: &str,
        identity: Option<(i64, &str)>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some((account_id, role)) = identity {
            builder = builder
                .header("x-account-id", account_id.to_string())
                .header("x-account-role", role);
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    async fn post(&self, account: i64, role: &str, body: Value) -> (StatusCode, Value) {
        self.send("POST", "/v1/case/messages", Some((account, role)), Some(body))
            .await
    }

    async fn list(&self, account: i64, role: &str) -> (StatusCode, Value) {
        let uri = format!("/v1/case/messages?case_id={}", self.case_id);
        self.send("GET", &uri, Some((account, role)), None).await
    }

    async fn unread(&self, account: i64, role: &str) -> i64 {
        let uri = format!("/v1/case/messages/unread_count?case_id={}", self.case_id);
        let (status, body) = self.send("GET", &uri, Some((account, role)), None).await;
        assert_eq!(status, StatusCode::OK);
        body["unread_count"].as_i64().unwrap()
    }
}

// =============================================================================
// Identity and validation
// =============================================================================

#[tokio::test]
async fn test_health_check() {
    let app = TestApp::new().await;
    let (status, body) = app.send("GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_missing_identity_is_unauthorized() {
    let app = TestApp::new().await;
    let uri = format!("/v1/case/messages?case_id={}", app.case_id);
    let (status, body) = app.send("GET", &uri, None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].as_str().unwrap().contains("x-account-id"));

    let (status, _) = app
        .send("GET", &uri, Some((PATIENT_ACCOUNT, "NURSE")), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_zero_case_id_is_bad_request() {
    let app = TestApp::new().await;
    let (status, _) = app
        .post(PATIENT_ACCOUNT, "PATIENT", json!({"case_id": 0, "message": "hi"}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .send(
            "GET",
            "/v1/case/messages/unread_count",
            Some((PATIENT_ACCOUNT, "PATIENT")),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_case_is_not_found() {
    let app = TestApp::new().await;
    let (status, _) = app
        .post(PATIENT_ACCOUNT, "PATIENT", json!({"case_id": 9999, "message": "hi"}))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_other_patient_is_forbidden() {
    let app = TestApp::new().await;
    let (status, _) = app
        .post(
            OTHER_PATIENT_ACCOUNT,
            "PATIENT",
            json!({"case_id": app.case_id, "message": "hello?"}),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(app.mem.message_count(app.case_id), 0);
}

#[tokio::test]
async fn test_empty_body_is_bad_request() {
    let app = TestApp::new().await;
    let (status, body) = app
        .post(PATIENT_ACCOUNT, "PATIENT", json!({"case_id": app.case_id, "message": "  "}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

// =============================================================================
// Posting and listing
// =============================================================================

#[tokio::test]
async fn test_patient_post_is_listed_for_doctor() {
    let app = TestApp::new().await;
    let (status, body) = app
        .post(
            PATIENT_ACCOUNT,
            "PATIENT",
            json!({"case_id": app.case_id, "message": "My skin is itchy"}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let message_id = body["message_id"].as_i64().unwrap();

    let (status, list) = app.list(DOCTOR_ACCOUNT, "DOCTOR").await;
    assert_eq!(status, StatusCode::OK);
    let items = list["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["id"], message_id);
    assert_eq!(items[0]["body"], "My skin is itchy");
    assert_eq!(items[0]["type"], "conversation_item:message");
    assert!(items[0].get("read_receipts").is_none());

    let participants = list["participants"].as_array().unwrap();
    assert_eq!(participants.len(), 1);
    assert_eq!(participants[0]["person_id"], items[0]["sender"]);
    assert_eq!(participants[0]["role"], "PATIENT");
    assert_eq!(participants[0]["initials"], "PJ");
}

#[tokio::test]
async fn test_care_coordinator_post_defaults_to_private() {
    let app = TestApp::new().await;
    let (status, _) = app
        .post(
            CC_ACCOUNT,
            "MA",
            json!({"case_id": app.case_id, "message": "Internal note"}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app
        .post(
            CC_ACCOUNT,
            "MA",
            json!({"case_id": app.case_id, "message": "Hi Pat!", "is_private": false}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, patient_view) = app.list(PATIENT_ACCOUNT, "PATIENT").await;
    let items = patient_view["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["body"], "Hi Pat!");

    let (_, cc_view) = app.list(CC_ACCOUNT, "MA").await;
    let items = cc_view["items"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["type"], "conversation_item:private_message");
    assert_eq!(items[1]["type"], "conversation_item:message");
    assert!(items[0]["read_receipts"].is_array());
}

#[tokio::test]
async fn test_attachments_carry_urls() {
    let app = TestApp::new().await;
    let doctor_person = app.mem.person_for(RoleType::Doctor, app.doctor_id);
    let photo = app.mem.seed_media(doctor_person.id, "image/jpeg");

    let (status, _) = app
        .post(
            DOCTOR_ACCOUNT,
            "DOCTOR",
            json!({
                "case_id": app.case_id,
                "message": "See attached",
                "attachments": [
                    {"type": "photo", "id": photo},
                    {"type": "attachment:visit", "id": 55, "title": "Your visit"}
                ]
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, list) = app.list(PATIENT_ACCOUNT, "PATIENT").await;
    let attachments = list["items"][0]["attachments"].as_array().unwrap();
    assert_eq!(attachments.len(), 2);

    assert_eq!(attachments[0]["type"], "attachment:photo");
    assert_eq!(attachments[0]["title"], "Photo");
    assert_eq!(attachments[0]["mimetype"], "image/jpeg");
    assert_eq!(attachments[0]["url"], format!("s3://media/{}", photo));

    assert_eq!(attachments[1]["type"], "attachment:visit");
    assert_eq!(attachments[1]["title"], "Your visit");
    assert_eq!(
        attachments[1]["url"],
        "careline:///action/view_visit?visit_id=55"
    );
}

#[tokio::test]
async fn test_unknown_attachment_type_is_bad_request() {
    let app = TestApp::new().await;
    let (status, _) = app
        .post(
            DOCTOR_ACCOUNT,
            "DOCTOR",
            json!({
                "case_id": app.case_id,
                "message": "See attached",
                "attachments": [{"type": "sticker", "id": 3}]
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// =============================================================================
// Assignment
// =============================================================================

#[tokio::test]
async fn test_doctor_assigns_to_care_coordinator() {
    let app = TestApp::new().await;
    let (status, body) = app
        .send(
            "POST",
            "/v1/case/assign",
            Some((DOCTOR_ACCOUNT, "DOCTOR")),
            Some(json!({"case_id": app.case_id, "message": "Please schedule labs"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["message_id"].as_i64().unwrap() > 0);

    let (_, cc_view) = app.list(CC_ACCOUNT, "MA").await;
    let items = cc_view["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert!(items[0]["event_text"]
        .as_str()
        .unwrap()
        .starts_with("assigned to"));

    let (_, patient_view) = app.list(PATIENT_ACCOUNT, "PATIENT").await;
    assert!(patient_view["items"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_patient_cannot_assign() {
    let app = TestApp::new().await;
    let (status, _) = app
        .send(
            "POST",
            "/v1/case/assign",
            Some((PATIENT_ACCOUNT, "PATIENT")),
            Some(json!({"case_id": app.case_id, "message": "Take it"})),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

// =============================================================================
// Read state
// =============================================================================

#[tokio::test]
async fn test_mark_read_clears_unread_count() {
    let app = TestApp::new().await;
    app.post(
        DOCTOR_ACCOUNT,
        "DOCTOR",
        json!({"case_id": app.case_id, "message": "Results are in"}),
    )
    .await;

    assert_eq!(app.unread(PATIENT_ACCOUNT, "PATIENT").await, 1);
    assert_eq!(app.unread(DOCTOR_ACCOUNT, "DOCTOR").await, 0);

    let (status, body) = app
        .send(
            "POST",
            "/v1/case/messages/read",
            Some((PATIENT_ACCOUNT, "PATIENT")),
            Some(json!({"case_id": app.case_id})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(app.unread(PATIENT_ACCOUNT, "PATIENT").await, 0);
}

#[tokio::test]
async fn test_private_note_does_not_raise_patient_unread_count() {
    let app = TestApp::new().await;
    app.post(
        CC_ACCOUNT,
        "MA",
        json!({"case_id": app.case_id, "message": "Patient prefers mornings"}),
    )
    .await;

    assert_eq!(app.unread(PATIENT_ACCOUNT, "PATIENT").await, 0);
    assert_eq!(app.unread(DOCTOR_ACCOUNT, "DOCTOR").await, 1);
}

#[tokio::test]
async fn test_viewed_app_event_marks_case_read() {
    let app = TestApp::new().await;
    app.post(
        DOCTOR_ACCOUNT,
        "DOCTOR",
        json!({"case_id": app.case_id, "message": "Results are in"}),
    )
    .await;
    assert_eq!(app.unread(PATIENT_ACCOUNT, "PATIENT").await, 1);

    let (status, _) = app
        .send(
            "POST",
            "/v1/app_event",
            Some((PATIENT_ACCOUNT, "PATIENT")),
            Some(json!({
                "resource": "all_case_messages",
                "resource_id": app.case_id,
                "action": "viewed"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.unread(PATIENT_ACCOUNT, "PATIENT").await, 0);

    let client_events = app.mem.client_events();
    assert!(client_events
        .iter()
        .any(|e| e.event == "all_case_messages_viewed"));
}

// =============================================================================
// Request analytics
// =============================================================================

#[tokio::test]
async fn test_each_request_records_web_event() {
    let app = TestApp::new().await;
    app.send("GET", "/health", None, None).await;
    let uri = format!("/v1/case/messages?case_id={}", app.case_id);
    app.send("GET", &uri, None, None).await;

    let events = app.mem.web_request_events();
    assert_eq!(events.len(), 2);

    assert_eq!(events[0].path, "/health");
    assert_eq!(events[0].method, "GET");
    assert_eq!(events[0].status_code, 200);
    assert_eq!(events[0].service, "careline-api");
    assert!(!events[0].request_id.is_empty());

    assert_eq!(events[1].path, "/v1/case/messages");
    assert_eq!(events[1].status_code, 401);
}
