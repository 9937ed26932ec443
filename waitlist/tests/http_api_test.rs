//! HTTP API tests against the full router with in-memory collaborators.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
    response::Response,
};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use waitlist::admission::{AdmissionEnvironment, AdmissionPolicy};
use waitlist::codes::{CodeStore, InMemoryCodeStore};
use waitlist::ledger::{InMemoryRegistrantLedger, RegistrantLedger};
use waitlist::mocks::{RecordingNotifier, SlowLedger, StaticRenderer};
use waitlist::photos::PhotoStore;
use waitlist::server::{AppSettings, AppState, build_router};
use waitlist::types::CodePool;
use waitlist_testing::{ManualClock, utc};
use waitlist_web::UploadLimits;

const BOUNDARY: &str = "waitlist-test-boundary";
const ADMIN_TOKEN: &str = "s3cret";

struct TestApp {
    router: Router,
    clock: Arc<ManualClock>,
    codes: Arc<InMemoryCodeStore>,
    ledger: Arc<dyn RegistrantLedger>,
    notifier: Arc<RecordingNotifier>,
    uploads: PathBuf,
}

/// Collaborators that vary between tests.
struct Overrides {
    ledger: Arc<dyn RegistrantLedger>,
    notifier: RecordingNotifier,
    admission_timeout: Duration,
}

impl Default for Overrides {
    fn default() -> Self {
        Self {
            ledger: Arc::new(InMemoryRegistrantLedger::default()),
            notifier: RecordingNotifier::new(),
            admission_timeout: Duration::from_secs(10),
        }
    }
}

impl TestApp {
    async fn new(standard: &[&str]) -> Self {
        Self::with(standard, Overrides::default()).await
    }

    async fn with(standard: &[&str], overrides: Overrides) -> Self {
        let Overrides {
            ledger,
            notifier,
            admission_timeout,
        } = overrides;
        let clock = Arc::new(ManualClock::new(utc(2025, 6, 15, 12)));
        let codes = Arc::new(InMemoryCodeStore::new(clock.clone(), chrono::Duration::minutes(10)));
        let list: Vec<String> = standard.iter().map(|c| (*c).to_string()).collect();
        codes.seed(CodePool::Standard, &list).await.unwrap();
        let notifier = Arc::new(notifier);
        let uploads = std::env::temp_dir().join(format!("waitlist-http-{}", uuid::Uuid::new_v4()));

        let env = AdmissionEnvironment {
            clock: clock.clone(),
            codes: codes.clone(),
            ledger: ledger.clone(),
            renderer: Arc::new(StaticRenderer::new()),
            notifier: notifier.clone(),
            policy: AdmissionPolicy::new(utc(2025, 7, 1, 0)),
        };
        let settings = AppSettings {
            admission_timeout,
            certificate_release: utc(2025, 12, 1, 0),
            uploads: UploadLimits::images(1024 * 1024),
            require_photo: false,
            admin_token: Some(ADMIN_TOKEN.to_string()),
            cors_origin: "*".to_string(),
        };
        let state = AppState::new(env, PhotoStore::new(uploads.clone()), settings);

        Self {
            router: build_router(state),
            clock,
            codes,
            ledger,
            notifier,
            uploads,
        }
    }

    async fn send(&self, request: Request<Body>) -> Response {
        self.router.clone().oneshot(request).await.unwrap()
    }

    async fn get(&self, uri: &str) -> Response {
        self.send(Request::builder().uri(uri).body(Body::empty()).unwrap()).await
    }

    async fn register(&self, fields: &[(&str, &str)], image: Option<&[u8]>) -> Response {
        let request = Request::builder()
            .method("POST")
            .uri("/api/waitlist")
            .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"))
            .body(Body::from(multipart_body(fields, image)))
            .unwrap();
        self.send(request).await
    }

    async fn send_certificates(&self, token: Option<&str>) -> Response {
        let mut request = Request::builder().method("POST").uri("/api/admin/send-certificates");
        if let Some(token) = token {
            request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        self.send(request.body(Body::empty()).unwrap()).await
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        std::fs::remove_dir_all(&self.uploads).ok();
    }
}

fn multipart_body(fields: &[(&str, &str)], image: Option<&[u8]>) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!("--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n")
                .as_bytes(),
        );
    }
    if let Some(bytes) = image {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"me.png\"\r\n\
                 Content-Type: image/png\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn registration<'a>(email: &'a str, code: &'a str) -> Vec<(&'static str, &'a str)> {
    vec![
        ("name", "Jane Doe"),
        ("email", email),
        ("phoneNumber", "08000000000"),
        ("state", "Edo"),
        ("regId", code),
    ]
}

async fn json(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_bytes(response: Response) -> Vec<u8> {
    to_bytes(response.into_body(), usize::MAX).await.unwrap().to_vec()
}

#[tokio::test]
async fn registration_scenario_end_to_end() {
    let app = TestApp::new(&["A1", "A2"]).await;

    let response = app.register(&registration("jane@x.com", "A1"), None).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = json(response).await;
    assert_eq!(body["message"], "Waitlist entry created!");
    assert_eq!(body["eventId"], "edo-ahapn-0001");
    assert_eq!(body["delivery"], "sent");
    assert_eq!(app.notifier.sent_to("jane@x.com").len(), 1);

    let response = app.register(&registration("john@x.com", "A1"), None).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json(response).await["code"], "INVALID_CODE");

    let response = app.register(&registration("jane@x.com", "A2"), None).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json(response).await["code"], "DUPLICATE_EMAIL");

    let count = json(app.get("/api/waitlist/count").await).await;
    assert_eq!(count["count"], 1);

    let lookup = app.get("/api/waitlist/jane@x.com").await;
    assert_eq!(lookup.status(), StatusCode::OK);
    assert_eq!(json(lookup).await["eventId"], "edo-ahapn-0001");
}

#[tokio::test]
async fn missing_fields_are_rejected() {
    let app = TestApp::new(&["A1"]).await;

    let response = app
        .register(&[("name", "Jane"), ("email", "jane@x.com"), ("regId", "A1")], None)
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.ledger.count().await.unwrap(), 0);
    assert!(app.codes.is_valid(CodePool::Standard, "A1").await.unwrap());
}

#[tokio::test]
async fn unknown_email_lookup_is_404() {
    let app = TestApp::new(&[]).await;

    let response = app.get("/api/waitlist/nobody@x.com").await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json(response).await["message"], "User not found");
}

#[tokio::test]
async fn identity_card_is_served_as_pdf_attachment() {
    let app = TestApp::new(&["A1"]).await;
    app.register(&registration("jane@x.com", "A1"), None).await;

    let response = app.get("/api/event-id-pdf/edo-ahapn-0001").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "application/pdf");
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"event_id_jane@x.com.pdf\""
    );
    assert!(body_bytes(response).await.starts_with(b"%PDF"));

    let missing = app.get("/api/event-id-pdf/edo-ahapn-0099").await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn certificates_are_withheld_until_release() {
    let app = TestApp::new(&["A1"]).await;
    app.register(&registration("jane@x.com", "A1"), None).await;

    let early = app.get("/api/download-certificate/jane@x.com").await;
    assert_eq!(early.status(), StatusCode::FORBIDDEN);
    let body = json(early).await;
    assert_eq!(body["code"], "NOT_YET_RELEASED");
    assert_eq!(body["message"], "Certificates available after 2025-12-01");

    app.clock.set(utc(2025, 12, 2, 9));

    let released = app.get("/api/download-certificate/jane@x.com").await;
    assert_eq!(released.status(), StatusCode::OK);
    assert_eq!(
        released.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"certificate_Jane Doe.pdf\""
    );

    let unknown = app.get("/api/download-certificate/nobody@x.com").await;
    assert_eq!(unknown.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn certificate_sweep_requires_the_admin_token() {
    let app = TestApp::new(&["A1", "A2"]).await;
    app.register(&registration("jane@x.com", "A1"), None).await;
    app.register(&registration("john@x.com", "A2"), None).await;

    assert_eq!(app.send_certificates(None).await.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(app.send_certificates(Some("wrong")).await.status(), StatusCode::UNAUTHORIZED);

    let response = app.send_certificates(Some(ADMIN_TOKEN)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let summary = json(response).await;
    assert_eq!(summary["attempted"], 2);
    assert_eq!(summary["sent"], 2);
    assert_eq!(summary["failed"], 0);

    // Welcome email plus certificate
    assert_eq!(app.notifier.sent_to("john@x.com").len(), 2);
}

#[tokio::test]
async fn uploaded_photo_is_stored_and_served() {
    let app = TestApp::new(&["A1"]).await;
    let photo = b"\x89PNG fake image bytes";

    let response = app.register(&registration("jane@x.com", "A1"), Some(photo)).await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let registrant = app.ledger.find_by_email("jane@x.com").await.unwrap().unwrap();
    let reference = registrant.photo_reference.expect("photo reference stored");

    assert!(reference.starts_with("/uploads/"));
    let served = app.get(&reference).await;
    assert_eq!(served.status(), StatusCode::OK);
    assert_eq!(body_bytes(served).await, photo.to_vec());
}

#[tokio::test]
async fn rejected_registration_discards_its_photo() {
    let app = TestApp::new(&["A1"]).await;

    let response = app.register(&registration("jane@x.com", "NOPE"), Some(b"\x89PNG")).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let mut entries = tokio::fs::read_dir(&app.uploads).await.unwrap();
    assert!(entries.next_entry().await.unwrap().is_none());
}

#[tokio::test]
async fn failed_welcome_email_still_admits() {
    let app = TestApp::with(
        &["A1"],
        Overrides {
            notifier: RecordingNotifier::new().failing_for("jane@x.com"),
            ..Overrides::default()
        },
    )
    .await;

    let response = app.register(&registration("jane@x.com", "A1"), None).await;

    assert_eq!(response.status(), StatusCode::CREATED);
    let body = json(response).await;
    assert_eq!(body["eventId"], "edo-ahapn-0001");
    assert_eq!(body["delivery"], "failed");
    assert!(body["deliveryError"].as_str().is_some_and(|e| !e.is_empty()));
    assert_eq!(app.ledger.count().await.unwrap(), 1);
    assert!(!app.codes.is_valid(CodePool::Standard, "A1").await.unwrap());
}

#[tokio::test]
async fn timeout_before_persistence_is_408_and_frees_everything() {
    let slow = SlowLedger::new(InMemoryRegistrantLedger::default()).with_lookup_delay(Duration::from_secs(2));
    let app = TestApp::with(
        &["A1"],
        Overrides {
            ledger: Arc::new(slow),
            admission_timeout: Duration::from_millis(200),
            ..Overrides::default()
        },
    )
    .await;

    let response = app.register(&registration("jane@x.com", "A1"), Some(b"\x89PNG")).await;

    assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
    assert_eq!(app.ledger.count().await.unwrap(), 0);
    assert!(app.codes.is_valid(CodePool::Standard, "A1").await.unwrap());
    let mut entries = tokio::fs::read_dir(&app.uploads).await.unwrap();
    assert!(entries.next_entry().await.unwrap().is_none());
}

#[tokio::test]
async fn non_image_uploads_are_refused() {
    let app = TestApp::new(&["A1"]).await;
    let mut body = Vec::new();
    for (name, value) in registration("jane@x.com", "A1") {
        body.extend_from_slice(
            format!("--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n")
                .as_bytes(),
        );
    }
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"notes.txt\"\r\n\
             Content-Type: text/plain\r\n\r\nhello\r\n--{BOUNDARY}--\r\n"
        )
        .as_bytes(),
    );
    let request = Request::builder()
        .method("POST")
        .uri("/api/waitlist")
        .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"))
        .body(Body::from(body))
        .unwrap();

    let response = app.send(request).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json(response).await["code"], "INVALID_FILE_TYPE");
    assert!(app.codes.is_valid(CodePool::Standard, "A1").await.unwrap());
}

#[tokio::test]
async fn health_and_readiness() {
    let app = TestApp::new(&["A1"]).await;

    let health = app.get("/health").await;
    assert_eq!(health.status(), StatusCode::OK);
    assert_eq!(body_bytes(health).await, b"ok".to_vec());

    assert_eq!(app.get("/ready").await.status(), StatusCode::OK);
}
