//! End-to-end tests for the HTTP API over the in-memory store.
//!
//! Requests go through the full router (extractors, middleware, error
//! mapping) with `tower::ServiceExt::oneshot`; no socket is opened.

#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Method, Request, StatusCode, header};
use campus_events_core::environment::Clock;
use campus_events_core::types::{EventId, Role, User, UserId};
use campus_events_runtime::RetryPolicy;
use campus_events_runtime::metrics::MetricsRecorder;
use campus_events_server::{AppState, build_router};
use campus_events_testing::fixtures::{coordinator, event_in_days, open_event, student};
use campus_events_testing::{InMemoryEntityStore, StoreOperation, test_clock};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

type Caller = Option<(UserId, Role)>;

struct TestApp {
    router: Router,
    store: InMemoryEntityStore,
    coordinator: User,
    student: User,
    admin: UserId,
}

impl TestApp {
    fn new() -> Self {
        let clock = test_clock();
        let store = InMemoryEntityStore::new();

        let coordinator = coordinator("Ravi Menon", &clock);
        let student = student("Lena Ortiz", &clock);
        store.put_user(coordinator.clone());
        store.put_user(student.clone());

        let policy = RetryPolicy::builder()
            .max_retries(1)
            .initial_delay(Duration::from_millis(1))
            .max_delay(Duration::from_millis(5))
            .jitter(false)
            .build();
        let state = AppState::new(
            Arc::new(store.clone()),
            Arc::new(clock),
            policy,
            MetricsRecorder::new(),
        );

        Self {
            router: build_router(state),
            store,
            coordinator,
            student,
            admin: UserId::new(),
        }
    }

    fn as_student(&self) -> Caller {
        Some((self.student.id, Role::Student))
    }

    fn as_coordinator(&self) -> Caller {
        Some((self.coordinator.id, Role::Coordinator))
    }

    fn as_admin(&self) -> Caller {
        Some((self.admin, Role::Admin))
    }

    async fn raw(
        &self,
        method: Method,
        uri: &str,
        caller: Caller,
        body: Option<Value>,
    ) -> axum::response::Response {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some((user_id, role)) = caller {
            request = request
                .header("X-User-Id", user_id.to_string())
                .header("X-User-Role", role.as_str());
        }
        let request = match body {
            Some(body) => request
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => request.body(Body::empty()),
        }
        .unwrap();

        self.router.clone().oneshot(request).await.unwrap()
    }

    async fn send(
        &self,
        method: Method,
        uri: &str,
        caller: Caller,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let response = self.raw(method, uri, caller, body).await;
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    /// Seed an upcoming event owned by the coordinator.
    fn seed_event(&self, days: i64) -> EventId {
        let mut event = event_in_days(&test_clock(), days);
        event.name = "Hack Night".to_string();
        event.created_by = self.coordinator.id;
        let id = event.id;
        self.store.put_event(event);
        id
    }
}

fn event_body() -> Value {
    json!({
        "name": "Spring Hackathon",
        "category": "hackathon",
        "date": (test_clock().now() + chrono::Duration::days(10)).to_rfc3339(),
        "details": { "venue": "Main Hall", "duration": 240 }
    })
}

// ============================================================================
// Health
// ============================================================================

#[tokio::test]
async fn health_and_readiness() {
    let app = TestApp::new();

    let (status, body) = app.send(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, body) = app.send(Method::GET, "/ready", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ready"], true);

    app.store.fail_next(StoreOperation::Ping, 1);
    let (status, body) = app.send(Method::GET, "/ready", None, None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["ready"], false);
}

#[tokio::test]
async fn metrics_unavailable_without_installed_recorder() {
    let app = TestApp::new();
    let response = app.raw(Method::GET, "/metrics", None, None).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn responses_echo_correlation_id() {
    let app = TestApp::new();
    let request = Request::builder()
        .uri("/health")
        .header("X-Correlation-ID", "5f0c3a0e-8f1d-4d6b-9a43-0d1a2b3c4d5e")
        .body(Body::empty())
        .unwrap();

    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(
        response.headers()["x-correlation-id"],
        "5f0c3a0e-8f1d-4d6b-9a43-0d1a2b3c4d5e"
    );
}

// ============================================================================
// Events
// ============================================================================

#[tokio::test]
async fn creating_events_needs_staff() {
    let app = TestApp::new();

    let (status, body) = app
        .send(Method::POST, "/api/events", None, Some(event_body()))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);

    let (status, _) = app
        .send(Method::POST, "/api/events", app.as_student(), Some(event_body()))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .send(
            Method::POST,
            "/api/events",
            app.as_coordinator(),
            Some(event_body()),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["name"], "Spring Hackathon");
    assert_eq!(body["data"]["status"], "upcoming");
    assert_eq!(body["data"]["eligibility"], "all");
    assert_eq!(body["data"]["registrationRequired"], true);
    assert_eq!(body["data"]["participants"], json!([]));
    assert_eq!(body["data"]["createdBy"], app.coordinator.id.to_string());
    assert_eq!(body["data"]["details"]["venue"], "Main Hall");
}

#[tokio::test]
async fn blank_event_name_is_rejected() {
    let app = TestApp::new();
    let mut body = event_body();
    body["name"] = json!("   ");

    let (status, body) = app
        .send(Method::POST, "/api/events", app.as_coordinator(), Some(body))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn list_and_get_events() {
    let app = TestApp::new();
    let upcoming = app.seed_event(5);
    let past = app.seed_event(-5);

    let (status, body) = app.send(Method::GET, "/api/events", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 2);
    // Newest date first
    assert_eq!(body["data"][0]["id"], upcoming.to_string());

    let (_, body) = app
        .send(Method::GET, "/api/events?status=completed", None, None)
        .await;
    assert_eq!(body["count"], 1);
    assert_eq!(body["data"][0]["id"], past.to_string());

    let (status, body) = app
        .send(Method::GET, &format!("/api/events/{upcoming}"), None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["participantCount"], 0);

    let (status, body) = app
        .send(
            Method::GET,
            &format!("/api/events/{}", EventId::new()),
            None,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Event not found");
}

#[tokio::test]
async fn update_is_limited_to_owner_and_keeps_participants() {
    let app = TestApp::new();
    let event_id = app.seed_event(5);
    let uri = format!("/api/events/{event_id}");

    app.send(
        Method::POST,
        &format!("{uri}/register"),
        app.as_student(),
        None,
    )
    .await;

    let other = Some((UserId::new(), Role::Coordinator));
    let (status, _) = app
        .send(
            Method::PATCH,
            &uri,
            other,
            Some(json!({ "name": "Renamed" })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .send(
            Method::PUT,
            &uri,
            app.as_coordinator(),
            Some(json!({ "name": "Renamed", "participants": [] })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["name"], "Renamed");
    assert_eq!(body["data"]["participants"], json!([app.student.id]));
}

// ============================================================================
// Registration
// ============================================================================

#[tokio::test]
async fn register_then_unregister() {
    let app = TestApp::new();
    let event_id = app.seed_event(5);
    let uri = format!("/api/events/{event_id}/register");

    let (status, body) = app
        .send(Method::POST, &uri, app.as_student(), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Successfully registered for event");
    assert_eq!(body["data"]["participantCount"], 1);
    assert_eq!(
        app.store.user(app.student.id).unwrap().registered_events,
        vec![event_id]
    );

    let (status, body) = app
        .send(Method::POST, &uri, app.as_student(), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "ALREADY_REGISTERED");

    let (status, body) = app
        .send(Method::DELETE, &uri, app.as_student(), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["participantCount"], 0);
    assert!(app.store.user(app.student.id).unwrap().registered_events.is_empty());

    let (status, body) = app
        .send(Method::DELETE, &uri, app.as_student(), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "not registered");
    assert!(app.store.is_consistent());
}

#[tokio::test]
async fn only_students_register() {
    let app = TestApp::new();
    let event_id = app.seed_event(5);

    let (status, _) = app
        .send(
            Method::POST,
            &format!("/api/events/{event_id}/register"),
            app.as_coordinator(),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(app.store.event(event_id).unwrap().participants.is_empty());
}

#[tokio::test]
async fn registration_preconditions_surface_as_client_errors() {
    let app = TestApp::new();

    let mut open = open_event(&test_clock());
    open.created_by = app.coordinator.id;
    let open_id = open.id;
    app.store.put_event(open);
    let (status, body) = app
        .send(
            Method::POST,
            &format!("/api/events/{open_id}/register"),
            app.as_student(),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "registration not required");

    let past = app.seed_event(-3);
    let (status, body) = app
        .send(
            Method::POST,
            &format!("/api/events/{past}/register"),
            app.as_student(),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_OPERATION");

    let (status, body) = app
        .send(
            Method::POST,
            &format!("/api/events/{}/register", EventId::new()),
            app.as_student(),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "event not found");
}

#[tokio::test]
async fn store_failure_leaves_nothing_applied() {
    let app = TestApp::new();
    let event_id = app.seed_event(5);
    app.store.fail_always(StoreOperation::AddRegisteredEvent);

    let (status, body) = app
        .send(
            Method::POST,
            &format!("/api/events/{event_id}/register"),
            app.as_student(),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["code"], "STORE_FAILURE");
    assert_eq!(body["message"], "Server error, nothing was changed");
    assert!(app.store.event(event_id).unwrap().participants.is_empty());
    assert!(app.store.is_consistent());
}

#[tokio::test]
async fn partial_failure_is_reported_and_repairable() {
    let app = TestApp::new();
    let event_id = app.seed_event(5);
    app.store.fail_always(StoreOperation::AddRegisteredEvent);
    app.store.fail_always(StoreOperation::RemoveParticipant);

    let (status, body) = app
        .send(
            Method::POST,
            &format!("/api/events/{event_id}/register"),
            app.as_student(),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["code"], "PARTIAL_FAILURE");
    assert!(!app.store.is_consistent());

    app.store.clear_faults();

    let (status, body) = app
        .send(Method::GET, "/api/admin/consistency", app.as_admin(), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["orphanedParticipants"][0]["userId"], app.student.id.to_string());

    let (status, body) = app
        .send(
            Method::POST,
            "/api/admin/consistency/repair",
            app.as_admin(),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["summary"]["failures"], 0);
    assert!(app.store.is_consistent());
    assert_eq!(
        app.store.user(app.student.id).unwrap().registered_events,
        vec![event_id]
    );
}

// ============================================================================
// Rosters
// ============================================================================

#[tokio::test]
async fn roster_and_csv_export() {
    let app = TestApp::new();
    let event_id = app.seed_event(5);
    app.send(
        Method::POST,
        &format!("/api/events/{event_id}/register"),
        app.as_student(),
        None,
    )
    .await;

    let uri = format!("/api/events/{event_id}/registrations");
    let (status, _) = app.send(Method::GET, &uri, app.as_student(), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .send(Method::GET, &uri, app.as_coordinator(), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);
    assert_eq!(body["data"][0]["name"], "Lena Ortiz");
    assert_eq!(body["data"][0]["year"], "2nd Year");

    let response = app
        .raw(Method::GET, &format!("{uri}/export"), app.as_coordinator(), None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/csv; charset=utf-8"
    );
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"Hack_Night_participants.csv\""
    );
    let csv = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let csv = String::from_utf8(csv.to_vec()).unwrap();
    assert_eq!(
        csv,
        "Name,Email,Year\nLena Ortiz,lena.ortiz@college.edu,2nd Year\n"
    );
}

#[tokio::test]
async fn staff_remove_participant() {
    let app = TestApp::new();
    let event_id = app.seed_event(5);
    let uri = format!("/api/events/{event_id}/registrations/{}", app.student.id);

    let (status, body) = app
        .send(Method::DELETE, &uri, app.as_coordinator(), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "user not registered");

    app.send(
        Method::POST,
        &format!("/api/events/{event_id}/register"),
        app.as_student(),
        None,
    )
    .await;

    let (status, body) = app
        .send(Method::DELETE, &uri, app.as_coordinator(), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["participantCount"], 0);
    assert!(app.store.user(app.student.id).unwrap().registered_events.is_empty());
    assert!(app.store.is_consistent());
}

// ============================================================================
// Cascade delete
// ============================================================================

#[tokio::test]
async fn deleting_an_event_cleans_registrations() {
    let app = TestApp::new();
    let event_id = app.seed_event(5);
    let uri = format!("/api/events/{event_id}");
    app.send(
        Method::POST,
        &format!("{uri}/register"),
        app.as_student(),
        None,
    )
    .await;

    let (status, _) = app
        .send(
            Method::DELETE,
            &uri,
            Some((UserId::new(), Role::Coordinator)),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .send(Method::DELETE, &uri, app.as_admin(), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["registrationsRemoved"], 1);
    assert!(app.store.event(event_id).is_none());
    assert!(app.store.user(app.student.id).unwrap().registered_events.is_empty());

    let (status, _) = app.send(Method::GET, &uri, None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ============================================================================
// Users
// ============================================================================

#[tokio::test]
async fn admins_create_users_once_per_email() {
    let app = TestApp::new();
    let body = json!({
        "name": "Noor Haddad",
        "email": "Noor.Haddad@College.edu",
        "role": "student",
        "year": "1st Year"
    });

    let (status, _) = app
        .send(Method::POST, "/api/users", app.as_coordinator(), Some(body.clone()))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, created) = app
        .send(Method::POST, "/api/users", app.as_admin(), Some(body.clone()))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["data"]["email"], "noor.haddad@college.edu");

    let (status, duplicate) = app
        .send(Method::POST, "/api/users", app.as_admin(), Some(body))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(duplicate["success"], false);

    let (status, body) = app
        .send(
            Method::POST,
            "/api/users",
            app.as_admin(),
            Some(json!({ "name": "No Year", "email": "ny@college.edu", "role": "student" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Year is required for students");
}

#[tokio::test]
async fn profile_lists_registered_events() {
    let app = TestApp::new();
    let event_id = app.seed_event(5);
    app.send(
        Method::POST,
        &format!("/api/events/{event_id}/register"),
        app.as_student(),
        None,
    )
    .await;

    let (status, body) = app
        .send(Method::GET, "/api/users/me", app.as_student(), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["email"], "lena.ortiz@college.edu");
    assert_eq!(body["data"]["registeredEvents"][0]["id"], event_id.to_string());

    let (status, _) = app
        .send(
            Method::GET,
            "/api/users/me",
            Some((UserId::new(), Role::Student)),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn profile_update_edits_fields_and_rejects_taken_email() {
    let app = TestApp::new();
    let event_id = app.seed_event(5);
    app.send(
        Method::POST,
        &format!("/api/events/{event_id}/register"),
        app.as_student(),
        None,
    )
    .await;

    let (status, body) = app
        .send(
            Method::PATCH,
            "/api/users/profile",
            app.as_student(),
            Some(json!({
                "name": "Lena O.",
                "email": " Lena.O@College.edu ",
                "year": "3rd Year",
                "bio": "Robotics club",
                "registeredEvents": []
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Profile updated successfully");
    assert_eq!(body["data"]["name"], "Lena O.");
    assert_eq!(body["data"]["email"], "lena.o@college.edu");
    assert_eq!(body["data"]["year"], "3rd Year");
    assert_eq!(
        app.store.user(app.student.id).unwrap().registered_events,
        vec![event_id]
    );

    let (status, body) = app
        .send(
            Method::PATCH,
            "/api/users/profile",
            app.as_student(),
            Some(json!({ "email": "ravi.menon@staff.college.edu" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Email already in use");
    assert_eq!(app.store.user(app.student.id).unwrap().email, "lena.o@college.edu");

    let (status, _) = app
        .send(
            Method::PATCH,
            "/api/users/profile",
            app.as_student(),
            Some(json!({ "name": "  " })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .send(
            Method::PATCH,
            "/api/users/profile",
            Some((UserId::new(), Role::Student)),
            Some(json!({ "bio": "ghost" })),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn account_deletion_clears_every_roster() {
    let app = TestApp::new();
    let events = [app.seed_event(5), app.seed_event(8)];
    for event_id in events {
        app.send(
            Method::POST,
            &format!("/api/events/{event_id}/register"),
            app.as_student(),
            None,
        )
        .await;
    }

    let (status, body) = app
        .send(Method::DELETE, "/api/users/account", app.as_student(), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Account deleted successfully");
    assert_eq!(body["data"]["participationsRemoved"], 2);

    assert!(app.store.user(app.student.id).is_none());
    for event_id in events {
        assert!(app.store.event(event_id).unwrap().participants.is_empty());
    }
    assert!(app.store.is_consistent());

    let (status, _) = app
        .send(Method::DELETE, "/api/users/account", app.as_student(), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn admins_list_coordinators() {
    let app = TestApp::new();

    let (status, _) = app
        .send(Method::GET, "/api/admin/coordinators", app.as_coordinator(), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .send(Method::GET, "/api/admin/coordinators", app.as_admin(), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);
    assert_eq!(body["data"][0]["id"], app.coordinator.id.to_string());
    assert_eq!(body["data"][0]["role"], "coordinator");
}

#[tokio::test]
async fn audit_endpoints_are_admin_only() {
    let app = TestApp::new();

    let (status, _) = app
        .send(Method::GET, "/api/admin/consistency", app.as_coordinator(), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .send(Method::GET, "/api/admin/consistency", app.as_admin(), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "No drift found");
}
