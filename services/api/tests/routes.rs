mod common;

use axum::http::{Method, StatusCode};
use chrono::{DateTime, Duration, Utc};
use common::{TestApp, t0};
use serde_json::json;
use tutoring::models::SessionStatus;
use uuid::Uuid;

fn assert_error(body: &serde_json::Value, code: &str) {
    assert_eq!(body["error"]["code"], code, "{}", body);
    assert!(body["error"]["message"].is_string());
    assert!(
        body["error"]["timestamp"]
            .as_str()
            .and_then(|t| t.parse::<DateTime<Utc>>().ok())
            .is_some()
    );
}

#[tokio::test]
async fn health_needs_no_token() {
    let app = TestApp::new().await;
    let (status, body) = app.send(Method::GET, "/health", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["database"], "in-memory");
}

#[tokio::test]
async fn api_routes_reject_missing_or_bad_tokens() {
    let app = TestApp::new().await;
    let uri = format!("/api/sessions/{}", Uuid::new_v4());

    let (status, body) = app.send(Method::GET, &uri, None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_error(&body, "UNAUTHORIZED");

    let status = app.send_with_authorization(&uri, "Bearer not-a-jwt").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let status = app.send_with_authorization(&uri, "Basic c3R1ZGVudDpwdw==").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn create_returns_created_envelope() {
    let app = TestApp::new().await;
    let (status, body) = app
        .post("/api/sessions", app.s1, Some(app.booking()))
        .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "Session created");
    assert_eq!(body["data"]["status"], "PENDING");
    assert_eq!(body["data"]["tutorId"], app.tutor.to_string());
    assert_eq!(body["data"]["price"].as_f64(), Some(100.0));
}

#[tokio::test]
async fn domain_errors_use_the_error_envelope() {
    let app = TestApp::new().await;

    let (status, body) = app
        .get(&format!("/api/sessions/{}", Uuid::new_v4()), app.s1)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_error(&body, "NOT_FOUND");

    let id = app.create_session().await;
    let (status, body) = app
        .post("/api/sessions", app.s2, Some(app.booking()))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_error(&body, "CONFLICT");

    let (status, body) = app
        .post(&format!("/api/sessions/{}/confirm", id), app.s2, None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_error(&body, "FORBIDDEN");

    let (status, body) = app
        .put(
            &format!("/api/sessions/{}/status", id),
            app.tutor,
            json!({ "status": "PENDING" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_error(&body, "VALIDATION_ERROR");
}

#[tokio::test]
async fn malformed_requests_are_validation_errors() {
    let app = TestApp::new().await;

    let (status, body) = app.get("/api/sessions/not-a-uuid", app.s1).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_error(&body, "VALIDATION_ERROR");

    let (status, body) = app
        .post("/api/sessions", app.s1, Some(json!({ "subject": "Missing fields" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_error(&body, "VALIDATION_ERROR");

    let mut booking = app.booking();
    booking["onlineMeetingLink"] = json!("meet me in the library");
    let (status, body) = app.post("/api/sessions", app.s1, Some(booking)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_error(&body, "VALIDATION_ERROR");

    let (status, body) = app
        .post(
            "/api/attendance/checkin",
            app.s1,
            Some(json!({ "sessionId": Uuid::new_v4(), "method": "pin", "code": "12ab" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_error(&body, "VALIDATION_ERROR");
}

#[tokio::test]
async fn full_session_over_http() {
    let app = TestApp::new().await;
    let id = app.confirmed_paid_session().await;
    let start = t0() + Duration::hours(25);

    app.clock.set(start);
    let (status, body) = app
        .get(&format!("/api/attendance/sessions/{}/qr", id), app.tutor)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["expiresIn"], 300);
    let qr_code = body["data"]["qrCode"].as_str().unwrap().to_string();

    app.clock.set(start + Duration::minutes(3));
    let (status, body) = app
        .post(
            "/api/attendance/checkin",
            app.s1,
            Some(json!({ "sessionId": id, "method": "qr", "code": qr_code })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["status"], "PRESENT");

    app.clock.set(start + Duration::hours(1));
    let (status, body) = app
        .post(
            "/api/attendance/checkout",
            app.tutor,
            Some(json!({ "sessionId": id })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["session"]["status"], "COMPLETED");
    assert_eq!(body["data"]["actualDuration"], 60);
    assert_eq!(body["data"]["scheduledDuration"], 60);
    assert_eq!(body["data"]["flaggedForReview"], false);
    assert_eq!(body["data"]["markedAbsent"], json!([app.s2]));

    assert_eq!(app.balance(app.tutor).await, 85.0);
    assert_eq!(app.balance(app.s1).await, 400.0);
    assert_eq!(app.balance(app.s2).await, 485.0);

    let (status, body) = app
        .get(&format!("/api/attendance/sessions/{}", id), app.tutor)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 2);

    // Nothing left to settle on retry
    let (status, body) = app
        .post(&format!("/api/sessions/{}/settle", id), app.tutor, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["payouts"], json!([]));
}

#[tokio::test]
async fn cancel_without_body_reports_refund_tier() {
    let app = TestApp::new().await;
    let id = app.confirmed_paid_session().await;

    // 12 hours of notice
    app.clock.set(t0() + Duration::hours(13));
    let (status, body) = app
        .post(&format!("/api/sessions/{}/cancel", id), app.s1, None)
        .await;

    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["session"]["status"], SessionStatus::Cancelled.as_str());
    assert_eq!(body["data"]["refundPercentage"], 0.5);
    assert_eq!(body["data"]["refundAmount"].as_f64(), Some(50.0));
    assert_eq!(app.balance(app.s2).await, 450.0);
}

#[tokio::test]
async fn pin_and_mark_absent_are_restricted_to_the_tutor_side() {
    let app = TestApp::new().await;
    let id = app.confirmed_paid_session().await;

    let (status, body) = app
        .get(&format!("/api/attendance/sessions/{}/pin", id), app.s2)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_error(&body, "FORBIDDEN");

    app.clock.set(t0() + Duration::hours(27));
    let (status, _) = app
        .post(
            &format!("/api/attendance/sessions/{}/mark-absent", id),
            app.s2,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .post(
            &format!("/api/attendance/sessions/{}/mark-absent", id),
            app.tutor,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["markedAbsent"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn reschedule_and_partial_update() {
    let app = TestApp::new().await;
    let id = app.create_session().await;
    let start = t0() + Duration::hours(49);

    let (status, body) = app
        .post(
            &format!("/api/sessions/{}/reschedule", id),
            app.s1,
            Some(json!({
                "scheduledStart": start,
                "scheduledEnd": start + Duration::minutes(90),
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);

    let (status, body) = app
        .put(
            &format!("/api/sessions/{}", id),
            app.tutor,
            json!({ "location": "Lab 2", "description": "Bring models" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["location"], "Lab 2");
    assert_eq!(body["data"]["subject"], "Stereochemistry");
    assert_eq!(
        body["data"]["scheduledStart"]
            .as_str()
            .and_then(|t| t.parse::<DateTime<Utc>>().ok()),
        Some(start)
    );
}

#[tokio::test]
async fn session_reads_are_limited_to_participants() {
    let app = TestApp::new().await;
    let id = app.create_session().await;
    let outsider = Uuid::new_v4();

    let (status, body) = app.get(&format!("/api/sessions/{}", id), outsider).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_error(&body, "FORBIDDEN");

    let (status, body) = app
        .get(&format!("/api/attendance/sessions/{}", id), outsider)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_error(&body, "FORBIDDEN");

    for member in [app.s2, app.tutor] {
        let (status, _) = app.get(&format!("/api/sessions/{}", id), member).await;
        assert_eq!(status, StatusCode::OK);
        let (status, body) = app
            .get(&format!("/api/attendance/sessions/{}", id), member)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"], json!([]));
    }
}
