#![allow(dead_code)]

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use api::{AppState, create_router, middleware::Claims, middleware::JwtConfig};
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header},
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{EncodingKey, Header, encode};
use serde_json::{Value, json};
use tower::ServiceExt;
use tutoring::clock::ManualClock;
use tutoring::credentials::InMemoryCredentialStore;
use tutoring::events::RecordingOutbox;
use tutoring::memory::InMemoryStore;
use tutoring::models::{Class, TutorProfile};
use tutoring::repository::Repositories;
use tutoring::settlement::SettlementPolicy;
use tutoring::{Money, TutoringService};
use uuid::Uuid;

pub const SECRET: &[u8] = b"router-test-secret";

/// Monday 2025-06-02 09:00 UTC
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 2, 9, 0, 0).unwrap()
}

pub fn token_for(user_id: Uuid) -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs();
    let claims = Claims {
        sub: user_id,
        roles: Vec::new(),
        iat: now,
        exp: now + 3600,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET)).unwrap()
}

pub struct TestApp {
    pub router: Router,
    pub store: Arc<InMemoryStore>,
    pub clock: Arc<ManualClock>,
    pub class_id: Uuid,
    pub tutor: Uuid,
    pub s1: Uuid,
    pub s2: Uuid,
}

impl TestApp {
    /// A class with two funded students and one tutor, behind the real router
    pub async fn new() -> Self {
        let store = Arc::new(InMemoryStore::new());
        let clock = Arc::new(ManualClock::new(t0()));

        let service = TutoringService::new(
            Repositories::from_store(store.clone()),
            Arc::new(InMemoryCredentialStore::new()),
            Arc::new(RecordingOutbox::new()),
            clock.clone(),
            SettlementPolicy::default(),
        );

        let class_id = Uuid::new_v4();
        let tutor = Uuid::new_v4();
        let s1 = Uuid::new_v4();
        let s2 = Uuid::new_v4();

        store
            .add_class(Class {
                id: class_id,
                creator_id: s1,
                name: "Organic Chemistry".to_string(),
                is_active: true,
            })
            .await;
        store.add_member(class_id, s1).await;
        store.add_member(class_id, s2).await;
        store
            .add_tutor(TutorProfile {
                user_id: tutor,
                hourly_rate: Money::from_cents(4_000),
                total_hours: 0.0,
            })
            .await;
        store.deposit(s1, Money::from_cents(50_000)).await;
        store.deposit(s2, Money::from_cents(50_000)).await;

        let state = AppState {
            service,
            jwt: Arc::new(JwtConfig::hs256(SECRET)),
            clock: clock.clone(),
            db_pool: None,
        };

        Self {
            router: create_router(state),
            store,
            clock,
            class_id,
            tutor,
            s1,
            s2,
        }
    }

    /// Tomorrow 10:00–11:00, priced at 100
    pub fn booking(&self) -> Value {
        json!({
            "classId": self.class_id,
            "tutorId": self.tutor,
            "scheduledStart": t0() + Duration::hours(25),
            "scheduledEnd": t0() + Duration::hours(26),
            "subject": "Stereochemistry",
            "price": 100.0,
        })
    }

    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        user: Option<Uuid>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token_for(user)));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    /// Send a GET with a raw Authorization header and return the status
    pub async fn send_with_authorization(&self, uri: &str, authorization: &str) -> StatusCode {
        let request = Request::builder()
            .uri(uri)
            .header(header::AUTHORIZATION, authorization)
            .body(Body::empty())
            .unwrap();
        self.router.clone().oneshot(request).await.unwrap().status()
    }

    pub async fn get(&self, uri: &str, user: Uuid) -> (StatusCode, Value) {
        self.send(Method::GET, uri, Some(user), None).await
    }

    pub async fn post(&self, uri: &str, user: Uuid, body: Option<Value>) -> (StatusCode, Value) {
        self.send(Method::POST, uri, Some(user), body).await
    }

    pub async fn put(&self, uri: &str, user: Uuid, body: Value) -> (StatusCode, Value) {
        self.send(Method::PUT, uri, Some(user), Some(body)).await
    }

    /// Book as the first student and return the session id
    pub async fn create_session(&self) -> Uuid {
        let (status, body) = self
            .post("/api/sessions", self.s1, Some(self.booking()))
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        body["data"]["id"].as_str().unwrap().parse().unwrap()
    }

    /// Create, confirm and pay for a session with both students
    pub async fn confirmed_paid_session(&self) -> Uuid {
        let id = self.create_session().await;
        let (status, _) = self
            .post(&format!("/api/sessions/{}/confirm", id), self.tutor, None)
            .await;
        assert_eq!(status, StatusCode::OK);

        for student in [self.s1, self.s2] {
            let (status, body) = self
                .post(&format!("/api/sessions/{}/payments", id), student, None)
                .await;
            assert_eq!(status, StatusCode::CREATED, "{}", body);
        }
        id
    }

    pub async fn balance(&self, user: Uuid) -> f64 {
        let (status, body) = self.get("/api/wallet", user).await;
        assert_eq!(status, StatusCode::OK);
        body["data"]["balance"].as_f64().unwrap()
    }
}
