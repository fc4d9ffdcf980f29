#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use tutoring::clock::{Clock, ManualClock};
use tutoring::credentials::InMemoryCredentialStore;
use tutoring::events::RecordingOutbox;
use tutoring::memory::InMemoryStore;
use tutoring::models::{Class, Consortium, ConsortiumMember, NewSession, Session, TutorProfile};
use tutoring::repository::Repositories;
use tutoring::settlement::SettlementPolicy;
use tutoring::{Money, TutoringService};
use uuid::Uuid;

/// Monday 2025-06-02 09:00 UTC
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 2, 9, 0, 0).unwrap()
}

pub fn money(major: i64) -> Money {
    Money::from_cents(major * 100)
}

pub struct Fixture {
    pub store: Arc<InMemoryStore>,
    pub clock: Arc<ManualClock>,
    pub outbox: Arc<RecordingOutbox>,
    pub credentials: Arc<InMemoryCredentialStore>,
    pub service: TutoringService,
    pub class_id: Uuid,
    pub creator: Uuid,
    pub tutor: Uuid,
    pub other_tutor: Uuid,
    pub s1: Uuid,
    pub s2: Uuid,
    pub outsider: Uuid,
}

impl Fixture {
    /// A class with two funded students and two tutors at 40/h
    pub async fn new() -> Self {
        let store = Arc::new(InMemoryStore::new());
        let clock = Arc::new(ManualClock::new(t0()));
        let outbox = Arc::new(RecordingOutbox::new());
        let credentials = Arc::new(InMemoryCredentialStore::new());

        let service = TutoringService::new(
            Repositories::from_store(store.clone()),
            credentials.clone(),
            outbox.clone(),
            clock.clone(),
            SettlementPolicy::default(),
        );

        let creator = Uuid::new_v4();
        let tutor = Uuid::new_v4();
        let other_tutor = Uuid::new_v4();
        let s1 = Uuid::new_v4();
        let s2 = Uuid::new_v4();
        let class_id = Uuid::new_v4();

        store
            .add_class(Class {
                id: class_id,
                creator_id: creator,
                name: "Algebra II".to_string(),
                is_active: true,
            })
            .await;
        store.add_member(class_id, s1).await;
        store.add_member(class_id, s2).await;

        for user_id in [tutor, other_tutor] {
            store
                .add_tutor(TutorProfile {
                    user_id,
                    hourly_rate: money(40),
                    total_hours: 0.0,
                })
                .await;
        }

        store.deposit(s1, money(500)).await;
        store.deposit(s2, money(500)).await;

        Self {
            store,
            clock,
            outbox,
            credentials,
            service,
            class_id,
            creator,
            tutor,
            other_tutor,
            s1,
            s2,
            outsider: Uuid::new_v4(),
        }
    }

    /// Tomorrow 10:00–11:00 with the default tutor, priced at 100
    pub fn booking(&self) -> NewSession {
        NewSession {
            class_id: self.class_id,
            tutor_id: Some(self.tutor),
            consortium_id: None,
            scheduled_start: t0() + Duration::hours(25),
            scheduled_end: t0() + Duration::hours(26),
            subject: "Quadratic equations".to_string(),
            description: None,
            price: money(100),
            location: Some("Room 4".to_string()),
            online_meeting_link: None,
        }
    }

    pub async fn create(&self, request: NewSession) -> Session {
        self.service
            .sessions()
            .create(self.s1, request)
            .await
            .unwrap()
    }

    /// Create, confirm and pay for a session with both students
    pub async fn confirmed_paid_session(&self) -> Session {
        let session = self.create(self.booking()).await;
        let session = self
            .service
            .sessions()
            .confirm(session.id, self.tutor)
            .await
            .unwrap();
        for student in [self.s1, self.s2] {
            self.service
                .settlement()
                .place_hold(session.id, student)
                .await
                .unwrap();
        }
        session
    }

    /// Register a consortium of the two tutors at 70/30
    pub async fn consortium(&self) -> Uuid {
        let consortium_id = Uuid::new_v4();
        self.store
            .add_consortium(
                Consortium {
                    id: consortium_id,
                    name: "Math Collective".to_string(),
                    is_active: true,
                },
                vec![
                    ConsortiumMember {
                        consortium_id,
                        tutor_id: self.tutor,
                        revenue_share: 70.0,
                    },
                    ConsortiumMember {
                        consortium_id,
                        tutor_id: self.other_tutor,
                        revenue_share: 30.0,
                    },
                ],
            )
            .await;
        consortium_id
    }

    pub fn clock_now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub async fn balance(&self, user_id: Uuid) -> Money {
        self.service.wallet_balance(user_id).await.unwrap()
    }
}
