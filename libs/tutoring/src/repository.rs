//! Repository traits for data access abstraction.
//!
//! The engines only talk to the relational store through these traits. The
//! API service implements them on PostgreSQL; [`crate::memory::InMemoryStore`]
//! implements them for tests and local development.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::TutoringResult;
use crate::models::{
    Attendance, Class, Consortium, ConsortiumMember, LedgerCredit, Session, SessionStatus,
    Transaction, TransactionStatus, TutorProfile,
};
use crate::money::Money;

#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Insert a new session. Fails with `Conflict` when the tutor already has
    /// an overlapping PENDING or CONFIRMED session.
    async fn insert(&self, session: &Session) -> TutoringResult<()>;

    async fn find(&self, id: Uuid) -> TutoringResult<Option<Session>>;

    /// Persist `session` only if the stored status still equals `expected`.
    ///
    /// Fails with `Conflict` when another writer changed the status first.
    async fn save(&self, session: &Session, expected: SessionStatus) -> TutoringResult<()>;

    /// PENDING and CONFIRMED sessions of a tutor, optionally excluding one
    async fn committed_for_tutor(
        &self,
        tutor_id: Uuid,
        exclude: Option<Uuid>,
    ) -> TutoringResult<Vec<Session>>;

    /// CONFIRMED sessions whose scheduled end is before `now`
    async fn stale_confirmed(&self, now: DateTime<Utc>) -> TutoringResult<Vec<Session>>;
}

#[async_trait]
pub trait ClassRepository: Send + Sync {
    async fn find_class(&self, id: Uuid) -> TutoringResult<Option<Class>>;

    async fn active_member_ids(&self, class_id: Uuid) -> TutoringResult<Vec<Uuid>>;

    async fn is_active_member(&self, class_id: Uuid, user_id: Uuid) -> TutoringResult<bool>;
}

#[async_trait]
pub trait TutorRepository: Send + Sync {
    async fn find_profile(&self, user_id: Uuid) -> TutoringResult<Option<TutorProfile>>;

    async fn add_hours(&self, user_id: Uuid, hours: f64) -> TutoringResult<()>;

    async fn find_consortium(&self, id: Uuid) -> TutoringResult<Option<Consortium>>;

    async fn consortium_members(&self, consortium_id: Uuid)
    -> TutoringResult<Vec<ConsortiumMember>>;

    /// Replace the revenue policy of a consortium
    async fn replace_consortium_members(
        &self,
        consortium_id: Uuid,
        members: &[ConsortiumMember],
    ) -> TutoringResult<()>;
}

#[async_trait]
pub trait AttendanceRepository: Send + Sync {
    async fn find(&self, session_id: Uuid, student_id: Uuid) -> TutoringResult<Option<Attendance>>;

    async fn list_for_session(&self, session_id: Uuid) -> TutoringResult<Vec<Attendance>>;

    /// Create or update the row to PRESENT with the given check-in time.
    /// Fails with `Conflict` when the row already has a check-in time.
    async fn record_check_in(
        &self,
        session_id: Uuid,
        student_id: Uuid,
        at: DateTime<Utc>,
    ) -> TutoringResult<Attendance>;

    /// Insert an ABSENT row. Returns `false` if a row already existed.
    async fn insert_absent(
        &self,
        session_id: Uuid,
        student_id: Uuid,
        at: DateTime<Utc>,
    ) -> TutoringResult<bool>;

    /// Insert or overwrite a row
    async fn save(&self, attendance: &Attendance) -> TutoringResult<()>;
}

#[async_trait]
pub trait TransactionRepository: Send + Sync {
    /// Debit the student's wallet by `hold.amount` and store the hold, as one
    /// unit. Fails with `Conflict` on insufficient funds or when the student
    /// already has a PENDING hold for the session.
    async fn place_hold(&self, hold: &Transaction, memo: &str) -> TutoringResult<()>;

    async fn pending_for_session(&self, session_id: Uuid) -> TutoringResult<Vec<Transaction>>;

    /// COMPLETED sessions that still have at least one PENDING hold
    async fn completed_with_pending_holds(&self) -> TutoringResult<Vec<Uuid>>;

    async fn pending_for_student(
        &self,
        session_id: Uuid,
        student_id: Uuid,
    ) -> TutoringResult<Option<Transaction>>;

    /// Move a PENDING hold to `to` and apply the wallet credits, as one unit.
    ///
    /// Returns `false` without crediting anything when the hold was no
    /// longer PENDING. `at` becomes the hold's `updated_at`.
    async fn resolve(
        &self,
        hold_id: Uuid,
        to: TransactionStatus,
        credits: &[LedgerCredit],
        at: DateTime<Utc>,
    ) -> TutoringResult<bool>;
}

#[async_trait]
pub trait WalletRepository: Send + Sync {
    async fn balance(&self, user_id: Uuid) -> TutoringResult<Money>;
}

/// Every repository the engines need, as shared trait objects
#[derive(Clone)]
pub struct Repositories {
    pub sessions: Arc<dyn SessionRepository>,
    pub classes: Arc<dyn ClassRepository>,
    pub tutors: Arc<dyn TutorRepository>,
    pub attendance: Arc<dyn AttendanceRepository>,
    pub transactions: Arc<dyn TransactionRepository>,
    pub wallets: Arc<dyn WalletRepository>,
}

impl Repositories {
    /// Use a single store that implements every repository
    pub fn from_store<S>(store: Arc<S>) -> Self
    where
        S: SessionRepository
            + ClassRepository
            + TutorRepository
            + AttendanceRepository
            + TransactionRepository
            + WalletRepository
            + 'static,
    {
        Self {
            sessions: store.clone(),
            classes: store.clone(),
            tutors: store.clone(),
            attendance: store.clone(),
            transactions: store.clone(),
            wallets: store,
        }
    }
}
