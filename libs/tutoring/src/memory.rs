//! In-memory implementation of every repository trait
//!
//! Used by the test-suite and by the API's `memory` storage backend. All
//! state sits behind one async mutex, so each repository call is atomic the
//! way a single database transaction would be.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::availability::intervals_overlap;
use crate::badges::{attendance_badges, tutor_badges};
use crate::error::{TutoringError, TutoringResult};
use crate::events::BadgeChecker;
use crate::models::{
    Attendance, AttendanceStatus, Class, ClassMember, Consortium, ConsortiumMember, LedgerCredit,
    Session, SessionStatus, Transaction, TransactionStatus, TutorProfile,
};
use crate::money::Money;
use crate::repository::{
    AttendanceRepository, ClassRepository, SessionRepository, TransactionRepository,
    TutorRepository, WalletRepository,
};

/// One wallet movement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletEntry {
    pub user_id: Uuid,
    /// Positive for credits, negative for debits
    pub amount: Money,
    pub memo: String,
}

#[derive(Default)]
struct State {
    sessions: HashMap<Uuid, Session>,
    classes: HashMap<Uuid, Class>,
    members: Vec<ClassMember>,
    tutors: HashMap<Uuid, TutorProfile>,
    consortia: HashMap<Uuid, Consortium>,
    consortium_members: HashMap<Uuid, Vec<ConsortiumMember>>,
    attendance: HashMap<(Uuid, Uuid), Attendance>,
    transactions: HashMap<Uuid, Transaction>,
    balances: HashMap<Uuid, Money>,
    ledger: Vec<WalletEntry>,
    badges: HashMap<Uuid, HashSet<&'static str>>,
}

impl State {
    fn apply_credit(&mut self, user_id: Uuid, amount: Money, memo: &str) {
        let balance = self.balances.entry(user_id).or_default();
        *balance = *balance + amount;
        self.ledger.push(WalletEntry {
            user_id,
            amount,
            memo: memo.to_string(),
        });
    }

    fn award(&mut self, user_id: Uuid, badges: Vec<&'static str>) -> Vec<String> {
        let owned = self.badges.entry(user_id).or_default();
        badges
            .into_iter()
            .filter(|badge| owned.insert(*badge))
            .map(str::to_string)
            .collect()
    }

    fn tutor_conflict(&self, session: &Session) -> Option<Uuid> {
        let tutor_id = session.tutor_id?;
        self.sessions
            .values()
            .filter(|s| s.id != session.id)
            .filter(|s| s.tutor_id == Some(tutor_id) && s.status.is_committed())
            .find(|s| {
                intervals_overlap(
                    s.scheduled_start,
                    s.scheduled_end,
                    session.scheduled_start,
                    session.scheduled_end,
                )
            })
            .map(|s| s.id)
    }
}

/// Process-local store
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_class(&self, class: Class) {
        self.state.lock().await.classes.insert(class.id, class);
    }

    pub async fn add_member(&self, class_id: Uuid, student_id: Uuid) {
        self.state.lock().await.members.push(ClassMember {
            class_id,
            student_id,
            is_active: true,
        });
    }

    /// Deactivate a membership without deleting it
    pub async fn deactivate_member(&self, class_id: Uuid, student_id: Uuid) {
        let mut state = self.state.lock().await;
        for member in state
            .members
            .iter_mut()
            .filter(|m| m.class_id == class_id && m.student_id == student_id)
        {
            member.is_active = false;
        }
    }

    pub async fn add_tutor(&self, profile: TutorProfile) {
        self.state
            .lock()
            .await
            .tutors
            .insert(profile.user_id, profile);
    }

    pub async fn add_consortium(&self, consortium: Consortium, members: Vec<ConsortiumMember>) {
        let mut state = self.state.lock().await;
        state.consortium_members.insert(consortium.id, members);
        state.consortia.insert(consortium.id, consortium);
    }

    pub async fn deposit(&self, user_id: Uuid, amount: Money) {
        self.state
            .lock()
            .await
            .apply_credit(user_id, amount, "deposit");
    }

    pub async fn transaction(&self, id: Uuid) -> Option<Transaction> {
        self.state.lock().await.transactions.get(&id).cloned()
    }

    pub async fn transactions_for_session(&self, session_id: Uuid) -> Vec<Transaction> {
        self.state
            .lock()
            .await
            .transactions
            .values()
            .filter(|t| t.session_id == session_id)
            .cloned()
            .collect()
    }

    pub async fn badges(&self, user_id: Uuid) -> Vec<String> {
        let mut badges: Vec<String> = self
            .state
            .lock()
            .await
            .badges
            .get(&user_id)
            .map(|owned| owned.iter().map(|b| b.to_string()).collect())
            .unwrap_or_default();
        badges.sort();
        badges
    }

    pub async fn wallet_entries(&self, user_id: Uuid) -> Vec<WalletEntry> {
        self.state
            .lock()
            .await
            .ledger
            .iter()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl SessionRepository for InMemoryStore {
    async fn insert(&self, session: &Session) -> TutoringResult<()> {
        let mut state = self.state.lock().await;
        if state.sessions.contains_key(&session.id) {
            return Err(TutoringError::conflict(format!(
                "Session {} already exists",
                session.id
            )));
        }
        if session.status.is_committed() {
            if let Some(other) = state.tutor_conflict(session) {
                return Err(TutoringError::conflict(format!(
                    "Tutor is already booked by session {}",
                    other
                )));
            }
        }
        state.sessions.insert(session.id, session.clone());
        Ok(())
    }

    async fn find(&self, id: Uuid) -> TutoringResult<Option<Session>> {
        Ok(self.state.lock().await.sessions.get(&id).cloned())
    }

    async fn save(&self, session: &Session, expected: SessionStatus) -> TutoringResult<()> {
        let mut state = self.state.lock().await;
        let current = state
            .sessions
            .get(&session.id)
            .map(|s| s.status)
            .ok_or_else(|| TutoringError::not_found("Session", session.id))?;
        if current != expected {
            return Err(TutoringError::conflict(format!(
                "Session {} changed to {} concurrently",
                session.id, current
            )));
        }
        if session.status.is_committed() {
            if let Some(other) = state.tutor_conflict(session) {
                return Err(TutoringError::conflict(format!(
                    "Tutor is already booked by session {}",
                    other
                )));
            }
        }
        state.sessions.insert(session.id, session.clone());
        Ok(())
    }

    async fn committed_for_tutor(
        &self,
        tutor_id: Uuid,
        exclude: Option<Uuid>,
    ) -> TutoringResult<Vec<Session>> {
        let state = self.state.lock().await;
        Ok(state
            .sessions
            .values()
            .filter(|s| s.tutor_id == Some(tutor_id) && s.status.is_committed())
            .filter(|s| Some(s.id) != exclude)
            .cloned()
            .collect())
    }

    async fn stale_confirmed(&self, now: DateTime<Utc>) -> TutoringResult<Vec<Session>> {
        let state = self.state.lock().await;
        let mut stale: Vec<Session> = state
            .sessions
            .values()
            .filter(|s| s.status == SessionStatus::Confirmed && s.scheduled_end < now)
            .cloned()
            .collect();
        stale.sort_by_key(|s| s.scheduled_end);
        Ok(stale)
    }
}

#[async_trait]
impl ClassRepository for InMemoryStore {
    async fn find_class(&self, id: Uuid) -> TutoringResult<Option<Class>> {
        Ok(self.state.lock().await.classes.get(&id).cloned())
    }

    async fn active_member_ids(&self, class_id: Uuid) -> TutoringResult<Vec<Uuid>> {
        let state = self.state.lock().await;
        let mut ids: Vec<Uuid> = state
            .members
            .iter()
            .filter(|m| m.class_id == class_id && m.is_active)
            .map(|m| m.student_id)
            .collect();
        ids.sort();
        ids.dedup();
        Ok(ids)
    }

    async fn is_active_member(&self, class_id: Uuid, user_id: Uuid) -> TutoringResult<bool> {
        let state = self.state.lock().await;
        Ok(state
            .members
            .iter()
            .any(|m| m.class_id == class_id && m.student_id == user_id && m.is_active))
    }
}

#[async_trait]
impl TutorRepository for InMemoryStore {
    async fn find_profile(&self, user_id: Uuid) -> TutoringResult<Option<TutorProfile>> {
        Ok(self.state.lock().await.tutors.get(&user_id).cloned())
    }

    async fn add_hours(&self, user_id: Uuid, hours: f64) -> TutoringResult<()> {
        let mut state = self.state.lock().await;
        let profile = state
            .tutors
            .get_mut(&user_id)
            .ok_or_else(|| TutoringError::not_found("Tutor", user_id))?;
        profile.total_hours += hours;
        Ok(())
    }

    async fn find_consortium(&self, id: Uuid) -> TutoringResult<Option<Consortium>> {
        Ok(self.state.lock().await.consortia.get(&id).cloned())
    }

    async fn consortium_members(
        &self,
        consortium_id: Uuid,
    ) -> TutoringResult<Vec<ConsortiumMember>> {
        Ok(self
            .state
            .lock()
            .await
            .consortium_members
            .get(&consortium_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn replace_consortium_members(
        &self,
        consortium_id: Uuid,
        members: &[ConsortiumMember],
    ) -> TutoringResult<()> {
        let mut state = self.state.lock().await;
        if !state.consortia.contains_key(&consortium_id) {
            return Err(TutoringError::not_found("Consortium", consortium_id));
        }
        state
            .consortium_members
            .insert(consortium_id, members.to_vec());
        Ok(())
    }
}

#[async_trait]
impl AttendanceRepository for InMemoryStore {
    async fn find(&self, session_id: Uuid, student_id: Uuid) -> TutoringResult<Option<Attendance>> {
        Ok(self
            .state
            .lock()
            .await
            .attendance
            .get(&(session_id, student_id))
            .cloned())
    }

    async fn list_for_session(&self, session_id: Uuid) -> TutoringResult<Vec<Attendance>> {
        let state = self.state.lock().await;
        let mut rows: Vec<Attendance> = state
            .attendance
            .values()
            .filter(|a| a.session_id == session_id)
            .cloned()
            .collect();
        rows.sort_by_key(|a| (a.created_at, a.student_id));
        Ok(rows)
    }

    async fn record_check_in(
        &self,
        session_id: Uuid,
        student_id: Uuid,
        at: DateTime<Utc>,
    ) -> TutoringResult<Attendance> {
        let mut state = self.state.lock().await;
        match state.attendance.get_mut(&(session_id, student_id)) {
            Some(row) if row.check_in_time.is_some() => Err(TutoringError::conflict(
                "Student has already checked in to this session",
            )),
            Some(row) => {
                row.status = AttendanceStatus::Present;
                row.check_in_time = Some(at);
                row.updated_at = at;
                Ok(row.clone())
            }
            None => {
                let row = Attendance::present(session_id, student_id, at);
                state.attendance.insert((session_id, student_id), row.clone());
                Ok(row)
            }
        }
    }

    async fn insert_absent(
        &self,
        session_id: Uuid,
        student_id: Uuid,
        at: DateTime<Utc>,
    ) -> TutoringResult<bool> {
        let mut state = self.state.lock().await;
        let key = (session_id, student_id);
        if state.attendance.contains_key(&key) {
            return Ok(false);
        }
        state
            .attendance
            .insert(key, Attendance::absent(session_id, student_id, at));
        Ok(true)
    }

    async fn save(&self, attendance: &Attendance) -> TutoringResult<()> {
        self.state.lock().await.attendance.insert(
            (attendance.session_id, attendance.student_id),
            attendance.clone(),
        );
        Ok(())
    }
}

#[async_trait]
impl TransactionRepository for InMemoryStore {
    async fn place_hold(&self, hold: &Transaction, memo: &str) -> TutoringResult<()> {
        let mut state = self.state.lock().await;
        let duplicate = state.transactions.values().any(|t| {
            t.session_id == hold.session_id
                && t.student_id == hold.student_id
                && t.status == TransactionStatus::Pending
        });
        if duplicate {
            return Err(TutoringError::conflict(
                "A payment for this session is already pending",
            ));
        }

        let balance = state
            .balances
            .get(&hold.student_id)
            .copied()
            .unwrap_or_default();
        if balance < hold.amount {
            return Err(TutoringError::conflict(format!(
                "Insufficient wallet balance: {} available, {} required",
                balance, hold.amount
            )));
        }

        state.apply_credit(hold.student_id, Money::ZERO - hold.amount, memo);
        state.transactions.insert(hold.id, hold.clone());
        Ok(())
    }

    async fn pending_for_session(&self, session_id: Uuid) -> TutoringResult<Vec<Transaction>> {
        let state = self.state.lock().await;
        let mut pending: Vec<Transaction> = state
            .transactions
            .values()
            .filter(|t| t.session_id == session_id && t.status == TransactionStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by_key(|t| t.created_at);
        Ok(pending)
    }

    async fn completed_with_pending_holds(&self) -> TutoringResult<Vec<Uuid>> {
        let state = self.state.lock().await;
        let mut ids: Vec<Uuid> = state
            .transactions
            .values()
            .filter(|t| t.status == TransactionStatus::Pending)
            .map(|t| t.session_id)
            .filter(|id| {
                state
                    .sessions
                    .get(id)
                    .is_some_and(|s| s.status == SessionStatus::Completed)
            })
            .collect();
        ids.sort();
        ids.dedup();
        Ok(ids)
    }

    async fn pending_for_student(
        &self,
        session_id: Uuid,
        student_id: Uuid,
    ) -> TutoringResult<Option<Transaction>> {
        let state = self.state.lock().await;
        Ok(state
            .transactions
            .values()
            .find(|t| {
                t.session_id == session_id
                    && t.student_id == student_id
                    && t.status == TransactionStatus::Pending
            })
            .cloned())
    }

    async fn resolve(
        &self,
        hold_id: Uuid,
        to: TransactionStatus,
        credits: &[LedgerCredit],
        at: DateTime<Utc>,
    ) -> TutoringResult<bool> {
        let mut state = self.state.lock().await;
        let hold = state
            .transactions
            .get_mut(&hold_id)
            .ok_or_else(|| TutoringError::not_found("Transaction", hold_id))?;
        if hold.status != TransactionStatus::Pending {
            return Ok(false);
        }
        hold.status = to;
        hold.updated_at = at;

        for credit in credits {
            state.apply_credit(credit.user_id, credit.amount, &credit.memo);
        }
        Ok(true)
    }
}

#[async_trait]
impl WalletRepository for InMemoryStore {
    async fn balance(&self, user_id: Uuid) -> TutoringResult<Money> {
        Ok(self
            .state
            .lock()
            .await
            .balances
            .get(&user_id)
            .copied()
            .unwrap_or_default())
    }
}

#[async_trait]
impl BadgeChecker for InMemoryStore {
    async fn check_attendance_badges(&self, student_id: Uuid) -> TutoringResult<Vec<String>> {
        let mut state = self.state.lock().await;
        let rows = state
            .attendance
            .values()
            .filter(|a| a.student_id == student_id);
        let (attended, total) = rows.fold((0, 0), |(attended, total), row| {
            (attended + i64::from(row.status.attended()), total + 1)
        });
        Ok(state.award(student_id, attendance_badges(attended, total)))
    }

    async fn check_tutor_badges(&self, tutor_id: Uuid) -> TutoringResult<Vec<String>> {
        let mut state = self.state.lock().await;
        let hours = match state.tutors.get(&tutor_id) {
            Some(profile) => profile.total_hours,
            None => return Ok(Vec::new()),
        };
        Ok(state.award(tutor_id, tutor_badges(hours)))
    }
}
