//! Check-in credentials, student check-in, tutor checkout and absences

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::credentials::{CredentialStore, issue_credential};
use crate::error::{TutoringError, TutoringResult};
use crate::events::{DomainEvent, Outbox, publish_or_log};
use crate::lifecycle::SessionLifecycle;
use crate::models::{
    Attendance, AttendanceCorrection, CheckInCredential, CheckInMethod, Session, SessionStatus,
};
use crate::repository::Repositories;
use crate::settlement::SettlementReport;

/// Minutes of difference between actual and scheduled duration tolerated
/// before a session is flagged for review
pub const DISCREPANCY_THRESHOLD_MINUTES: i64 = 15;

/// `(|actual - scheduled|, flagged)`. Flagged only strictly above the threshold.
pub fn duration_discrepancy(actual_minutes: i64, scheduled_minutes: i64) -> (i64, bool) {
    let discrepancy = (actual_minutes - scheduled_minutes).abs();
    (discrepancy, discrepancy > DISCREPANCY_THRESHOLD_MINUTES)
}

/// What checkout did to the session
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutSummary {
    pub session: Session,
    pub actual_duration: i64,
    pub scheduled_duration: i64,
    pub discrepancy: i64,
    pub flagged_for_review: bool,
    pub marked_absent: Vec<Uuid>,
    pub settlement: SettlementReport,
}

#[derive(Clone)]
pub struct AttendanceEngine {
    repos: Repositories,
    lifecycle: SessionLifecycle,
    credentials: Arc<dyn CredentialStore>,
    outbox: Arc<dyn Outbox>,
    clock: Arc<dyn Clock>,
}

impl AttendanceEngine {
    pub fn new(
        repos: Repositories,
        lifecycle: SessionLifecycle,
        credentials: Arc<dyn CredentialStore>,
        outbox: Arc<dyn Outbox>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            repos,
            lifecycle,
            credentials,
            outbox,
            clock,
        }
    }

    /// Issue a fresh credential, replacing the previous one of that kind
    pub async fn issue_credential(
        &self,
        session_id: Uuid,
        caller: Uuid,
        method: CheckInMethod,
    ) -> TutoringResult<CheckInCredential> {
        let session = self.lifecycle.get(session_id).await?;
        session.ensure_mutable()?;

        if !self.lifecycle.is_lead(&session, caller).await? {
            return Err(TutoringError::forbidden(
                "Only the assigned tutor can issue check-in codes",
            ));
        }

        let credential = issue_credential(session_id, method, self.clock.now());
        self.credentials.put(credential.clone()).await?;

        info!(
            %session_id,
            %method,
            expires_at = %credential.expires_at,
            "Check-in credential issued"
        );
        Ok(credential)
    }

    pub async fn issue_pin(&self, session_id: Uuid, caller: Uuid) -> TutoringResult<CheckInCredential> {
        self.issue_credential(session_id, caller, CheckInMethod::Pin)
            .await
    }

    pub async fn issue_qr(&self, session_id: Uuid, caller: Uuid) -> TutoringResult<CheckInCredential> {
        self.issue_credential(session_id, caller, CheckInMethod::Qr)
            .await
    }

    /// Record a student's arrival with a PIN or QR code
    pub async fn check_in(
        &self,
        session_id: Uuid,
        student_id: Uuid,
        method: CheckInMethod,
        code: &str,
    ) -> TutoringResult<Attendance> {
        let code = code.trim();
        if code.is_empty() {
            return Err(TutoringError::validation("Check-in code is required"));
        }

        let session = self.lifecycle.get(session_id).await?;
        if session.status != SessionStatus::Confirmed {
            return Err(TutoringError::validation(format!(
                "Check-in is only open for confirmed sessions, session is {}",
                session.status
            )));
        }

        if !self
            .repos
            .classes
            .is_active_member(session.class_id, student_id)
            .await?
        {
            return Err(TutoringError::forbidden(
                "Only class members can check in to this session",
            ));
        }

        let now = self.clock.now();
        if now < session.scheduled_start || now > session.scheduled_end {
            return Err(TutoringError::validation(
                "Check-in is only open during the scheduled session time",
            ));
        }

        let credential = self
            .credentials
            .get(session_id, method)
            .await?
            .ok_or_else(|| TutoringError::not_found("Check-in code", session_id))?;
        if credential.is_expired(now) {
            return Err(TutoringError::validation("Check-in code has expired"));
        }
        if credential.code != code {
            warn!(%session_id, %student_id, %method, "Invalid check-in code");
            return Err(TutoringError::validation("Invalid check-in code"));
        }

        if let Some(existing) = self.repos.attendance.find(session_id, student_id).await? {
            if existing.check_in_time.is_some() {
                return Err(TutoringError::conflict(
                    "Student has already checked in to this session",
                ));
            }
        }

        let attendance = self
            .repos
            .attendance
            .record_check_in(session_id, student_id, now)
            .await?;

        info!(%session_id, %student_id, %method, "Student checked in");
        publish_or_log(
            self.outbox.as_ref(),
            DomainEvent::StudentCheckedIn {
                session_id,
                student_id,
            },
        );

        Ok(attendance)
    }

    /// End a session: mark absences, complete it, then settle payments
    pub async fn check_out(&self, session_id: Uuid, caller: Uuid) -> TutoringResult<CheckoutSummary> {
        let mut session = self.lifecycle.get(session_id).await?;

        if !self.lifecycle.is_lead(&session, caller).await? {
            return Err(TutoringError::forbidden(
                "Only the assigned tutor can check out of this session",
            ));
        }
        if session.status != SessionStatus::Confirmed {
            return Err(TutoringError::validation(format!(
                "Only confirmed sessions can be checked out, session is {}",
                session.status
            )));
        }

        let now = self.clock.now();
        if now < session.scheduled_start {
            return Err(TutoringError::validation(
                "Cannot check out before the session has started",
            ));
        }

        let marked_absent = self.mark_absent_unchecked(&session).await?;

        let actual_start = *session.actual_start.get_or_insert(session.scheduled_start);
        session.actual_end = Some(now);

        let actual_duration = (now - actual_start).num_minutes();
        let scheduled_duration = session.scheduled_minutes();
        let (discrepancy, flagged_for_review) =
            duration_discrepancy(actual_duration, scheduled_duration);

        if flagged_for_review {
            let marker = format!(
                "[FLAGGED FOR REVIEW: Duration discrepancy of {} minutes]",
                discrepancy
            );
            session.description = Some(match session.description.take() {
                Some(description) if !description.is_empty() => {
                    format!("{}\n\n{}", description, marker)
                }
                _ => marker,
            });
        }

        let session = self.lifecycle.finish(session).await?;

        if flagged_for_review {
            warn!(
                %session_id,
                actual_duration,
                scheduled_duration,
                discrepancy,
                "Session duration flagged for review"
            );
            publish_or_log(
                self.outbox.as_ref(),
                DomainEvent::SessionFlaggedForReview {
                    session_id,
                    discrepancy_minutes: discrepancy,
                },
            );
        }

        let settlement = self.lifecycle.settlement().settle(session_id).await?;

        info!(
            %session_id,
            %caller,
            actual_duration,
            absent = marked_absent.len(),
            "Session checked out"
        );

        Ok(CheckoutSummary {
            session,
            actual_duration,
            scheduled_duration,
            discrepancy,
            flagged_for_review,
            marked_absent,
            settlement,
        })
    }

    /// Mark every active member without an attendance row as ABSENT.
    ///
    /// Only allowed once the session is over. Returns the newly marked ids.
    pub async fn mark_absent(&self, session_id: Uuid) -> TutoringResult<Vec<Uuid>> {
        let session = self.lifecycle.get(session_id).await?;

        if session.status == SessionStatus::Cancelled {
            return Err(TutoringError::validation(
                "Cannot mark absences for a cancelled session",
            ));
        }
        if self.clock.now() < session.scheduled_end {
            return Err(TutoringError::validation(
                "Cannot mark absences before the session has ended",
            ));
        }

        self.mark_absent_unchecked(&session).await
    }

    /// Manual absence marking by the tutor side or the class creator
    pub async fn mark_absent_as(&self, session_id: Uuid, caller: Uuid) -> TutoringResult<Vec<Uuid>> {
        let session = self.lifecycle.get(session_id).await?;
        if !self.lifecycle.is_lead_or_creator(&session, caller).await? {
            return Err(TutoringError::forbidden(
                "Only the tutor or the class creator can mark absences",
            ));
        }
        self.mark_absent(session_id).await
    }

    /// Absence marking without the end-of-session guard
    pub(crate) async fn mark_absent_unchecked(&self, session: &Session) -> TutoringResult<Vec<Uuid>> {
        let members = self
            .repos
            .classes
            .active_member_ids(session.class_id)
            .await?;
        let recorded: HashSet<Uuid> = self
            .repos
            .attendance
            .list_for_session(session.id)
            .await?
            .into_iter()
            .map(|a| a.student_id)
            .collect();

        let now = self.clock.now();
        let mut marked = Vec::new();
        for student_id in members.into_iter().filter(|id| !recorded.contains(id)) {
            // The store rejects duplicates, so a concurrent sweep cannot double-mark
            if self
                .repos
                .attendance
                .insert_absent(session.id, student_id, now)
                .await?
            {
                marked.push(student_id);
            }
        }

        if !marked.is_empty() {
            info!(session_id = %session.id, count = marked.len(), "Students marked absent");
        }
        Ok(marked)
    }

    /// Manual fix of a student's status or notes by the tutor or class creator
    pub async fn correct_attendance(
        &self,
        session_id: Uuid,
        student_id: Uuid,
        caller: Uuid,
        correction: AttendanceCorrection,
    ) -> TutoringResult<Attendance> {
        let session = self.lifecycle.get(session_id).await?;

        if !self.lifecycle.is_lead_or_creator(&session, caller).await? {
            return Err(TutoringError::forbidden(
                "Only the tutor or the class creator can correct attendance",
            ));
        }

        let now = self.clock.now();
        let mut attendance = match self.repos.attendance.find(session_id, student_id).await? {
            Some(existing) => existing,
            None => {
                if !self
                    .repos
                    .classes
                    .is_active_member(session.class_id, student_id)
                    .await?
                {
                    return Err(TutoringError::not_found("Class member", student_id));
                }
                Attendance::absent(session_id, student_id, now)
            }
        };

        if let Some(status) = correction.status {
            attendance.status = status;
            if status.attended() && attendance.check_in_time.is_none() {
                attendance.check_in_time = Some(now);
            }
        }
        if let Some(notes) = correction.notes {
            attendance.notes = Some(notes);
        }
        attendance.updated_at = now;

        self.repos.attendance.save(&attendance).await?;

        info!(
            %session_id,
            %student_id,
            %caller,
            status = %attendance.status,
            "Attendance corrected"
        );
        Ok(attendance)
    }

    pub async fn list_attendance(&self, session_id: Uuid) -> TutoringResult<Vec<Attendance>> {
        let session = self.lifecycle.get(session_id).await?;
        self.repos.attendance.list_for_session(session.id).await
    }

    /// Attendance of a session, visible to its participants only
    pub async fn list_attendance_as(
        &self,
        session_id: Uuid,
        caller: Uuid,
    ) -> TutoringResult<Vec<Attendance>> {
        let session = self.lifecycle.get_as(session_id, caller).await?;
        self.repos.attendance.list_for_session(session.id).await
    }

    pub(crate) fn credentials(&self) -> &Arc<dyn CredentialStore> {
        &self.credentials
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discrepancy_threshold_is_exclusive() {
        assert_eq!(duration_discrepancy(44, 60), (16, true));
        assert_eq!(duration_discrepancy(46, 60), (14, false));
        assert_eq!(duration_discrepancy(75, 60), (15, false));
        assert_eq!(duration_discrepancy(76, 60), (16, true));
    }
}
