//! Session state machine
//!
//! `PENDING → CONFIRMED → COMPLETED`, with `CANCELLED` reachable from both
//! non-terminal states. Every status write is a compare-and-set against the
//! status the transition was validated on.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::availability::AvailabilityChecker;
use crate::clock::Clock;
use crate::error::{TutoringError, TutoringResult};
use crate::events::{DomainEvent, Outbox, publish_or_log};
use crate::models::{Class, NewSession, Session, SessionStatus, SessionUpdate};
use crate::money::Money;
use crate::repository::Repositories;
use crate::settlement::{SettlementEngine, SettlementReport};

/// Result of cancelling a session
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancellationOutcome {
    pub session: Session,
    /// Tier computed on the session price
    pub refund_amount: Money,
    pub refund_percentage: f64,
}

#[derive(Clone)]
pub struct SessionLifecycle {
    repos: Repositories,
    availability: AvailabilityChecker,
    settlement: SettlementEngine,
    outbox: Arc<dyn Outbox>,
    clock: Arc<dyn Clock>,
}

impl SessionLifecycle {
    pub fn new(
        repos: Repositories,
        settlement: SettlementEngine,
        outbox: Arc<dyn Outbox>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            availability: AvailabilityChecker::new(repos.sessions.clone()),
            repos,
            settlement,
            outbox,
            clock,
        }
    }

    pub fn settlement(&self) -> &SettlementEngine {
        &self.settlement
    }

    pub async fn get(&self, session_id: Uuid) -> TutoringResult<Session> {
        self.repos
            .sessions
            .find(session_id)
            .await?
            .ok_or_else(|| TutoringError::not_found("Session", session_id))
    }

    /// Load a session on behalf of a participant
    pub async fn get_as(&self, session_id: Uuid, caller: Uuid) -> TutoringResult<Session> {
        let session = self.get(session_id).await?;
        if !self.is_participant(&session, caller).await? {
            return Err(TutoringError::forbidden(
                "Only session participants can view this session",
            ));
        }
        Ok(session)
    }

    /// Book a new session in PENDING
    pub async fn create(&self, requester: Uuid, request: NewSession) -> TutoringResult<Session> {
        let class = self.active_class(request.class_id).await?;

        if class.creator_id != requester
            && !self
                .repos
                .classes
                .is_active_member(class.id, requester)
                .await?
        {
            return Err(TutoringError::forbidden(
                "Only class members can book sessions for this class",
            ));
        }

        validate_interval(request.scheduled_start, request.scheduled_end)?;
        validate_subject(&request.subject)?;
        if request.price.is_negative() {
            return Err(TutoringError::validation("Price cannot be negative"));
        }

        match (request.tutor_id, request.consortium_id) {
            (Some(tutor_id), None) => {
                if self.repos.tutors.find_profile(tutor_id).await?.is_none() {
                    return Err(TutoringError::not_found("Tutor", tutor_id));
                }
                self.ensure_available(
                    tutor_id,
                    request.scheduled_start,
                    request.scheduled_end,
                    None,
                )
                .await?;
            }
            (None, Some(consortium_id)) => {
                let consortium = self
                    .repos
                    .tutors
                    .find_consortium(consortium_id)
                    .await?
                    .ok_or_else(|| TutoringError::not_found("Consortium", consortium_id))?;
                if !consortium.is_active {
                    return Err(TutoringError::validation(format!(
                        "Consortium {} is not active",
                        consortium_id
                    )));
                }
            }
            _ => {
                return Err(TutoringError::validation(
                    "A session needs exactly one of tutorId or consortiumId",
                ));
            }
        }

        let now = self.clock.now();
        let session = Session {
            id: Uuid::new_v4(),
            class_id: class.id,
            tutor_id: request.tutor_id,
            consortium_id: request.consortium_id,
            scheduled_start: request.scheduled_start,
            scheduled_end: request.scheduled_end,
            actual_start: None,
            actual_end: None,
            subject: request.subject.trim().to_string(),
            description: request.description,
            price: request.price,
            location: request.location,
            online_meeting_link: request.online_meeting_link,
            status: SessionStatus::Pending,
            cancellation_reason: None,
            created_at: now,
            updated_at: now,
        };

        self.repos.sessions.insert(&session).await?;

        info!(
            session_id = %session.id,
            class_id = %session.class_id,
            tutor_id = ?session.tutor_id,
            consortium_id = ?session.consortium_id,
            "Session created"
        );
        publish_or_log(
            self.outbox.as_ref(),
            DomainEvent::SessionCreated {
                session_id: session.id,
                class_id: session.class_id,
                created_by: requester,
                tutor_id: session.tutor_id,
            },
        );

        Ok(session)
    }

    /// PENDING → CONFIRMED by the assigned tutor
    pub async fn confirm(&self, session_id: Uuid, caller: Uuid) -> TutoringResult<Session> {
        let mut session = self.get(session_id).await?;
        session.ensure_mutable()?;

        if !self.is_lead(&session, caller).await? {
            return Err(TutoringError::forbidden(
                "Only the assigned tutor can confirm this session",
            ));
        }
        if session.status != SessionStatus::Pending {
            return Err(TutoringError::validation(format!(
                "Session {} is already {}",
                session.id, session.status
            )));
        }

        if let Some(tutor_id) = session.tutor_id {
            self.ensure_available(
                tutor_id,
                session.scheduled_start,
                session.scheduled_end,
                Some(session.id),
            )
            .await?;
        }

        session.status = SessionStatus::Confirmed;
        session.updated_at = self.clock.now();
        self.repos
            .sessions
            .save(&session, SessionStatus::Pending)
            .await?;

        info!(session_id = %session.id, %caller, "Session confirmed");
        let members = self.repos.classes.active_member_ids(session.class_id).await?;
        publish_or_log(
            self.outbox.as_ref(),
            DomainEvent::SessionConfirmed {
                session_id: session.id,
                subject: session.subject.clone(),
                members,
            },
        );

        Ok(session)
    }

    /// Partial update of non-status fields, including tutor assignment
    pub async fn update(
        &self,
        session_id: Uuid,
        caller: Uuid,
        update: SessionUpdate,
    ) -> TutoringResult<Session> {
        let mut session = self.get(session_id).await?;
        session.ensure_mutable()?;
        let expected = session.status;

        if !self.is_lead_or_creator(&session, caller).await? {
            return Err(TutoringError::forbidden(
                "Only the tutor or the class creator can update this session",
            ));
        }

        let times_changed = update.changes_times();
        if let Some(subject) = update.subject {
            validate_subject(&subject)?;
            session.subject = subject.trim().to_string();
        }
        if let Some(description) = update.description {
            session.description = Some(description);
        }
        if let Some(location) = update.location {
            session.location = Some(location);
        }
        if let Some(link) = update.online_meeting_link {
            session.online_meeting_link = Some(link);
        }
        if let Some(price) = update.price {
            if price.is_negative() {
                return Err(TutoringError::validation("Price cannot be negative"));
            }
            session.price = price;
        }

        if times_changed {
            session.scheduled_start = update.scheduled_start.unwrap_or(session.scheduled_start);
            session.scheduled_end = update.scheduled_end.unwrap_or(session.scheduled_end);
            validate_interval(session.scheduled_start, session.scheduled_end)?;
        }

        let mut assigned = None;
        if let Some(tutor_id) = update.tutor_id {
            if session.tutor_id.is_some() {
                return Err(TutoringError::conflict(
                    "A tutor is already assigned to this session",
                ));
            }
            if let Some(consortium_id) = session.consortium_id {
                let members = self.repos.tutors.consortium_members(consortium_id).await?;
                if !members.iter().any(|m| m.tutor_id == tutor_id) {
                    return Err(TutoringError::validation(format!(
                        "Tutor {} is not a member of consortium {}",
                        tutor_id, consortium_id
                    )));
                }
            }
            let profile = self
                .repos
                .tutors
                .find_profile(tutor_id)
                .await?
                .ok_or_else(|| TutoringError::not_found("Tutor", tutor_id))?;

            session.tutor_id = Some(tutor_id);
            session.price = profile.hourly_rate.scale(session.scheduled_minutes(), 60);
            assigned = Some(tutor_id);
        }

        if let Some(tutor_id) = session.tutor_id {
            if times_changed || assigned.is_some() {
                self.ensure_available(
                    tutor_id,
                    session.scheduled_start,
                    session.scheduled_end,
                    Some(session.id),
                )
                .await?;
            }
        }

        if times_changed && session.status == SessionStatus::Confirmed {
            session.status = SessionStatus::Pending;
        }
        session.updated_at = self.clock.now();
        self.repos.sessions.save(&session, expected).await?;

        info!(
            session_id = %session.id,
            %caller,
            times_changed,
            tutor_assigned = assigned.is_some(),
            "Session updated"
        );

        if let Some(tutor_id) = assigned {
            let members = self.repos.classes.active_member_ids(session.class_id).await?;
            publish_or_log(
                self.outbox.as_ref(),
                DomainEvent::TutorAssigned {
                    session_id: session.id,
                    tutor_id,
                    members,
                },
            );
        }
        if times_changed {
            self.publish_rescheduled(&session).await?;
        }

        Ok(session)
    }

    /// Move a session. Confirmed sessions need to be confirmed again.
    pub async fn reschedule(
        &self,
        session_id: Uuid,
        caller: Uuid,
        scheduled_start: DateTime<Utc>,
        scheduled_end: DateTime<Utc>,
    ) -> TutoringResult<Session> {
        let mut session = self.get(session_id).await?;
        session.ensure_mutable()?;
        let expected = session.status;

        if !self.is_lead_or_creator(&session, caller).await? {
            return Err(TutoringError::forbidden(
                "Only the tutor or the class creator can reschedule this session",
            ));
        }
        validate_interval(scheduled_start, scheduled_end)?;

        if let Some(tutor_id) = session.tutor_id {
            self.ensure_available(tutor_id, scheduled_start, scheduled_end, Some(session.id))
                .await?;
        }

        session.scheduled_start = scheduled_start;
        session.scheduled_end = scheduled_end;
        if session.status == SessionStatus::Confirmed {
            session.status = SessionStatus::Pending;
        }
        session.updated_at = self.clock.now();
        self.repos.sessions.save(&session, expected).await?;

        info!(
            session_id = %session.id,
            %caller,
            %scheduled_start,
            %scheduled_end,
            previous_status = %expected,
            "Session rescheduled"
        );
        self.publish_rescheduled(&session).await?;

        Ok(session)
    }

    /// Status endpoint entry point
    pub async fn update_status(
        &self,
        session_id: Uuid,
        caller: Uuid,
        status: SessionStatus,
        reason: Option<String>,
    ) -> TutoringResult<Session> {
        match status {
            SessionStatus::Confirmed => self.confirm(session_id, caller).await,
            SessionStatus::Completed => self.complete(session_id, caller).await,
            SessionStatus::Cancelled => Ok(self.cancel(session_id, caller, reason).await?.session),
            SessionStatus::Pending => Err(TutoringError::validation(
                "Sessions cannot be moved back to PENDING explicitly",
            )),
        }
    }

    /// Cancel and refund pending holds according to the notice period
    pub async fn cancel(
        &self,
        session_id: Uuid,
        caller: Uuid,
        reason: Option<String>,
    ) -> TutoringResult<CancellationOutcome> {
        let mut session = self.get(session_id).await?;
        session.ensure_mutable()?;
        let expected = session.status;

        if !self.is_participant(&session, caller).await? {
            return Err(TutoringError::forbidden(
                "Only session participants can cancel this session",
            ));
        }

        let tier = self.settlement.refund_tier(&session);

        session.status = SessionStatus::Cancelled;
        session.cancellation_reason = reason.clone();
        session.updated_at = self.clock.now();
        self.repos.sessions.save(&session, expected).await?;

        info!(
            session_id = %session.id,
            %caller,
            refund_percentage = tier.percentage,
            refund_amount = %tier.amount,
            "Session cancelled"
        );

        let refunds = self
            .settlement
            .refund_cancellation(&session, tier.percentage)
            .await?;
        debug!(session_id = %session.id, refunds = refunds.len(), "Cancellation refunds issued");

        let recipients = self.participants(&session).await?;
        publish_or_log(
            self.outbox.as_ref(),
            DomainEvent::SessionCancelled {
                session_id: session.id,
                reason,
                refund_percentage: tier.percentage,
                recipients,
            },
        );

        Ok(CancellationOutcome {
            session,
            refund_amount: tier.amount,
            refund_percentage: tier.percentage,
        })
    }

    /// CONFIRMED → COMPLETED by the tutor or class creator, then settle
    pub async fn complete(&self, session_id: Uuid, caller: Uuid) -> TutoringResult<Session> {
        let session = self.get(session_id).await?;
        session.ensure_mutable()?;

        if !self.is_lead_or_creator(&session, caller).await? {
            return Err(TutoringError::forbidden(
                "Only the tutor or the class creator can complete this session",
            ));
        }
        if session.status != SessionStatus::Confirmed {
            return Err(TutoringError::validation(format!(
                "Only confirmed sessions can be completed, session is {}",
                session.status
            )));
        }

        let session = self.finish(session).await?;
        self.settlement.settle(session.id).await?;
        Ok(session)
    }

    /// Re-run settlement of a completed session after a partial failure
    pub async fn retry_settlement(
        &self,
        session_id: Uuid,
        caller: Uuid,
    ) -> TutoringResult<SettlementReport> {
        let session = self.get(session_id).await?;
        if !self.is_lead_or_creator(&session, caller).await? {
            return Err(TutoringError::forbidden(
                "Only the tutor or the class creator can settle this session",
            ));
        }
        if session.status != SessionStatus::Completed {
            return Err(TutoringError::validation(format!(
                "Only completed sessions can be settled, session is {}",
                session.status
            )));
        }

        info!(%session_id, %caller, "Settlement retried");
        self.settlement.settle(session_id).await
    }

    /// Flip a CONFIRMED session to COMPLETED and accrue tutor hours.
    ///
    /// Settlement is left to the caller.
    pub(crate) async fn finish(&self, mut session: Session) -> TutoringResult<Session> {
        session.status = SessionStatus::Completed;
        session.updated_at = self.clock.now();
        self.repos
            .sessions
            .save(&session, SessionStatus::Confirmed)
            .await?;

        let hours = session_hours(&session);
        if let Some(tutor_id) = session.tutor_id {
            self.repos.tutors.add_hours(tutor_id, hours).await?;
        }

        info!(
            session_id = %session.id,
            tutor_id = ?session.tutor_id,
            hours,
            "Session completed"
        );
        publish_or_log(
            self.outbox.as_ref(),
            DomainEvent::SessionCompleted {
                session_id: session.id,
                tutor_id: session.tutor_id,
                hours,
            },
        );

        Ok(session)
    }

    /// Assigned tutor, or any member of the assigned consortium
    pub(crate) async fn is_lead(&self, session: &Session, user: Uuid) -> TutoringResult<bool> {
        if session.tutor_id == Some(user) {
            return Ok(true);
        }
        match session.consortium_id {
            Some(consortium_id) => Ok(self
                .repos
                .tutors
                .consortium_members(consortium_id)
                .await?
                .iter()
                .any(|m| m.tutor_id == user)),
            None => Ok(false),
        }
    }

    pub(crate) async fn is_lead_or_creator(
        &self,
        session: &Session,
        user: Uuid,
    ) -> TutoringResult<bool> {
        if self.is_lead(session, user).await? {
            return Ok(true);
        }
        Ok(self
            .repos
            .classes
            .find_class(session.class_id)
            .await?
            .is_some_and(|class| class.creator_id == user))
    }

    /// Lead, class creator or active class member
    pub(crate) async fn is_participant(&self, session: &Session, user: Uuid) -> TutoringResult<bool> {
        Ok(self.is_lead_or_creator(session, user).await?
            || self
                .repos
                .classes
                .is_active_member(session.class_id, user)
                .await?)
    }

    async fn active_class(&self, class_id: Uuid) -> TutoringResult<Class> {
        let class = self
            .repos
            .classes
            .find_class(class_id)
            .await?
            .ok_or_else(|| TutoringError::not_found("Class", class_id))?;
        if !class.is_active {
            return Err(TutoringError::validation(format!(
                "Class {} is not active",
                class_id
            )));
        }
        Ok(class)
    }

    async fn ensure_available(
        &self,
        tutor_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exclude: Option<Uuid>,
    ) -> TutoringResult<()> {
        if !self
            .availability
            .is_available(tutor_id, start, end, exclude)
            .await?
        {
            warn!(%tutor_id, %start, %end, "Double booking rejected");
            return Err(TutoringError::conflict(
                "Tutor is not available at the requested time",
            ));
        }
        Ok(())
    }

    /// Class members, the tutor side and the class creator
    async fn participants(&self, session: &Session) -> TutoringResult<Vec<Uuid>> {
        let mut recipients = self.repos.classes.active_member_ids(session.class_id).await?;
        if let Some(tutor_id) = session.tutor_id {
            recipients.push(tutor_id);
        }
        if let Some(consortium_id) = session.consortium_id {
            recipients.extend(
                self.repos
                    .tutors
                    .consortium_members(consortium_id)
                    .await?
                    .into_iter()
                    .map(|m| m.tutor_id),
            );
        }
        if let Some(class) = self.repos.classes.find_class(session.class_id).await? {
            recipients.push(class.creator_id);
        }
        recipients.sort();
        recipients.dedup();
        Ok(recipients)
    }

    async fn publish_rescheduled(&self, session: &Session) -> TutoringResult<()> {
        let recipients = self.participants(session).await?;
        publish_or_log(
            self.outbox.as_ref(),
            DomainEvent::SessionRescheduled {
                session_id: session.id,
                scheduled_start: session.scheduled_start,
                recipients,
            },
        );
        Ok(())
    }
}

/// Hours to accrue: the actual duration when known, the scheduled one otherwise
pub fn session_hours(session: &Session) -> f64 {
    let (start, end) = match (session.actual_start, session.actual_end) {
        (Some(start), Some(end)) => (start, end),
        _ => (session.scheduled_start, session.scheduled_end),
    };
    ((end - start).num_seconds().max(0) as f64) / 3600.0
}

fn validate_interval(start: DateTime<Utc>, end: DateTime<Utc>) -> TutoringResult<()> {
    if end <= start {
        return Err(TutoringError::validation(
            "Scheduled end must be after scheduled start",
        ));
    }
    Ok(())
}

fn validate_subject(subject: &str) -> TutoringResult<()> {
    if subject.trim().is_empty() {
        return Err(TutoringError::validation("Subject is required"));
    }
    Ok(())
}
