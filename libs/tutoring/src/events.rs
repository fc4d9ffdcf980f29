//! Domain events and the side-effect outbox
//!
//! Engines never call the notification or badge collaborators directly.
//! They append a [`DomainEvent`] to an [`Outbox`]; a [`SideEffectWorker`]
//! drains it and performs the side effects with its own retry policy. A
//! failing side effect never fails the operation that produced the event.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::{TutoringError, TutoringResult};
use crate::money::Money;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum DomainEvent {
    SessionCreated {
        session_id: Uuid,
        class_id: Uuid,
        created_by: Uuid,
        tutor_id: Option<Uuid>,
    },
    SessionConfirmed {
        session_id: Uuid,
        subject: String,
        members: Vec<Uuid>,
    },
    TutorAssigned {
        session_id: Uuid,
        tutor_id: Uuid,
        members: Vec<Uuid>,
    },
    SessionRescheduled {
        session_id: Uuid,
        scheduled_start: DateTime<Utc>,
        recipients: Vec<Uuid>,
    },
    SessionCancelled {
        session_id: Uuid,
        reason: Option<String>,
        refund_percentage: f64,
        recipients: Vec<Uuid>,
    },
    SessionCompleted {
        session_id: Uuid,
        tutor_id: Option<Uuid>,
        hours: f64,
    },
    SessionFlaggedForReview {
        session_id: Uuid,
        discrepancy_minutes: i64,
    },
    StudentCheckedIn {
        session_id: Uuid,
        student_id: Uuid,
    },
    PaymentReleased {
        session_id: Uuid,
        recipient_id: Uuid,
        amount: Money,
    },
    PaymentRefunded {
        session_id: Uuid,
        student_id: Uuid,
        amount: Money,
    },
}

impl DomainEvent {
    pub fn session_id(&self) -> Uuid {
        match self {
            DomainEvent::SessionCreated { session_id, .. }
            | DomainEvent::SessionConfirmed { session_id, .. }
            | DomainEvent::TutorAssigned { session_id, .. }
            | DomainEvent::SessionRescheduled { session_id, .. }
            | DomainEvent::SessionCancelled { session_id, .. }
            | DomainEvent::SessionCompleted { session_id, .. }
            | DomainEvent::SessionFlaggedForReview { session_id, .. }
            | DomainEvent::StudentCheckedIn { session_id, .. }
            | DomainEvent::PaymentReleased { session_id, .. }
            | DomainEvent::PaymentRefunded { session_id, .. } => *session_id,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DomainEvent::SessionCreated { .. } => "session_created",
            DomainEvent::SessionConfirmed { .. } => "session_confirmed",
            DomainEvent::TutorAssigned { .. } => "tutor_assigned",
            DomainEvent::SessionRescheduled { .. } => "session_rescheduled",
            DomainEvent::SessionCancelled { .. } => "session_cancelled",
            DomainEvent::SessionCompleted { .. } => "session_completed",
            DomainEvent::SessionFlaggedForReview { .. } => "session_flagged_for_review",
            DomainEvent::StudentCheckedIn { .. } => "student_checked_in",
            DomainEvent::PaymentReleased { .. } => "payment_released",
            DomainEvent::PaymentRefunded { .. } => "payment_refunded",
        }
    }
}

/// Append-only sink for domain events. Publishing must not block.
pub trait Outbox: Send + Sync {
    fn publish(&self, event: DomainEvent) -> TutoringResult<()>;
}

/// Publish an event, logging instead of failing when the outbox rejects it
pub fn publish_or_log(outbox: &dyn Outbox, event: DomainEvent) {
    let name = event.name();
    let session_id = event.session_id();
    if let Err(e) = outbox.publish(event) {
        warn!(event = name, %session_id, error = %e, "Failed to publish domain event");
    }
}

/// Outbox backed by an unbounded channel, drained by [`SideEffectWorker`]
#[derive(Clone)]
pub struct ChannelOutbox {
    sender: mpsc::UnboundedSender<DomainEvent>,
}

impl ChannelOutbox {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<DomainEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl Outbox for ChannelOutbox {
    fn publish(&self, event: DomainEvent) -> TutoringResult<()> {
        self.sender
            .send(event)
            .map_err(|_| TutoringError::SideEffect("outbox consumer has stopped".to_string()))
    }
}

/// Outbox that keeps every event in memory, for inspection in tests
#[derive(Debug, Default)]
pub struct RecordingOutbox {
    events: Mutex<Vec<DomainEvent>>,
}

impl RecordingOutbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<DomainEvent> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn take(&self) -> Vec<DomainEvent> {
        std::mem::take(&mut *self.events.lock().unwrap_or_else(|e| e.into_inner()))
    }
}

impl Outbox for RecordingOutbox {
    fn publish(&self, event: DomainEvent) -> TutoringResult<()> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event);
        Ok(())
    }
}

/// A user-facing notification
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub recipient_id: Uuid,
    pub kind: &'static str,
    pub title: String,
    pub message: String,
    pub session_id: Uuid,
}

#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn create_notification(&self, notification: Notification) -> TutoringResult<()>;

    async fn create_bulk_notifications(
        &self,
        notifications: Vec<Notification>,
    ) -> TutoringResult<()>;
}

/// Awards gamification badges
#[async_trait]
pub trait BadgeChecker: Send + Sync {
    /// Re-check attendance-rate badges of a student
    async fn check_attendance_badges(&self, student_id: Uuid) -> TutoringResult<Vec<String>>;

    /// Re-check teaching-hours badges of a tutor
    async fn check_tutor_badges(&self, tutor_id: Uuid) -> TutoringResult<Vec<String>>;
}

/// Dispatcher that only writes notifications to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotificationDispatcher;

#[async_trait]
impl NotificationDispatcher for LogNotificationDispatcher {
    async fn create_notification(&self, notification: Notification) -> TutoringResult<()> {
        info!(
            recipient = %notification.recipient_id,
            kind = notification.kind,
            session_id = %notification.session_id,
            "{}",
            notification.message
        );
        Ok(())
    }

    async fn create_bulk_notifications(
        &self,
        notifications: Vec<Notification>,
    ) -> TutoringResult<()> {
        for notification in notifications {
            self.create_notification(notification).await?;
        }
        Ok(())
    }
}

fn notify_all(
    recipients: &[Uuid],
    kind: &'static str,
    title: &str,
    message: String,
    session_id: Uuid,
) -> Vec<Notification> {
    recipients
        .iter()
        .map(|recipient_id| Notification {
            recipient_id: *recipient_id,
            kind,
            title: title.to_string(),
            message: message.clone(),
            session_id,
        })
        .collect()
}

/// Notifications a domain event should produce
pub fn notifications_for(event: &DomainEvent) -> Vec<Notification> {
    match event {
        DomainEvent::SessionConfirmed {
            session_id,
            subject,
            members,
        } => notify_all(
            members,
            "session_confirmed",
            "Session confirmed",
            format!("Your {} session has been confirmed by the tutor", subject),
            *session_id,
        ),
        DomainEvent::TutorAssigned {
            session_id,
            tutor_id,
            members,
        } => {
            let mut notifications = notify_all(
                &[*tutor_id],
                "tutor_assigned",
                "New session assignment",
                "You have been assigned to a session".to_string(),
                *session_id,
            );
            notifications.extend(notify_all(
                members,
                "tutor_assigned",
                "Tutor assigned",
                "A tutor has been assigned to your session".to_string(),
                *session_id,
            ));
            notifications
        }
        DomainEvent::SessionRescheduled {
            session_id,
            scheduled_start,
            recipients,
        } => notify_all(
            recipients,
            "session_rescheduled",
            "Session rescheduled",
            format!(
                "Your session now starts at {}",
                scheduled_start.format("%Y-%m-%d %H:%M UTC")
            ),
            *session_id,
        ),
        DomainEvent::SessionCancelled {
            session_id,
            reason,
            refund_percentage,
            recipients,
        } => notify_all(
            recipients,
            "session_cancelled",
            "Session cancelled",
            match reason {
                Some(reason) => format!(
                    "The session was cancelled ({}). Refund: {:.0}%",
                    reason,
                    refund_percentage * 100.0
                ),
                None => format!(
                    "The session was cancelled. Refund: {:.0}%",
                    refund_percentage * 100.0
                ),
            },
            *session_id,
        ),
        DomainEvent::PaymentReleased {
            session_id,
            recipient_id,
            amount,
        } => notify_all(
            &[*recipient_id],
            "payment_received",
            "Payment received",
            format!("{} has been credited to your wallet", amount),
            *session_id,
        ),
        DomainEvent::PaymentRefunded {
            session_id,
            student_id,
            amount,
        } => notify_all(
            &[*student_id],
            "payment_refunded",
            "Payment refunded",
            format!("{} has been refunded to your wallet", amount),
            *session_id,
        ),
        DomainEvent::SessionCreated { .. }
        | DomainEvent::SessionCompleted { .. }
        | DomainEvent::SessionFlaggedForReview { .. }
        | DomainEvent::StudentCheckedIn { .. } => Vec::new(),
    }
}

/// Retry policy of the worker
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

/// Consumes domain events and performs their side effects
#[derive(Clone)]
pub struct SideEffectWorker {
    notifier: Arc<dyn NotificationDispatcher>,
    badges: Arc<dyn BadgeChecker>,
    retry: RetryPolicy,
}

impl SideEffectWorker {
    pub fn new(
        notifier: Arc<dyn NotificationDispatcher>,
        badges: Arc<dyn BadgeChecker>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            notifier,
            badges,
            retry,
        }
    }

    /// Perform the side effects of one event, once
    pub async fn handle(&self, event: &DomainEvent) -> TutoringResult<()> {
        match event {
            DomainEvent::StudentCheckedIn { student_id, .. } => {
                let awarded = self.badges.check_attendance_badges(*student_id).await?;
                if !awarded.is_empty() {
                    info!(%student_id, badges = ?awarded, "Attendance badges awarded");
                }
            }
            DomainEvent::SessionCompleted {
                tutor_id: Some(tutor_id),
                ..
            } => {
                let awarded = self.badges.check_tutor_badges(*tutor_id).await?;
                if !awarded.is_empty() {
                    info!(%tutor_id, badges = ?awarded, "Tutor badges awarded");
                }
            }
            DomainEvent::SessionFlaggedForReview {
                session_id,
                discrepancy_minutes,
            } => {
                warn!(
                    %session_id,
                    discrepancy_minutes,
                    "Session duration flagged for review"
                );
            }
            _ => {}
        }

        let notifications = notifications_for(event);
        match notifications.len() {
            0 => {}
            1 => {
                let notification = notifications.into_iter().next().ok_or_else(|| {
                    TutoringError::SideEffect("notification list emptied".to_string())
                })?;
                self.notifier.create_notification(notification).await?;
            }
            _ => self.notifier.create_bulk_notifications(notifications).await?,
        }

        Ok(())
    }

    /// Handle an event with exponential backoff. Returns whether it succeeded.
    pub async fn handle_with_retry(&self, event: &DomainEvent) -> bool {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.handle(event).await {
                Ok(()) => return true,
                Err(e) if attempt < self.retry.max_attempts => {
                    warn!(
                        event = event.name(),
                        session_id = %event.session_id(),
                        attempt,
                        max_attempts = self.retry.max_attempts,
                        error = %e,
                        "Side effect failed, retrying"
                    );
                    sleep(self.retry.base_delay * 2u32.pow(attempt - 1)).await;
                }
                Err(e) => {
                    error!(
                        event = event.name(),
                        session_id = %event.session_id(),
                        attempts = attempt,
                        error = %e,
                        "Side effect dropped after exhausting retries"
                    );
                    return false;
                }
            }
        }
    }

    /// Drain the channel until every sender is gone
    pub async fn run(self, mut receiver: mpsc::UnboundedReceiver<DomainEvent>) {
        info!("Side-effect worker started");
        while let Some(event) = receiver.recv().await {
            self.handle_with_retry(&event).await;
        }
        info!("Side-effect worker stopped");
    }

    pub fn spawn(self, receiver: mpsc::UnboundedReceiver<DomainEvent>) -> JoinHandle<()> {
        tokio::spawn(self.run(receiver))
    }
}
