//! Session model and related functionality

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{TutoringError, TutoringResult};
use crate::money::Money;

/// Lifecycle state of a tutoring session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
}

impl SessionStatus {
    /// `COMPLETED` and `CANCELLED` accept no further transitions
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Cancelled)
    }

    /// Statuses that occupy the tutor's calendar
    pub fn is_committed(self) -> bool {
        matches!(self, SessionStatus::Pending | SessionStatus::Confirmed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Pending => "PENDING",
            SessionStatus::Confirmed => "CONFIRMED",
            SessionStatus::Completed => "COMPLETED",
            SessionStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = TutoringError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(SessionStatus::Pending),
            "CONFIRMED" => Ok(SessionStatus::Confirmed),
            "COMPLETED" => Ok(SessionStatus::Completed),
            "CANCELLED" => Ok(SessionStatus::Cancelled),
            other => Err(TutoringError::validation(format!(
                "Unknown session status: {}",
                other
            ))),
        }
    }
}

/// A scheduled tutoring engagement between a class and a tutor or consortium
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: Uuid,
    pub class_id: Uuid,
    pub tutor_id: Option<Uuid>,
    pub consortium_id: Option<Uuid>,
    pub scheduled_start: DateTime<Utc>,
    pub scheduled_end: DateTime<Utc>,
    pub actual_start: Option<DateTime<Utc>>,
    pub actual_end: Option<DateTime<Utc>>,
    pub subject: String,
    pub description: Option<String>,
    pub price: Money,
    pub location: Option<String>,
    pub online_meeting_link: Option<String>,
    pub status: SessionStatus,
    pub cancellation_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// Scheduled length in whole minutes
    pub fn scheduled_minutes(&self) -> i64 {
        (self.scheduled_end - self.scheduled_start).num_minutes()
    }

    /// Reject any mutation of a session in a terminal state
    pub fn ensure_mutable(&self) -> TutoringResult<()> {
        if self.status.is_terminal() {
            return Err(TutoringError::validation(format!(
                "Session {} is {} and can no longer be modified",
                self.id, self.status
            )));
        }
        Ok(())
    }
}

/// New session creation payload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSession {
    pub class_id: Uuid,
    pub tutor_id: Option<Uuid>,
    pub consortium_id: Option<Uuid>,
    pub scheduled_start: DateTime<Utc>,
    pub scheduled_end: DateTime<Utc>,
    pub subject: String,
    pub description: Option<String>,
    pub price: Money,
    pub location: Option<String>,
    pub online_meeting_link: Option<String>,
}

/// Session update payload. Absent fields are left unchanged.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SessionUpdate {
    pub subject: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub online_meeting_link: Option<String>,
    pub price: Option<Money>,
    pub tutor_id: Option<Uuid>,
    pub scheduled_start: Option<DateTime<Utc>>,
    pub scheduled_end: Option<DateTime<Utc>>,
}

impl SessionUpdate {
    pub fn changes_times(&self) -> bool {
        self.scheduled_start.is_some() || self.scheduled_end.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            SessionStatus::Pending,
            SessionStatus::Confirmed,
            SessionStatus::Completed,
            SessionStatus::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<SessionStatus>().unwrap(), status);
        }
        assert!("DONE".parse::<SessionStatus>().is_err());
    }

    #[test]
    fn terminal_statuses() {
        assert!(!SessionStatus::Pending.is_terminal());
        assert!(!SessionStatus::Confirmed.is_terminal());
        assert!(SessionStatus::Completed.is_terminal());
        assert!(SessionStatus::Cancelled.is_terminal());
    }

    #[test]
    fn status_serializes_screaming() {
        let json = serde_json::to_string(&SessionStatus::Confirmed).unwrap();
        assert_eq!(json, "\"CONFIRMED\"");
    }
}
