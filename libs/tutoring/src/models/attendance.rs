//! Attendance model

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::TutoringError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttendanceStatus {
    Present,
    Absent,
    Late,
}

impl AttendanceStatus {
    /// Present and late students are billed, absent ones are refunded
    pub fn attended(self) -> bool {
        matches!(self, AttendanceStatus::Present | AttendanceStatus::Late)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AttendanceStatus::Present => "PRESENT",
            AttendanceStatus::Absent => "ABSENT",
            AttendanceStatus::Late => "LATE",
        }
    }
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttendanceStatus {
    type Err = TutoringError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PRESENT" => Ok(AttendanceStatus::Present),
            "ABSENT" => Ok(AttendanceStatus::Absent),
            "LATE" => Ok(AttendanceStatus::Late),
            other => Err(TutoringError::validation(format!(
                "Unknown attendance status: {}",
                other
            ))),
        }
    }
}

/// Per-student presence record, unique on (session_id, student_id)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attendance {
    pub session_id: Uuid,
    pub student_id: Uuid,
    pub status: AttendanceStatus,
    pub check_in_time: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Attendance {
    pub fn absent(session_id: Uuid, student_id: Uuid, at: DateTime<Utc>) -> Self {
        Self {
            session_id,
            student_id,
            status: AttendanceStatus::Absent,
            check_in_time: None,
            notes: None,
            created_at: at,
            updated_at: at,
        }
    }

    pub fn present(session_id: Uuid, student_id: Uuid, at: DateTime<Utc>) -> Self {
        Self {
            session_id,
            student_id,
            status: AttendanceStatus::Present,
            check_in_time: Some(at),
            notes: None,
            created_at: at,
            updated_at: at,
        }
    }
}

/// Manual correction of an attendance row
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceCorrection {
    pub status: Option<AttendanceStatus>,
    pub notes: Option<String>,
}
