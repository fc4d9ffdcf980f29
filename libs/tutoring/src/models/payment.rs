//! Payment hold (transaction) model

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::TutoringError;
use crate::money::Money;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Refunded,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TransactionStatus::Pending => "PENDING",
            TransactionStatus::Completed => "COMPLETED",
            TransactionStatus::Refunded => "REFUNDED",
            TransactionStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = TutoringError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(TransactionStatus::Pending),
            "COMPLETED" => Ok(TransactionStatus::Completed),
            "REFUNDED" => Ok(TransactionStatus::Refunded),
            "FAILED" => Ok(TransactionStatus::Failed),
            other => Err(TutoringError::validation(format!(
                "Unknown transaction status: {}",
                other
            ))),
        }
    }
}

/// A student's payment hold for one session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: Uuid,
    pub session_id: Uuid,
    pub student_id: Uuid,
    /// Gross amount charged to the student
    pub amount: Money,
    /// Amount payable to the tutor after platform commission
    pub net_amount: Money,
    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A wallet credit applied atomically with a hold's status change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerCredit {
    pub user_id: Uuid,
    pub amount: Money,
    pub memo: String,
}
