//! Tutor profile and consortium models

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::money::Money;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TutorProfile {
    pub user_id: Uuid,
    pub hourly_rate: Money,
    pub total_hours: f64,
}

/// A group of tutors sharing sessions and splitting their revenue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Consortium {
    pub id: Uuid,
    pub name: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsortiumMember {
    pub consortium_id: Uuid,
    pub tutor_id: Uuid,
    /// Percentage of the consortium's revenue, 0–100
    pub revenue_share: f64,
}
