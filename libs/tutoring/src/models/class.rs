//! Study class model

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A persistent study group, the booking unit for sessions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Class {
    pub id: Uuid,
    pub creator_id: Uuid,
    pub name: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassMember {
    pub class_id: Uuid,
    pub student_id: Uuid,
    pub is_active: bool,
}
