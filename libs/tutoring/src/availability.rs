//! Tutor availability checks
//!
//! Only point-in-time calendar conflicts are considered: a tutor is available
//! for `[start, end)` when none of their PENDING or CONFIRMED sessions
//! overlaps it. Weekly availability preferences are not consulted.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use crate::error::TutoringResult;
use crate::models::Session;
use crate::repository::SessionRepository;

/// Whether two half-open intervals `[a_start, a_end)` and `[b_start, b_end)`
/// overlap.
///
/// Covers the new interval starting inside the existing one, ending inside
/// it, and containing it. Touching endpoints do not overlap.
pub fn intervals_overlap(
    a_start: DateTime<Utc>,
    a_end: DateTime<Utc>,
    b_start: DateTime<Utc>,
    b_end: DateTime<Utc>,
) -> bool {
    a_start < b_end && b_start < a_end
}

#[derive(Clone)]
pub struct AvailabilityChecker {
    sessions: Arc<dyn SessionRepository>,
}

impl AvailabilityChecker {
    pub fn new(sessions: Arc<dyn SessionRepository>) -> Self {
        Self { sessions }
    }

    /// Committed sessions of the tutor that overlap `[start, end)`
    pub async fn conflicts(
        &self,
        tutor_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exclude_session_id: Option<Uuid>,
    ) -> TutoringResult<Vec<Session>> {
        let existing = self
            .sessions
            .committed_for_tutor(tutor_id, exclude_session_id)
            .await?;

        Ok(existing
            .into_iter()
            .filter(|s| intervals_overlap(start, end, s.scheduled_start, s.scheduled_end))
            .collect())
    }

    pub async fn is_available(
        &self,
        tutor_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exclude_session_id: Option<Uuid>,
    ) -> TutoringResult<bool> {
        let conflicts = self
            .conflicts(tutor_id, start, end, exclude_session_id)
            .await?;

        if !conflicts.is_empty() {
            debug!(
                %tutor_id,
                conflicting = conflicts.len(),
                "Tutor has conflicting sessions"
            );
        }

        Ok(conflicts.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 12, hour, minute, 0).unwrap()
    }

    #[test]
    fn back_to_back_intervals_do_not_overlap() {
        assert!(!intervals_overlap(at(9, 0), at(10, 0), at(10, 0), at(11, 0)));
        assert!(!intervals_overlap(at(10, 0), at(11, 0), at(9, 0), at(10, 0)));
    }

    #[test]
    fn overlap_shapes() {
        let (start, end) = (at(10, 0), at(11, 0));
        // starts inside
        assert!(intervals_overlap(at(10, 30), at(11, 30), start, end));
        // ends inside
        assert!(intervals_overlap(at(9, 30), at(10, 30), start, end));
        // contains
        assert!(intervals_overlap(at(9, 0), at(12, 0), start, end));
        // contained
        assert!(intervals_overlap(at(10, 15), at(10, 45), start, end));
        // identical
        assert!(intervals_overlap(start, end, start, end));
        // disjoint
        assert!(!intervals_overlap(at(12, 0), at(13, 0), start, end));
    }

    #[test]
    fn overlap_is_symmetric() {
        let base = at(8, 0);
        for a_offset in 0..8i64 {
            for a_len in 1..4i64 {
                for b_offset in 0..8i64 {
                    for b_len in 1..4i64 {
                        let a_start = base + Duration::minutes(a_offset * 30);
                        let a_end = a_start + Duration::minutes(a_len * 30);
                        let b_start = base + Duration::minutes(b_offset * 30);
                        let b_end = b_start + Duration::minutes(b_len * 30);
                        assert_eq!(
                            intervals_overlap(a_start, a_end, b_start, b_end),
                            intervals_overlap(b_start, b_end, a_start, a_end),
                        );
                    }
                }
            }
        }
    }
}
