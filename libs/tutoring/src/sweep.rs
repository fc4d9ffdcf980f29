//! Periodic jobs: closing sessions nobody checked out, credential cleanup

use std::sync::Arc;

use tracing::{error, info};
use uuid::Uuid;

use crate::attendance::AttendanceEngine;
use crate::clock::Clock;
use crate::error::TutoringResult;
use crate::lifecycle::SessionLifecycle;
use crate::models::Session;
use crate::repository::Repositories;

/// Outcome of one attendance sweep
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SweepReport {
    pub completed: Vec<Uuid>,
    pub marked_absent: usize,
    /// Already COMPLETED sessions whose leftover holds were settled
    pub resettled: Vec<Uuid>,
    /// Sessions that could not be closed or settled, with the reason
    pub failed: Vec<(Uuid, String)>,
}

#[derive(Clone)]
pub struct AttendanceSweep {
    repos: Repositories,
    lifecycle: SessionLifecycle,
    attendance: AttendanceEngine,
    clock: Arc<dyn Clock>,
}

impl AttendanceSweep {
    pub fn new(
        repos: Repositories,
        lifecycle: SessionLifecycle,
        attendance: AttendanceEngine,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            repos,
            lifecycle,
            attendance,
            clock,
        }
    }

    /// Complete and settle every CONFIRMED session whose end has passed, then
    /// retry settlement of completed sessions that still hold payments
    pub async fn run_attendance_sweep(&self) -> TutoringResult<SweepReport> {
        let now = self.clock.now();
        let stale = self.repos.sessions.stale_confirmed(now).await?;
        let mut report = SweepReport::default();

        for session in stale {
            let session_id = session.id;
            match self.close(session).await {
                Ok(absent) => {
                    report.marked_absent += absent;
                    report.completed.push(session_id);
                }
                Err(e) => {
                    error!(%session_id, error = %e, "Attendance sweep failed for session");
                    report.failed.push((session_id, e.to_string()));
                }
            }
        }

        let unsettled = self.repos.transactions.completed_with_pending_holds().await?;
        for session_id in unsettled {
            if report.failed.iter().any(|(id, _)| *id == session_id) {
                continue;
            }
            match self.lifecycle.settlement().settle(session_id).await {
                Ok(_) => report.resettled.push(session_id),
                Err(e) => {
                    error!(%session_id, error = %e, "Settlement retry failed for session");
                    report.failed.push((session_id, e.to_string()));
                }
            }
        }

        info!(
            completed = report.completed.len(),
            marked_absent = report.marked_absent,
            resettled = report.resettled.len(),
            failed = report.failed.len(),
            "Attendance sweep finished"
        );
        Ok(report)
    }

    pub async fn purge_credentials(&self) -> TutoringResult<usize> {
        self.attendance
            .credentials()
            .purge_expired(self.clock.now())
            .await
    }

    async fn close(&self, mut session: Session) -> TutoringResult<usize> {
        let absent = self.attendance.mark_absent_unchecked(&session).await?;

        session.actual_start.get_or_insert(session.scheduled_start);
        session.actual_end.get_or_insert(session.scheduled_end);

        let session = self.lifecycle.finish(session).await?;
        self.lifecycle.settlement().settle(session.id).await?;
        Ok(absent.len())
    }
}
