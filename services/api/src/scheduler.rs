//! Periodic attendance sweep and credential janitor

use anyhow::Result;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};
use tutoring::sweep::AttendanceSweep;

/// Start both background jobs on a new scheduler
pub async fn start_sweeps(
    sweep: AttendanceSweep,
    sweep_schedule: &str,
    gc_schedule: &str,
) -> Result<JobScheduler> {
    let scheduler = JobScheduler::new().await?;

    let attendance = sweep.clone();
    let sweep_job = Job::new_async(sweep_schedule, move |_, _| {
        let sweep = attendance.clone();
        Box::pin(async move {
            match sweep.run_attendance_sweep().await {
                Ok(report) if !report.failed.is_empty() => {
                    warn!(
                        completed = report.completed.len(),
                        failed = report.failed.len(),
                        "Attendance sweep finished with failures"
                    );
                }
                Ok(report) => {
                    info!(
                        completed = report.completed.len(),
                        marked_absent = report.marked_absent,
                        resettled = report.resettled.len(),
                        "Attendance sweep executed"
                    );
                }
                Err(e) => error!("Attendance sweep failed: {}", e),
            }
        })
    })?;

    let janitor = sweep;
    let gc_job = Job::new_async(gc_schedule, move |_, _| {
        let sweep = janitor.clone();
        Box::pin(async move {
            if let Err(e) = sweep.purge_credentials().await {
                error!("Failed to purge expired credentials: {}", e);
            }
        })
    })?;

    scheduler.add(sweep_job).await?;
    scheduler.add(gc_job).await?;
    scheduler.start().await?;

    info!(
        "Started sweep scheduler with schedules: attendance {}, credentials {}",
        sweep_schedule, gc_schedule
    );
    Ok(scheduler)
}
