//! Attendance rows, unique per (session, student)

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, postgres::PgRow};
use tutoring::{TutoringError, TutoringResult};
use tutoring::models::{Attendance, AttendanceStatus};
use tutoring::repository::AttendanceRepository;
use uuid::Uuid;

use super::{PgStore, corrupt, store_error};

fn attendance_from_row(row: &PgRow) -> TutoringResult<Attendance> {
    let status: String = row.get("status");
    Ok(Attendance {
        session_id: row.get("session_id"),
        student_id: row.get("student_id"),
        status: status.parse().map_err(|e| corrupt("attendance.status", e))?,
        check_in_time: row.get("check_in_time"),
        notes: row.get("notes"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[async_trait]
impl AttendanceRepository for PgStore {
    async fn find(&self, session_id: Uuid, student_id: Uuid) -> TutoringResult<Option<Attendance>> {
        let row = sqlx::query(
            r#"
            SELECT session_id, student_id, status, check_in_time, notes, created_at, updated_at
            FROM attendance
            WHERE session_id = $1 AND student_id = $2
            "#,
        )
        .bind(session_id)
        .bind(student_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;

        row.as_ref().map(attendance_from_row).transpose()
    }

    async fn list_for_session(&self, session_id: Uuid) -> TutoringResult<Vec<Attendance>> {
        let rows = sqlx::query(
            r#"
            SELECT session_id, student_id, status, check_in_time, notes, created_at, updated_at
            FROM attendance
            WHERE session_id = $1
            ORDER BY created_at, student_id
            "#,
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        rows.iter().map(attendance_from_row).collect()
    }

    async fn record_check_in(
        &self,
        session_id: Uuid,
        student_id: Uuid,
        at: DateTime<Utc>,
    ) -> TutoringResult<Attendance> {
        let row = sqlx::query(
            r#"
            INSERT INTO attendance (session_id, student_id, status, check_in_time, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $4, $4)
            ON CONFLICT (session_id, student_id) DO UPDATE
            SET status = EXCLUDED.status,
                check_in_time = EXCLUDED.check_in_time,
                updated_at = EXCLUDED.updated_at
            WHERE attendance.check_in_time IS NULL
            RETURNING session_id, student_id, status, check_in_time, notes, created_at, updated_at
            "#,
        )
        .bind(session_id)
        .bind(student_id)
        .bind(AttendanceStatus::Present.as_str())
        .bind(at)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;

        match row {
            Some(row) => attendance_from_row(&row),
            None => Err(TutoringError::conflict(
                "Student has already checked in to this session",
            )),
        }
    }

    async fn insert_absent(
        &self,
        session_id: Uuid,
        student_id: Uuid,
        at: DateTime<Utc>,
    ) -> TutoringResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO attendance (session_id, student_id, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $4)
            ON CONFLICT (session_id, student_id) DO NOTHING
            "#,
        )
        .bind(session_id)
        .bind(student_id)
        .bind(AttendanceStatus::Absent.as_str())
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(result.rows_affected() == 1)
    }

    async fn save(&self, attendance: &Attendance) -> TutoringResult<()> {
        sqlx::query(
            r#"
            INSERT INTO attendance (session_id, student_id, status, check_in_time, notes, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (session_id, student_id) DO UPDATE
            SET status = EXCLUDED.status,
                check_in_time = EXCLUDED.check_in_time,
                notes = EXCLUDED.notes,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(attendance.session_id)
        .bind(attendance.student_id)
        .bind(attendance.status.as_str())
        .bind(attendance.check_in_time)
        .bind(&attendance.notes)
        .bind(attendance.created_at)
        .bind(attendance.updated_at)
        .execute(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(())
    }
}
