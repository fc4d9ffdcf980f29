//! Session persistence

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, postgres::PgRow};
use tutoring::models::{Session, SessionStatus};
use tutoring::repository::SessionRepository;
use tutoring::{Money, TutoringError, TutoringResult};
use uuid::Uuid;

use super::{PgStore, corrupt, store_error};

const SESSION_COLUMNS: &str = r#"
    id, class_id, tutor_id, consortium_id, scheduled_start, scheduled_end,
    actual_start, actual_end, subject, description, price_cents, location,
    online_meeting_link, status, cancellation_reason, created_at, updated_at
"#;

fn session_from_row(row: &PgRow) -> TutoringResult<Session> {
    let status: String = row.get("status");
    Ok(Session {
        id: row.get("id"),
        class_id: row.get("class_id"),
        tutor_id: row.get("tutor_id"),
        consortium_id: row.get("consortium_id"),
        scheduled_start: row.get("scheduled_start"),
        scheduled_end: row.get("scheduled_end"),
        actual_start: row.get("actual_start"),
        actual_end: row.get("actual_end"),
        subject: row.get("subject"),
        description: row.get("description"),
        price: Money::from_cents(row.get("price_cents")),
        location: row.get("location"),
        online_meeting_link: row.get("online_meeting_link"),
        status: status.parse().map_err(|e| corrupt("sessions.status", e))?,
        cancellation_reason: row.get("cancellation_reason"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[async_trait]
impl SessionRepository for PgStore {
    async fn insert(&self, session: &Session) -> TutoringResult<()> {
        sqlx::query(
            r#"
            INSERT INTO sessions (
                id, class_id, tutor_id, consortium_id, scheduled_start, scheduled_end,
                actual_start, actual_end, subject, description, price_cents, location,
                online_meeting_link, status, cancellation_reason, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            "#,
        )
        .bind(session.id)
        .bind(session.class_id)
        .bind(session.tutor_id)
        .bind(session.consortium_id)
        .bind(session.scheduled_start)
        .bind(session.scheduled_end)
        .bind(session.actual_start)
        .bind(session.actual_end)
        .bind(&session.subject)
        .bind(&session.description)
        .bind(session.price.cents())
        .bind(&session.location)
        .bind(&session.online_meeting_link)
        .bind(session.status.as_str())
        .bind(&session.cancellation_reason)
        .bind(session.created_at)
        .bind(session.updated_at)
        .execute(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(())
    }

    async fn find(&self, id: Uuid) -> TutoringResult<Option<Session>> {
        let row = sqlx::query(&format!("SELECT {} FROM sessions WHERE id = $1", SESSION_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?;

        row.as_ref().map(session_from_row).transpose()
    }

    async fn save(&self, session: &Session, expected: SessionStatus) -> TutoringResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE sessions
            SET tutor_id = $2, consortium_id = $3, scheduled_start = $4, scheduled_end = $5,
                actual_start = $6, actual_end = $7, subject = $8, description = $9,
                price_cents = $10, location = $11, online_meeting_link = $12, status = $13,
                cancellation_reason = $14, updated_at = $15
            WHERE id = $1 AND status = $16
            "#,
        )
        .bind(session.id)
        .bind(session.tutor_id)
        .bind(session.consortium_id)
        .bind(session.scheduled_start)
        .bind(session.scheduled_end)
        .bind(session.actual_start)
        .bind(session.actual_end)
        .bind(&session.subject)
        .bind(&session.description)
        .bind(session.price.cents())
        .bind(&session.location)
        .bind(&session.online_meeting_link)
        .bind(session.status.as_str())
        .bind(&session.cancellation_reason)
        .bind(session.updated_at)
        .bind(expected.as_str())
        .execute(&self.pool)
        .await
        .map_err(store_error)?;

        if result.rows_affected() == 0 {
            let current: Option<String> =
                sqlx::query_scalar("SELECT status FROM sessions WHERE id = $1")
                    .bind(session.id)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(store_error)?;

            return Err(match current {
                Some(status) => TutoringError::conflict(format!(
                    "Session {} changed to {} concurrently",
                    session.id, status
                )),
                None => TutoringError::not_found("Session", session.id),
            });
        }

        Ok(())
    }

    async fn committed_for_tutor(
        &self,
        tutor_id: Uuid,
        exclude: Option<Uuid>,
    ) -> TutoringResult<Vec<Session>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM sessions
            WHERE tutor_id = $1
              AND status IN ('PENDING', 'CONFIRMED')
              AND ($2::uuid IS NULL OR id <> $2)
            ORDER BY scheduled_start
            "#,
            SESSION_COLUMNS
        ))
        .bind(tutor_id)
        .bind(exclude)
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        rows.iter().map(session_from_row).collect()
    }

    async fn stale_confirmed(&self, now: DateTime<Utc>) -> TutoringResult<Vec<Session>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM sessions
            WHERE status = 'CONFIRMED' AND scheduled_end < $1
            ORDER BY scheduled_end
            "#,
            SESSION_COLUMNS
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        rows.iter().map(session_from_row).collect()
    }
}
