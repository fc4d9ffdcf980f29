//! Attendance and teaching-hours badges stored in `user_badges`

use async_trait::async_trait;
use sqlx::Row;
use tracing::info;
use tutoring::TutoringResult;
use tutoring::badges::{attendance_badges, tutor_badges};
use tutoring::events::BadgeChecker;
use uuid::Uuid;

use super::{PgStore, store_error};

impl PgStore {
    /// Insert badges the user does not have yet, returning the new ones
    async fn award(&self, user_id: Uuid, badges: Vec<&'static str>) -> TutoringResult<Vec<String>> {
        let mut awarded = Vec::new();
        for badge in badges {
            let inserted = sqlx::query(
                r#"
                INSERT INTO user_badges (user_id, badge) VALUES ($1, $2)
                ON CONFLICT (user_id, badge) DO NOTHING
                "#,
            )
            .bind(user_id)
            .bind(badge)
            .execute(&self.pool)
            .await
            .map_err(store_error)?;

            if inserted.rows_affected() == 1 {
                info!(%user_id, badge, "Badge awarded");
                awarded.push(badge.to_string());
            }
        }
        Ok(awarded)
    }
}

#[async_trait]
impl BadgeChecker for PgStore {
    async fn check_attendance_badges(&self, student_id: Uuid) -> TutoringResult<Vec<String>> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) FILTER (WHERE status IN ('PRESENT', 'LATE')) AS attended,
                   COUNT(*) AS total
            FROM attendance
            WHERE student_id = $1
            "#,
        )
        .bind(student_id)
        .fetch_one(&self.pool)
        .await
        .map_err(store_error)?;

        let attended: i64 = row.get("attended");
        let total: i64 = row.get("total");
        self.award(student_id, attendance_badges(attended, total))
            .await
    }

    async fn check_tutor_badges(&self, tutor_id: Uuid) -> TutoringResult<Vec<String>> {
        let total_hours: Option<f64> =
            sqlx::query_scalar("SELECT total_hours FROM tutor_profiles WHERE user_id = $1")
                .bind(tutor_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(store_error)?;

        match total_hours {
            Some(hours) => self.award(tutor_id, tutor_badges(hours)).await,
            None => Ok(Vec::new()),
        }
    }
}
