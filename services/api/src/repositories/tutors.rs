//! Tutor profiles and consortia

use async_trait::async_trait;
use sqlx::Row;
use tutoring::models::{Consortium, ConsortiumMember, TutorProfile};
use tutoring::repository::TutorRepository;
use tutoring::{Money, TutoringError, TutoringResult};
use uuid::Uuid;

use super::{PgStore, store_error};

#[async_trait]
impl TutorRepository for PgStore {
    async fn find_profile(&self, user_id: Uuid) -> TutoringResult<Option<TutorProfile>> {
        let row = sqlx::query(
            "SELECT user_id, hourly_rate_cents, total_hours FROM tutor_profiles WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(row.map(|row| TutorProfile {
            user_id: row.get("user_id"),
            hourly_rate: Money::from_cents(row.get("hourly_rate_cents")),
            total_hours: row.get("total_hours"),
        }))
    }

    async fn add_hours(&self, user_id: Uuid, hours: f64) -> TutoringResult<()> {
        let result = sqlx::query(
            "UPDATE tutor_profiles SET total_hours = total_hours + $2 WHERE user_id = $1",
        )
        .bind(user_id)
        .bind(hours)
        .execute(&self.pool)
        .await
        .map_err(store_error)?;

        if result.rows_affected() == 0 {
            return Err(TutoringError::not_found("Tutor", user_id));
        }
        Ok(())
    }

    async fn find_consortium(&self, id: Uuid) -> TutoringResult<Option<Consortium>> {
        let row = sqlx::query("SELECT id, name, is_active FROM consortia WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?;

        Ok(row.map(|row| Consortium {
            id: row.get("id"),
            name: row.get("name"),
            is_active: row.get("is_active"),
        }))
    }

    async fn consortium_members(
        &self,
        consortium_id: Uuid,
    ) -> TutoringResult<Vec<ConsortiumMember>> {
        let rows = sqlx::query(
            r#"
            SELECT consortium_id, tutor_id, revenue_share
            FROM consortium_members
            WHERE consortium_id = $1
            ORDER BY revenue_share DESC, tutor_id
            "#,
        )
        .bind(consortium_id)
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(rows
            .into_iter()
            .map(|row| ConsortiumMember {
                consortium_id: row.get("consortium_id"),
                tutor_id: row.get("tutor_id"),
                revenue_share: row.get("revenue_share"),
            })
            .collect())
    }

    async fn replace_consortium_members(
        &self,
        consortium_id: Uuid,
        members: &[ConsortiumMember],
    ) -> TutoringResult<()> {
        let mut tx = self.pool.begin().await.map_err(store_error)?;

        let locked: Option<Uuid> =
            sqlx::query_scalar("SELECT id FROM consortia WHERE id = $1 FOR UPDATE")
                .bind(consortium_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(store_error)?;
        if locked.is_none() {
            return Err(TutoringError::not_found("Consortium", consortium_id));
        }

        sqlx::query("DELETE FROM consortium_members WHERE consortium_id = $1")
            .bind(consortium_id)
            .execute(&mut *tx)
            .await
            .map_err(store_error)?;

        for member in members {
            sqlx::query(
                r#"
                INSERT INTO consortium_members (consortium_id, tutor_id, revenue_share)
                VALUES ($1, $2, $3)
                "#,
            )
            .bind(consortium_id)
            .bind(member.tutor_id)
            .bind(member.revenue_share)
            .execute(&mut *tx)
            .await
            .map_err(store_error)?;
        }

        tx.commit().await.map_err(store_error)?;
        Ok(())
    }
}
