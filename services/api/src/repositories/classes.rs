//! Class and membership lookups

use async_trait::async_trait;
use sqlx::Row;
use tutoring::TutoringResult;
use tutoring::models::Class;
use tutoring::repository::ClassRepository;
use uuid::Uuid;

use super::{PgStore, store_error};

#[async_trait]
impl ClassRepository for PgStore {
    async fn find_class(&self, id: Uuid) -> TutoringResult<Option<Class>> {
        let row = sqlx::query("SELECT id, creator_id, name, is_active FROM classes WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?;

        Ok(row.map(|row| Class {
            id: row.get("id"),
            creator_id: row.get("creator_id"),
            name: row.get("name"),
            is_active: row.get("is_active"),
        }))
    }

    async fn active_member_ids(&self, class_id: Uuid) -> TutoringResult<Vec<Uuid>> {
        sqlx::query_scalar(
            r#"
            SELECT student_id FROM class_members
            WHERE class_id = $1 AND is_active
            ORDER BY student_id
            "#,
        )
        .bind(class_id)
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)
    }

    async fn is_active_member(&self, class_id: Uuid, user_id: Uuid) -> TutoringResult<bool> {
        sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM class_members
                WHERE class_id = $1 AND student_id = $2 AND is_active
            )
            "#,
        )
        .bind(class_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(store_error)
    }
}
