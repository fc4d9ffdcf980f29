//! In-app notifications written to the `notifications` table

use async_trait::async_trait;
use tracing::debug;
use tutoring::TutoringResult;
use tutoring::events::{Notification, NotificationDispatcher};
use uuid::Uuid;

use super::{PgStore, store_error};

#[async_trait]
impl NotificationDispatcher for PgStore {
    async fn create_notification(&self, notification: Notification) -> TutoringResult<()> {
        sqlx::query(
            r#"
            INSERT INTO notifications (id, user_id, type, title, message, session_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(notification.recipient_id)
        .bind(notification.kind)
        .bind(&notification.title)
        .bind(&notification.message)
        .bind(notification.session_id)
        .execute(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(())
    }

    async fn create_bulk_notifications(
        &self,
        notifications: Vec<Notification>,
    ) -> TutoringResult<()> {
        if notifications.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await.map_err(store_error)?;
        let count = notifications.len();
        for notification in notifications {
            sqlx::query(
                r#"
                INSERT INTO notifications (id, user_id, type, title, message, session_id)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(notification.recipient_id)
            .bind(notification.kind)
            .bind(&notification.title)
            .bind(&notification.message)
            .bind(notification.session_id)
            .execute(&mut *tx)
            .await
            .map_err(store_error)?;
        }
        tx.commit().await.map_err(store_error)?;

        debug!(count, "Notifications stored");
        Ok(())
    }
}
