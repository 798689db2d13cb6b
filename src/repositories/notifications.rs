use crate::models::notifications::Notification;

use anyhow::bail;
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Clone)]
pub struct NotificationRepository {
    conn: PgPool,
}

impl NotificationRepository {
    pub fn new(conn: PgPool) -> Self {
        NotificationRepository { conn }
    }

    pub async fn insert(&self, user_id: &str, body: &str) -> Result<Notification, anyhow::Error> {
        let notification_id = Uuid::new_v4().hyphenated().to_string();
        let notification = sqlx::query_as::<_, Notification>(
            r#"INSERT INTO notifications (id, user_id, body)
            VALUES ($1, $2, $3)
            RETURNING *"#,
        )
        .bind(&notification_id)
        .bind(user_id)
        .bind(body)
        .fetch_one(&self.conn)
        .await?;

        Ok(notification)
    }

    pub async fn unread_for_user(&self, user_id: &str) -> Result<Vec<Notification>, anyhow::Error> {
        let notifications = sqlx::query_as::<_, Notification>(
            r#"SELECT * FROM notifications
            WHERE user_id = $1 AND read_at IS NULL
            ORDER BY created_at DESC"#,
        )
        .bind(user_id)
        .fetch_all(&self.conn)
        .await?;

        Ok(notifications)
    }

    pub async fn mark_read(&self, user_id: &str, notification_id: &str) -> Result<(), anyhow::Error> {
        let result = sqlx::query(
            r#"UPDATE notifications SET read_at = CURRENT_TIMESTAMP
            WHERE id = $1 AND user_id = $2 AND read_at IS NULL"#,
        )
        .bind(notification_id)
        .bind(user_id)
        .execute(&self.conn)
        .await?;

        if result.rows_affected() == 0 {
            bail!("Notification not found: {}", notification_id)
        }

        Ok(())
    }
}
