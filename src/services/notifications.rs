use super::{RequestHandler, Service, ServiceError};
use crate::models::notifications::Notification;
use crate::repositories::notifications::NotificationRepository;

use async_trait::async_trait;
use sqlx::PgPool;
use tokio::sync::oneshot;

pub enum NotificationRequest {
    /// Fire-and-forget: senders do not wait for delivery.
    Notify {
        user_id: String,
        body: String,
    },
    ListUnread {
        user_id: String,
        response: oneshot::Sender<Result<Vec<Notification>, ServiceError>>,
    },
    MarkRead {
        user_id: String,
        id: String,
        response: oneshot::Sender<Result<(), ServiceError>>,
    },
}

#[derive(Clone)]
pub struct NotificationRequestHandler {
    repository: NotificationRepository,
}

impl NotificationRequestHandler {
    pub fn new(sql_conn: PgPool) -> Self {
        let repository = NotificationRepository::new(sql_conn);

        NotificationRequestHandler { repository }
    }

    async fn notify(&self, user_id: &str, body: &str) {
        match self.repository.insert(user_id, body).await {
            Ok(notification) => {
                log::info!("Notified user {}: {}", user_id, notification.body);
            }
            Err(e) => {
                log::error!("Could not store notification for {}: {}", user_id, e);
            }
        }
    }
}

#[async_trait]
impl RequestHandler<NotificationRequest> for NotificationRequestHandler {
    async fn handle_request(&self, request: NotificationRequest) {
        match request {
            NotificationRequest::Notify { user_id, body } => {
                self.notify(&user_id, &body).await;
            }
            NotificationRequest::ListUnread { user_id, response } => {
                let result = self.repository.unread_for_user(&user_id).await.map_err(|e| {
                    ServiceError::Repository("NotificationService".to_string(), e.to_string())
                });
                let _ = response.send(result);
            }
            NotificationRequest::MarkRead {
                user_id,
                id,
                response,
            } => {
                let result = self.repository.mark_read(&user_id, &id).await.map_err(|e| {
                    ServiceError::Repository("NotificationService".to_string(), e.to_string())
                });
                let _ = response.send(result);
            }
        }
    }
}

pub struct NotificationService;

impl NotificationService {
    pub fn new() -> Self {
        NotificationService {}
    }
}

#[async_trait]
impl Service<NotificationRequest, NotificationRequestHandler> for NotificationService {}
