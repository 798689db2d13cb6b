use super::notifications::NotificationRequest;
use super::{RequestHandler, Service, ServiceError};
use crate::models::credit_requests::{CreditRequest, NewCreditRequest};
use crate::models::transactions::Transaction;
use crate::repositories::credit_requests::CreditRequestRepository;

use async_trait::async_trait;
use sqlx::PgPool;
use tokio::sync::{mpsc, oneshot};

pub enum CreditRequestServiceRequest {
    Create {
        new_request: NewCreditRequest,
        response: oneshot::Sender<Result<CreditRequest, ServiceError>>,
    },
    Accept {
        id: String,
        actor: String,
        response: oneshot::Sender<Result<(CreditRequest, Transaction), ServiceError>>,
    },
    Decline {
        id: String,
        actor: String,
        response: oneshot::Sender<Result<CreditRequest, ServiceError>>,
    },
    ListForUser {
        user_id: String,
        response: oneshot::Sender<Result<Vec<CreditRequest>, ServiceError>>,
    },
}

#[derive(Clone)]
pub struct CreditRequestHandler {
    repository: CreditRequestRepository,
    notification_channel: mpsc::Sender<NotificationRequest>,
}

impl CreditRequestHandler {
    pub fn new(sql_conn: PgPool, notification_channel: mpsc::Sender<NotificationRequest>) -> Self {
        let repository = CreditRequestRepository::new(sql_conn);

        CreditRequestHandler {
            repository,
            notification_channel,
        }
    }

    fn notify(&self, user_id: String, body: String) {
        let notification_channel = self.notification_channel.clone();
        tokio::spawn(async move {
            let _ = notification_channel
                .send(NotificationRequest::Notify { user_id, body })
                .await;
        });
    }

    async fn create(&self, new_request: NewCreditRequest) -> Result<CreditRequest, ServiceError> {
        let request = self.repository.create(&new_request).await?;

        self.notify(
            request.payer_id.clone(),
            format!(
                "{} requests {:.2} time credits: {}",
                request.requester_id,
                request.amount_in_cents as f64 / 100.0,
                request.description
            ),
        );

        Ok(request)
    }

    async fn accept(
        &self,
        actor: &str,
        id: &str,
    ) -> Result<(CreditRequest, Transaction), ServiceError> {
        let (request, transaction) = self.repository.accept(actor, id).await?;

        log::info!(
            "Credit request {} accepted, transaction {} recorded",
            request.id,
            transaction.id
        );
        self.notify(
            request.requester_id.clone(),
            format!(
                "Your request for {:.2} time credits was accepted",
                request.amount_in_cents as f64 / 100.0
            ),
        );

        Ok((request, transaction))
    }

    async fn decline(&self, actor: &str, id: &str) -> Result<CreditRequest, ServiceError> {
        let request = self.repository.decline(actor, id).await?;

        self.notify(
            request.requester_id.clone(),
            format!(
                "Your request for {:.2} time credits was declined",
                request.amount_in_cents as f64 / 100.0
            ),
        );

        Ok(request)
    }
}

#[async_trait]
impl RequestHandler<CreditRequestServiceRequest> for CreditRequestHandler {
    async fn handle_request(&self, request: CreditRequestServiceRequest) {
        match request {
            CreditRequestServiceRequest::Create {
                new_request,
                response,
            } => {
                let result = self.create(new_request).await;
                let _ = response.send(result);
            }
            CreditRequestServiceRequest::Accept {
                id,
                actor,
                response,
            } => {
                let result = self.accept(&actor, &id).await;
                let _ = response.send(result);
            }
            CreditRequestServiceRequest::Decline {
                id,
                actor,
                response,
            } => {
                let result = self.decline(&actor, &id).await;
                let _ = response.send(result);
            }
            CreditRequestServiceRequest::ListForUser { user_id, response } => {
                let result = self
                    .repository
                    .list_for_user(&user_id)
                    .await
                    .map_err(ServiceError::from);
                let _ = response.send(result);
            }
        }
    }
}

pub struct CreditRequestService;

impl CreditRequestService {
    pub fn new() -> Self {
        CreditRequestService {}
    }
}

#[async_trait]
impl Service<CreditRequestServiceRequest, CreditRequestHandler> for CreditRequestService {}
