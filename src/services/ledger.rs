use super::notifications::NotificationRequest;
use super::RequestHandler;
use super::Service;
use super::ServiceError;

use crate::models::transactions::{BalanceSummary, NewTransfer, Transaction};
use crate::repositories::transactions::TransactionRepository;

use async_trait::async_trait;
use sqlx::PgPool;
use tokio::sync::{mpsc, oneshot};

const HISTORY_LIMIT: i64 = 50;

pub enum LedgerRequest {
    Transfer {
        transfer: NewTransfer,
        response: oneshot::Sender<Result<Transaction, ServiceError>>,
    },
    Balance {
        user_id: String,
        response: oneshot::Sender<Result<BalanceSummary, ServiceError>>,
    },
    History {
        user_id: String,
        response: oneshot::Sender<Result<Vec<Transaction>, ServiceError>>,
    },
}

#[derive(Clone)]
pub struct LedgerRequestHandler {
    repository: TransactionRepository,
    notification_channel: mpsc::Sender<NotificationRequest>,
}

impl LedgerRequestHandler {
    pub fn new(sql_conn: PgPool, notification_channel: mpsc::Sender<NotificationRequest>) -> Self {
        let repository = TransactionRepository::new(sql_conn);

        LedgerRequestHandler {
            repository,
            notification_channel,
        }
    }

    async fn transfer(&self, transfer: NewTransfer) -> Result<Transaction, ServiceError> {
        let transaction = self.repository.record_transfer(&transfer).await?;

        log::info!(
            "Recorded transfer {}: {} -> {} ({} cents)",
            transaction.id,
            transaction.sender_id,
            transaction.receiver_id,
            transaction.amount_in_cents
        );

        // The transfer is committed; notifying the receiver happens
        // outside the transaction and must not fail the request.
        let notification_channel = self.notification_channel.clone();
        let user_id = transaction.receiver_id.clone();
        let body = format!(
            "You received {:.2} time credits from {}: {}",
            transaction.amount_in_cents as f64 / 100.0,
            transaction.sender_id,
            transaction.description
        );
        tokio::spawn(async move {
            let _ = notification_channel
                .send(NotificationRequest::Notify { user_id, body })
                .await;
        });

        Ok(transaction)
    }

    async fn balance(&self, user_id: &str) -> Result<BalanceSummary, ServiceError> {
        let summary = self.repository.balance_summary(user_id).await?;
        Ok(summary)
    }

    async fn history(&self, user_id: &str) -> Result<Vec<Transaction>, ServiceError> {
        let transactions = self
            .repository
            .recent_for_user(user_id, HISTORY_LIMIT)
            .await?;
        Ok(transactions)
    }
}

#[async_trait]
impl RequestHandler<LedgerRequest> for LedgerRequestHandler {
    async fn handle_request(&self, request: LedgerRequest) {
        match request {
            LedgerRequest::Transfer { transfer, response } => {
                let result = self.transfer(transfer).await;
                let _ = response.send(result);
            }
            LedgerRequest::Balance { user_id, response } => {
                let result = self.balance(&user_id).await;
                let _ = response.send(result);
            }
            LedgerRequest::History { user_id, response } => {
                let result = self.history(&user_id).await;
                let _ = response.send(result);
            }
        }
    }
}

pub struct LedgerService;

impl LedgerService {
    pub fn new() -> Self {
        LedgerService {}
    }
}

#[async_trait]
impl Service<LedgerRequest, LedgerRequestHandler> for LedgerService {}
