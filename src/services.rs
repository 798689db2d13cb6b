use async_trait::async_trait;
use sqlx::PgPool;
use tokio::sync::mpsc;

use crate::settings::Settings;

mod credit_requests;
mod http;
mod ledger;
mod listings;
mod matching;
mod notifications;
mod users;

#[derive(Debug, thiserror::Error)]
enum ServiceError {
    #[error("Repository error: {0} - {1}")]
    Repository(String, String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Transfer(#[from] crate::repositories::transactions::TransferError),
    #[error(transparent)]
    CreditRequest(#[from] crate::repositories::credit_requests::CreditRequestError),
    #[error(transparent)]
    Listing(#[from] crate::repositories::listings::ListingError),
}

#[async_trait]
pub trait RequestHandler<T>: Send + Sync + 'static
where
    T: Send + 'static,
{
    async fn handle_request(&self, request: T);
}

#[async_trait]
pub trait Service<T, H>: Send + Sync + 'static
where
    T: Send + 'static,
    H: RequestHandler<T> + Clone + Send,
{
    async fn run(&mut self, handler: H, receiver: &mut mpsc::Receiver<T>) {
        while let Some(request) = receiver.recv().await {
            let handler = handler.clone();

            tokio::spawn(async move {
                handler.handle_request(request).await;
            });
        }
    }
}

pub async fn start_services(pool: PgPool, settings: Settings) -> Result<(), anyhow::Error> {
    let (ledger_tx, mut ledger_rx) = mpsc::channel(512);
    let (matching_tx, mut matching_rx) = mpsc::channel(512);
    let (listing_tx, mut listing_rx) = mpsc::channel(512);
    let (user_tx, mut user_rx) = mpsc::channel(512);
    let (credit_tx, mut credit_rx) = mpsc::channel(512);
    let (notification_tx, mut notification_rx) = mpsc::channel(512);

    let mut ledger_service = ledger::LedgerService::new();
    let mut matching_service = matching::MatchingService::new();
    let mut listing_service = listings::ListingService::new();
    let mut user_service = users::UserService::new();
    let mut credit_service = credit_requests::CreditRequestService::new();
    let mut notification_service = notifications::NotificationService::new();

    log::info!("Starting notification service.");
    let notification_pool = pool.clone();
    tokio::spawn(async move {
        notification_service
            .run(
                notifications::NotificationRequestHandler::new(notification_pool),
                &mut notification_rx,
            )
            .await;
    });

    log::info!("Starting ledger service.");
    let ledger_pool = pool.clone();
    let ledger_notification_tx = notification_tx.clone();
    tokio::spawn(async move {
        ledger_service
            .run(
                ledger::LedgerRequestHandler::new(ledger_pool, ledger_notification_tx),
                &mut ledger_rx,
            )
            .await;
    });

    log::info!("Starting credit request service.");
    let credit_pool = pool.clone();
    let credit_notification_tx = notification_tx.clone();
    tokio::spawn(async move {
        credit_service
            .run(
                credit_requests::CreditRequestHandler::new(credit_pool, credit_notification_tx),
                &mut credit_rx,
            )
            .await;
    });

    log::info!("Starting matching service.");
    let matching_pool = pool.clone();
    tokio::spawn(async move {
        matching_service
            .run(
                matching::MatchingRequestHandler::new(matching_pool),
                &mut matching_rx,
            )
            .await;
    });

    log::info!("Starting listing service.");
    let listing_pool = pool.clone();
    tokio::spawn(async move {
        listing_service
            .run(
                listings::ListingRequestHandler::new(listing_pool),
                &mut listing_rx,
            )
            .await;
    });

    log::info!("Starting user service.");
    let user_pool = pool.clone();
    tokio::spawn(async move {
        user_service
            .run(users::UserRequestHandler::new(user_pool), &mut user_rx)
            .await;
    });

    log::info!("Starting HTTP server.");
    http::start_http_server(
        &settings.server.listen,
        http::ServiceChannels {
            ledger: ledger_tx,
            matching: matching_tx,
            listings: listing_tx,
            users: user_tx,
            credit_requests: credit_tx,
            notifications: notification_tx,
        },
    )
    .await
}
