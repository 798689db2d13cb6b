use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::{mpsc, oneshot};
use tower_http::trace::TraceLayer;

use super::credit_requests::CreditRequestServiceRequest;
use super::ledger::LedgerRequest;
use super::listings::ListingRequest;
use super::matching::MatchingRequest;
use super::notifications::NotificationRequest;
use super::users::UserRequest;
use super::ServiceError;

use crate::models::credit_requests::NewCreditRequest;
use crate::models::listings::{ListingKind, ListingUpdate, NewListing};
use crate::models::transactions::NewTransfer;
use crate::models::users::{NewUser, ProfileUpdate};
use crate::repositories::credit_requests::CreditRequestError;
use crate::repositories::listings::ListingError;
use crate::repositories::transactions::TransferError;

#[derive(Clone)]
pub struct ServiceChannels {
    pub ledger: mpsc::Sender<LedgerRequest>,
    pub matching: mpsc::Sender<MatchingRequest>,
    pub listings: mpsc::Sender<ListingRequest>,
    pub users: mpsc::Sender<UserRequest>,
    pub credit_requests: mpsc::Sender<CreditRequestServiceRequest>,
    pub notifications: mpsc::Sender<NotificationRequest>,
}

fn transfer_status(error: &TransferError) -> StatusCode {
    match error {
        TransferError::InvalidAmount
        | TransferError::SelfTransfer
        | TransferError::InsufficientBalance { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        TransferError::AccountNotFound(_) => StatusCode::NOT_FOUND,
        TransferError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_status(error: &ServiceError) -> StatusCode {
    match error {
        ServiceError::Repository(..) => StatusCode::INTERNAL_SERVER_ERROR,
        ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
        ServiceError::Transfer(e) => transfer_status(e),
        ServiceError::CreditRequest(e) => match e {
            CreditRequestError::InvalidAmount | CreditRequestError::SelfRequest => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            CreditRequestError::NotFound(_) => StatusCode::NOT_FOUND,
            CreditRequestError::PermissionDenied => StatusCode::FORBIDDEN,
            CreditRequestError::AlreadyResolved(_) | CreditRequestError::ListingInactive(_) => {
                StatusCode::CONFLICT
            }
            CreditRequestError::Transfer(e) => transfer_status(e),
            CreditRequestError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        },
        ServiceError::Listing(e) => match e {
            ListingError::NotFound(_) => StatusCode::NOT_FOUND,
            ListingError::PermissionDenied => StatusCode::FORBIDDEN,
            ListingError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        },
    }
}

fn error_response(error: ServiceError) -> (StatusCode, Json<serde_json::Value>) {
    (
        error_status(&error),
        Json(json!({"description": error.to_string()})),
    )
}

fn send_failed(e: impl std::fmt::Display) -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"description": format!("Failed to process request: {}", e)})),
    )
}

fn recv_failed(e: impl std::fmt::Display) -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"description": format!("Failed to receive response: {}", e)})),
    )
}

#[derive(Deserialize)]
struct ActorBody {
    user_id: String,
}

#[derive(Deserialize)]
struct ActorParams {
    user_id: String,
}

#[derive(Deserialize)]
struct BrowseParams {
    kind: Option<String>,
    q: Option<String>,
}

// ---- users ----

async fn create_user(
    State(state): State<ServiceChannels>,
    Json(req): Json<NewUser>,
) -> impl IntoResponse {
    let (tx, rx) = oneshot::channel();
    if let Err(e) = state
        .users
        .send(UserRequest::CreateUser {
            new_user: req,
            response: tx,
        })
        .await
    {
        return send_failed(e);
    }

    match rx.await {
        Ok(Ok(details)) => (StatusCode::CREATED, Json(json!(details))),
        Ok(Err(service_error)) => error_response(service_error),
        Err(e) => recv_failed(e),
    }
}

async fn get_user(
    State(state): State<ServiceChannels>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let (tx, rx) = oneshot::channel();
    if let Err(e) = state
        .users
        .send(UserRequest::GetUser { id, response: tx })
        .await
    {
        return send_failed(e);
    }

    match rx.await {
        Ok(Ok(details)) => (StatusCode::OK, Json(json!(details))),
        Ok(Err(service_error)) => error_response(service_error),
        Err(e) => recv_failed(e),
    }
}

async fn update_profile(
    State(state): State<ServiceChannels>,
    Path(id): Path<String>,
    Json(req): Json<ProfileUpdate>,
) -> impl IntoResponse {
    let (tx, rx) = oneshot::channel();
    if let Err(e) = state
        .users
        .send(UserRequest::UpdateProfile {
            id,
            update: req,
            response: tx,
        })
        .await
    {
        return send_failed(e);
    }

    match rx.await {
        Ok(Ok(profile)) => (StatusCode::OK, Json(json!(profile))),
        Ok(Err(service_error)) => error_response(service_error),
        Err(e) => recv_failed(e),
    }
}

// ---- ledger ----

async fn transfer_credits(
    State(state): State<ServiceChannels>,
    Json(req): Json<NewTransfer>,
) -> impl IntoResponse {
    let (tx, rx) = oneshot::channel();
    if let Err(e) = state
        .ledger
        .send(LedgerRequest::Transfer {
            transfer: req,
            response: tx,
        })
        .await
    {
        return send_failed(e);
    }

    match rx.await {
        Ok(Ok(transaction)) => (StatusCode::CREATED, Json(json!(transaction))),
        Ok(Err(service_error)) => error_response(service_error),
        Err(e) => recv_failed(e),
    }
}

async fn get_balance(
    State(state): State<ServiceChannels>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let (tx, rx) = oneshot::channel();
    if let Err(e) = state
        .ledger
        .send(LedgerRequest::Balance {
            user_id: id,
            response: tx,
        })
        .await
    {
        return send_failed(e);
    }

    match rx.await {
        Ok(Ok(summary)) => (StatusCode::OK, Json(json!(summary))),
        Ok(Err(service_error)) => error_response(service_error),
        Err(e) => recv_failed(e),
    }
}

async fn get_transactions(
    State(state): State<ServiceChannels>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let (tx, rx) = oneshot::channel();
    if let Err(e) = state
        .ledger
        .send(LedgerRequest::History {
            user_id: id,
            response: tx,
        })
        .await
    {
        return send_failed(e);
    }

    match rx.await {
        Ok(Ok(transactions)) => (StatusCode::OK, Json(json!(transactions))),
        Ok(Err(service_error)) => error_response(service_error),
        Err(e) => recv_failed(e),
    }
}

// ---- matching ----

async fn get_matches(
    State(state): State<ServiceChannels>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let (tx, rx) = oneshot::channel();
    if let Err(e) = state
        .matching
        .send(MatchingRequest::FindMatches {
            user_id: id,
            response: tx,
        })
        .await
    {
        return send_failed(e);
    }

    match rx.await {
        Ok(Ok(report)) => (StatusCode::OK, Json(json!(report))),
        Ok(Err(service_error)) => error_response(service_error),
        Err(e) => recv_failed(e),
    }
}

// ---- listings ----

async fn create_listing(
    State(state): State<ServiceChannels>,
    Json(req): Json<NewListing>,
) -> impl IntoResponse {
    let (tx, rx) = oneshot::channel();
    if let Err(e) = state
        .listings
        .send(ListingRequest::Create {
            new_listing: req,
            response: tx,
        })
        .await
    {
        return send_failed(e);
    }

    match rx.await {
        Ok(Ok(detail)) => (StatusCode::CREATED, Json(json!(detail))),
        Ok(Err(service_error)) => error_response(service_error),
        Err(e) => recv_failed(e),
    }
}

async fn browse_listings(
    State(state): State<ServiceChannels>,
    Query(params): Query<BrowseParams>,
) -> impl IntoResponse {
    let kind = match params.kind.as_deref() {
        None => None,
        Some(raw) => match raw.parse::<ListingKind>() {
            Ok(kind) => Some(kind),
            Err(e) => {
                return (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    Json(json!({"description": e})),
                )
            }
        },
    };

    let (tx, rx) = oneshot::channel();
    if let Err(e) = state
        .listings
        .send(ListingRequest::Browse {
            kind,
            query: params.q,
            response: tx,
        })
        .await
    {
        return send_failed(e);
    }

    match rx.await {
        Ok(Ok(listings)) => (StatusCode::OK, Json(json!(listings))),
        Ok(Err(service_error)) => error_response(service_error),
        Err(e) => recv_failed(e),
    }
}

async fn get_listing(
    State(state): State<ServiceChannels>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let (tx, rx) = oneshot::channel();
    if let Err(e) = state
        .listings
        .send(ListingRequest::Get { id, response: tx })
        .await
    {
        return send_failed(e);
    }

    match rx.await {
        Ok(Ok(detail)) => (StatusCode::OK, Json(json!(detail))),
        Ok(Err(service_error)) => error_response(service_error),
        Err(e) => recv_failed(e),
    }
}

async fn update_listing(
    State(state): State<ServiceChannels>,
    Path(id): Path<String>,
    Json(req): Json<ListingUpdate>,
) -> impl IntoResponse {
    let (tx, rx) = oneshot::channel();
    if let Err(e) = state
        .listings
        .send(ListingRequest::Update {
            id,
            update: req,
            response: tx,
        })
        .await
    {
        return send_failed(e);
    }

    match rx.await {
        Ok(Ok(detail)) => (StatusCode::OK, Json(json!(detail))),
        Ok(Err(service_error)) => error_response(service_error),
        Err(e) => recv_failed(e),
    }
}

async fn delete_listing(
    State(state): State<ServiceChannels>,
    Path(id): Path<String>,
    Query(params): Query<ActorParams>,
) -> impl IntoResponse {
    let (tx, rx) = oneshot::channel();
    if let Err(e) = state
        .listings
        .send(ListingRequest::Deactivate {
            id,
            actor: params.user_id,
            response: tx,
        })
        .await
    {
        return send_failed(e);
    }

    match rx.await {
        Ok(Ok(())) => (StatusCode::OK, Json(json!({"deactivated": true}))),
        Ok(Err(service_error)) => error_response(service_error),
        Err(e) => recv_failed(e),
    }
}

// ---- credit requests ----

async fn create_credit_request(
    State(state): State<ServiceChannels>,
    Json(req): Json<NewCreditRequest>,
) -> impl IntoResponse {
    let (tx, rx) = oneshot::channel();
    if let Err(e) = state
        .credit_requests
        .send(CreditRequestServiceRequest::Create {
            new_request: req,
            response: tx,
        })
        .await
    {
        return send_failed(e);
    }

    match rx.await {
        Ok(Ok(request)) => (StatusCode::CREATED, Json(json!(request))),
        Ok(Err(service_error)) => error_response(service_error),
        Err(e) => recv_failed(e),
    }
}

async fn accept_credit_request(
    State(state): State<ServiceChannels>,
    Path(id): Path<String>,
    Json(req): Json<ActorBody>,
) -> impl IntoResponse {
    let (tx, rx) = oneshot::channel();
    if let Err(e) = state
        .credit_requests
        .send(CreditRequestServiceRequest::Accept {
            id,
            actor: req.user_id,
            response: tx,
        })
        .await
    {
        return send_failed(e);
    }

    match rx.await {
        Ok(Ok((request, transaction))) => (
            StatusCode::OK,
            Json(json!({"request": request, "transaction": transaction})),
        ),
        Ok(Err(service_error)) => error_response(service_error),
        Err(e) => recv_failed(e),
    }
}

async fn decline_credit_request(
    State(state): State<ServiceChannels>,
    Path(id): Path<String>,
    Json(req): Json<ActorBody>,
) -> impl IntoResponse {
    let (tx, rx) = oneshot::channel();
    if let Err(e) = state
        .credit_requests
        .send(CreditRequestServiceRequest::Decline {
            id,
            actor: req.user_id,
            response: tx,
        })
        .await
    {
        return send_failed(e);
    }

    match rx.await {
        Ok(Ok(request)) => (StatusCode::OK, Json(json!(request))),
        Ok(Err(service_error)) => error_response(service_error),
        Err(e) => recv_failed(e),
    }
}

async fn list_credit_requests(
    State(state): State<ServiceChannels>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let (tx, rx) = oneshot::channel();
    if let Err(e) = state
        .credit_requests
        .send(CreditRequestServiceRequest::ListForUser {
            user_id: id,
            response: tx,
        })
        .await
    {
        return send_failed(e);
    }

    match rx.await {
        Ok(Ok(requests)) => (StatusCode::OK, Json(json!(requests))),
        Ok(Err(service_error)) => error_response(service_error),
        Err(e) => recv_failed(e),
    }
}

// ---- notifications ----

async fn list_notifications(
    State(state): State<ServiceChannels>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let (tx, rx) = oneshot::channel();
    if let Err(e) = state
        .notifications
        .send(NotificationRequest::ListUnread {
            user_id: id,
            response: tx,
        })
        .await
    {
        return send_failed(e);
    }

    match rx.await {
        Ok(Ok(notifications)) => (StatusCode::OK, Json(json!(notifications))),
        Ok(Err(service_error)) => error_response(service_error),
        Err(e) => recv_failed(e),
    }
}

async fn mark_notification_read(
    State(state): State<ServiceChannels>,
    Path(id): Path<String>,
    Json(req): Json<ActorBody>,
) -> impl IntoResponse {
    let (tx, rx) = oneshot::channel();
    if let Err(e) = state
        .notifications
        .send(NotificationRequest::MarkRead {
            user_id: req.user_id,
            id,
            response: tx,
        })
        .await
    {
        return send_failed(e);
    }

    match rx.await {
        Ok(Ok(())) => (StatusCode::OK, Json(json!({"read": true}))),
        Ok(Err(service_error)) => error_response(service_error),
        Err(e) => recv_failed(e),
    }
}

pub async fn start_http_server(
    listen: &str,
    channels: ServiceChannels,
) -> Result<(), anyhow::Error> {
    let app = Router::new()
        .route("/users", post(create_user))
        .route("/users/{id}", get(get_user))
        .route("/users/{id}/profile", put(update_profile))
        .route("/users/{id}/balance", get(get_balance))
        .route("/users/{id}/transactions", get(get_transactions))
        .route("/users/{id}/matches", get(get_matches))
        .route("/users/{id}/credit-requests", get(list_credit_requests))
        .route("/users/{id}/notifications", get(list_notifications))
        .route("/transfer", post(transfer_credits))
        .route("/listings", post(create_listing).get(browse_listings))
        .route(
            "/listings/{id}",
            get(get_listing).put(update_listing).delete(delete_listing),
        )
        .route("/credit-requests", post(create_credit_request))
        .route("/credit-requests/{id}/accept", post(accept_credit_request))
        .route(
            "/credit-requests/{id}/decline",
            post(decline_credit_request),
        )
        .route("/notifications/{id}/read", post(mark_notification_read))
        .route("/health", get(|| async { "OK" }))
        .with_state(channels)
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(listen).await?;
    log::info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}
