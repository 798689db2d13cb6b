use super::{RequestHandler, Service, ServiceError};
use crate::models::listings::{ListingDetail, ListingKind, ListingUpdate, NewListing};
use crate::repositories::listings::ListingRepository;

use async_trait::async_trait;
use sqlx::PgPool;
use tokio::sync::oneshot;

pub enum ListingRequest {
    Create {
        new_listing: NewListing,
        response: oneshot::Sender<Result<ListingDetail, ServiceError>>,
    },
    Update {
        id: String,
        update: ListingUpdate,
        response: oneshot::Sender<Result<ListingDetail, ServiceError>>,
    },
    Deactivate {
        id: String,
        actor: String,
        response: oneshot::Sender<Result<(), ServiceError>>,
    },
    Get {
        id: String,
        response: oneshot::Sender<Result<ListingDetail, ServiceError>>,
    },
    Browse {
        kind: Option<ListingKind>,
        query: Option<String>,
        response: oneshot::Sender<Result<Vec<ListingDetail>, ServiceError>>,
    },
}

#[derive(Clone)]
pub struct ListingRequestHandler {
    repository: ListingRepository,
}

impl ListingRequestHandler {
    pub fn new(sql_conn: PgPool) -> Self {
        let repository = ListingRepository::new(sql_conn);

        ListingRequestHandler { repository }
    }

    async fn create(&self, new_listing: NewListing) -> Result<ListingDetail, ServiceError> {
        let detail = self.repository.create(&new_listing).await?;

        log::info!(
            "Created {} listing {} for user {}",
            detail.kind,
            detail.id,
            detail.user_id
        );

        Ok(detail)
    }

    async fn get(&self, id: &str) -> Result<ListingDetail, ServiceError> {
        let detail = self
            .repository
            .get(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("listing {}", id)))?;

        Ok(detail)
    }
}

#[async_trait]
impl RequestHandler<ListingRequest> for ListingRequestHandler {
    async fn handle_request(&self, request: ListingRequest) {
        match request {
            ListingRequest::Create {
                new_listing,
                response,
            } => {
                let result = self.create(new_listing).await;
                let _ = response.send(result);
            }
            ListingRequest::Update {
                id,
                update,
                response,
            } => {
                let result = self
                    .repository
                    .update(&update.user_id, &id, &update)
                    .await
                    .map_err(ServiceError::from);
                let _ = response.send(result);
            }
            ListingRequest::Deactivate {
                id,
                actor,
                response,
            } => {
                let result = self
                    .repository
                    .deactivate(&actor, &id)
                    .await
                    .map_err(ServiceError::from);
                let _ = response.send(result);
            }
            ListingRequest::Get { id, response } => {
                let result = self.get(&id).await;
                let _ = response.send(result);
            }
            ListingRequest::Browse {
                kind,
                query,
                response,
            } => {
                let result = self
                    .repository
                    .browse(kind, query.as_deref())
                    .await
                    .map_err(ServiceError::from);
                let _ = response.send(result);
            }
        }
    }
}

pub struct ListingService;

impl ListingService {
    pub fn new() -> Self {
        ListingService {}
    }
}

#[async_trait]
impl Service<ListingRequest, ListingRequestHandler> for ListingService {}
