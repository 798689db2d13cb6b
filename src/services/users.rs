use super::{RequestHandler, Service, ServiceError};
use crate::models::users::{NewUser, Profile, ProfileUpdate, UserDetails};
use crate::repositories::users::UserRepository;

use async_trait::async_trait;
use sqlx::PgPool;
use tokio::sync::oneshot;

pub enum UserRequest {
    CreateUser {
        new_user: NewUser,
        response: oneshot::Sender<Result<UserDetails, ServiceError>>,
    },
    GetUser {
        id: String,
        response: oneshot::Sender<Result<UserDetails, ServiceError>>,
    },
    UpdateProfile {
        id: String,
        update: ProfileUpdate,
        response: oneshot::Sender<Result<Profile, ServiceError>>,
    },
}

#[derive(Clone)]
pub struct UserRequestHandler {
    repository: UserRepository,
}

impl UserRequestHandler {
    pub fn new(sql_conn: PgPool) -> Self {
        let repository = UserRepository::new(sql_conn);

        UserRequestHandler { repository }
    }

    async fn create_user(&self, new_user: NewUser) -> Result<UserDetails, ServiceError> {
        let user = self
            .repository
            .insert_user(&new_user)
            .await
            .map_err(|e| ServiceError::Repository("UserService".to_string(), e.to_string()))?;
        let profile = self
            .repository
            .get_or_create_profile(&user.id)
            .await
            .map_err(|e| ServiceError::Repository("UserService".to_string(), e.to_string()))?;

        log::info!("Registered user {} ({})", user.username, user.id);

        Ok(UserDetails { user, profile })
    }

    async fn get_user(&self, id: &str) -> Result<UserDetails, ServiceError> {
        let user = self
            .repository
            .get_user_by_id(id)
            .await
            .map_err(|e| ServiceError::Repository("UserService".to_string(), e.to_string()))?
            .ok_or_else(|| ServiceError::NotFound(format!("user {}", id)))?;

        let profile = self
            .repository
            .get_or_create_profile(id)
            .await
            .map_err(|e| ServiceError::Repository("UserService".to_string(), e.to_string()))?;

        Ok(UserDetails { user, profile })
    }

    async fn update_profile(
        &self,
        id: &str,
        update: ProfileUpdate,
    ) -> Result<Profile, ServiceError> {
        if self
            .repository
            .get_user_by_id(id)
            .await
            .map_err(|e| ServiceError::Repository("UserService".to_string(), e.to_string()))?
            .is_none()
        {
            return Err(ServiceError::NotFound(format!("user {}", id)));
        }

        self.repository
            .update_profile(id, &update)
            .await
            .map_err(|e| ServiceError::Repository("UserService".to_string(), e.to_string()))
    }
}

#[async_trait]
impl RequestHandler<UserRequest> for UserRequestHandler {
    async fn handle_request(&self, request: UserRequest) {
        match request {
            UserRequest::CreateUser { new_user, response } => {
                let result = self.create_user(new_user).await;
                let _ = response.send(result);
            }
            UserRequest::GetUser { id, response } => {
                let result = self.get_user(&id).await;
                let _ = response.send(result);
            }
            UserRequest::UpdateProfile {
                id,
                update,
                response,
            } => {
                let result = self.update_profile(&id, update).await;
                let _ = response.send(result);
            }
        }
    }
}

pub struct UserService;

impl UserService {
    pub fn new() -> Self {
        UserService {}
    }
}

#[async_trait]
impl Service<UserRequest, UserRequestHandler> for UserService {}
