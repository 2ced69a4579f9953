use std::sync::Arc;
use uuid::Uuid;

use crate::api::error;
use crate::modules::user::model::{InsertUser, SignInModel, SignUpModel, UserResponse};
use crate::modules::user::repository::UserRepository;
use crate::utils::{hash_password, verify_password, Claims};
use crate::ENV;

#[derive(Clone)]
pub struct UserService<U>
where
    U: UserRepository + Send + Sync,
{
    repo: Arc<U>,
}

impl<U> UserService<U>
where
    U: UserRepository + Send + Sync,
{
    pub fn with_dependencies(repo: Arc<U>) -> Self {
        UserService { repo }
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<UserResponse, error::SystemError> {
        let user = self
            .repo
            .find_by_id(&id)
            .await?
            .ok_or_else(|| error::SystemError::not_found("User not found"))?;
        Ok(UserResponse::from(user))
    }

    pub async fn search(&self, query: &str) -> Result<Vec<UserResponse>, error::SystemError> {
        let users = self.repo.search_users(query, 50).await?;
        Ok(users.into_iter().map(UserResponse::from).collect())
    }

    pub async fn sign_up(&self, user: SignUpModel) -> Result<Uuid, error::SystemError> {
        let hash_password = hash_password(&user.password)?;

        let new_user = InsertUser {
            username: user.username,
            email: user.email,
            hash_password,
            display_name: user.display_name,
        };

        let user_id = self.repo.create(&new_user).await?;
        Ok(user_id)
    }

    pub async fn sign_in(&self, user: SignInModel) -> Result<String, error::SystemError> {
        let user_entity = self
            .repo
            .find_by_username(&user.username)
            .await?
            .ok_or_else(|| error::SystemError::unauthorized("Invalid username or password"))?;

        let valid = verify_password(&user_entity.hash_password, &user.password)?;
        if !valid {
            return Err(error::SystemError::unauthorized("Invalid username or password"));
        }

        let access_token = Claims::new(&user_entity.id, ENV.access_token_expiration)
            .encode(ENV.jwt_secret.as_ref())?;

        Ok(access_token)
    }
}
