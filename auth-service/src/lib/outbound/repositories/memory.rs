use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::domain::user::models::EmailAddress;
use crate::domain::user::models::NewUser;
use crate::domain::user::models::User;
use crate::domain::user::models::UserId;
use crate::domain::user::models::UserUpdate;
use crate::domain::user::ports::CredentialStore;
use crate::domain::user::ports::UserDirectory;
use crate::user::errors::AuthError;
use crate::user::errors::ConflictError;
use crate::user::errors::ServiceError;

/// Process-local credential store, used when no database is configured and
/// by the integration tests.
#[derive(Default)]
pub struct InMemoryCredentialStore {
    users: RwLock<HashMap<UserId, User>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn find_by_email(&self, email: &EmailAddress) -> Result<Option<User>, ServiceError> {
        let users = self.users.read().await;
        Ok(users.values().find(|u| u.email == *email).cloned())
    }

    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, ServiceError> {
        Ok(self.users.read().await.get(id).cloned())
    }

    async fn create(&self, fields: NewUser) -> Result<User, ServiceError> {
        let mut users = self.users.write().await;

        if users.values().any(|u| u.email == fields.email) {
            return Err(ConflictError::EmailTaken(fields.email.to_string()).into());
        }

        let user = User {
            id: UserId::new(),
            email: fields.email,
            name: fields.name,
            password_hash: fields.password_hash,
            role: fields.role,
            created_at: Utc::now(),
            last_login_at: None,
        };
        users.insert(user.id, user.clone());

        Ok(user)
    }

    async fn update(&self, id: &UserId, fields: UserUpdate) -> Result<User, ServiceError> {
        let mut users = self.users.write().await;
        let user = users.get_mut(id).ok_or(AuthError::UserNotFound)?;

        if let Some(role) = fields.role {
            user.role = role;
        }
        if let Some(at) = fields.last_login_at {
            user.last_login_at = Some(at);
        }

        Ok(user.clone())
    }
}

#[async_trait]
impl UserDirectory for InMemoryCredentialStore {
    async fn list_users(&self) -> Result<Vec<User>, ServiceError> {
        let mut users: Vec<User> = self.users.read().await.values().cloned().collect();
        users.sort_by_key(|u| u.created_at);
        Ok(users)
    }
}
