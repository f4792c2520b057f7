use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::user::models::DisplayName;
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

const USER_COLUMNS: &str = "id, email, name, password_hash, role, created_at, last_login_at";

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    email: String,
    name: String,
    password_hash: String,
    role: String,
    created_at: DateTime<Utc>,
    last_login_at: Option<DateTime<Utc>>,
}

impl TryFrom<UserRow> for User {
    type Error = ServiceError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let corrupt = |e: &dyn std::fmt::Display| {
            ServiceError::Store(format!("Corrupt user row {}: {}", row.id, e))
        };

        Ok(User {
            id: UserId(row.id),
            email: EmailAddress::new(row.email).map_err(|e| corrupt(&e))?,
            name: DisplayName::new(row.name).map_err(|e| corrupt(&e))?,
            role: row.role.parse().map_err(|e| corrupt(&e))?,
            password_hash: row.password_hash,
            created_at: row.created_at,
            last_login_at: row.last_login_at,
        })
    }
}

fn database_error(e: sqlx::Error) -> ServiceError {
    ServiceError::Store(e.to_string())
}

/// Credential store backed by the `users` table.
pub struct PostgresCredentialStore {
    pool: PgPool,
}

impl PostgresCredentialStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialStore for PostgresCredentialStore {
    async fn find_by_email(&self, email: &EmailAddress) -> Result<Option<User>, ServiceError> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");

        sqlx::query_as::<_, UserRow>(&query)
            .bind(email.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(database_error)?
            .map(User::try_from)
            .transpose()
    }

    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, ServiceError> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");

        sqlx::query_as::<_, UserRow>(&query)
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(database_error)?
            .map(User::try_from)
            .transpose()
    }

    async fn create(&self, fields: NewUser) -> Result<User, ServiceError> {
        let query = format!(
            "INSERT INTO users (id, email, name, password_hash, role, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {USER_COLUMNS}"
        );

        let row = sqlx::query_as::<_, UserRow>(&query)
            .bind(UserId::new().0)
            .bind(fields.email.as_str())
            .bind(fields.name.as_str())
            .bind(&fields.password_hash)
            .bind(fields.role.as_str())
            .bind(Utc::now())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                if let Some(db_err) = e.as_database_error() {
                    if db_err.is_unique_violation()
                        && db_err.constraint() == Some("users_email_key")
                    {
                        return ServiceError::Conflict(ConflictError::EmailTaken(
                            fields.email.to_string(),
                        ));
                    }
                }
                database_error(e)
            })?;

        row.try_into()
    }

    async fn update(&self, id: &UserId, fields: UserUpdate) -> Result<User, ServiceError> {
        let query = format!(
            "UPDATE users SET \
                 role = COALESCE($2, role), \
                 last_login_at = COALESCE($3, last_login_at) \
             WHERE id = $1 \
             RETURNING {USER_COLUMNS}"
        );

        sqlx::query_as::<_, UserRow>(&query)
            .bind(id.0)
            .bind(fields.role.map(|role| role.as_str()))
            .bind(fields.last_login_at)
            .fetch_optional(&self.pool)
            .await
            .map_err(database_error)?
            .ok_or(ServiceError::Auth(AuthError::UserNotFound))?
            .try_into()
    }
}

#[async_trait]
impl UserDirectory for PostgresCredentialStore {
    async fn list_users(&self) -> Result<Vec<User>, ServiceError> {
        let query = format!("SELECT {USER_COLUMNS} FROM users ORDER BY created_at ASC");

        sqlx::query_as::<_, UserRow>(&query)
            .fetch_all(&self.pool)
            .await
            .map_err(database_error)?
            .into_iter()
            .map(User::try_from)
            .collect()
    }
}
