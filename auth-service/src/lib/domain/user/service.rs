use std::sync::Arc;
use std::sync::OnceLock;

use async_trait::async_trait;
use auth::Authenticator;
use auth::Claims;
use auth::Clock;
use auth::JwtError;
use auth::RateDecision;
use auth::TokenPair;

use crate::domain::user::models::AuthResult;
use crate::domain::user::models::AuthenticatedUser;
use crate::domain::user::models::EmailAddress;
use crate::domain::user::models::Limiter;
use crate::domain::user::models::LogoutScope;
use crate::domain::user::models::NewUser;
use crate::domain::user::models::RateLimitPolicies;
use crate::domain::user::models::RegisterUserCommand;
use crate::domain::user::models::Role;
use crate::domain::user::models::User;
use crate::domain::user::models::UserId;
use crate::domain::user::models::UserUpdate;
use crate::user::errors::AuthError;
use crate::user::errors::ConflictError;
use crate::user::errors::RateLimitExceeded;
use crate::user::errors::ServiceError;
use crate::user::errors::ValidationError;
use crate::user::ports::AuthServicePort;
use crate::user::ports::CredentialStore;
use crate::user::ports::UserDirectory;

/// Verified against when the email is unknown, so a miss costs one hash
/// verification just like a wrong password.
const TIMING_PARITY_PASSWORD: &str = "timing-parity-placeholder";

/// Domain service implementation for authentication operations.
///
/// Holds the per-instance [`Authenticator`] (sessions, rate buckets, signing
/// key) and the credential store. Nothing is held locked across a store call.
pub struct AuthService<CS>
where
    CS: CredentialStore + UserDirectory,
{
    store: Arc<CS>,
    authenticator: Arc<Authenticator<UserId>>,
    rate_limits: RateLimitPolicies,
    clock: Arc<dyn Clock>,
    dummy_hash: Arc<OnceLock<String>>,
}

impl<CS> AuthService<CS>
where
    CS: CredentialStore + UserDirectory,
{
    /// Create a new auth service with injected dependencies.
    ///
    /// # Arguments
    /// * `store` - Credential store implementation
    /// * `authenticator` - Token, session and rate limit context
    /// * `rate_limits` - Quotas for the named limiters
    /// * `clock` - Time source, shared with `authenticator`
    pub fn new(
        store: Arc<CS>,
        authenticator: Arc<Authenticator<UserId>>,
        rate_limits: RateLimitPolicies,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            authenticator,
            rate_limits,
            clock,
            dummy_hash: Arc::new(OnceLock::new()),
        }
    }

    fn claims_for(user: &User) -> Claims {
        Claims::new(user.id, user.email.as_str(), user.role.as_str())
    }

    fn auth_result(&self, user: User) -> Result<AuthResult, ServiceError> {
        let tokens = self.issue_pair(&user)?;
        Ok(AuthResult { tokens, user })
    }

    /// Runs the Argon2 check on the blocking pool. A missing digest still
    /// performs one verification and then reports a mismatch.
    async fn verify_password(
        &self,
        password: &str,
        stored_hash: Option<String>,
    ) -> Result<bool, ServiceError> {
        let authenticator = Arc::clone(&self.authenticator);
        let dummy_hash = Arc::clone(&self.dummy_hash);
        let password = password.to_owned();

        tokio::task::spawn_blocking(move || match stored_hash {
            Some(hash) => authenticator.verify_password(&password, &hash),
            None => {
                let dummy = dummy_hash.get_or_init(|| {
                    authenticator
                        .hash_password(TIMING_PARITY_PASSWORD)
                        .unwrap_or_default()
                });
                let _ = authenticator.verify_password(&password, dummy);
                false
            }
        })
        .await
        .map_err(|e| ServiceError::Internal(format!("Password verification task failed: {}", e)))
    }
}

#[async_trait]
impl<CS> AuthServicePort for AuthService<CS>
where
    CS: CredentialStore + UserDirectory,
{
    async fn hash_password(&self, password: &str) -> Result<String, ServiceError> {
        let authenticator = Arc::clone(&self.authenticator);
        let password = password.to_owned();

        tokio::task::spawn_blocking(move || authenticator.hash_password(&password))
            .await
            .map_err(|e| ServiceError::Internal(format!("Password hashing task failed: {}", e)))?
            .map_err(|e| ServiceError::Internal(format!("Password hashing failed: {}", e)))
    }

    async fn register(&self, command: RegisterUserCommand) -> Result<AuthResult, ServiceError> {
        if self.store.find_by_email(&command.email).await?.is_some() {
            return Err(ConflictError::EmailTaken(command.email.to_string()).into());
        }

        let user = self
            .store
            .create(NewUser {
                email: command.email,
                name: command.name,
                password_hash: command.password_digest,
                role: Role::User,
            })
            .await?;

        tracing::info!(user_id = %user.id, "User registered");

        self.auth_result(user)
    }

    async fn login(
        &self,
        email: &EmailAddress,
        password: &str,
    ) -> Result<AuthResult, ServiceError> {
        let user = self.store.find_by_email(email).await?;
        let stored_hash = user.as_ref().map(|u| u.password_hash.clone());

        let user = match (self.verify_password(password, stored_hash).await?, user) {
            (true, Some(user)) => user,
            _ => {
                tracing::debug!(%email, "Login rejected");
                return Err(AuthError::InvalidCredentials.into());
            }
        };

        let user = self
            .store
            .update(&user.id, UserUpdate::last_login(self.clock.now()))
            .await?;

        tracing::info!(user_id = %user.id, "User logged in");

        self.auth_result(user)
    }

    async fn refresh(&self, refresh_token: &str) -> Result<AuthResult, ServiceError> {
        let session = self
            .authenticator
            .consume_refresh_token(refresh_token)
            .ok_or(AuthError::InvalidToken)?;

        let user = match self.store.find_by_id(&session.user_id).await {
            Ok(Some(user)) => user,
            Ok(None) => {
                tracing::warn!(user_id = %session.user_id, "Refresh for a user that no longer exists");
                return Err(AuthError::InvalidToken.into());
            }
            Err(e) => {
                let restored = self.authenticator.restore_session(session);
                tracing::warn!(error = %e, restored, "Credential lookup failed during refresh");
                return Err(e);
            }
        };

        // Refused if the user's sessions were revoked while the lookup ran.
        let tokens = self
            .authenticator
            .rotate_pair(&Self::claims_for(&user), &session)?;

        tracing::debug!(user_id = %user.id, "Refresh token rotated");

        Ok(AuthResult { tokens, user })
    }

    async fn logout(
        &self,
        user_id: &UserId,
        scope: LogoutScope,
        refresh_token: Option<&str>,
    ) -> Result<usize, ServiceError> {
        let revoked = match scope {
            LogoutScope::All => self.authenticator.revoke_all(user_id),
            LogoutScope::Single => {
                let token = refresh_token.ok_or(ValidationError::MissingField("refresh_token"))?;

                match self.authenticator.session(token) {
                    Some(session) if session.user_id == *user_id => {
                        usize::from(self.authenticator.revoke(token))
                    }
                    _ => 0,
                }
            }
        };

        tracing::info!(%user_id, ?scope, revoked, "User logged out");

        Ok(revoked)
    }

    fn issue_pair(&self, user: &User) -> Result<TokenPair, ServiceError> {
        Ok(self
            .authenticator
            .issue_pair(&Self::claims_for(user), user.id)?)
    }

    fn verify_token(&self, token: &str) -> Result<Claims, AuthError> {
        self.authenticator
            .validate_token(token)
            .map_err(|e| match e {
                JwtError::Expired => AuthError::Expired,
                _ => AuthError::InvalidToken,
            })
    }

    async fn authenticate(&self, token: &str) -> Result<AuthenticatedUser, AuthError> {
        let claims = self.verify_token(token).map_err(|e| {
            tracing::debug!(error = %e, "Access token rejected");
            AuthError::Unauthenticated
        })?;

        let user_id = UserId::from_string(&claims.sub).map_err(|e| {
            tracing::warn!(error = %e, "Signed token carries a malformed subject");
            AuthError::Unauthenticated
        })?;

        match self.store.find_by_id(&user_id).await {
            Ok(Some(user)) => Ok(user.into()),
            Ok(None) => {
                tracing::debug!(%user_id, "Token subject no longer exists");
                Err(AuthError::Unauthenticated)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Credential lookup failed during authentication");
                Err(AuthError::Unauthenticated)
            }
        }
    }

    fn authorize(&self, user: &AuthenticatedUser, required: Role) -> Result<(), AuthError> {
        if user.role().satisfies(required) {
            Ok(())
        } else {
            tracing::debug!(user_id = %user.id(), %required, "Role check failed");
            Err(AuthError::Forbidden)
        }
    }

    fn enforce_rate_limit(
        &self,
        limiter: Limiter,
        subject: &str,
    ) -> Result<(), RateLimitExceeded> {
        let key = format!("{}:{}", limiter.name(), subject);

        match self
            .authenticator
            .check_rate_limit(&key, self.rate_limits.policy(limiter))
        {
            RateDecision::Allow { .. } => Ok(()),
            RateDecision::Deny { retry_after_secs } => {
                Err(RateLimitExceeded { retry_after_secs })
            }
        }
    }

    async fn list_users(&self) -> Result<Vec<User>, ServiceError> {
        self.store.list_users().await
    }

    async fn update_role(&self, user_id: &UserId, role: Role) -> Result<User, ServiceError> {
        let user = self.store.update(user_id, UserUpdate::role(role)).await?;

        tracing::info!(%user_id, %role, "User role changed");

        Ok(user)
    }

    fn sweep_expired_sessions(&self) -> Vec<String> {
        let removed = self.authenticator.sweep_expired_sessions();
        let pruned = self
            .authenticator
            .prune_rate_limits(self.rate_limits.max_window_secs());

        if !removed.is_empty() || pruned > 0 {
            tracing::debug!(
                sessions = removed.len(),
                rate_limit_keys = pruned,
                "Swept expired state"
            );
        }

        removed
    }
}
