//! User service
//!
//! Accounts and sessions for the admin console:
//! - Setup: the very first account is created through `register` and
//!   becomes the administrator; afterwards accounts are created by admins
//! - Login by username or email, producing a session token
//! - Session validation, logout and periodic cleanup
//! - Password changes

use crate::db::repositories::{SessionRepository, UserRepository};
use crate::models::{CreateUserInput, ListParams, PagedResult, Session, User, UserRole, UserStatus};
use crate::services::password::{check_password_policy, hash_password, verify_password};
use anyhow::Context;
use chrono::Duration;
use serde::Deserialize;
use std::sync::Arc;

const DEFAULT_SESSION_DAYS: i64 = 7;
const MAX_USERNAME_LENGTH: usize = 50;

#[derive(Debug, thiserror::Error)]
pub enum UserServiceError {
    /// Invalid credentials or disabled account
    #[error("Authentication failed: {0}")]
    AuthenticationError(String),

    #[error("Registration is closed")]
    RegistrationClosed,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("User already exists: {0}")]
    UserExists(String),

    #[error("User not found: {0}")]
    NotFound(i64),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterInput {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

impl RegisterInput {
    pub fn new(username: impl Into<String>, email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            email: email.into(),
            password: password.into(),
            display_name: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginInput {
    /// Username or email
    pub login: String,
    pub password: String,
}

pub struct UserService {
    user_repo: Arc<dyn UserRepository>,
    session_repo: Arc<dyn SessionRepository>,
    session_lifetime: Duration,
}

impl UserService {
    pub fn new(user_repo: Arc<dyn UserRepository>, session_repo: Arc<dyn SessionRepository>) -> Self {
        Self::with_session_days(user_repo, session_repo, DEFAULT_SESSION_DAYS)
    }

    pub fn with_session_days(
        user_repo: Arc<dyn UserRepository>,
        session_repo: Arc<dyn SessionRepository>,
        session_days: i64,
    ) -> Self {
        Self {
            user_repo,
            session_repo,
            session_lifetime: Duration::days(session_days.max(1)),
        }
    }

    /// Whether at least one account exists
    pub async fn has_users(&self) -> Result<bool, UserServiceError> {
        let count = self.user_repo.count().await.context("Failed to count users")?;
        Ok(count > 0)
    }

    /// Create the first account, which is always an admin
    pub async fn register(&self, input: RegisterInput) -> Result<User, UserServiceError> {
        if self.has_users().await? {
            return Err(UserServiceError::RegistrationClosed);
        }
        let record = self.prepare_user(input, UserRole::Admin).await?;
        // A concurrent registration may have won since the check above
        let user = self
            .user_repo
            .create_first(&record)
            .await
            .context("Failed to create user")?
            .ok_or(UserServiceError::RegistrationClosed)?;
        tracing::info!("Initial admin account created: {}", user.username);
        Ok(user)
    }

    /// Create an additional account on behalf of an admin
    pub async fn create_user(&self, input: RegisterInput, role: UserRole) -> Result<User, UserServiceError> {
        let record = self.prepare_user(input, role).await?;
        let user = self
            .user_repo
            .create(&record)
            .await
            .context("Failed to create user")?;
        tracing::info!("User created: {} ({})", user.username, user.role);
        Ok(user)
    }

    /// Verify credentials and open a session
    pub async fn login(&self, input: LoginInput) -> Result<(User, Session), UserServiceError> {
        let invalid = || UserServiceError::AuthenticationError("Invalid username or password".to_string());

        let user = self
            .user_repo
            .get_by_login(input.login.trim())
            .await
            .context("Failed to look up user")?
            .ok_or_else(invalid)?;

        if !verify_password(&input.password, &user.password_hash).context("Failed to verify password")? {
            return Err(invalid());
        }
        if !user.is_active() {
            return Err(UserServiceError::AuthenticationError(
                "This account has been disabled".to_string(),
            ));
        }

        let session = Session::issue(user.id, self.session_lifetime);
        self.session_repo
            .create(&session)
            .await
            .context("Failed to create session")?;
        self.user_repo
            .update_last_login(user.id)
            .await
            .context("Failed to record login time")?;

        tracing::info!("User logged in: {}", user.username);
        Ok((user, session))
    }

    pub async fn logout(&self, session_id: &str) -> Result<(), UserServiceError> {
        self.session_repo
            .delete(session_id)
            .await
            .context("Failed to delete session")?;
        Ok(())
    }

    /// Resolve a session token to its user
    ///
    /// Expired sessions are deleted on sight. Disabled users are treated as
    /// logged out.
    pub async fn validate_session(&self, token: &str) -> Result<Option<User>, UserServiceError> {
        let Some(session) = self
            .session_repo
            .get_by_id(token)
            .await
            .context("Failed to get session")?
        else {
            return Ok(None);
        };

        if session.is_expired() {
            self.session_repo
                .delete(token)
                .await
                .context("Failed to delete expired session")?;
            return Ok(None);
        }

        let user = self
            .user_repo
            .get_by_id(session.user_id)
            .await
            .context("Failed to get session user")?;
        Ok(user.filter(User::is_active))
    }

    pub async fn cleanup_expired_sessions(&self) -> Result<u64, UserServiceError> {
        let removed = self
            .session_repo
            .delete_expired()
            .await
            .context("Failed to delete expired sessions")?;
        if removed > 0 {
            tracing::debug!("Removed {} expired sessions", removed);
        }
        Ok(removed)
    }

    /// Change a password after checking the current one
    ///
    /// Other sessions of the user are revoked; `keep_session` survives.
    pub async fn change_password(
        &self,
        user: &User,
        current_password: &str,
        new_password: &str,
        keep_session: Option<&str>,
    ) -> Result<(), UserServiceError> {
        if !verify_password(current_password, &user.password_hash).context("Failed to verify password")? {
            return Err(UserServiceError::AuthenticationError(
                "Current password is incorrect".to_string(),
            ));
        }
        check_password_policy(new_password).map_err(UserServiceError::ValidationError)?;

        let hash = hash_password(new_password).context("Failed to hash password")?;
        self.user_repo
            .update_password(user.id, &hash)
            .await
            .context("Failed to update password")?;

        let kept = match keep_session {
            Some(id) => self.session_repo.get_by_id(id).await.context("Failed to get session")?,
            None => None,
        };
        self.session_repo
            .delete_by_user(user.id)
            .await
            .context("Failed to revoke sessions")?;
        if let Some(session) = kept {
            self.session_repo
                .create(&session)
                .await
                .context("Failed to restore session")?;
        }

        tracing::info!("Password changed for {}", user.username);
        Ok(())
    }

    pub async fn get_by_id(&self, id: i64) -> Result<User, UserServiceError> {
        self.user_repo
            .get_by_id(id)
            .await
            .context("Failed to get user")?
            .ok_or(UserServiceError::NotFound(id))
    }

    pub async fn list_users(&self, params: &ListParams) -> Result<PagedResult<User>, UserServiceError> {
        let users = self.user_repo.list(params).await.context("Failed to list users")?;
        let total = self.user_repo.count().await.context("Failed to count users")?;
        Ok(PagedResult::new(users, total, params))
    }

    /// Enable or disable an account; disabling also ends its sessions
    pub async fn set_status(&self, id: i64, status: UserStatus) -> Result<User, UserServiceError> {
        if !self
            .user_repo
            .update_status(id, status)
            .await
            .context("Failed to update user status")?
        {
            return Err(UserServiceError::NotFound(id));
        }
        if status == UserStatus::Disabled {
            self.session_repo
                .delete_by_user(id)
                .await
                .context("Failed to revoke sessions")?;
        }
        self.get_by_id(id).await
    }

    pub async fn count(&self) -> Result<i64, UserServiceError> {
        Ok(self.user_repo.count().await.context("Failed to count users")?)
    }

    /// Validate a new account and hash its password
    async fn prepare_user(&self, input: RegisterInput, role: UserRole) -> Result<CreateUserInput, UserServiceError> {
        let username = input.username.trim().to_string();
        let email = input.email.trim().to_lowercase();
        validate_username(&username)?;
        if !is_plausible_email(&email) {
            return Err(UserServiceError::ValidationError("Invalid email format".to_string()));
        }
        check_password_policy(&input.password).map_err(UserServiceError::ValidationError)?;

        if self
            .user_repo
            .get_by_username(&username)
            .await
            .context("Failed to check username")?
            .is_some()
        {
            return Err(UserServiceError::UserExists(format!("Username '{}' is already taken", username)));
        }
        if self
            .user_repo
            .get_by_email(&email)
            .await
            .context("Failed to check email")?
            .is_some()
        {
            return Err(UserServiceError::UserExists(format!("Email '{}' is already registered", email)));
        }

        let password_hash = hash_password(&input.password).context("Failed to hash password")?;
        let display_name = input
            .display_name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());

        Ok(CreateUserInput {
            username,
            email,
            password_hash,
            display_name,
            role,
        })
    }
}

fn validate_username(username: &str) -> Result<(), UserServiceError> {
    if username.is_empty() {
        return Err(UserServiceError::ValidationError("Username cannot be empty".to_string()));
    }
    if username.chars().count() > MAX_USERNAME_LENGTH {
        return Err(UserServiceError::ValidationError(format!(
            "Username cannot exceed {} characters",
            MAX_USERNAME_LENGTH
        )));
    }
    if !username
        .chars()
        .all(|c| c.is_alphanumeric() || c == '_' || c == '-' || c == '.')
    {
        return Err(UserServiceError::ValidationError(
            "Username may only contain letters, digits, '.', '_' and '-'".to_string(),
        ));
    }
    Ok(())
}

fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SqlxSessionRepository, SqlxUserRepository};
    use crate::db::{create_test_pool, migrations::run_migrations};

    const PASSWORD: &str = "correct horse";

    async fn setup_test_service() -> UserService {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        run_migrations(&pool).await.expect("Failed to run migrations");
        UserService::new(
            SqlxUserRepository::boxed(pool.clone()),
            SqlxSessionRepository::boxed(pool),
        )
    }

    fn login(login: &str, password: &str) -> LoginInput {
        LoginInput {
            login: login.to_string(),
            password: password.to_string(),
        }
    }

    #[tokio::test]
    async fn test_first_registration_is_admin_then_closed() {
        let service = setup_test_service().await;
        assert!(!service.has_users().await.unwrap());

        let admin = service
            .register(RegisterInput::new("admin", "Admin@Example.com", PASSWORD))
            .await
            .unwrap();
        assert_eq!(admin.role, UserRole::Admin);
        assert_eq!(admin.email, "admin@example.com");
        assert!(service.has_users().await.unwrap());

        let second = service
            .register(RegisterInput::new("other", "other@example.com", PASSWORD))
            .await;
        assert!(matches!(second, Err(UserServiceError::RegistrationClosed)));
    }

    #[tokio::test]
    async fn test_concurrent_registrations_create_one_admin() {
        let service = setup_test_service().await;

        let (a, b) = tokio::join!(
            service.register(RegisterInput::new("first", "first@example.com", PASSWORD)),
            service.register(RegisterInput::new("second", "second@example.com", PASSWORD)),
        );

        assert_eq!([a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(), 1);
        assert!(matches!(
            if a.is_ok() { b } else { a },
            Err(UserServiceError::RegistrationClosed)
        ));
        assert_eq!(service.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_create_user_validation() {
        let service = setup_test_service().await;
        service
            .register(RegisterInput::new("admin", "admin@example.com", PASSWORD))
            .await
            .unwrap();

        let bad_email = service
            .create_user(RegisterInput::new("ed", "not-an-email", PASSWORD), UserRole::Editor)
            .await;
        assert!(matches!(bad_email, Err(UserServiceError::ValidationError(_))));

        let short = service
            .create_user(RegisterInput::new("ed", "ed@example.com", "short"), UserRole::Editor)
            .await;
        assert!(matches!(short, Err(UserServiceError::ValidationError(_))));

        let dup = service
            .create_user(RegisterInput::new("admin", "x@example.com", PASSWORD), UserRole::Editor)
            .await;
        assert!(matches!(dup, Err(UserServiceError::UserExists(_))));

        let editor = service
            .create_user(RegisterInput::new("ed", "ed@example.com", PASSWORD), UserRole::Editor)
            .await
            .unwrap();
        assert_eq!(editor.role, UserRole::Editor);
    }

    #[tokio::test]
    async fn test_login_by_username_or_email() {
        let service = setup_test_service().await;
        service
            .register(RegisterInput::new("admin", "admin@example.com", PASSWORD))
            .await
            .unwrap();

        let (user, session) = service.login(login("admin", PASSWORD)).await.unwrap();
        assert_eq!(user.username, "admin");
        let resolved = service.validate_session(&session.id).await.unwrap().unwrap();
        assert_eq!(resolved.id, user.id);
        assert!(resolved.last_login_at.is_some());

        assert!(service.login(login("admin@example.com", PASSWORD)).await.is_ok());
        assert!(matches!(
            service.login(login("admin", "wrong password")).await,
            Err(UserServiceError::AuthenticationError(_))
        ));
        assert!(matches!(
            service.login(login("nobody", PASSWORD)).await,
            Err(UserServiceError::AuthenticationError(_))
        ));
    }

    #[tokio::test]
    async fn test_logout_invalidates_session() {
        let service = setup_test_service().await;
        service
            .register(RegisterInput::new("admin", "admin@example.com", PASSWORD))
            .await
            .unwrap();
        let (_, session) = service.login(login("admin", PASSWORD)).await.unwrap();

        service.logout(&session.id).await.unwrap();
        assert!(service.validate_session(&session.id).await.unwrap().is_none());
        assert!(service.validate_session("unknown-token").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_disabled_user_cannot_log_in() {
        let service = setup_test_service().await;
        service
            .register(RegisterInput::new("admin", "admin@example.com", PASSWORD))
            .await
            .unwrap();
        let editor = service
            .create_user(RegisterInput::new("ed", "ed@example.com", PASSWORD), UserRole::Editor)
            .await
            .unwrap();
        let (_, session) = service.login(login("ed", PASSWORD)).await.unwrap();

        let disabled = service.set_status(editor.id, UserStatus::Disabled).await.unwrap();
        assert!(!disabled.is_active());
        assert!(service.validate_session(&session.id).await.unwrap().is_none());
        assert!(matches!(
            service.login(login("ed", PASSWORD)).await,
            Err(UserServiceError::AuthenticationError(_))
        ));
        assert!(matches!(
            service.set_status(9999, UserStatus::Active).await,
            Err(UserServiceError::NotFound(9999))
        ));
    }

    #[tokio::test]
    async fn test_change_password_keeps_current_session_only() {
        let service = setup_test_service().await;
        service
            .register(RegisterInput::new("admin", "admin@example.com", PASSWORD))
            .await
            .unwrap();
        let (user, current) = service.login(login("admin", PASSWORD)).await.unwrap();
        let (_, other) = service.login(login("admin", PASSWORD)).await.unwrap();

        assert!(matches!(
            service.change_password(&user, "wrong password", "new password!", None).await,
            Err(UserServiceError::AuthenticationError(_))
        ));
        assert!(matches!(
            service.change_password(&user, PASSWORD, "tiny", None).await,
            Err(UserServiceError::ValidationError(_))
        ));

        service
            .change_password(&user, PASSWORD, "new password!", Some(&current.id))
            .await
            .unwrap();
        assert!(service.validate_session(&current.id).await.unwrap().is_some());
        assert!(service.validate_session(&other.id).await.unwrap().is_none());
        assert!(service.login(login("admin", "new password!")).await.is_ok());
        assert!(service.login(login("admin", PASSWORD)).await.is_err());
    }

    #[tokio::test]
    async fn test_cleanup_expired_sessions() {
        let pool = create_test_pool().await.unwrap();
        run_migrations(&pool).await.unwrap();
        let sessions = SqlxSessionRepository::boxed(pool.clone());
        let service = UserService::new(SqlxUserRepository::boxed(pool), sessions.clone());
        let admin = service
            .register(RegisterInput::new("admin", "admin@example.com", PASSWORD))
            .await
            .unwrap();

        let expired = Session::issue(admin.id, Duration::seconds(-5));
        sessions.create(&expired).await.unwrap();
        service.login(login("admin", PASSWORD)).await.unwrap();

        assert_eq!(service.cleanup_expired_sessions().await.unwrap(), 1);
        assert_eq!(service.cleanup_expired_sessions().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_expired_session_is_deleted_on_validation() {
        let pool = create_test_pool().await.unwrap();
        run_migrations(&pool).await.unwrap();
        let sessions = SqlxSessionRepository::boxed(pool.clone());
        let service = UserService::new(SqlxUserRepository::boxed(pool), sessions.clone());
        let admin = service
            .register(RegisterInput::new("admin", "admin@example.com", PASSWORD))
            .await
            .unwrap();

        let expired = Session::issue(admin.id, Duration::seconds(-5));
        sessions.create(&expired).await.unwrap();
        assert!(service.validate_session(&expired.id).await.unwrap().is_none());
        assert!(sessions.get_by_id(&expired.id).await.unwrap().is_none());
    }

    #[test]
    fn test_email_and_username_checks() {
        assert!(is_plausible_email("a@b.co"));
        assert!(!is_plausible_email("@b.co"));
        assert!(!is_plausible_email("a@bco"));
        assert!(!is_plausible_email("a@.co"));
        assert!(validate_username("jane.doe-1").is_ok());
        assert!(validate_username("jane doe").is_err());
    }
}
