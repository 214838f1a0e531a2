//! User service
//!
//! Registration, login/logout, database-backed sessions, password change and
//! profile editing.

use crate::db::repositories::{SessionRepository, UserRepository};
use crate::models::{Session, UpdateProfileInput, User};
use crate::services::password::{hash_password, validate_password, verify_password};
use crate::services::validation::{check_email, check_max_length, check_username, FieldErrors};
use anyhow::Context;
use std::sync::Arc;

/// Default session lifetime in days
const DEFAULT_SESSION_EXPIRATION_DAYS: i64 = 14;

/// Maximum length of first and last names
const NAME_MAX_LENGTH: usize = 150;

/// Error types for user service operations
#[derive(Debug, thiserror::Error)]
pub enum UserServiceError {
    /// Invalid credentials or inactive account
    #[error("Authentication failed: {0}")]
    AuthenticationError(String),

    /// One or more form fields are invalid
    #[error("Validation error: {0}")]
    ValidationError(FieldErrors),

    #[error("User not found")]
    NotFound,

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// User service for managing users and authentication
pub struct UserService {
    user_repo: Arc<dyn UserRepository>,
    session_repo: Arc<dyn SessionRepository>,
    session_expiration_days: i64,
}

impl UserService {
    pub fn new(user_repo: Arc<dyn UserRepository>, session_repo: Arc<dyn SessionRepository>) -> Self {
        Self::with_session_expiration(user_repo, session_repo, DEFAULT_SESSION_EXPIRATION_DAYS)
    }

    pub fn with_session_expiration(
        user_repo: Arc<dyn UserRepository>,
        session_repo: Arc<dyn SessionRepository>,
        session_expiration_days: i64,
    ) -> Self {
        Self {
            user_repo,
            session_repo,
            session_expiration_days,
        }
    }

    /// Register a new active account.
    ///
    /// Does not log the new user in.
    ///
    /// # Errors
    ///
    /// - `ValidationError` for a bad or taken username, mismatched passwords
    ///   or a password that breaks the password rules
    /// - `InternalError` for database errors
    pub async fn register(&self, input: RegisterInput) -> Result<User, UserServiceError> {
        let mut errors = FieldErrors::new();
        check_username(&mut errors, "username", &input.username);

        if input.password1.is_empty() {
            errors.add("password1", "This field is required.");
        }
        if input.password2.is_empty() {
            errors.add("password2", "This field is required.");
        } else if input.password1 != input.password2 {
            errors.add("password2", "The two password fields didn't match.");
        } else {
            for problem in validate_password(&input.password2, &input.username) {
                errors.add("password2", problem);
            }
        }

        if !errors.has("username") && self.username_taken(&input.username, None).await? {
            errors.add("username", "A user with that username already exists.");
        }
        errors.into_result().map_err(UserServiceError::ValidationError)?;

        let password_hash = hash_password(&input.password1).context("Failed to hash password")?;
        let user = self
            .user_repo
            .create(&User::new(input.username, password_hash))
            .await
            .context("Failed to create user")?;

        tracing::info!("Registered user {} (id {})", user.username, user.id);
        Ok(user)
    }

    /// Check credentials and open a new session.
    ///
    /// Unknown usernames, wrong passwords and inactive accounts all give the
    /// same `AuthenticationError`.
    pub async fn login(&self, input: LoginInput) -> Result<Session, UserServiceError> {
        let invalid = || {
            UserServiceError::AuthenticationError(
                "Please enter a correct username and password. Note that both fields may be case-sensitive."
                    .to_string(),
            )
        };

        let user = self
            .user_repo
            .get_by_username(&input.username)
            .await
            .context("Failed to get user by username")?
            .ok_or_else(invalid)?;

        let password_valid = verify_password(&input.password, &user.password_hash)
            .context("Failed to verify password")?;
        if !password_valid || !user.is_active {
            return Err(invalid());
        }

        let session = self.create_session(user.id).await?;
        tracing::debug!("User {} logged in", user.username);
        Ok(session)
    }

    /// Delete the session. Unknown sessions are ignored.
    pub async fn logout(&self, session_id: &str) -> Result<(), UserServiceError> {
        self.session_repo
            .delete(session_id)
            .await
            .context("Failed to delete session")?;
        Ok(())
    }

    /// Resolve a session token to its active user.
    ///
    /// Expired sessions are deleted on sight and resolve to `None`, as do
    /// sessions of deactivated users.
    pub async fn validate_session(&self, token: &str) -> Result<Option<User>, UserServiceError> {
        let session = match self
            .session_repo
            .get_by_id(token)
            .await
            .context("Failed to get session")?
        {
            Some(s) => s,
            None => return Ok(None),
        };

        if session.is_expired() {
            if let Err(e) = self.session_repo.delete(token).await {
                tracing::warn!("Failed to delete expired session: {}", e);
            }
            return Ok(None);
        }

        let user = self
            .user_repo
            .get_by_id(session.user_id)
            .await
            .context("Failed to get user")?;

        Ok(user.filter(|u| u.is_active))
    }

    /// Change the password of `user` after checking the old one.
    ///
    /// Every session of the user is dropped and a fresh one is returned, so
    /// the browser making the change stays logged in and others are logged
    /// out.
    pub async fn change_password(
        &self,
        user: &User,
        input: ChangePasswordInput,
    ) -> Result<Session, UserServiceError> {
        let mut errors = FieldErrors::new();

        let old_valid = verify_password(&input.old_password, &user.password_hash)
            .context("Failed to verify password")?;
        if !old_valid {
            errors.add(
                "old_password",
                "Your old password was entered incorrectly. Please enter it again.",
            );
        }

        if input.new_password1.is_empty() {
            errors.add("new_password1", "This field is required.");
        }
        if input.new_password2.is_empty() {
            errors.add("new_password2", "This field is required.");
        } else if input.new_password1 != input.new_password2 {
            errors.add("new_password2", "The two password fields didn't match.");
        } else {
            for problem in validate_password(&input.new_password2, &user.username) {
                errors.add("new_password2", problem);
            }
        }
        errors.into_result().map_err(UserServiceError::ValidationError)?;

        let password_hash =
            hash_password(&input.new_password1).context("Failed to hash password")?;
        self.user_repo
            .update_password(user.id, &password_hash)
            .await
            .context("Failed to update password")?;

        let dropped = self
            .session_repo
            .delete_by_user(user.id)
            .await
            .context("Failed to delete sessions")?;
        tracing::info!(
            "User {} changed password, {} session(s) closed",
            user.username,
            dropped
        );

        self.create_session(user.id).await
    }

    /// Update the profile fields of `user`.
    pub async fn update_profile(
        &self,
        user: &User,
        input: UpdateProfileInput,
    ) -> Result<User, UserServiceError> {
        let input = UpdateProfileInput {
            username: input.username.trim().to_string(),
            first_name: input.first_name.trim().to_string(),
            last_name: input.last_name.trim().to_string(),
            email: input.email.trim().to_string(),
        };

        let mut errors = FieldErrors::new();
        check_username(&mut errors, "username", &input.username);
        check_max_length(&mut errors, "first_name", &input.first_name, NAME_MAX_LENGTH);
        check_max_length(&mut errors, "last_name", &input.last_name, NAME_MAX_LENGTH);
        check_email(&mut errors, "email", &input.email);

        if !errors.has("username") && self.username_taken(&input.username, Some(user.id)).await? {
            errors.add("username", "A user with that username already exists.");
        }
        errors.into_result().map_err(UserServiceError::ValidationError)?;

        let mut updated = user.clone();
        updated.username = input.username;
        updated.first_name = input.first_name;
        updated.last_name = input.last_name;
        updated.email = input.email;

        let updated = self
            .user_repo
            .update(&updated)
            .await
            .context("Failed to update user")?;
        Ok(updated)
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<User>, UserServiceError> {
        let user = self
            .user_repo
            .get_by_id(id)
            .await
            .context("Failed to get user by ID")?;
        Ok(user)
    }

    pub async fn get_by_username(&self, username: &str) -> Result<Option<User>, UserServiceError> {
        let user = self
            .user_repo
            .get_by_username(username)
            .await
            .context("Failed to get user by username")?;
        Ok(user)
    }

    /// Delete all expired sessions; returns how many were removed
    pub async fn cleanup_expired_sessions(&self) -> Result<u64, UserServiceError> {
        let count = self
            .session_repo
            .delete_expired()
            .await
            .context("Failed to delete expired sessions")?;
        Ok(count)
    }

    // ========================================================================
    // Private helper methods
    // ========================================================================

    async fn username_taken(
        &self,
        username: &str,
        except: Option<i64>,
    ) -> Result<bool, UserServiceError> {
        let existing = self
            .user_repo
            .get_by_username(username)
            .await
            .context("Failed to check username")?;
        Ok(existing.is_some_and(|u| Some(u.id) != except))
    }

    async fn create_session(&self, user_id: i64) -> Result<Session, UserServiceError> {
        let session = Session::new(user_id, self.session_expiration_days);
        let created = self
            .session_repo
            .create(&session)
            .await
            .context("Failed to create session")?;
        Ok(created)
    }
}

/// Input for user registration
#[derive(Debug, Clone)]
pub struct RegisterInput {
    pub username: String,
    pub password1: String,
    pub password2: String,
}

impl RegisterInput {
    pub fn new(
        username: impl Into<String>,
        password1: impl Into<String>,
        password2: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into().trim().to_string(),
            password1: password1.into(),
            password2: password2.into(),
        }
    }
}

/// Input for user login
#[derive(Debug, Clone)]
pub struct LoginInput {
    pub username: String,
    pub password: String,
}

impl LoginInput {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into().trim().to_string(),
            password: password.into(),
        }
    }
}

/// Input for the password change form
#[derive(Debug, Clone)]
pub struct ChangePasswordInput {
    pub old_password: String,
    pub new_password1: String,
    pub new_password2: String,
}
