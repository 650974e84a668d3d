/// User directory collaborator
///
/// User management (registration, profile CRUD, role administration) is owned
/// by a separate system. This service only reads users and mutates the
/// credential-relevant columns, so the surface is a narrow trait: lookups,
/// login stamping, password updates, and the single-slot password-reset token
/// that lives on the user record. When the owning system deactivates a user it
/// calls [`crate::auth::AuthService::force_logout_user`] as its revocation
/// callback.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppError;

/// The auth-relevant projection of a user record.
///
/// Invariant: at most one live reset token per user. `reset_token` and
/// `reset_token_created_at` are set together and cleared together.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub role: String,
    pub is_active: bool,
    pub must_change_password: bool,
    pub reset_token: Option<String>,
    pub reset_token_created_at: Option<DateTime<Utc>>,
    pub last_login_at: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AppError>;

    async fn record_login(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), AppError>;

    /// Store a new password hash and clear the must-change flag.
    async fn set_password(&self, id: Uuid, password_hash: &str) -> Result<(), AppError>;

    /// Store a reset token on the user record, overwriting any prior one.
    async fn store_reset_token(
        &self,
        id: Uuid,
        token: &str,
        at: DateTime<Utc>,
    ) -> Result<(), AppError>;

    async fn find_by_reset_token(&self, token: &str) -> Result<Option<User>, AppError>;

    async fn clear_reset_token(&self, id: Uuid) -> Result<(), AppError>;
}

const USER_COLUMNS: &str = "id, email, password_hash, role, is_active, must_change_password, \
     reset_token, reset_token_created_at, last_login_at";

/// Postgres-backed directory used in production.
pub struct PgUserDirectory {
    pool: PgPool,
}

impl PgUserDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE email = $1",
            USER_COLUMNS
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE id = $1",
            USER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn record_login(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), AppError> {
        sqlx::query("UPDATE users SET last_login_at = $1 WHERE id = $2")
            .bind(at)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn set_password(&self, id: Uuid, password_hash: &str) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE users SET password_hash = $1, must_change_password = false WHERE id = $2",
        )
        .bind(password_hash)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn store_reset_token(
        &self,
        id: Uuid,
        token: &str,
        at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE users SET reset_token = $1, reset_token_created_at = $2 WHERE id = $3",
        )
        .bind(token)
        .bind(at)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_reset_token(&self, token: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE reset_token = $1",
            USER_COLUMNS
        ))
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn clear_reset_token(&self, id: Uuid) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE users SET reset_token = NULL, reset_token_created_at = NULL WHERE id = $1",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

/// In-memory directory for tests and local development.
///
/// Also stands in for the external user-management system in tests, which is
/// why it exposes [`insert`](Self::insert) and [`set_active`](Self::set_active)
/// outside the trait.
#[derive(Default)]
pub struct InMemoryUserDirectory {
    users: Mutex<HashMap<Uuid, User>>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, user: User) {
        self.users.lock().unwrap().insert(user.id, user);
    }

    /// Flip the active flag, as the owning user-management system would.
    pub fn set_active(&self, id: Uuid, is_active: bool) {
        if let Some(user) = self.users.lock().unwrap().get_mut(&id) {
            user.is_active = is_active;
        }
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let users = self.users.lock().unwrap();
        Ok(users.values().find(|u| u.email == email).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AppError> {
        let users = self.users.lock().unwrap();
        Ok(users.get(&id).cloned())
    }

    async fn record_login(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), AppError> {
        if let Some(user) = self.users.lock().unwrap().get_mut(&id) {
            user.last_login_at = Some(at);
        }
        Ok(())
    }

    async fn set_password(&self, id: Uuid, password_hash: &str) -> Result<(), AppError> {
        if let Some(user) = self.users.lock().unwrap().get_mut(&id) {
            user.password_hash = password_hash.to_string();
            user.must_change_password = false;
        }
        Ok(())
    }

    async fn store_reset_token(
        &self,
        id: Uuid,
        token: &str,
        at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        if let Some(user) = self.users.lock().unwrap().get_mut(&id) {
            user.reset_token = Some(token.to_string());
            user.reset_token_created_at = Some(at);
        }
        Ok(())
    }

    async fn find_by_reset_token(&self, token: &str) -> Result<Option<User>, AppError> {
        let users = self.users.lock().unwrap();
        Ok(users
            .values()
            .find(|u| u.reset_token.as_deref() == Some(token))
            .cloned())
    }

    async fn clear_reset_token(&self, id: Uuid) -> Result<(), AppError> {
        if let Some(user) = self.users.lock().unwrap().get_mut(&id) {
            user.reset_token = None;
            user.reset_token_created_at = None;
        }
        Ok(())
    }
}
