/// Refresh token store: persistence and atomic lifecycle operations.
///
/// All mutation of refresh tokens goes through this interface; callers never
/// read-modify-write token rows themselves. The narrow trait keeps the
/// persistence engine swappable and lets the rotation logic be exercised
/// against the in-memory implementation in tests.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::refresh_token::{hash_token_value, IssuedToken, RefreshToken, RotationOutcome};
use crate::error::{AppError, AuthError};

#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    /// Create and persist a new Active token for the user. Called on login
    /// and on every successful rotation.
    async fn create(
        &self,
        user_id: Uuid,
        device_info: Option<String>,
        ttl_seconds: i64,
    ) -> Result<IssuedToken, AppError>;

    /// Consume the presented token and issue its replacement.
    ///
    /// Fails with `TokenInvalid` if the token is unknown, retired, or
    /// expired; retired and expired rows are deleted as a side effect so a
    /// replayed value cannot keep probing the store. The flip of the old
    /// token and the insert of the new one commit as a single atomic unit:
    /// of two concurrent calls presenting the same value, exactly one wins.
    async fn validate_and_rotate(
        &self,
        token_value: &str,
        ttl_seconds: i64,
    ) -> Result<RotationOutcome, AppError>;

    /// Retire a single token. Idempotent; returns whether a row was affected.
    async fn revoke(&self, token_value: &str) -> Result<bool, AppError>;

    /// Retire every Active token the user owns; returns how many were hit.
    async fn revoke_all_for_user(&self, user_id: Uuid) -> Result<u64, AppError>;

    /// Physically delete rows whose expiry has passed, used or not.
    async fn purge_expired(&self) -> Result<u64, AppError>;
}

const TOKEN_COLUMNS: &str =
    "id, user_id, token_hash, created_at, expires_at, device_info, is_active, last_used_at";

/// Postgres-backed store used in production.
pub struct PgRefreshTokenStore {
    pool: PgPool,
}

impl PgRefreshTokenStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

async fn insert_token<'e, E>(executor: E, token: &RefreshToken) -> Result<(), AppError>
where
    E: sqlx::Executor<'e, Database = sqlx::Postgres>,
{
    sqlx::query(
        r#"
        INSERT INTO refresh_tokens
            (id, user_id, token_hash, created_at, expires_at, device_info, is_active, last_used_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(token.id)
    .bind(token.user_id)
    .bind(&token.token_hash)
    .bind(token.created_at)
    .bind(token.expires_at)
    .bind(&token.device_info)
    .bind(token.is_active)
    .bind(token.last_used_at)
    .execute(executor)
    .await?;

    Ok(())
}

#[async_trait]
impl RefreshTokenStore for PgRefreshTokenStore {
    async fn create(
        &self,
        user_id: Uuid,
        device_info: Option<String>,
        ttl_seconds: i64,
    ) -> Result<IssuedToken, AppError> {
        let issued = IssuedToken::generate(user_id, device_info, ttl_seconds);
        insert_token(&self.pool, &issued.token).await?;
        Ok(issued)
    }

    async fn validate_and_rotate(
        &self,
        token_value: &str,
        ttl_seconds: i64,
    ) -> Result<RotationOutcome, AppError> {
        let token_hash = hash_token_value(token_value);
        let mut tx = self.pool.begin().await?;

        let stored = sqlx::query_as::<_, RefreshToken>(&format!(
            "SELECT {} FROM refresh_tokens WHERE token_hash = $1",
            TOKEN_COLUMNS
        ))
        .bind(&token_hash)
        .fetch_optional(&mut tx)
        .await?;

        let stored = match stored {
            Some(stored) => stored,
            None => {
                tracing::warn!("Refresh token not found in store");
                return Err(AppError::Auth(AuthError::TokenInvalid));
            }
        };

        if !stored.is_active {
            // Replay of an already-rotated or revoked token: delete the row
            // so the stolen value stops resolving at all.
            sqlx::query("DELETE FROM refresh_tokens WHERE id = $1")
                .bind(stored.id)
                .execute(&mut tx)
                .await?;
            tx.commit().await?;

            tracing::warn!(
                user_id = %stored.user_id,
                "Attempt to use a retired refresh token"
            );
            return Err(AppError::Auth(AuthError::TokenInvalid));
        }

        if stored.is_expired() {
            sqlx::query("DELETE FROM refresh_tokens WHERE id = $1")
                .bind(stored.id)
                .execute(&mut tx)
                .await?;
            tx.commit().await?;

            tracing::info!(user_id = %stored.user_id, "Expired refresh token presented");
            return Err(AppError::Auth(AuthError::TokenInvalid));
        }

        // Conditional flip gated on the flag still being set. Under
        // concurrent rotation of the same value the loser's UPDATE matches
        // zero rows once the winner commits.
        let now = Utc::now();
        let flipped = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET is_active = false, last_used_at = $1
            WHERE token_hash = $2 AND is_active = true
            "#,
        )
        .bind(now)
        .bind(&token_hash)
        .execute(&mut tx)
        .await?
        .rows_affected();

        if flipped == 0 {
            tx.rollback().await?;
            tracing::warn!(
                user_id = %stored.user_id,
                "Lost a concurrent rotation race for a refresh token"
            );
            return Err(AppError::Auth(AuthError::TokenInvalid));
        }

        let issued = IssuedToken::generate(stored.user_id, stored.device_info.clone(), ttl_seconds);
        insert_token(&mut tx, &issued.token).await?;
        tx.commit().await?;

        let mut consumed = stored;
        consumed.is_active = false;
        consumed.last_used_at = Some(now);

        Ok(RotationOutcome { consumed, issued })
    }

    async fn revoke(&self, token_value: &str) -> Result<bool, AppError> {
        let token_hash = hash_token_value(token_value);

        let affected = sqlx::query(
            "UPDATE refresh_tokens SET is_active = false WHERE token_hash = $1 AND is_active = true",
        )
        .bind(&token_hash)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(affected > 0)
    }

    async fn revoke_all_for_user(&self, user_id: Uuid) -> Result<u64, AppError> {
        let affected = sqlx::query(
            "UPDATE refresh_tokens SET is_active = false WHERE user_id = $1 AND is_active = true",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if affected > 0 {
            tracing::info!(user_id = %user_id, count = affected, "Revoked all refresh tokens for user");
        }
        Ok(affected)
    }

    async fn purge_expired(&self) -> Result<u64, AppError> {
        let affected = sqlx::query("DELETE FROM refresh_tokens WHERE expires_at < $1")
            .bind(Utc::now())
            .execute(&self.pool)
            .await?
            .rows_affected();

        Ok(affected)
    }
}
