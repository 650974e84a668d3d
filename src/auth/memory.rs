/// In-memory refresh token store for tests and local development.
///
/// Honors the same atomic-conditional-update contract as the Postgres store:
/// the lookup, the active-flag flip, and the insert of the replacement all
/// happen under one mutex acquisition, so two concurrent rotations of the
/// same value still produce exactly one winner.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::auth::refresh_token::{hash_token_value, IssuedToken, RefreshToken, RotationOutcome};
use crate::auth::store::RefreshTokenStore;
use crate::error::{AppError, AuthError};

#[derive(Default)]
pub struct InMemoryRefreshTokenStore {
    tokens: Mutex<HashMap<String, RefreshToken>>,
}

impl InMemoryRefreshTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RefreshTokenStore for InMemoryRefreshTokenStore {
    async fn create(
        &self,
        user_id: Uuid,
        device_info: Option<String>,
        ttl_seconds: i64,
    ) -> Result<IssuedToken, AppError> {
        let issued = IssuedToken::generate(user_id, device_info, ttl_seconds);
        self.tokens
            .lock()
            .unwrap()
            .insert(issued.token.token_hash.clone(), issued.token.clone());
        Ok(issued)
    }

    async fn validate_and_rotate(
        &self,
        token_value: &str,
        ttl_seconds: i64,
    ) -> Result<RotationOutcome, AppError> {
        let token_hash = hash_token_value(token_value);
        let mut tokens = self.tokens.lock().unwrap();

        let stored = match tokens.get(&token_hash) {
            Some(stored) => stored.clone(),
            None => return Err(AppError::Auth(AuthError::TokenInvalid)),
        };

        if !stored.is_active {
            // Replay cleanup, mirroring the row deletion in the Postgres store
            tokens.remove(&token_hash);
            tracing::warn!(
                user_id = %stored.user_id,
                "Attempt to use a retired refresh token"
            );
            return Err(AppError::Auth(AuthError::TokenInvalid));
        }

        if stored.is_expired() {
            tokens.remove(&token_hash);
            return Err(AppError::Auth(AuthError::TokenInvalid));
        }

        let now = Utc::now();
        let mut consumed = stored;
        consumed.is_active = false;
        consumed.last_used_at = Some(now);
        tokens.insert(token_hash, consumed.clone());

        let issued = IssuedToken::generate(consumed.user_id, consumed.device_info.clone(), ttl_seconds);
        tokens.insert(issued.token.token_hash.clone(), issued.token.clone());

        Ok(RotationOutcome { consumed, issued })
    }

    async fn revoke(&self, token_value: &str) -> Result<bool, AppError> {
        let token_hash = hash_token_value(token_value);
        let mut tokens = self.tokens.lock().unwrap();

        match tokens.get_mut(&token_hash) {
            Some(token) if token.is_active => {
                token.is_active = false;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn revoke_all_for_user(&self, user_id: Uuid) -> Result<u64, AppError> {
        let mut tokens = self.tokens.lock().unwrap();
        let mut affected = 0;

        for token in tokens.values_mut() {
            if token.user_id == user_id && token.is_active {
                token.is_active = false;
                affected += 1;
            }
        }

        Ok(affected)
    }

    async fn purge_expired(&self) -> Result<u64, AppError> {
        let mut tokens = self.tokens.lock().unwrap();
        let before = tokens.len();
        tokens.retain(|_, token| !token.is_expired());
        Ok((before - tokens.len()) as u64)
    }
}
