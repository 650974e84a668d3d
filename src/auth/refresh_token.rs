/// Refresh token primitives
///
/// Refresh tokens are:
/// - Cryptographically secure random 64-byte strings with no embedded semantics
/// - Hashed with SHA-256 before storage (never store plaintext)
/// - Single-use: rotation retires the presented token in the same atomic step
///   that creates its replacement
/// - Database-backed for revocation support
///
/// Password-reset tokens reuse the same generator; they live on the user
/// record instead of the refresh-token store.

use chrono::{DateTime, Duration, Utc};
use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// A stored refresh token row. Holds only the SHA-256 of the opaque value;
/// the plaintext is returned to the client once at issuance and never kept.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RefreshToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub device_info: Option<String>,
    pub is_active: bool,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl RefreshToken {
    pub fn is_expired(&self) -> bool {
        self.expires_at < Utc::now()
    }
}

/// A freshly issued token: the opaque value for the client plus the row that
/// was persisted for it.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub value: String,
    pub token: RefreshToken,
}

impl IssuedToken {
    /// Mint a new Active token for the user.
    pub fn generate(user_id: Uuid, device_info: Option<String>, ttl_seconds: i64) -> Self {
        let value = generate_token_value();
        let now = Utc::now();
        let token = RefreshToken {
            id: Uuid::new_v4(),
            user_id,
            token_hash: hash_token_value(&value),
            created_at: now,
            expires_at: now + Duration::seconds(ttl_seconds),
            device_info,
            is_active: true,
            last_used_at: None,
        };
        Self { value, token }
    }
}

/// The result of a successful rotation: the retired token and its Active
/// replacement.
#[derive(Debug, Clone)]
pub struct RotationOutcome {
    pub consumed: RefreshToken,
    pub issued: IssuedToken,
}

/// Generate a new cryptographically secure opaque token value.
///
/// The value is returned in plaintext (this is what the client stores); the
/// server stores only the SHA-256 hash.
pub fn generate_token_value() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(64)
        .map(char::from)
        .collect()
}

/// Hash a token value using SHA-256.
pub fn hash_token_value(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}
