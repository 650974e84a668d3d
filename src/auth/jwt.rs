/// Access token signing and verification
///
/// Stateless HS256 issuer: a token is a pure function of the claims, the
/// process-wide secret, and the clock. Verification rejects on bad signature,
/// malformed payload, wrong issuer, or past expiry; there is no server-side
/// revocation list, which is why refresh-token revocation elsewhere must be
/// immediate.

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use uuid::Uuid;

use crate::auth::claims::Claims;
use crate::configuration::AuthSettings;
use crate::error::{AppError, AuthError};

/// Sign a new access token embedding the user's identity and role.
///
/// # Errors
/// Returns error if token encoding fails
pub fn generate_access_token(
    user_id: &Uuid,
    role: &str,
    config: &AuthSettings,
) -> Result<String, AppError> {
    let claims = Claims::new(
        *user_id,
        role.to_string(),
        config.access_token_expiry,
        config.issuer.clone(),
    );

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(format!("Token generation failed: {}", e)))
}

/// Validate and extract claims from an access token
///
/// # Errors
/// Returns `TokenInvalid` if the token is expired, tampered with, or was
/// signed for a different issuer or with a different secret
pub fn validate_access_token(token: &str, config: &AuthSettings) -> Result<Claims, AppError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_issuer(&[&config.issuer]);

    decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|e| {
        tracing::warn!("Access token validation error: {}", e);
        AppError::Auth(AuthError::TokenInvalid)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn get_test_config() -> AuthSettings {
        AuthSettings {
            secret: "test-secret-key-at-least-32-characters-long".to_string(),
            access_token_expiry: 3600,
            refresh_token_expiry: 604800,
            reset_token_expiry_hours: 24,
            purge_interval_secs: 3600,
            issuer: "test".to_string(),
        }
    }

    #[test]
    fn test_generate_and_validate_token() {
        let config = get_test_config();
        let user_id = Uuid::new_v4();

        let token =
            generate_access_token(&user_id, "member", &config).expect("Failed to generate token");
        let claims = validate_access_token(&token, &config).expect("Failed to validate token");

        assert_eq!(claims.sub, user_id.to_string());
        assert_eq!(claims.role, "member");
        assert_eq!(claims.iss, "test");
    }

    #[test]
    fn test_invalid_token() {
        let config = get_test_config();
        let result = validate_access_token("invalid.token.here", &config);

        assert!(matches!(
            result,
            Err(AppError::Auth(AuthError::TokenInvalid))
        ));
    }

    #[test]
    fn test_tampered_token() {
        let config = get_test_config();
        let user_id = Uuid::new_v4();

        let token =
            generate_access_token(&user_id, "member", &config).expect("Failed to generate token");

        // Tamper with token
        let tampered = format!("{}X", token);
        let result = validate_access_token(&tampered, &config);

        assert!(result.is_err());
    }

    #[test]
    fn test_wrong_issuer() {
        let mut config = get_test_config();
        let user_id = Uuid::new_v4();

        let token =
            generate_access_token(&user_id, "member", &config).expect("Failed to generate token");

        // Change issuer in validation config
        config.issuer = "wrong-issuer".to_string();
        let result = validate_access_token(&token, &config);

        assert!(result.is_err());
    }

    #[test]
    fn test_wrong_secret() {
        let config = get_test_config();
        let user_id = Uuid::new_v4();

        let token =
            generate_access_token(&user_id, "admin", &config).expect("Failed to generate token");

        let mut other = get_test_config();
        other.secret = "a-completely-different-secret-of-equal-len".to_string();
        let result = validate_access_token(&token, &other);

        assert!(result.is_err());
    }

    #[test]
    fn test_expired_token_rejected() {
        let mut config = get_test_config();
        config.access_token_expiry = -120; // already in the past, beyond default leeway

        let token = generate_access_token(&Uuid::new_v4(), "member", &config)
            .expect("Failed to generate token");
        let result = validate_access_token(&token, &config);

        assert!(matches!(
            result,
            Err(AppError::Auth(AuthError::TokenInvalid))
        ));
    }
}
