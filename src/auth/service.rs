/// Credential lifecycle orchestration
///
/// One service owns every flow that touches credentials: login, refresh-token
/// rotation, revocation, and the two password-recovery paths. The service
/// holds no mutable state of its own; everything flows through the injected
/// collaborators, so each flow reads as a straight line from input to
/// outcome.

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::auth::password::{
    equalize_verification_timing, hash_password_blocking, verify_password_blocking,
};
use crate::auth::refresh_token::generate_token_value;
use crate::auth::store::RefreshTokenStore;
use crate::auth::jwt::generate_access_token;
use crate::configuration::AuthSettings;
use crate::email_client::PasswordResetNotifier;
use crate::error::{AppError, AuthError};
use crate::users::UserDirectory;

/// Successful login outcome.
#[derive(Debug, Serialize)]
pub struct LoginResult {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub must_change_password: bool,
    pub user: LoginUser,
}

/// Minimal user projection returned on login.
#[derive(Debug, Serialize)]
pub struct LoginUser {
    pub id: String,
    pub email: String,
    pub role: String,
}

/// Successful rotation outcome.
#[derive(Debug, Serialize)]
pub struct RefreshResult {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

pub struct AuthService {
    users: Arc<dyn UserDirectory>,
    tokens: Arc<dyn RefreshTokenStore>,
    notifier: Arc<dyn PasswordResetNotifier>,
    settings: AuthSettings,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UserDirectory>,
        tokens: Arc<dyn RefreshTokenStore>,
        notifier: Arc<dyn PasswordResetNotifier>,
        settings: AuthSettings,
    ) -> Self {
        Self {
            users,
            tokens,
            notifier,
            settings,
        }
    }

    /// Authenticate with email and password and open a new session.
    ///
    /// Unknown email and wrong password fail identically, in timing as well
    /// as content. The inactive check runs only after the password has been
    /// verified so that probing a deactivated account still requires knowing
    /// its password.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        device_info: Option<String>,
    ) -> Result<LoginResult, AppError> {
        let user = match self.users.find_by_email(email).await? {
            Some(user) => user,
            None => {
                equalize_verification_timing(password).await;
                return Err(AppError::Auth(AuthError::InvalidCredentials));
            }
        };

        if !verify_password_blocking(password, &user.password_hash).await? {
            tracing::warn!(user_id = %user.id, "Login failed: wrong password");
            return Err(AppError::Auth(AuthError::InvalidCredentials));
        }

        if !user.is_active {
            tracing::warn!(user_id = %user.id, "Login blocked: account inactive");
            return Err(AppError::Auth(AuthError::AccountInactive));
        }

        let issued = self
            .tokens
            .create(user.id, device_info, self.settings.refresh_token_expiry)
            .await?;
        let access_token = generate_access_token(&user.id, &user.role, &self.settings)?;

        self.users.record_login(user.id, Utc::now()).await?;

        tracing::info!(user_id = %user.id, "User logged in");

        Ok(LoginResult {
            access_token,
            refresh_token: issued.value,
            token_type: "Bearer".to_string(),
            expires_in: self.settings.access_token_expiry,
            must_change_password: user.must_change_password,
            user: LoginUser {
                id: user.id.to_string(),
                email: user.email,
                role: user.role,
            },
        })
    }

    /// Exchange a refresh token for a fresh (access, refresh) pair.
    ///
    /// Rotation happens first and is atomic in the store; store rejections
    /// propagate unchanged as `TokenInvalid`. If the owner turns out to be
    /// inactive the freshly rotated token is swept up with the rest of the
    /// user's sessions before the rejection, since an inactive user must
    /// hold no live tokens.
    pub async fn refresh(&self, token_value: &str) -> Result<RefreshResult, AppError> {
        let outcome = self
            .tokens
            .validate_and_rotate(token_value, self.settings.refresh_token_expiry)
            .await?;
        let user_id = outcome.consumed.user_id;

        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or(AppError::Auth(AuthError::UserNotFound))?;

        if !user.is_active {
            self.tokens.revoke_all_for_user(user.id).await?;
            tracing::warn!(
                user_id = %user.id,
                "Refresh blocked for inactive user; revoked remaining sessions"
            );
            return Err(AppError::Auth(AuthError::AccountInactive));
        }

        let access_token = generate_access_token(&user.id, &user.role, &self.settings)?;

        tracing::info!(user_id = %user.id, "Refresh token rotated");

        Ok(RefreshResult {
            access_token,
            refresh_token: outcome.issued.value,
            token_type: "Bearer".to_string(),
            expires_in: self.settings.access_token_expiry,
        })
    }

    /// Best-effort single-session logout. Idempotent; never fails from the
    /// caller's perspective.
    pub async fn logout(&self, token_value: &str) {
        match self.tokens.revoke(token_value).await {
            Ok(true) => tracing::info!("Refresh token revoked on logout"),
            Ok(false) => tracing::debug!("Logout presented an unknown or retired token"),
            Err(e) => tracing::warn!(error = %e, "Logout revocation failed"),
        }
    }

    /// Revoke every session the user holds. Invoked by "logout everywhere",
    /// by the inactive-user refresh path, and by user management as its
    /// deactivation callback.
    pub async fn force_logout_user(&self, user_id: Uuid) -> Result<u64, AppError> {
        self.tokens.revoke_all_for_user(user_id).await
    }

    /// Start the password-reset flow.
    ///
    /// Whether or not the email belongs to a user, the caller sees the same
    /// outcome; notification failures are logged and swallowed for the same
    /// reason.
    pub async fn forgot_password(&self, email: &str) -> Result<(), AppError> {
        let user = match self.users.find_by_email(email).await? {
            Some(user) => user,
            None => {
                tracing::debug!("Password reset requested for unknown email");
                return Ok(());
            }
        };

        let token = generate_token_value();
        self.users
            .store_reset_token(user.id, &token, Utc::now())
            .await?;

        if let Err(e) = self.notifier.send_password_reset(&user.email, &token).await {
            tracing::error!(user_id = %user.id, error = %e, "Failed to send password reset message");
        } else {
            tracing::info!(user_id = %user.id, "Password reset message queued");
        }

        Ok(())
    }

    /// Complete the password-reset flow with a previously issued token.
    ///
    /// The token is single-use and time-boxed; consuming it (or finding it
    /// expired) clears it from the user record. A successful reset revokes
    /// every refresh token the user owns.
    pub async fn reset_password(&self, token: &str, new_password: &str) -> Result<(), AppError> {
        let user = self
            .users
            .find_by_reset_token(token)
            .await?
            .ok_or(AppError::Auth(AuthError::ResetTokenInvalid))?;

        let created_at = user
            .reset_token_created_at
            .ok_or(AppError::Auth(AuthError::ResetTokenInvalid))?;
        let ttl = Duration::hours(self.settings.reset_token_expiry_hours);
        if Utc::now() - created_at > ttl {
            self.users.clear_reset_token(user.id).await?;
            tracing::info!(user_id = %user.id, "Expired password reset token presented");
            return Err(AppError::Auth(AuthError::ResetTokenInvalid));
        }

        let password_hash = hash_password_blocking(new_password).await?;
        self.users.set_password(user.id, &password_hash).await?;
        self.users.clear_reset_token(user.id).await?;

        let revoked = self.tokens.revoke_all_for_user(user.id).await?;
        tracing::info!(
            user_id = %user.id,
            revoked_sessions = revoked,
            "Password reset completed"
        );

        Ok(())
    }

    /// Set a new password for an account flagged `must_change_password`.
    ///
    /// Rejected when the flag is not set, so this path cannot bypass the
    /// normal change-password flow. Existing sessions are deliberately left
    /// alive; unlike reset-by-token, the caller is already authenticated.
    pub async fn force_change_password(
        &self,
        user_id: Uuid,
        new_password: &str,
    ) -> Result<(), AppError> {
        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or(AppError::Auth(AuthError::UserNotFound))?;

        if !user.must_change_password {
            return Err(AppError::Auth(AuthError::PasswordChangeNotRequired));
        }

        let password_hash = hash_password_blocking(new_password).await?;
        self.users.set_password(user.id, &password_hash).await?;

        tracing::info!(user_id = %user.id, "Forced password change completed");

        Ok(())
    }
}
