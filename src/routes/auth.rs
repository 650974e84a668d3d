/// Authentication Routes
///
/// Handles login, token refresh, logout, and the password-recovery flows.
/// Handlers stay thin: input validation, one service call, one fixed
/// response shape per outcome.

use actix_web::{web, HttpResponse};
use serde::Deserialize;

use crate::auth::{AuthService, Claims};
use crate::error::{AppError, ErrorContext};
use crate::validators::is_valid_email;

/// User login request
#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    pub device_info: Option<String>,
}

/// Token refresh request
#[derive(Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Logout request; the token is optional so logout without a body stays a no-op
#[derive(Deserialize)]
pub struct LogoutRequest {
    pub refresh_token: Option<String>,
}

#[derive(Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Deserialize)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub new_password: String,
}

#[derive(Deserialize)]
pub struct ForceChangePasswordRequest {
    pub new_password: String,
}

/// POST /auth/login
///
/// Authenticate with email and password; returns an access token and a
/// single-use refresh token.
///
/// # Errors
/// - 400: Validation error (invalid email format)
/// - 401: Invalid credentials (email not found or wrong password)
/// - 403: Account is inactive
/// - 500: Internal server error
///
/// # Security Notes
/// - Unknown email and wrong password produce the same error, with matched
///   timing, to prevent user enumeration
pub async fn login(
    form: web::Json<LoginRequest>,
    service: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("user_login");

    let email = is_valid_email(&form.email)?;

    let result = service
        .login(&email, &form.password, form.device_info.clone())
        .await?;

    tracing::info!(
        request_id = %context.request_id,
        "User logged in successfully"
    );

    Ok(HttpResponse::Ok().json(result))
}

/// POST /auth/refresh
///
/// Exchange a refresh token for a new token pair.
/// Rotation is single-use: the presented token is retired atomically with
/// the creation of its replacement, so a replayed token is always rejected.
///
/// # Errors
/// - 401: Invalid, expired, revoked, or already rotated refresh token
/// - 404: Owning user no longer exists
/// - 403: Owning account is inactive (remaining sessions are revoked)
/// - 500: Internal server error
pub async fn refresh(
    form: web::Json<RefreshRequest>,
    service: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("token_refresh");

    let result = service.refresh(&form.refresh_token).await?;

    tracing::info!(
        request_id = %context.request_id,
        "Token refreshed successfully"
    );

    Ok(HttpResponse::Ok().json(result))
}

/// POST /auth/logout
///
/// Revoke the presented refresh token. Idempotent: unknown, retired, or
/// absent tokens all produce the same 204.
pub async fn logout(
    form: Option<web::Json<LogoutRequest>>,
    service: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    if let Some(token) = form.and_then(|f| f.refresh_token.clone()) {
        service.logout(&token).await;
    }

    Ok(HttpResponse::NoContent().finish())
}

/// POST /auth/logout-all
///
/// Revoke every session of the authenticated user ("logout everywhere").
/// **Requires a valid access token** in the Authorization header.
pub async fn logout_all(
    claims: web::ReqData<Claims>,
    service: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let user_id = claims.user_id()?;
    let revoked = service.force_logout_user(user_id).await?;

    tracing::info!(user_id = %user_id, revoked = revoked, "Logout-all completed");

    Ok(HttpResponse::NoContent().finish())
}

/// POST /auth/forgot-password
///
/// Start the password-reset flow. The response body is byte-identical
/// whether or not the email belongs to an account, so the endpoint reveals
/// nothing about which addresses are registered.
///
/// # Errors
/// - 400: Validation error (invalid email format)
/// - 500: Internal server error
pub async fn forgot_password(
    form: web::Json<ForgotPasswordRequest>,
    service: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let email = is_valid_email(&form.email)?;

    service.forgot_password(&email).await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "If that email address is registered, a password reset message has been sent."
    })))
}

/// POST /auth/reset-password
///
/// Complete the password-reset flow with a token from the reset message.
/// Consuming the token revokes every existing session of the account.
///
/// # Errors
/// - 400: Invalid or expired reset token
/// - 422: New password fails the strength policy
/// - 500: Internal server error
pub async fn reset_password(
    form: web::Json<ResetPasswordRequest>,
    service: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("password_reset");

    service
        .reset_password(&form.token, &form.new_password)
        .await?;

    tracing::info!(
        request_id = %context.request_id,
        "Password reset completed"
    );

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "Password has been reset. Please log in with your new password."
    })))
}

/// POST /auth/force-change-password
///
/// Set a new password for an account that is flagged as requiring a change
/// (e.g., freshly provisioned accounts). **Requires a valid access token.**
///
/// # Errors
/// - 400: The account is not flagged for a password change
/// - 404: User no longer exists
/// - 422: New password fails the strength policy
/// - 500: Internal server error
pub async fn force_change_password(
    claims: web::ReqData<Claims>,
    form: web::Json<ForceChangePasswordRequest>,
    service: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let user_id = claims.user_id()?;

    service
        .force_change_password(user_id, &form.new_password)
        .await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "Password has been updated."
    })))
}
