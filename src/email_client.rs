/// Notification collaborator for the password-reset flow.
///
/// The service never talks to the mail relay directly; it hands the reset
/// token to a `PasswordResetNotifier`. Production uses the HTTP relay
/// client below; tests substitute a recording implementation.

use async_trait::async_trait;
use serde::Serialize;

use crate::error::{AppError, EmailError};
use crate::validators::is_valid_email;

#[async_trait]
pub trait PasswordResetNotifier: Send + Sync {
    async fn send_password_reset(&self, recipient: &str, token: &str) -> Result<(), AppError>;
}

#[derive(Clone)]
pub struct EmailClient {
    http_client: reqwest::Client,
    base_url: String,
    sender: SenderEmail,
}

/// A validated sender address.
#[derive(Clone)]
pub struct SenderEmail(String);

impl SenderEmail {
    pub fn parse(s: String) -> Result<Self, String> {
        let email = is_valid_email(&s).map_err(|e| format!("{:?}", e))?;
        Ok(Self(email))
    }

    pub fn inner(&self) -> &str {
        &self.0
    }
}

#[derive(Serialize)]
struct SendEmailRequest {
    from: String,
    to: String,
    #[serde(rename = "Html")]
    html: String,
    #[serde(rename = "Subject")]
    subject: String,
}

impl EmailClient {
    pub fn new(base_url: String, sender: SenderEmail, http_client: reqwest::Client) -> Self {
        Self {
            http_client,
            base_url,
            sender,
        }
    }
}

#[async_trait]
impl PasswordResetNotifier for EmailClient {
    async fn send_password_reset(&self, recipient: &str, token: &str) -> Result<(), AppError> {
        let url = format!("{}/email", self.base_url);
        let request = SendEmailRequest {
            from: self.sender.inner().to_string(),
            to: recipient.to_string(),
            subject: "Password reset requested".to_string(),
            html: format!(
                "<p>A password reset was requested for your account.</p>\
                 <p>Use this token to set a new password: <code>{}</code></p>\
                 <p>The token expires in 24 hours. If you did not request a \
                 reset, you can ignore this message.</p>",
                token
            ),
        };

        self.http_client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Failed to reach email service: {}", e);
                AppError::Email(EmailError::ServiceUnavailable(e.to_string()))
            })?
            .error_for_status()
            .map_err(|e| {
                tracing::error!("Email service returned error: {}", e);
                AppError::Email(EmailError::SendFailed(e.to_string()))
            })?;

        Ok(())
    }
}
