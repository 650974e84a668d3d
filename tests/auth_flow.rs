//! Black-box tests for the credential lifecycle HTTP surface.
//!
//! The server is spawned on a random port with in-memory backends, so the
//! full request path (routing, middleware, error mapping, service flows) is
//! exercised without any external services.

use std::net::TcpListener;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use uuid::Uuid;

use sessiond::auth::memory::InMemoryRefreshTokenStore;
use sessiond::auth::AuthService;
use sessiond::configuration::AuthSettings;
use sessiond::email_client::PasswordResetNotifier;
use sessiond::error::AppError;
use sessiond::startup::run;
use sessiond::users::{InMemoryUserDirectory, User};

/// Records outgoing reset messages so tests can fish the token out.
#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingNotifier {
    fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl PasswordResetNotifier for RecordingNotifier {
    async fn send_password_reset(&self, recipient: &str, token: &str) -> Result<(), AppError> {
        self.sent
            .lock()
            .unwrap()
            .push((recipient.to_string(), token.to_string()));
        Ok(())
    }
}

struct TestApp {
    address: String,
    users: Arc<InMemoryUserDirectory>,
    notifier: Arc<RecordingNotifier>,
}

fn test_auth_settings() -> AuthSettings {
    AuthSettings {
        secret: "test-secret-key-at-least-32-characters-long".to_string(),
        access_token_expiry: 900,
        refresh_token_expiry: 604800,
        reset_token_expiry_hours: 24,
        purge_interval_secs: 3600,
        issuer: "sessiond-test".to_string(),
    }
}

fn spawn_app() -> TestApp {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    let users = Arc::new(InMemoryUserDirectory::new());
    let tokens = Arc::new(InMemoryRefreshTokenStore::new());
    let notifier = Arc::new(RecordingNotifier::default());

    let service = AuthService::new(
        users.clone(),
        tokens.clone(),
        notifier.clone(),
        test_auth_settings(),
    );

    let server = run(listener, service, test_auth_settings()).expect("Failed to bind address");
    let _ = tokio::spawn(server);

    TestApp {
        address,
        users,
        notifier,
    }
}

/// Low bcrypt cost keeps the suite fast; verification accepts whatever cost
/// the hash embeds.
fn seed_user(app: &TestApp, email: &str, password: &str, must_change_password: bool) -> Uuid {
    let user = User {
        id: Uuid::new_v4(),
        email: email.to_string(),
        password_hash: bcrypt::hash(password, 4).unwrap(),
        role: "member".to_string(),
        is_active: true,
        must_change_password,
        reset_token: None,
        reset_token_created_at: None,
        last_login_at: None,
    };
    let id = user.id;
    app.users.insert(user);
    id
}

async fn login(app: &TestApp, email: &str, password: &str) -> reqwest::Response {
    reqwest::Client::new()
        .post(&format!("{}/auth/login", app.address))
        .json(&json!({ "email": email, "password": password }))
        .send()
        .await
        .expect("Failed to execute request")
}

// --- Login ---

#[tokio::test]
async fn health_check_works() {
    let app = spawn_app();

    let response = reqwest::Client::new()
        .get(&format!("{}/health_check", app.address))
        .send()
        .await
        .expect("Failed to execute request");

    assert!(response.status().is_success());
}

#[tokio::test]
async fn login_returns_tokens_for_valid_credentials() {
    let app = spawn_app();
    seed_user(&app, "user@example.com", "Password123", false);

    let response = login(&app, "user@example.com", "Password123").await;
    assert_eq!(200, response.status().as_u16());

    let body: Value = response.json().await.expect("Failed to parse response");
    assert!(body.get("access_token").is_some());
    assert_eq!(body["refresh_token"].as_str().unwrap().len(), 64);
    assert_eq!(body["token_type"], "Bearer");
    assert_eq!(body["expires_in"], 900);
    assert_eq!(body["must_change_password"], false);
    assert_eq!(body["user"]["email"], "user@example.com");
    assert_eq!(body["user"]["role"], "member");
}

#[tokio::test]
async fn login_returns_401_for_bad_credentials() {
    let app = spawn_app();
    seed_user(&app, "user@example.com", "Password123", false);

    let unknown = login(&app, "ghost@example.com", "Password123").await;
    let wrong = login(&app, "user@example.com", "WrongPassword1").await;

    assert_eq!(401, unknown.status().as_u16());
    assert_eq!(401, wrong.status().as_u16());

    // Same error code either way, so nothing distinguishes the two cases
    let unknown_body: Value = unknown.json().await.unwrap();
    let wrong_body: Value = wrong.json().await.unwrap();
    assert_eq!(unknown_body["code"], "INVALID_CREDENTIALS");
    assert_eq!(unknown_body["code"], wrong_body["code"]);
    assert_eq!(unknown_body["message"], wrong_body["message"]);
}

#[tokio::test]
async fn login_returns_403_for_inactive_account() {
    let app = spawn_app();
    let user_id = seed_user(&app, "user@example.com", "Password123", false);
    app.users.set_active(user_id, false);

    let response = login(&app, "user@example.com", "Password123").await;
    assert_eq!(403, response.status().as_u16());
}

#[tokio::test]
async fn login_returns_400_for_invalid_email() {
    let app = spawn_app();

    for invalid_email in ["notanemail", "user@", "@example.com", "user@@example.com"] {
        let response = login(&app, invalid_email, "Password123").await;
        assert_eq!(
            400,
            response.status().as_u16(),
            "Should reject invalid email: {}",
            invalid_email
        );
    }
}

// --- Refresh ---

#[tokio::test]
async fn refresh_rotates_the_token_exactly_once() {
    let app = spawn_app();
    seed_user(&app, "user@example.com", "Password123", false);

    let body: Value = login(&app, "user@example.com", "Password123")
        .await
        .json()
        .await
        .unwrap();
    let r1 = body["refresh_token"].as_str().unwrap().to_string();

    let client = reqwest::Client::new();
    let refresh_url = format!("{}/auth/refresh", app.address);

    // First use of R1 succeeds and yields R2
    let response = client
        .post(&refresh_url)
        .json(&json!({ "refresh_token": r1 }))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(200, response.status().as_u16());
    let refreshed: Value = response.json().await.unwrap();
    let r2 = refreshed["refresh_token"].as_str().unwrap().to_string();
    assert_ne!(r1, r2);

    // Replaying R1 fails
    let replay = client
        .post(&refresh_url)
        .json(&json!({ "refresh_token": r1 }))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(401, replay.status().as_u16());

    // R2 is the live session
    let response = client
        .post(&refresh_url)
        .json(&json!({ "refresh_token": r2 }))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(200, response.status().as_u16());
}

#[tokio::test]
async fn refresh_returns_401_for_unknown_token() {
    let app = spawn_app();

    let response = reqwest::Client::new()
        .post(&format!("{}/auth/refresh", app.address))
        .json(&json!({ "refresh_token": "never-issued" }))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(401, response.status().as_u16());
}

#[tokio::test]
async fn refresh_returns_403_for_inactive_user_and_revokes_the_rest() {
    let app = spawn_app();
    let user_id = seed_user(&app, "user@example.com", "Password123", false);

    let first: Value = login(&app, "user@example.com", "Password123")
        .await
        .json()
        .await
        .unwrap();
    let second: Value = login(&app, "user@example.com", "Password123")
        .await
        .json()
        .await
        .unwrap();

    app.users.set_active(user_id, false);

    let client = reqwest::Client::new();
    let refresh_url = format!("{}/auth/refresh", app.address);

    let response = client
        .post(&refresh_url)
        .json(&json!({ "refresh_token": first["refresh_token"] }))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(403, response.status().as_u16());

    // The sweep for the inactive user killed the other session too
    let response = client
        .post(&refresh_url)
        .json(&json!({ "refresh_token": second["refresh_token"] }))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(401, response.status().as_u16());
}

// --- Logout ---

#[tokio::test]
async fn logout_is_idempotent() {
    let app = spawn_app();
    seed_user(&app, "user@example.com", "Password123", false);

    let body: Value = login(&app, "user@example.com", "Password123")
        .await
        .json()
        .await
        .unwrap();
    let refresh_token = body["refresh_token"].as_str().unwrap().to_string();

    let client = reqwest::Client::new();
    let logout_url = format!("{}/auth/logout", app.address);

    for _ in 0..2 {
        let response = client
            .post(&logout_url)
            .json(&json!({ "refresh_token": refresh_token }))
            .send()
            .await
            .expect("Failed to execute request");
        assert_eq!(204, response.status().as_u16());
    }

    // Logout without a body is also fine
    let response = client
        .post(&logout_url)
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(204, response.status().as_u16());

    // The token is dead
    let response = client
        .post(&format!("{}/auth/refresh", app.address))
        .json(&json!({ "refresh_token": refresh_token }))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(401, response.status().as_u16());
}

#[tokio::test]
async fn logout_all_requires_authentication() {
    let app = spawn_app();

    let response = reqwest::Client::new()
        .post(&format!("{}/auth/logout-all", app.address))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(401, response.status().as_u16());
}

#[tokio::test]
async fn logout_all_revokes_every_session() {
    let app = spawn_app();
    seed_user(&app, "user@example.com", "Password123", false);

    let first: Value = login(&app, "user@example.com", "Password123")
        .await
        .json()
        .await
        .unwrap();
    let second: Value = login(&app, "user@example.com", "Password123")
        .await
        .json()
        .await
        .unwrap();

    let client = reqwest::Client::new();
    let response = client
        .post(&format!("{}/auth/logout-all", app.address))
        .bearer_auth(first["access_token"].as_str().unwrap())
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(204, response.status().as_u16());

    for body in [&first, &second] {
        let response = client
            .post(&format!("{}/auth/refresh", app.address))
            .json(&json!({ "refresh_token": body["refresh_token"] }))
            .send()
            .await
            .expect("Failed to execute request");
        assert_eq!(401, response.status().as_u16());
    }
}

// --- Password reset ---

#[tokio::test]
async fn forgot_password_bodies_are_byte_identical() {
    let app = spawn_app();
    seed_user(&app, "real@example.com", "Password123", false);

    let client = reqwest::Client::new();
    let url = format!("{}/auth/forgot-password", app.address);

    let known = client
        .post(&url)
        .json(&json!({ "email": "real@example.com" }))
        .send()
        .await
        .expect("Failed to execute request");
    let unknown = client
        .post(&url)
        .json(&json!({ "email": "unknown@example.com" }))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(200, known.status().as_u16());
    assert_eq!(200, unknown.status().as_u16());

    let known_bytes = known.bytes().await.unwrap();
    let unknown_bytes = unknown.bytes().await.unwrap();
    assert_eq!(known_bytes, unknown_bytes);

    // Only the real account got a message
    let sent = app.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "real@example.com");
}

#[tokio::test]
async fn reset_password_flow_invalidates_sessions_and_the_token() {
    let app = spawn_app();
    seed_user(&app, "user@example.com", "Password123", false);

    let session: Value = login(&app, "user@example.com", "Password123")
        .await
        .json()
        .await
        .unwrap();

    let client = reqwest::Client::new();
    client
        .post(&format!("{}/auth/forgot-password", app.address))
        .json(&json!({ "email": "user@example.com" }))
        .send()
        .await
        .expect("Failed to execute request");

    let token = app.notifier.sent()[0].1.clone();

    let response = client
        .post(&format!("{}/auth/reset-password", app.address))
        .json(&json!({ "token": token, "new_password": "NewPassword456" }))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(200, response.status().as_u16());

    // Pre-existing session is gone
    let response = client
        .post(&format!("{}/auth/refresh", app.address))
        .json(&json!({ "refresh_token": session["refresh_token"] }))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(401, response.status().as_u16());

    // Old password is dead, the new one works
    assert_eq!(
        401,
        login(&app, "user@example.com", "Password123")
            .await
            .status()
            .as_u16()
    );
    assert_eq!(
        200,
        login(&app, "user@example.com", "NewPassword456")
            .await
            .status()
            .as_u16()
    );

    // The reset token was single-use
    let response = client
        .post(&format!("{}/auth/reset-password", app.address))
        .json(&json!({ "token": token, "new_password": "OtherPassword789" }))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(400, response.status().as_u16());
}

#[tokio::test]
async fn reset_password_returns_400_for_unknown_token() {
    let app = spawn_app();

    let response = reqwest::Client::new()
        .post(&format!("{}/auth/reset-password", app.address))
        .json(&json!({ "token": "never-issued", "new_password": "NewPassword456" }))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(400, response.status().as_u16());
}

#[tokio::test]
async fn reset_password_returns_422_for_weak_password() {
    let app = spawn_app();
    seed_user(&app, "user@example.com", "Password123", false);

    let client = reqwest::Client::new();
    client
        .post(&format!("{}/auth/forgot-password", app.address))
        .json(&json!({ "email": "user@example.com" }))
        .send()
        .await
        .expect("Failed to execute request");
    let token = app.notifier.sent()[0].1.clone();

    let response = client
        .post(&format!("{}/auth/reset-password", app.address))
        .json(&json!({ "token": token, "new_password": "weak" }))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(422, response.status().as_u16());
}

// --- Forced password change ---

#[tokio::test]
async fn force_change_password_requires_authentication() {
    let app = spawn_app();

    let response = reqwest::Client::new()
        .post(&format!("{}/auth/force-change-password", app.address))
        .json(&json!({ "new_password": "NewPassword456" }))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(401, response.status().as_u16());
}

#[tokio::test]
async fn force_change_password_returns_400_when_not_required() {
    let app = spawn_app();
    seed_user(&app, "user@example.com", "Password123", false);

    let session: Value = login(&app, "user@example.com", "Password123")
        .await
        .json()
        .await
        .unwrap();

    let response = reqwest::Client::new()
        .post(&format!("{}/auth/force-change-password", app.address))
        .bearer_auth(session["access_token"].as_str().unwrap())
        .json(&json!({ "new_password": "NewPassword456" }))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(400, response.status().as_u16());
}

#[tokio::test]
async fn force_change_password_clears_the_flag() {
    let app = spawn_app();
    seed_user(&app, "fresh@example.com", "Provisional1", true);

    let session: Value = login(&app, "fresh@example.com", "Provisional1")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(session["must_change_password"], true);

    let response = reqwest::Client::new()
        .post(&format!("{}/auth/force-change-password", app.address))
        .bearer_auth(session["access_token"].as_str().unwrap())
        .json(&json!({ "new_password": "Permanent123" }))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(200, response.status().as_u16());

    let relogin: Value = login(&app, "fresh@example.com", "Permanent123")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(relogin["must_change_password"], false);
}
