use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;

use sessiond::auth::{AuthService, PgRefreshTokenStore, RefreshTokenStore};
use sessiond::configuration::get_configuration;
use sessiond::email_client::{EmailClient, SenderEmail};
use sessiond::startup::run;
use sessiond::telemetry::init_telemetry;
use sessiond::users::PgUserDirectory;
use sqlx::postgres::PgPoolOptions;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    // Structured logging for tracing events, env_logger for log-facade
    // records emitted by the HTTP middleware
    init_telemetry();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init()
        .ok();

    tracing::info!("Starting application");

    let configuration = match get_configuration() {
        Ok(config) => {
            tracing::info!("Configuration loaded successfully");
            config
        }
        Err(e) => {
            tracing::error!("Failed to read configuration: {}", e);
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "Configuration error",
            ));
        }
    };

    let connection_string = configuration.database.connection_string();
    tracing::info!("Attempting to connect to database");

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&connection_string)
        .await
        .map_err(|e| {
            tracing::error!("Failed to create connection pool: {}", e);
            std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "Database connection error",
            )
        })?;

    tracing::info!("Database connection pool created successfully");

    // Assemble the dependency graph once; everything downstream receives it
    // explicitly
    let users = Arc::new(PgUserDirectory::new(pool.clone()));
    let tokens: Arc<dyn RefreshTokenStore> = Arc::new(PgRefreshTokenStore::new(pool.clone()));

    let sender = SenderEmail::parse(configuration.email.sender.clone()).map_err(|e| {
        tracing::error!("Invalid sender address in configuration: {}", e);
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "Configuration error")
    })?;
    let notifier = Arc::new(EmailClient::new(
        configuration.email.base_url.clone(),
        sender,
        reqwest::Client::new(),
    ));

    let service = AuthService::new(
        users,
        tokens.clone(),
        notifier,
        configuration.auth.clone(),
    );

    // Periodic sweep of expired refresh tokens
    let purge_interval = Duration::from_secs(configuration.auth.purge_interval_secs);
    let purge_store = tokens.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(purge_interval);
        interval.tick().await; // the first tick fires immediately; skip it
        loop {
            interval.tick().await;
            match purge_store.purge_expired().await {
                Ok(0) => tracing::debug!("Expired token sweep found nothing to delete"),
                Ok(count) => tracing::info!(count = count, "Deleted expired refresh tokens"),
                Err(e) => tracing::error!(error = %e, "Expired token sweep failed"),
            }
        }
    });

    let address = format!("127.0.0.1:{}", configuration.application.port);
    tracing::info!("Binding server to address: {}", address);

    let listener = TcpListener::bind(&address)?;
    tracing::info!("Server listening on: {}", address);

    let server = run(listener, service, configuration.auth.clone())?;
    tracing::info!("Server started successfully");

    let _ = server.await;

    Ok(())
}
