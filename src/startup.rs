use actix_web::dev::Server;
use actix_web::{middleware::Logger, web, App, HttpServer};
use std::net::TcpListener;

use crate::auth::AuthService;
use crate::configuration::AuthSettings;
use crate::logger::LoggerMiddleware;
use crate::middleware::JwtMiddleware;
use crate::routes::{
    force_change_password, forgot_password, health_check, login, logout, logout_all, refresh,
    reset_password,
};

/// Wire the dependency graph into the HTTP application and start serving.
///
/// The service graph is assembled once by the caller and injected here;
/// handlers receive it through app data rather than reaching for globals.
pub fn run(
    listener: TcpListener,
    service: AuthService,
    auth_config: AuthSettings,
) -> Result<Server, std::io::Error> {
    let service = web::Data::new(service);

    let server = HttpServer::new(move || {
        App::new()
            // Global middleware
            .wrap(Logger::default())
            .wrap(LoggerMiddleware)

            // Shared state
            .app_data(service.clone())

            // Public routes (no authentication required)
            .route("/health_check", web::get().to(health_check))
            .route("/auth/login", web::post().to(login))
            .route("/auth/refresh", web::post().to(refresh))
            .route("/auth/logout", web::post().to(logout))
            .route("/auth/forgot-password", web::post().to(forgot_password))
            .route("/auth/reset-password", web::post().to(reset_password))

            // Protected routes (require a valid access token)
            .service(
                web::scope("/auth")
                    .wrap(JwtMiddleware::new(auth_config.clone()))
                    .route("/logout-all", web::post().to(logout_all))
                    .route(
                        "/force-change-password",
                        web::post().to(force_change_password),
                    ),
            )
    })
    .listen(listener)?
    .run();

    Ok(server)
}
