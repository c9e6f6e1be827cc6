use actix_web::dev::Server;
use actix_web::{error::JsonPayloadError, web, App, HttpRequest, HttpServer};
use std::net::TcpListener;

use crate::error::{AppError, ValidationError};
use crate::logger::LoggerMiddleware;
use crate::middleware::JwtMiddleware;
use crate::routes::{
    get_user, get_user_by_email, get_users, health_check, login, refresh, register, update_user,
};
use crate::session::SessionService;

/// Malformed JSON bodies get the same structured 400 as any validation error
fn json_config() -> web::JsonConfig {
    web::JsonConfig::default().error_handler(|err: JsonPayloadError, _req: &HttpRequest| {
        tracing::debug!("Rejected request body: {}", err);
        AppError::Validation(ValidationError::InvalidFormat("request body".to_string())).into()
    })
}

/// Build the HTTP server around an already-initialized session service.
///
/// The service (store handle and signing keys) must be fully constructed
/// before this is called; nothing here initializes lazily.
pub fn run(listener: TcpListener, sessions: SessionService) -> Result<Server, std::io::Error> {
    let sessions = web::Data::new(sessions);

    let server = HttpServer::new(move || {
        let issuer = sessions.issuer().clone();

        App::new()
            .wrap(LoggerMiddleware)
            .app_data(sessions.clone())
            .app_data(json_config())
            // Public routes
            .route("/health_check", web::get().to(health_check))
            .route("/users/register", web::post().to(register))
            .route("/users/login", web::post().to(login))
            .route("/users/refresh", web::post().to(refresh))
            // Protected routes (require a bearer access token)
            .service(
                web::scope("/users")
                    .wrap(JwtMiddleware::new(issuer.clone()))
                    .route("", web::get().to(get_users))
                    .route("/{user_id}", web::get().to(get_user)),
            )
            .service(
                web::scope("/user")
                    .wrap(JwtMiddleware::new(issuer))
                    .route("/{email}", web::get().to(get_user_by_email))
                    .route("/{user_id}", web::put().to(update_user)),
            )
    })
    .listen(listener)?
    .run();

    Ok(server)
}
