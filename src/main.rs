use sqlx::postgres::PgPoolOptions;
use std::net::TcpListener;
use std::sync::Arc;

use cms_auth::auth::{PasswordHasher, TokenIssuer};
use cms_auth::configuration::{get_configuration, DatabaseSettings, StoreBackend};
use cms_auth::session::SessionService;
use cms_auth::startup::run;
use cms_auth::store::{InMemoryUserStore, PostgresUserStore, UserStore};
use cms_auth::telemetry::init_telemetry;

fn startup_error(kind: std::io::ErrorKind, message: &str) -> std::io::Error {
    std::io::Error::new(kind, message.to_string())
}

async fn connect_postgres(settings: &DatabaseSettings) -> std::io::Result<PostgresUserStore> {
    tracing::info!(
        host = %settings.host,
        database = %settings.database_name,
        "Attempting to connect to database"
    );

    let pool = PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .acquire_timeout(settings.timeout())
        .connect(&settings.connection_string())
        .await
        .map_err(|e| {
            tracing::error!("Failed to create connection pool: {}", e);
            startup_error(std::io::ErrorKind::ConnectionRefused, "Database connection error")
        })?;

    sqlx::migrate!("./migrations").run(&pool).await.map_err(|e| {
        tracing::error!("Failed to run migrations: {}", e);
        startup_error(std::io::ErrorKind::Other, "Database migration error")
    })?;

    tracing::info!("Database connection pool created successfully");
    Ok(PostgresUserStore::new(pool))
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    init_telemetry();
    tracing::info!("Starting application");

    let configuration = get_configuration().map_err(|e| {
        tracing::error!("Failed to read configuration: {}", e);
        startup_error(std::io::ErrorKind::InvalidInput, "Configuration error")
    })?;

    // Secret and limits are checked before anything else is built
    configuration.validate().map_err(|e| {
        tracing::error!("Invalid configuration: {}", e);
        startup_error(std::io::ErrorKind::InvalidInput, "Configuration error")
    })?;
    tracing::info!("Configuration loaded successfully");

    let issuer = TokenIssuer::new(&configuration.jwt).map_err(|e| {
        tracing::error!("Failed to initialize token issuer: {}", e);
        startup_error(std::io::ErrorKind::InvalidInput, "Configuration error")
    })?;

    let store: Arc<dyn UserStore> = match configuration.application.store {
        StoreBackend::Postgres => Arc::new(connect_postgres(&configuration.database).await?),
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory user store; data is lost on shutdown");
            Arc::new(InMemoryUserStore::new())
        }
    };

    let sessions = SessionService::new(
        store,
        issuer,
        PasswordHasher::new(configuration.auth.bcrypt_cost),
        configuration.database.timeout(),
    );

    let address = format!(
        "{}:{}",
        configuration.application.host, configuration.application.port
    );
    let listener = TcpListener::bind(&address)?;
    tracing::info!("Server listening on: {}", address);

    run(listener, sessions)?.await
}
