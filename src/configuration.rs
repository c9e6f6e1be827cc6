use std::time::Duration;

use crate::auth::{MAX_BCRYPT_COST, MIN_BCRYPT_COST};
use crate::error::AppError;

#[derive(serde::Deserialize, Clone, Debug)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub application: ApplicationSettings,
    pub jwt: JwtSettings,
    pub auth: AuthSettings,
}

#[derive(serde::Deserialize, Clone, Debug)]
pub struct ApplicationSettings {
    pub host: String,
    pub port: u16,
    /// `postgres` or `memory`
    pub store: StoreBackend,
}

#[derive(serde::Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Postgres,
    Memory,
}

#[derive(serde::Deserialize, Clone, Debug)]
pub struct DatabaseSettings {
    pub username: String,
    pub password: String,
    pub port: u16,
    pub host: String,
    pub database_name: String,
    pub max_connections: u32,
    /// Upper bound for every store operation
    pub timeout_seconds: u64,
}

impl DatabaseSettings {
    pub fn connection_string(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.username, self.password, self.host, self.port, self.database_name
        )
    }

    /// Server-level connection, used to create per-test databases
    pub fn connection_string_without_db(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}",
            self.username, self.password, self.host, self.port
        )
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// JWT signing settings
#[derive(serde::Deserialize, Clone)]
pub struct JwtSettings {
    pub secret: String,
    pub access_token_expiry: i64,   // seconds (604800 = 7 days)
    pub refresh_token_expiry: i64,  // seconds
    pub issuer: String,
}

// The secret must never end up in logs.
impl std::fmt::Debug for JwtSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtSettings")
            .field("secret", &"[redacted]")
            .field("access_token_expiry", &self.access_token_expiry)
            .field("refresh_token_expiry", &self.refresh_token_expiry)
            .field("issuer", &self.issuer)
            .finish()
    }
}

#[derive(serde::Deserialize, Clone, Debug)]
pub struct AuthSettings {
    pub bcrypt_cost: u32,
}

impl Settings {
    /// Rejects settings the server cannot safely run with.
    ///
    /// Called once at startup so a missing signing secret stops the process
    /// before any request is served.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.jwt.secret.trim().is_empty() {
            return Err(AppError::Config("jwt.secret (SECRET_KEY) is not set".to_string()));
        }
        if self.jwt.access_token_expiry <= 0 || self.jwt.refresh_token_expiry <= 0 {
            return Err(AppError::Config("token expiry must be positive".to_string()));
        }
        if !(MIN_BCRYPT_COST..=MAX_BCRYPT_COST).contains(&self.auth.bcrypt_cost) {
            return Err(AppError::Config(format!(
                "auth.bcrypt_cost must be between {} and {}",
                MIN_BCRYPT_COST, MAX_BCRYPT_COST
            )));
        }
        if self.database.timeout_seconds == 0 {
            return Err(AppError::Config("database.timeout_seconds must be positive".to_string()));
        }
        Ok(())
    }
}

/// Load settings from `configuration.yaml` (optional) and the environment.
///
/// `APP_JWT__SECRET`, `APP_APPLICATION__PORT`, ... override file values. The
/// bare `SECRET_KEY` and `PORT` variables are honoured as well.
pub fn get_configuration() -> Result<Settings, config::ConfigError> {
    let mut builder = config::Config::builder()
        .set_default("application.host", "127.0.0.1")?
        .set_default("application.port", 8888)?
        .set_default("application.store", "postgres")?
        .set_default("database.username", "postgres")?
        .set_default("database.password", "password")?
        .set_default("database.host", "127.0.0.1")?
        .set_default("database.port", 5432)?
        .set_default("database.database_name", "cms")?
        .set_default("database.max_connections", 5)?
        .set_default("database.timeout_seconds", 100)?
        .set_default("jwt.secret", "")?
        .set_default("jwt.access_token_expiry", 604800)?
        .set_default("jwt.refresh_token_expiry", 604800)?
        .set_default("jwt.issuer", "cms_auth")?
        .set_default("auth.bcrypt_cost", bcrypt::DEFAULT_COST as i64)?
        .add_source(config::File::with_name("configuration").required(false))
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__"),
        );

    if let Ok(secret) = std::env::var("SECRET_KEY") {
        builder = builder.set_override("jwt.secret", secret)?;
    }
    if let Ok(port) = std::env::var("PORT") {
        builder = builder.set_override("application.port", port)?;
    }

    builder.build()?.try_deserialize::<Settings>()
}
