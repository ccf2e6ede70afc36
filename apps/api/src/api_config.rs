use std::env;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use sentinel_application::{
    DEFAULT_AUDIT_APPEND_MAX_ATTEMPTS, DEFAULT_CLIENT_RATE_LIMIT_REQUESTS,
    DEFAULT_CLIENT_RATE_LIMIT_WINDOW_SECONDS,
};
use sentinel_core::AppError;
use tracing_subscriber::EnvFilter;

const MIN_GATEWAY_SECRET_LENGTH: usize = 32;

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub migrate_only: bool,
    pub database_url: String,
    pub database_max_connections: u32,
    pub gateway_shared_secret: String,
    pub api_host: String,
    pub api_port: u16,
    pub audit_append_max_attempts: u32,
    pub cors_allowed_origin: String,
    pub rate_limit_enabled: bool,
    pub rate_limit_requests: i64,
    pub rate_limit_window_seconds: i64,
}

impl ApiConfig {
    pub fn load() -> Result<Self, AppError> {
        let migrate_only = env::args().nth(1).as_deref() == Some("migrate");

        let database_url = required_non_empty_env("DATABASE_URL")?;
        let gateway_shared_secret = if migrate_only {
            env::var("GATEWAY_SHARED_SECRET").unwrap_or_default()
        } else {
            let secret = required_env("GATEWAY_SHARED_SECRET")?;
            if secret.len() < MIN_GATEWAY_SECRET_LENGTH {
                return Err(AppError::Validation(format!(
                    "GATEWAY_SHARED_SECRET must be at least {MIN_GATEWAY_SECRET_LENGTH} characters"
                )));
            }
            secret
        };

        let api_host = env::var("API_HOST").unwrap_or_else(|_| "127.0.0.1".to_owned());
        let api_port = parsed_env("API_PORT", 3001_u16)?;
        let database_max_connections = parsed_env("DATABASE_MAX_CONNECTIONS", 10_u32)?;
        let audit_append_max_attempts =
            parsed_env("AUDIT_APPEND_MAX_ATTEMPTS", DEFAULT_AUDIT_APPEND_MAX_ATTEMPTS)?;
        let cors_allowed_origin = env::var("CORS_ALLOWED_ORIGIN")
            .unwrap_or_else(|_| "http://localhost:3000".to_owned());
        let rate_limit_enabled = parsed_env("RATE_LIMIT_ENABLED", true)?;
        let rate_limit_requests =
            positive_env("RATE_LIMIT_REQUESTS", DEFAULT_CLIENT_RATE_LIMIT_REQUESTS)?;
        let rate_limit_window_seconds = positive_env(
            "RATE_LIMIT_WINDOW_SECONDS",
            DEFAULT_CLIENT_RATE_LIMIT_WINDOW_SECONDS,
        )?;

        Ok(Self {
            migrate_only,
            database_url,
            database_max_connections,
            gateway_shared_secret,
            api_host,
            api_port,
            audit_append_max_attempts,
            cors_allowed_origin,
            rate_limit_enabled,
            rate_limit_requests,
            rate_limit_window_seconds,
        })
    }

    pub fn socket_address(&self) -> Result<SocketAddr, AppError> {
        let host = IpAddr::from_str(&self.api_host).map_err(|error| {
            AppError::Internal(format!("invalid API_HOST '{}': {error}", self.api_host))
        })?;
        Ok(SocketAddr::from((host, self.api_port)))
    }
}

pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

fn required_env(name: &str) -> Result<String, AppError> {
    env::var(name).map_err(|_| AppError::Validation(format!("{name} is required")))
}

fn required_non_empty_env(name: &str) -> Result<String, AppError> {
    let value = required_env(name)?;
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("{name} must not be empty")));
    }

    Ok(value)
}

fn parsed_env<T>(name: &str, default: T) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse::<T>()
            .map_err(|error| AppError::Validation(format!("invalid {name}: {error}"))),
        _ => Ok(default),
    }
}

fn positive_env(name: &str, default: i64) -> Result<i64, AppError> {
    let value = parsed_env(name, default)?;
    if value <= 0 {
        return Err(AppError::Validation(format!("{name} must be positive")));
    }

    Ok(value)
}
