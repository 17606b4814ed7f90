// server/src/config.rs

use crate::errors::{AppError, Result};
use dotenvy::dotenv;
use order_engine::RetryPolicy;
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
  Pretty,
  Json,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
  pub server_host: String,
  pub server_port: u16,
  pub database_url: String,
  pub db_max_connections: u32,
  pub request_timeout: Duration,
  pub refund_max_attempts: u32,
  pub refund_backoff: Duration,
  pub log_format: LogFormat,
  pub run_migrations: bool,
}

impl AppConfig {
  pub fn from_env() -> Result<Self> {
    dotenv().ok(); // Load .env file if present

    let get_env = |var_name: &str| {
      env::var(var_name).map_err(|e| AppError::Config(format!("Missing environment variable '{}': {}", var_name, e)))
    };
    let parse_env = |var_name: &str, default: &str| -> Result<u64> {
      get_env(var_name)
        .unwrap_or_else(|_| default.to_string())
        .trim()
        .parse::<u64>()
        .map_err(|e| AppError::Config(format!("Invalid {}: {}", var_name, e)))
    };

    let server_host = get_env("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let server_port = get_env("SERVER_PORT")
      .unwrap_or_else(|_| "8080".to_string())
      .parse::<u16>()
      .map_err(|e| AppError::Config(format!("Invalid SERVER_PORT: {}", e)))?;
    let database_url = get_env("DATABASE_URL")?;

    let db_max_connections = u32::try_from(parse_env("DB_MAX_CONNECTIONS", "10")?)
      .map_err(|e| AppError::Config(format!("Invalid DB_MAX_CONNECTIONS: {}", e)))?;
    let request_timeout = Duration::from_millis(parse_env("REQUEST_TIMEOUT_MS", "5000")?);
    let refund_max_attempts = u32::try_from(parse_env("REFUND_MAX_ATTEMPTS", "5")?)
      .map_err(|e| AppError::Config(format!("Invalid REFUND_MAX_ATTEMPTS: {}", e)))?;
    let refund_backoff = Duration::from_millis(parse_env("REFUND_BACKOFF_MS", "200")?);

    let log_format = match get_env("LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string()).as_str() {
      "pretty" => LogFormat::Pretty,
      "json" => LogFormat::Json,
      other => return Err(AppError::Config(format!("Invalid LOG_FORMAT '{}', expected pretty or json", other))),
    };
    let run_migrations = get_env("RUN_MIGRATIONS")
      .unwrap_or_else(|_| "false".to_string())
      .parse::<bool>()
      .map_err(|e| AppError::Config(format!("Invalid RUN_MIGRATIONS value: {}", e)))?;

    if request_timeout.is_zero() {
      return Err(AppError::Config("REQUEST_TIMEOUT_MS must be greater than zero".to_string()));
    }

    Ok(Self {
      server_host,
      server_port,
      database_url,
      db_max_connections,
      request_timeout,
      refund_max_attempts,
      refund_backoff,
      log_format,
      run_migrations,
    })
  }

  pub fn refund_policy(&self) -> RetryPolicy {
    RetryPolicy {
      max_attempts: self.refund_max_attempts.max(1),
      base_backoff: self.refund_backoff,
      ..RetryPolicy::default()
    }
  }

  pub fn bind_address(&self) -> String {
    format!("{}:{}", self.server_host, self.server_port)
  }
}
