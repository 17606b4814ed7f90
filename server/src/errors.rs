// server/src/errors.rs

use crate::web::response::ApiResponse;
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use order_engine::{EngineError, ErrorKind};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
  #[error(transparent)]
  Engine(#[from] EngineError),

  /// Malformed request outside of what the engine validates: bodies, paths, headers.
  #[error("Validation Error: {0}")]
  Validation(String),

  #[error("Configuration Error: {0}")]
  Config(String),

  #[error("Database Error: {0}")]
  Sqlx(#[from] sqlx::Error),

  #[error("Export Error: {0}")]
  Csv(#[from] csv::Error),

  #[error("Internal Server Error: {0}")]
  Internal(String),
}

impl AppError {
  /// Stable identifier rendered in the `errors` field.
  pub fn code(&self) -> &'static str {
    match self {
      AppError::Engine(e) => e.code(),
      AppError::Validation(_) => "InvalidRequest",
      AppError::Config(_) => "Configuration",
      AppError::Sqlx(_) => "StorageUnavailable",
      AppError::Csv(_) | AppError::Internal(_) => "Internal",
    }
  }

  // Infrastructure details never reach clients.
  fn client_message(&self) -> String {
    match self.status_code() {
      StatusCode::INTERNAL_SERVER_ERROR => "An internal error occurred".to_string(),
      _ => self.to_string(),
    }
  }
}

impl From<anyhow::Error> for AppError {
  fn from(err: anyhow::Error) -> Self {
    match err.downcast::<EngineError>() {
      Ok(engine) => AppError::Engine(engine),
      Err(err) => match err.downcast::<sqlx::Error>() {
        Ok(db) => AppError::Sqlx(db),
        Err(err) => AppError::Internal(err.to_string()),
      },
    }
  }
}

impl ResponseError for AppError {
  fn status_code(&self) -> StatusCode {
    match self {
      AppError::Engine(e) => match (e, e.kind()) {
        (EngineError::Unauthenticated, _) => StatusCode::UNAUTHORIZED,
        (EngineError::MaintenanceMode, _) => StatusCode::SERVICE_UNAVAILABLE,
        (_, ErrorKind::Validation) => StatusCode::BAD_REQUEST,
        (_, ErrorKind::Lookup) => StatusCode::NOT_FOUND,
        (_, ErrorKind::Authorisation) => StatusCode::FORBIDDEN,
        (_, ErrorKind::Transition) | (_, ErrorKind::Conflict) => StatusCode::CONFLICT,
        (_, ErrorKind::Infrastructure) => StatusCode::INTERNAL_SERVER_ERROR,
      },
      AppError::Validation(_) => StatusCode::BAD_REQUEST,
      AppError::Config(_) | AppError::Sqlx(_) | AppError::Csv(_) | AppError::Internal(_) => {
        StatusCode::INTERNAL_SERVER_ERROR
      }
    }
  }

  fn error_response(&self) -> HttpResponse {
    let status = self.status_code();
    if status.is_server_error() {
      tracing::error!(application_error = %self, code = self.code(), "Responding with error");
    } else {
      tracing::info!(application_error = %self, code = self.code(), "Request rejected");
    }
    let body: ApiResponse<()> = ApiResponse::failure(self.client_message(), json!({ "code": self.code() }));
    HttpResponse::build(status).json(body)
  }
}

pub type Result<T, E = AppError> = std::result::Result<T, E>;
