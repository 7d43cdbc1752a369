// server/src/errors.rs

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use referral_core::{CoreError, ErrorCategory};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
  /// Every domain failure of the referral core.
  #[error(transparent)]
  Core(#[from] CoreError),

  #[error("Authentication Failed: {0}")]
  Auth(String),

  #[error("Access denied: {0}")]
  Forbidden(String),

  #[error("Configuration Error: {0}")]
  Config(String),

  #[error("Database Error: {0}")]
  Sqlx(#[from] sqlx::Error),

  #[error("Migration Error: {0}")]
  Migration(#[from] sqlx::migrate::MigrateError),

  #[error("Internal Server Error: {0}")]
  Internal(String), // For miscellaneous errors
}

// Allow anyhow::Error to be converted into AppError for convenience in handlers
impl From<anyhow::Error> for AppError {
  fn from(err: anyhow::Error) -> Self {
    // Recover the typed error if anyhow was only wrapping it
    let err = match err.downcast::<CoreError>() {
      Ok(core) => return AppError::Core(core),
      Err(other) => other,
    };
    match err.downcast::<sqlx::Error>() {
      Ok(db) => AppError::Sqlx(db),
      Err(other) => AppError::Internal(format!("{:#}", other)),
    }
  }
}

impl AppError {
  /// Stable machine-readable identifier, sent as the `error` field of the body.
  pub fn kind(&self) -> &'static str {
    match self {
      AppError::Core(core) => core.kind(),
      AppError::Auth(_) => "unauthorized",
      AppError::Forbidden(_) => "forbidden",
      AppError::Config(_) => "config",
      AppError::Sqlx(_) | AppError::Migration(_) => "storage",
      AppError::Internal(_) => "internal",
    }
  }

  fn public_message(&self) -> String {
    match self {
      AppError::Sqlx(_) | AppError::Migration(_) => "Database operation failed".to_string(),
      AppError::Core(CoreError::Storage(_)) => "Database operation failed".to_string(),
      other => other.to_string(),
    }
  }
}

impl ResponseError for AppError {
  fn status_code(&self) -> StatusCode {
    match self {
      AppError::Core(core) => match (core, core.category()) {
        (CoreError::Forbidden(_), _) => StatusCode::FORBIDDEN,
        (CoreError::PendingCapacity, _) => StatusCode::SERVICE_UNAVAILABLE,
        (_, ErrorCategory::Validation) => StatusCode::BAD_REQUEST,
        (_, ErrorCategory::Conflict) => StatusCode::CONFLICT,
        (_, ErrorCategory::NotFound) => StatusCode::NOT_FOUND,
        (_, ErrorCategory::Auth) => StatusCode::UNAUTHORIZED,
        (_, ErrorCategory::Dependency) => StatusCode::BAD_GATEWAY,
        (_, ErrorCategory::Internal) => StatusCode::INTERNAL_SERVER_ERROR,
      },
      AppError::Auth(_) => StatusCode::UNAUTHORIZED,
      AppError::Forbidden(_) => StatusCode::FORBIDDEN,
      AppError::Config(_) | AppError::Sqlx(_) | AppError::Migration(_) | AppError::Internal(_) => {
        StatusCode::INTERNAL_SERVER_ERROR
      }
    }
  }

  fn error_response(&self) -> HttpResponse {
    let status = self.status_code();
    // Log the full error when it's turned into a response
    if status.is_server_error() {
      tracing::error!(application_error = %self, kind = self.kind(), "Responding with error");
    } else {
      tracing::warn!(application_error = %self, kind = self.kind(), "Responding with error");
    }
    HttpResponse::build(status).json(json!({
      "success": false,
      "error": self.kind(),
      "message": self.public_message(),
    }))
  }
}

// Define a Result type alias for the application
pub type Result<T, E = AppError> = std::result::Result<T, E>;
