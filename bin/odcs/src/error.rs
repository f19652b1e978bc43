use axum::{Json, http::StatusCode, response::IntoResponse};
use thiserror::Error;

/// Domain error kinds. Every Store/Resolver/ReuseIndex/Worker/Expirer
/// failure boils down to one of these before it crosses a component
/// boundary; the Worker maps everything non-`Transient` straight into a
/// `failed` transition's `state_reason`.
#[derive(Debug, Error)]
pub enum OdcsError {
  #[error("invalid input: {0}")]
  InvalidInput(String),

  #[error("invalid state transition: {0}")]
  InvalidTransition(String),

  #[error("not found: {0}")]
  NotFound(String),

  #[error("unauthorized: {0}")]
  Unauthorized(String),

  #[error("resolution failed: {0}")]
  ResolutionError(String),

  #[error("reuse disallowed: {0}")]
  ReuseDisallowed(String),

  #[error("tool failed: {0}")]
  ToolFailure(String),

  #[error("validation failed: {0}")]
  ValidationFailure(String),

  /// Retryable external I/O error (MBS / Koji / Pulp / Mongo transient
  /// failure). Callers that can retry should match on this variant before
  /// giving up.
  #[error("transient error: {0}")]
  Transient(String),

  #[error("fatal error: {0}")]
  Fatal(String),
}

impl OdcsError {
  pub fn status_code(&self) -> StatusCode {
    use OdcsError::*;
    match self {
      InvalidInput(_) | InvalidTransition(_) => {
        StatusCode::BAD_REQUEST
      }
      Unauthorized(_) => StatusCode::UNAUTHORIZED,
      NotFound(_) => StatusCode::NOT_FOUND,
      ReuseDisallowed(_) => StatusCode::OK,
      ResolutionError(_)
      | ToolFailure(_)
      | ValidationFailure(_)
      | Transient(_)
      | Fatal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }

  pub fn is_transient(&self) -> bool {
    matches!(self, OdcsError::Transient(_))
  }
}

impl IntoResponse for OdcsError {
  fn into_response(self) -> axum::response::Response {
    let status = self.status_code();
    let body = Json(serde_json::json!({ "error": self.to_string() }));
    (status, body).into_response()
  }
}

pub type OdcsResult<T> = Result<T, OdcsError>;
