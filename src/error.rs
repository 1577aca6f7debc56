use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::config::Environment;
use crate::gemini::LlmError;
use crate::storage::StorageError;

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
  #[error("{0} is not configured")]
  MissingCredential(&'static str),
  #[error("No messages provided")]
  NoMessages,
  #[error("Invalid request body")]
  InvalidBody(String),
  #[error("Failed to process chat request")]
  Upstream(#[from] LlmError),
  #[error("Failed to store generated image")]
  Storage(#[from] StorageError),
}

#[derive(Serialize)]
struct ErrorBody {
  error: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  details: Option<String>,
}

impl ChatError {
  pub fn status(&self) -> StatusCode {
    match self {
      ChatError::NoMessages | ChatError::InvalidBody(_) => StatusCode::BAD_REQUEST,
      ChatError::MissingCredential(_) | ChatError::Upstream(_) | ChatError::Storage(_) => {
        StatusCode::INTERNAL_SERVER_ERROR
      }
    }
  }

  /// Underlying cause, only for failures that have one.
  fn details(&self) -> Option<String> {
    match self {
      ChatError::InvalidBody(reason) => Some(reason.clone()),
      ChatError::Upstream(err) => Some(err.to_string()),
      ChatError::Storage(err) => Some(err.to_string()),
      ChatError::MissingCredential(_) | ChatError::NoMessages => None,
    }
  }

  /// Error response; details are withheld in production.
  pub fn into_response_for(self, env: Environment) -> Response {
    let body = ErrorBody {
      error: self.to_string(),
      details: if env.is_production() { None } else { self.details() },
    };
    (self.status(), Json(body)).into_response()
  }
}

impl IntoResponse for ChatError {
  fn into_response(self) -> Response {
    self.into_response_for(Environment::Production)
  }
}
