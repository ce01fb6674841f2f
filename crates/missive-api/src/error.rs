//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use missive_core::{ErrorCode, ErrorRecord};
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("bad request: {0}")]
  BadRequest(String),

  #[error(transparent)]
  Record(#[from] ErrorRecord),
}

pub type Result<T, E = ApiError> = std::result::Result<T, E>;

/// HTTP status for a failure code.
pub fn status_for(record: &ErrorRecord) -> StatusCode {
  match record.code() {
    ErrorCode::TemplateNotFound | ErrorCode::MappingNotFound => StatusCode::NOT_FOUND,
    ErrorCode::DuplicateMapping => StatusCode::CONFLICT,
    ErrorCode::InvalidTemplate
    | ErrorCode::ValidationFailed
    | ErrorCode::InvalidConfiguration => StatusCode::UNPROCESSABLE_ENTITY,
    _ if record.is_temporary() => StatusCode::SERVICE_UNAVAILABLE,
    _ => StatusCode::INTERNAL_SERVER_ERROR,
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, code, message) = match &self {
      ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, ErrorCode::ValidationFailed, m.clone()),
      ApiError::Record(r) => (status_for(r), r.code(), r.message().to_owned()),
    };
    (status, Json(json!({ "error": message, "code": code }))).into_response()
  }
}
