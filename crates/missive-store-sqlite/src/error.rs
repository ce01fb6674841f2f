//! Error type for `missive-store-sqlite`, and its classification.

use missive_core::{ErrorCode, ErrorRecord, factory};
use rusqlite::ErrorCode as SqliteCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("template not found: {0}")]
  TemplateNotFound(uuid::Uuid),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl From<Error> for ErrorRecord {
  /// Lost connections are `CONNECTION_FAILED` and lock contention is
  /// `TIMEOUT`, so both get retried; everything else is a `DATABASE_ERROR`.
  fn from(err: Error) -> Self {
    match &err {
      Error::Database(tokio_rusqlite::Error::ConnectionClosed) => ErrorRecord::new(
        "SQLite connection closed",
        ErrorCode::ConnectionFailed,
      )
      .with_cause(&err),
      Error::Database(tokio_rusqlite::Error::Rusqlite(
        rusqlite::Error::SqliteFailure(failure, _),
      )) => match failure.code {
        SqliteCode::DatabaseBusy | SqliteCode::DatabaseLocked => {
          ErrorRecord::new("SQLite database is busy", ErrorCode::Timeout)
            .with_cause(&err)
        }
        SqliteCode::CannotOpen => ErrorRecord::new(
          "SQLite database cannot be opened",
          ErrorCode::ConnectionFailed,
        )
        .with_cause(&err),
        _ => factory::data_store_error("sqlite query", &err),
      },
      Error::TemplateNotFound(id) => factory::template_not_found_by_id(*id),
      _ => factory::data_store_error("sqlite query", &err),
    }
  }
}
