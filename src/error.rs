//! Error taxonomy for the dynamic-schema employee store.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
  #[error("employee {0} not found")]
  EmployeeNotFound(i64),

  #[error("column '{0}' not found")]
  ColumnNotFound(String),

  #[error("column '{0}' already exists")]
  DuplicateColumn(String),

  #[error("invalid column name '{0}': {1}")]
  InvalidColumnName(String, &'static str),

  #[error("invalid value '{value}' for {ty} column: {reason}")]
  InvalidValue {
    value: String,
    ty: &'static str,
    reason: String,
  },

  #[error("schema introspection failed")]
  SchemaIntrospection(#[source] rusqlite::Error),

  #[error("schema change failed")]
  SchemaAlter(#[source] rusqlite::Error),

  #[error("write rejected for column '{column}'")]
  WriteRejected {
    column: String,
    #[source]
    source: rusqlite::Error,
  },

  /// The base record was written, but a dynamic field write failed.
  /// Fields written before the failing one remain written.
  #[error("employee {id} updated, but dynamic field '{field}' failed")]
  PartialUpdate {
    id: i64,
    field: String,
    #[source]
    source: Box<Error>,
  },

  #[error("store call timed out")]
  Timeout(#[source] rusqlite::Error),

  #[error("lock poisoned")]
  LockPoisoned,

  #[error("configuration error: {0}")]
  Config(String),

  #[error("storage error")]
  Storage(#[source] rusqlite::Error),
}

impl From<rusqlite::Error> for Error {
  fn from(err: rusqlite::Error) -> Self {
    // A busy store is a deadline failure, not a generic storage error;
    // callers must see it distinctly and decide whether to retry.
    if let rusqlite::Error::SqliteFailure(code, _) = &err {
      if code.code == rusqlite::ErrorCode::DatabaseBusy
        || code.code == rusqlite::ErrorCode::DatabaseLocked
      {
        return Self::Timeout(err);
      }
    }
    Self::Storage(err)
  }
}

impl<T> From<std::sync::PoisonError<T>> for Error {
  fn from(_: std::sync::PoisonError<T>) -> Self {
    Self::LockPoisoned
  }
}
