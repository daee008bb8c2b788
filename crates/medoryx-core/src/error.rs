//! Error kinds surfaced to callers of the core.

use rusqlite::ErrorCode;
use tracing::warn;

use crate::db::DbError;

/// Failure kinds returned by every core operation.
///
/// An empty queue on `call_next` is not an error; see
/// [`CallNextOutcome`](crate::models::CallNextOutcome).
#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum CoreError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Already admitted: {0}")]
    AlreadyAdmitted(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),
}

pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    /// Stable identifier for the HTTP layer.
    pub fn kind(&self) -> &'static str {
        match self {
            CoreError::Validation(_) => "validation_error",
            CoreError::NotFound(_) => "not_found",
            CoreError::Unauthorized(_) => "unauthorized",
            CoreError::AlreadyAdmitted(_) => "already_admitted",
            CoreError::Conflict(_) => "conflict",
            CoreError::UpstreamUnavailable(_) => "upstream_unavailable",
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, CoreError::Conflict(_))
    }
}

impl From<DbError> for CoreError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::NotFound(what) => CoreError::NotFound(what),
            DbError::Constraint(msg) => CoreError::Conflict(msg),
            DbError::Sqlite(rusqlite::Error::SqliteFailure(ref failure, _))
                if failure.code == ErrorCode::ConstraintViolation =>
            {
                CoreError::Conflict(e.to_string())
            }
            other => CoreError::UpstreamUnavailable(other.to_string()),
        }
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(e: rusqlite::Error) -> Self {
        DbError::from(e).into()
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        CoreError::UpstreamUnavailable(format!("serialization failed: {}", e))
    }
}

impl<T> From<std::sync::PoisonError<T>> for CoreError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        CoreError::UpstreamUnavailable(format!("Lock poisoned: {}", e))
    }
}

/// Run `op`, retrying exactly once when it fails with [`CoreError::Conflict`].
///
/// `op` must re-read whatever state it depends on; the retry applies the
/// operation from scratch.
pub(crate) fn retry_on_conflict<T>(
    operation: &str,
    mut op: impl FnMut() -> CoreResult<T>,
) -> CoreResult<T> {
    match op() {
        Err(e) if e.is_conflict() => {
            warn!(operation, error = %e, "conflict detected, retrying once");
            op()
        }
        other => other,
    }
}
