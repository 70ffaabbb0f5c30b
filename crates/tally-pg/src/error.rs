use core::time::Duration;
use tally::StoreError;

/// Errors raised while connecting to or preparing the database.
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error("failed to connect to PostgreSQL: {0}")]
    Connect(#[source] sqlx::Error),

    #[error("failed to apply migrations: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

/// SQLSTATE `unique_violation`.
const UNIQUE_VIOLATION: &str = "23505";
/// SQLSTATE `lock_not_available`, raised when `lock_timeout` elapses.
const LOCK_NOT_AVAILABLE: &str = "55P03";
/// SQLSTATE `serialization_failure`.
const SERIALIZATION_FAILURE: &str = "40001";
/// SQLSTATE `deadlock_detected`.
const DEADLOCK_DETECTED: &str = "40P01";
/// SQLSTATE `too_many_connections`.
const TOO_MANY_CONNECTIONS: &str = "53300";

/// Maps a driver error onto the store taxonomy.
///
/// `lock_timeout` is the deadline the failing transaction was opened with.
pub(crate) fn store_error(err: sqlx::Error, lock_timeout: Duration) -> StoreError {
    match &err {
        sqlx::Error::Database(db) => match db.code() {
            Some(code) => sqlstate_error(&code, lock_timeout, err.to_string()),
            None => backend(&err),
        },
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => unavailable(&err),
        _ => backend(&err),
    }
}

/// Classifies a database error by its SQLSTATE code.
fn sqlstate_error(code: &str, lock_timeout: Duration, context: String) -> StoreError {
    match code {
        UNIQUE_VIOLATION => StoreError::UniqueViolation,
        LOCK_NOT_AVAILABLE => StoreError::LockTimeout {
            waited: lock_timeout,
        },
        SERIALIZATION_FAILURE | DEADLOCK_DETECTED => StoreError::Conflict { context },
        TOO_MANY_CONNECTIONS => StoreError::Unavailable { context },
        // Class 08: connection exception. Class 57: operator intervention
        // (shutdown, cannot connect now).
        code if code.starts_with("08") || code.starts_with("57") => {
            StoreError::Unavailable { context }
        }
        _ => StoreError::Backend { context },
    }
}

fn unavailable(err: &sqlx::Error) -> StoreError {
    StoreError::Unavailable {
        context: err.to_string(),
    }
}

fn backend(err: &sqlx::Error) -> StoreError {
    StoreError::Backend {
        context: err.to_string(),
    }
}
