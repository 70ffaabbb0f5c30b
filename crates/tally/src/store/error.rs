use core::time::Duration;

/// Failures reported by a [`CounterStore`](crate::CounterStore).
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum StoreError {
    /// The backing store could not be reached (connection refused, reset,
    /// pool exhausted).
    #[error("store unavailable: {context}")]
    Unavailable { context: String },

    /// A row lock was not granted before the lock-wait deadline.
    #[error("lock wait exceeded {waited:?}")]
    LockTimeout { waited: Duration },

    /// The backend aborted the transaction to resolve a conflict with a
    /// concurrent one (serialization failure, deadlock).
    #[error("transaction aborted by a concurrent conflict: {context}")]
    Conflict { context: String },

    /// An insert collided with a row another transaction created first.
    #[error("counter row already exists")]
    UniqueViolation,

    /// A row the transaction believed it held is gone.
    #[error("counter row missing")]
    MissingRow,

    /// Anything else the backend reported.
    #[error("{context}")]
    Backend { context: String },
}

impl StoreError {
    /// Returns `true` for failures that may clear up on their own.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Unavailable { .. } | Self::LockTimeout { .. } | Self::Conflict { .. }
        )
    }
}
