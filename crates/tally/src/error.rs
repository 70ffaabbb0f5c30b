use crate::StoreError;

/// A result type defaulting to [`Error`].
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// All errors `tally` can surface to a caller.
///
/// Allocation never reports failure through a sentinel value. A caller either
/// gets a committed number or one of these variants, and
/// [`Error::is_retryable`] tells it whether trying again later is sensible.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The caller supplied an empty tenant, a malformed scope key or an
    /// otherwise unusable context. Nothing was sent to the store.
    #[error("invalid input: {reason}")]
    InvalidInput { reason: String },

    /// The store could not be reached, the row lock was not granted in time,
    /// or the backend aborted the transaction over a conflict.
    ///
    /// Usually the transaction was rolled back and nothing was consumed. If
    /// the connection dropped while committing, the store may have applied
    /// the increment anyway, which leaves a gap. It never leaves a duplicate.
    #[error("transient store failure: {0}")]
    Transient(StoreError),

    /// Creating the counter row lost the unique-constraint race on every
    /// attempt. Surfaced as a hard error so callers do not loop forever.
    #[error("counter creation lost the race {attempts} times in a row")]
    RetriesExhausted { attempts: u32 },

    /// The counter reached the largest value the store can hold.
    #[error("counter {scope_key} exhausted at {value}")]
    Exhausted { scope_key: String, value: u64 },

    /// Any other store failure.
    #[error("store failure: {0}")]
    Store(StoreError),
}

impl Error {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            reason: reason.into(),
        }
    }

    /// Returns `true` when the operation may succeed if retried with backoff.
    ///
    /// Only [`Error::Transient`] qualifies. In particular
    /// [`Error::RetriesExhausted`] is not retryable: the allocator already
    /// retried internally.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        if err.is_transient() {
            Self::Transient(err)
        } else {
            Self::Store(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::time::Duration;

    #[test]
    fn lock_timeouts_and_outages_are_retryable() {
        let err = Error::from(StoreError::LockTimeout {
            waited: Duration::from_secs(3),
        });
        assert!(err.is_retryable());

        let err = Error::from(StoreError::Unavailable {
            context: "connection reset".into(),
        });
        assert!(err.is_retryable());
    }

    #[test]
    fn hard_failures_are_not_retryable() {
        assert!(!Error::RetriesExhausted { attempts: 3 }.is_retryable());
        assert!(!Error::invalid("empty tenant").is_retryable());
        assert!(!Error::from(StoreError::MissingRow).is_retryable());
        assert!(
            !Error::Exhausted {
                scope_key: "students".into(),
                value: u64::MAX,
            }
            .is_retryable()
        );
    }
}
