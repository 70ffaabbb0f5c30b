use crate::{Error, Result};
use core::time::Duration;
use rand::Rng;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Default time a transaction waits for a contended row lock.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(3);

/// Default number of attempts when counter creation races.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Backoff strategies applied between attempts after losing the counter
/// creation race.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Backoff {
    /// Busy-waits for a single spin hint.
    ///
    /// Lowest latency, but burns CPU while the winner commits.
    Spin,

    /// Yields to the OS scheduler to allow the winning transaction to finish.
    #[default]
    Yield,

    /// Sleeps for `base * attempt` plus up to `base` of random jitter.
    ///
    /// Spreads out retries from many losers of the same race.
    Sleep(Duration),
}

impl Backoff {
    /// The delay before retry number `attempt` (1-based), for strategies that
    /// sleep.
    pub fn delay(&self, attempt: u32) -> Option<Duration> {
        match *self {
            Self::Sleep(base) => {
                let jitter_nanos = u64::try_from(base.as_nanos()).unwrap_or(u64::MAX);
                let jitter = rand::rng().random_range(0..=jitter_nanos);
                Some(
                    base.saturating_mul(attempt)
                        .saturating_add(Duration::from_nanos(jitter)),
                )
            }
            Self::Spin | Self::Yield => None,
        }
    }

    /// Blocks the current thread according to the strategy.
    pub fn wait(&self, attempt: u32) {
        match self {
            Self::Spin => core::hint::spin_loop(),
            Self::Yield => std::thread::yield_now(),
            Self::Sleep(_) => {
                if let Some(delay) = self.delay(attempt) {
                    std::thread::sleep(delay);
                }
            }
        }
    }
}

/// Bounds on how long and how often an allocation may try.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
pub struct AllocatorPolicy {
    /// How long to wait for a contended row lock before giving up with a
    /// transient error.
    pub lock_timeout: Duration,
    /// Attempts made when counter creation collides with a concurrent insert.
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl Default for AllocatorPolicy {
    fn default() -> Self {
        Self {
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: Backoff::default(),
        }
    }
}

impl AllocatorPolicy {
    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Rejects policies that could never allocate.
    pub fn validate(&self) -> Result<()> {
        if self.lock_timeout.is_zero() {
            return Err(Error::invalid("lock timeout must be greater than zero"));
        }
        if self.max_attempts == 0 {
            return Err(Error::invalid("max attempts must be greater than zero"));
        }
        Ok(())
    }
}
