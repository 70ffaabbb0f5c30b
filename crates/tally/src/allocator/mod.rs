mod policy;

pub use policy::*;

use crate::{CounterStore, CounterTransaction, Error, Result, ScopeKey, StoreError, TenantId};
use core::time::Duration;
#[cfg(feature = "tracing")]
use tracing::instrument;

/// Outcome of a single transactional attempt.
pub(crate) enum Attempt {
    Allocated(u64),
    /// Another transaction created the counter row first.
    Raced,
}

/// The increment step shared by every allocator.
pub(crate) fn next_value(current: u64, max: u64, key: &ScopeKey) -> Result<u64> {
    match current.checked_add(1) {
        Some(next) if next <= max => Ok(next),
        _ => Err(Error::Exhausted {
            scope_key: key.to_string(),
            value: current,
        }),
    }
}

pub(crate) fn retries_exhausted(
    _tenant: &TenantId,
    _key: &ScopeKey,
    attempts: u32,
) -> Error {
    #[cfg(feature = "tracing")]
    tracing::warn!(
        tenant = %_tenant,
        scope_key = %_key,
        attempts,
        "counter creation raced on every attempt"
    );
    Error::RetriesExhausted { attempts }
}

/// A transactional, tenant-scoped sequence allocator.
///
/// For a fixed `(tenant, key)` the values returned across all callers, ordered
/// by commit, are `1, 2, 3, ...`. Two callers never receive the same value. A
/// transaction that fails after incrementing (lock lost, commit failed,
/// process killed) is rolled back by the store, which may leave a gap when
/// the next caller commits, but never a duplicate.
///
/// # Not idempotent
///
/// Every successful call consumes a number. Calling `allocate` twice for the
/// "same" record yields two different values. Callers that need request-level
/// idempotency (for example, an HTTP retry) must de-duplicate before calling.
///
/// # Blocking
///
/// `allocate` blocks while another transaction holds the counter row, for at
/// most the policy's lock timeout. Do not hold unrelated locks while calling
/// it.
#[derive(Debug, Clone)]
pub struct Allocator<S> {
    store: S,
    policy: AllocatorPolicy,
}

impl<S> Allocator<S>
where
    S: CounterStore,
{
    /// Creates an allocator using [`AllocatorPolicy::default`].
    pub fn new(store: S) -> Self {
        Self {
            store,
            policy: AllocatorPolicy::default(),
        }
    }

    /// Creates an allocator with an explicit policy.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for a zero lock timeout or zero attempts.
    pub fn with_policy(store: S, policy: AllocatorPolicy) -> Result<Self> {
        policy.validate()?;
        Ok(Self { store, policy })
    }

    pub fn policy(&self) -> &AllocatorPolicy {
        &self.policy
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Allocates the next value for `key` within `tenant`.
    ///
    /// # Errors
    ///
    /// - [`Error::Transient`] if the store is unreachable or the row lock was
    ///   not granted within the policy's lock timeout. Nothing was consumed,
    ///   unless the failure hit the commit itself: the store may then have
    ///   applied the increment, leaving a gap in the sequence.
    /// - [`Error::RetriesExhausted`] if creating the counter row lost the race
    ///   on every attempt.
    /// - [`Error::Exhausted`] if the counter cannot be incremented further.
    /// - [`Error::Store`] for any other store failure.
    pub fn allocate(&self, tenant: &TenantId, key: &ScopeKey) -> Result<u64> {
        self.allocate_with_timeout(tenant, key, self.policy.lock_timeout)
    }

    /// Like [`Self::allocate`], with a per-call lock-wait timeout.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip_all, fields(tenant = %tenant, scope_key = %key))
    )]
    pub fn allocate_with_timeout(
        &self,
        tenant: &TenantId,
        key: &ScopeKey,
        lock_timeout: Duration,
    ) -> Result<u64> {
        if lock_timeout.is_zero() {
            return Err(Error::invalid("lock timeout must be greater than zero"));
        }

        let attempts = self.policy.max_attempts;
        for attempt in 1..=attempts {
            match self.try_allocate(tenant, key, lock_timeout)? {
                Attempt::Allocated(value) => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(value, attempt, "allocated");
                    return Ok(value);
                }
                Attempt::Raced => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(attempt, "lost counter creation race, re-reading");
                    if attempt < attempts {
                        self.policy.backoff.wait(attempt);
                    }
                }
            }
        }

        Err(retries_exhausted(tenant, key, attempts))
    }

    /// Opens a store transaction with the policy's lock timeout, for use with
    /// [`Self::allocate_in`].
    pub fn begin(&self) -> Result<S::Transaction<'_>> {
        Ok(self.store.begin(self.policy.lock_timeout)?)
    }

    /// Allocates the next value for `key` inside a transaction the caller
    /// owns, without committing it.
    ///
    /// The increment becomes durable only when the caller commits `tx`,
    /// together with the record that carries the number. Rolling `tx` back
    /// discards both. The row lock is held until then, so keep `tx` short.
    ///
    /// A creation race is settled inside `tx` without aborting it. On any
    /// error the caller must roll `tx` back.
    ///
    /// # Errors
    ///
    /// As for [`Self::allocate`], except that [`Error::RetriesExhausted`]
    /// cannot occur.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip_all, fields(tenant = %tenant, scope_key = %key))
    )]
    pub fn allocate_in(
        &self,
        tx: &mut S::Transaction<'_>,
        tenant: &TenantId,
        key: &ScopeKey,
    ) -> Result<u64> {
        let current = match tx.lock(tenant, key)? {
            Some(current) => current,
            None => {
                let _created = tx.insert_if_absent(tenant, key)?;
                #[cfg(feature = "tracing")]
                tracing::debug!(created = _created, "counter row ensured");
                tx.lock(tenant, key)?.ok_or(StoreError::MissingRow)?
            }
        };

        let next = next_value(current, S::MAX_VALUE, key)?;
        tx.update(tenant, key, next)?;
        Ok(next)
    }

    /// Returns the last committed value without locking.
    ///
    /// Intended for dashboards. The value may already be stale when returned
    /// and must not be used to predict or compute the next number.
    pub fn peek(&self, tenant: &TenantId, key: &ScopeKey) -> Result<Option<u64>> {
        Ok(self.store.peek(tenant, key)?)
    }

    fn try_allocate(
        &self,
        tenant: &TenantId,
        key: &ScopeKey,
        lock_timeout: Duration,
    ) -> Result<Attempt> {
        // Any early return drops `tx`, which rolls it back.
        let mut tx = self.store.begin(lock_timeout)?;

        let current = match tx.lock(tenant, key)? {
            Some(current) => current,
            None => match tx.insert(tenant, key) {
                Ok(()) => tx.lock(tenant, key)?.ok_or(StoreError::MissingRow)?,
                Err(StoreError::UniqueViolation) => {
                    tx.rollback()?;
                    return Ok(Attempt::Raced);
                }
                Err(err) => return Err(err.into()),
            },
        };

        let next = next_value(current, S::MAX_VALUE, key)?;
        tx.update(tenant, key, next)?;
        tx.commit()?;
        Ok(Attempt::Allocated(next))
    }
}
