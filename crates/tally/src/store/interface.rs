use crate::{ScopeKey, StoreError, TenantId};
use core::time::Duration;

/// A durable table of counters keyed by `(tenant, scope key)`.
///
/// Implementations must enforce uniqueness of the key pair themselves (a unique
/// index, not application logic) and must provide blocking row locks that are
/// held until the owning transaction commits or rolls back.
pub trait CounterStore {
    type Transaction<'a>: CounterTransaction
    where
        Self: 'a;

    /// Largest value a counter row can hold.
    const MAX_VALUE: u64 = u64::MAX;

    /// Opens a transaction whose lock waits give up after `lock_timeout`.
    fn begin(&self, lock_timeout: Duration) -> Result<Self::Transaction<'_>, StoreError>;

    /// Reads the last committed value without taking a lock.
    ///
    /// The result may be stale by the time it is observed. It must never be
    /// used to compute the next number.
    fn peek(&self, tenant: &TenantId, key: &ScopeKey) -> Result<Option<u64>, StoreError>;
}

/// One open transaction against a [`CounterStore`].
///
/// Dropping a transaction without calling [`CounterTransaction::commit`] rolls
/// it back and releases every lock it holds.
pub trait CounterTransaction {
    /// Locks the counter row and returns its value, or `None` when no
    /// committed row exists for the key.
    fn lock(&mut self, tenant: &TenantId, key: &ScopeKey) -> Result<Option<u64>, StoreError>;

    /// Creates the counter row at `0` and locks it.
    ///
    /// Returns [`StoreError::UniqueViolation`] when another transaction
    /// already created the row.
    fn insert(&mut self, tenant: &TenantId, key: &ScopeKey) -> Result<(), StoreError>;

    /// Creates the counter row at `0` unless a committed row already exists,
    /// and returns whether this transaction created it.
    ///
    /// Unlike [`CounterTransaction::insert`], losing the race leaves the
    /// transaction usable. The default treats
    /// [`StoreError::UniqueViolation`] as `Ok(false)`; stores where a failed
    /// statement poisons the whole transaction must override it.
    fn insert_if_absent(&mut self, tenant: &TenantId, key: &ScopeKey) -> Result<bool, StoreError> {
        match self.insert(tenant, key) {
            Ok(()) => Ok(true),
            Err(StoreError::UniqueViolation) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Writes `value` to a row this transaction holds the lock on.
    fn update(&mut self, tenant: &TenantId, key: &ScopeKey, value: u64) -> Result<(), StoreError>;

    fn commit(self) -> Result<(), StoreError>;

    fn rollback(self) -> Result<(), StoreError>;
}
