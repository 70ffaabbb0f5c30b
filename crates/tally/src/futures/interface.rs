use crate::{ScopeKey, StoreError, TenantId};
use core::{future::Future, time::Duration};

/// Async counterpart of [`CounterStore`](crate::CounterStore).
///
/// Same contract: the store enforces `(tenant, scope key)` uniqueness and its
/// row locks are held until the owning transaction ends.
pub trait AsyncCounterStore: Sync {
    type Transaction<'a>: AsyncCounterTransaction
    where
        Self: 'a;

    /// Largest value a counter row can hold.
    const MAX_VALUE: u64 = u64::MAX;

    fn begin(
        &self,
        lock_timeout: Duration,
    ) -> impl Future<Output = Result<Self::Transaction<'_>, StoreError>> + Send;

    /// Reads the last committed value without taking a lock.
    fn peek(
        &self,
        tenant: &TenantId,
        key: &ScopeKey,
    ) -> impl Future<Output = Result<Option<u64>, StoreError>> + Send;
}

/// Async counterpart of [`CounterTransaction`](crate::CounterTransaction).
///
/// Dropping a transaction without committing rolls it back. Implementations
/// that cannot roll back synchronously must make sure the backend discards
/// the transaction once the handle is gone.
pub trait AsyncCounterTransaction: Send {
    fn lock(
        &mut self,
        tenant: &TenantId,
        key: &ScopeKey,
    ) -> impl Future<Output = Result<Option<u64>, StoreError>> + Send;

    fn insert(
        &mut self,
        tenant: &TenantId,
        key: &ScopeKey,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// See [`CounterTransaction::insert_if_absent`](crate::CounterTransaction::insert_if_absent).
    fn insert_if_absent(
        &mut self,
        tenant: &TenantId,
        key: &ScopeKey,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send {
        async move {
            match self.insert(tenant, key).await {
                Ok(()) => Ok(true),
                Err(StoreError::UniqueViolation) => Ok(false),
                Err(err) => Err(err),
            }
        }
    }

    fn update(
        &mut self,
        tenant: &TenantId,
        key: &ScopeKey,
        value: u64,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn commit(self) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn rollback(self) -> impl Future<Output = Result<(), StoreError>> + Send;
}
