use crate::{
    AllocatorPolicy, AsyncCounterStore, AsyncCounterTransaction, Error, Result, ScopeKey,
    SleepProvider, StoreError, TenantId,
    allocator::{Attempt, next_value, retries_exhausted},
};
use core::time::Duration;
#[cfg(feature = "tracing")]
use tracing::instrument;

/// Async counterpart of [`Allocator`](crate::Allocator), with identical
/// semantics.
///
/// The [`SleepProvider`] chosen per call decides how the task waits between
/// creation-race retries, as in
/// `allocator.allocate::<TokioSleep>(&tenant, &key).await`.
///
/// Not idempotent: every successful call consumes a number.
#[derive(Debug, Clone)]
pub struct AsyncAllocator<S> {
    store: S,
    policy: AllocatorPolicy,
}

impl<S> AsyncAllocator<S>
where
    S: AsyncCounterStore,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            policy: AllocatorPolicy::default(),
        }
    }

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
    /// See [`Allocator::allocate`](crate::Allocator::allocate) for the error
    /// contract.
    pub async fn allocate<Z>(&self, tenant: &TenantId, key: &ScopeKey) -> Result<u64>
    where
        Z: SleepProvider,
    {
        self.allocate_with_timeout::<Z>(tenant, key, self.policy.lock_timeout)
            .await
    }

    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip_all, fields(tenant = %tenant, scope_key = %key))
    )]
    pub async fn allocate_with_timeout<Z>(
        &self,
        tenant: &TenantId,
        key: &ScopeKey,
        lock_timeout: Duration,
    ) -> Result<u64>
    where
        Z: SleepProvider,
    {
        if lock_timeout.is_zero() {
            return Err(Error::invalid("lock timeout must be greater than zero"));
        }

        let attempts = self.policy.max_attempts;
        for attempt in 1..=attempts {
            match self.try_allocate(tenant, key, lock_timeout).await? {
                Attempt::Allocated(value) => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(value, attempt, "allocated");
                    return Ok(value);
                }
                Attempt::Raced => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(attempt, "lost counter creation race, re-reading");
                    if attempt < attempts {
                        let delay = self.policy.backoff.delay(attempt).unwrap_or_default();
                        Z::sleep_for(delay).await;
                    }
                }
            }
        }

        Err(retries_exhausted(tenant, key, attempts))
    }

    /// Opens a store transaction with the policy's lock timeout, for use with
    /// [`Self::allocate_in`].
    pub async fn begin(&self) -> Result<S::Transaction<'_>> {
        Ok(self.store.begin(self.policy.lock_timeout).await?)
    }

    /// Allocates the next value for `key` inside a transaction the caller
    /// owns, without committing it.
    ///
    /// See [`Allocator::allocate_in`](crate::Allocator::allocate_in).
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip_all, fields(tenant = %tenant, scope_key = %key))
    )]
    pub async fn allocate_in(
        &self,
        tx: &mut S::Transaction<'_>,
        tenant: &TenantId,
        key: &ScopeKey,
    ) -> Result<u64> {
        let current = match tx.lock(tenant, key).await? {
            Some(current) => current,
            None => {
                let _created = tx.insert_if_absent(tenant, key).await?;
                #[cfg(feature = "tracing")]
                tracing::debug!(created = _created, "counter row ensured");
                tx.lock(tenant, key)
                    .await?
                    .ok_or(StoreError::MissingRow)?
            }
        };

        let next = next_value(current, S::MAX_VALUE, key)?;
        tx.update(tenant, key, next).await?;
        Ok(next)
    }

    /// Returns the last committed value without locking. Possibly stale.
    pub async fn peek(&self, tenant: &TenantId, key: &ScopeKey) -> Result<Option<u64>> {
        Ok(self.store.peek(tenant, key).await?)
    }

    async fn try_allocate(
        &self,
        tenant: &TenantId,
        key: &ScopeKey,
        lock_timeout: Duration,
    ) -> Result<Attempt> {
        let mut tx = self.store.begin(lock_timeout).await?;

        let current = match tx.lock(tenant, key).await? {
            Some(current) => current,
            None => match tx.insert(tenant, key).await {
                Ok(()) => tx
                    .lock(tenant, key)
                    .await?
                    .ok_or(StoreError::MissingRow)?,
                Err(StoreError::UniqueViolation) => {
                    tx.rollback().await?;
                    return Ok(Attempt::Raced);
                }
                Err(err) => return Err(err.into()),
            },
        };

        let next = next_value(current, S::MAX_VALUE, key)?;
        tx.update(tenant, key, next).await?;
        tx.commit().await?;
        Ok(Attempt::Allocated(next))
    }
}

#[cfg(all(test, feature = "async-tokio"))]
mod tests {
    use super::*;
    use crate::{Backoff, MemoryStore, TokioSleep, TokioYield};
    use std::{collections::HashSet, sync::Arc};

    fn tenant() -> TenantId {
        TenantId::new("org-1").unwrap()
    }

    fn key() -> ScopeKey {
        ScopeKey::new("students").unwrap()
    }

    async fn run_concurrent_allocations_are_unique<Z>(callers: u64)
    where
        Z: SleepProvider + 'static,
    {
        let policy = AllocatorPolicy::default()
            .with_lock_timeout(Duration::from_secs(10))
            .with_backoff(Backoff::Sleep(Duration::from_millis(1)));
        let allocator = Arc::new(AsyncAllocator::with_policy(MemoryStore::new(), policy).unwrap());

        let tasks: Vec<_> = (0..callers)
            .map(|_| {
                let allocator = Arc::clone(&allocator);
                tokio::spawn(async move { allocator.allocate::<Z>(&tenant(), &key()).await })
            })
            .collect();

        let mut seen = HashSet::new();
        for task in tasks {
            let value = task.await.unwrap().unwrap();
            assert!(seen.insert(value), "duplicate value {value}");
        }
        assert_eq!(seen, (1..=callers).collect::<HashSet<_>>());
        assert_eq!(
            allocator.peek(&tenant(), &key()).await.unwrap(),
            Some(callers)
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn tokio_sleep_50_concurrent_callers() {
        run_concurrent_allocations_are_unique::<TokioSleep>(50).await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn tokio_yield_200_concurrent_callers() {
        run_concurrent_allocations_are_unique::<TokioYield>(200).await;
    }

    #[tokio::test]
    async fn sequential_allocations_are_contiguous() {
        let allocator = AsyncAllocator::new(MemoryStore::new());
        for expected in 1..=100 {
            let value = allocator
                .allocate::<TokioSleep>(&tenant(), &key())
                .await
                .unwrap();
            assert_eq!(value, expected);
        }
    }

    #[tokio::test]
    async fn lock_timeout_is_transient() {
        let store = MemoryStore::new();
        let allocator = AsyncAllocator::new(store.clone());
        allocator
            .allocate::<TokioSleep>(&tenant(), &key())
            .await
            .unwrap();

        let mut holder = AsyncCounterStore::begin(&store, Duration::from_secs(1))
            .await
            .unwrap();
        AsyncCounterTransaction::lock(&mut holder, &tenant(), &key())
            .await
            .unwrap();

        let err = allocator
            .allocate_with_timeout::<TokioSleep>(&tenant(), &key(), Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert!(matches!(
            err,
            Error::Transient(StoreError::LockTimeout { .. })
        ));

        drop(holder);
        assert_eq!(
            allocator
                .allocate::<TokioSleep>(&tenant(), &key())
                .await
                .unwrap(),
            2
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn caller_transactions_race_to_create_the_counter() {
        let policy = AllocatorPolicy::default().with_lock_timeout(Duration::from_secs(10));
        let allocator = Arc::new(AsyncAllocator::with_policy(MemoryStore::new(), policy).unwrap());

        let tasks: Vec<_> = (0..50)
            .map(|_| {
                let allocator = Arc::clone(&allocator);
                tokio::spawn(async move {
                    let mut tx = allocator.begin().await?;
                    let value = allocator.allocate_in(&mut tx, &tenant(), &key()).await?;
                    tx.commit().await?;
                    Ok::<_, Error>(value)
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for task in tasks {
            assert!(seen.insert(task.await.unwrap().unwrap()));
        }
        assert_eq!(seen, (1..=50).collect::<HashSet<_>>());
    }

    #[tokio::test]
    async fn rolled_back_caller_transaction_consumes_nothing() {
        let allocator = AsyncAllocator::new(MemoryStore::new());
        allocator
            .allocate::<TokioSleep>(&tenant(), &key())
            .await
            .unwrap();

        let mut tx = allocator.begin().await.unwrap();
        assert_eq!(
            allocator
                .allocate_in(&mut tx, &tenant(), &key())
                .await
                .unwrap(),
            2
        );
        tx.rollback().await.unwrap();

        assert_eq!(allocator.peek(&tenant(), &key()).await.unwrap(), Some(1));
        assert_eq!(
            allocator
                .allocate::<TokioSleep>(&tenant(), &key())
                .await
                .unwrap(),
            2
        );
    }

    #[tokio::test]
    async fn zero_timeout_is_rejected() {
        let allocator = AsyncAllocator::new(MemoryStore::new());
        let err = allocator
            .allocate_with_timeout::<TokioSleep>(&tenant(), &key(), Duration::ZERO)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput { .. }));
    }
}
