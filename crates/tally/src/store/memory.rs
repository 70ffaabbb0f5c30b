use crate::{CounterStore, CounterTransaction, ScopeKey, StoreError, TenantId};
use core::time::Duration;
use parking_lot::{Condvar, Mutex};
use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Instant,
};

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct RowId {
    tenant: TenantId,
    key: ScopeKey,
}

impl RowId {
    fn new(tenant: &TenantId, key: &ScopeKey) -> Self {
        Self {
            tenant: tenant.clone(),
            key: key.clone(),
        }
    }
}

#[derive(Debug)]
struct Row {
    value: u64,
    /// `false` while the inserting transaction is still open. Such rows are
    /// invisible to other transactions' reads but block their inserts.
    committed: bool,
    holder: Option<u64>,
}

#[derive(Default)]
struct Shared {
    rows: Mutex<HashMap<RowId, Row>>,
    released: Condvar,
    next_tx: AtomicU64,
}

/// An in-process [`CounterStore`] with real row locks.
///
/// Each row lock is held from [`CounterTransaction::lock`] (or
/// [`CounterTransaction::insert`]) until the transaction commits, rolls back or
/// is dropped. Waiters block on a condition variable until the holder releases
/// or the transaction's lock timeout elapses. Writes stay private to the
/// transaction until commit, so an abandoned transaction leaves every counter
/// at its previous value.
///
/// Cloning is cheap and yields a handle to the same table.
///
/// ## Recommended When
/// - Tests and benchmarks that need the exact locking behavior of a
///   relational store
/// - Single-process deployments where counters need not outlive the process
#[derive(Clone, Default)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of committed counter rows.
    pub fn len(&self) -> usize {
        self.shared
            .rows
            .lock()
            .values()
            .filter(|row| row.committed)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[cfg(test)]
    pub(crate) fn seed(&self, tenant: &TenantId, key: &ScopeKey, value: u64) {
        self.shared.rows.lock().insert(
            RowId::new(tenant, key),
            Row {
                value,
                committed: true,
                holder: None,
            },
        );
    }

    fn transaction(&self, lock_timeout: Duration) -> MemoryTransaction<'_> {
        MemoryTransaction {
            shared: &self.shared,
            id: self.shared.next_tx.fetch_add(1, Ordering::Relaxed),
            lock_timeout,
            held: Vec::new(),
            inserted: Vec::new(),
            writes: HashMap::new(),
            finished: false,
        }
    }

    fn peek_row(&self, tenant: &TenantId, key: &ScopeKey) -> Option<u64> {
        self.shared
            .rows
            .lock()
            .get(&RowId::new(tenant, key))
            .filter(|row| row.committed)
            .map(|row| row.value)
    }
}

impl core::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("rows", &self.len())
            .finish()
    }
}

impl CounterStore for MemoryStore {
    type Transaction<'a> = MemoryTransaction<'a>;

    fn begin(&self, lock_timeout: Duration) -> Result<Self::Transaction<'_>, StoreError> {
        Ok(self.transaction(lock_timeout))
    }

    fn peek(&self, tenant: &TenantId, key: &ScopeKey) -> Result<Option<u64>, StoreError> {
        Ok(self.peek_row(tenant, key))
    }
}

/// Outcome of one non-blocking step against the row table.
enum Step<T> {
    Done(T),
    Busy,
}

/// An open transaction on a [`MemoryStore`].
pub struct MemoryTransaction<'a> {
    shared: &'a Shared,
    id: u64,
    lock_timeout: Duration,
    held: Vec<RowId>,
    inserted: Vec<RowId>,
    writes: HashMap<RowId, u64>,
    finished: bool,
}

impl MemoryTransaction<'_> {
    fn try_lock(&mut self, rows: &mut HashMap<RowId, Row>, id: &RowId) -> Step<Option<u64>> {
        let Some(row) = rows.get_mut(id) else {
            return Step::Done(None);
        };
        match row.holder {
            Some(holder) if holder == self.id => {
                Step::Done(Some(self.writes.get(id).copied().unwrap_or(row.value)))
            }
            Some(_) if !row.committed => Step::Done(None),
            Some(_) => Step::Busy,
            None => {
                row.holder = Some(self.id);
                self.held.push(id.clone());
                Step::Done(Some(row.value))
            }
        }
    }

    fn try_insert(
        &mut self,
        rows: &mut HashMap<RowId, Row>,
        id: &RowId,
    ) -> Step<Result<(), StoreError>> {
        match rows.get(id) {
            None => {
                rows.insert(
                    id.clone(),
                    Row {
                        value: 0,
                        committed: false,
                        holder: Some(self.id),
                    },
                );
                self.held.push(id.clone());
                self.inserted.push(id.clone());
                Step::Done(Ok(()))
            }
            Some(row) if row.committed || row.holder == Some(self.id) => {
                Step::Done(Err(StoreError::UniqueViolation))
            }
            Some(_) => Step::Busy,
        }
    }

    fn write(&mut self, id: RowId, value: u64) -> Result<(), StoreError> {
        match self.shared.rows.lock().get(&id) {
            Some(row) if row.holder == Some(self.id) => {}
            Some(_) => {
                return Err(StoreError::Backend {
                    context: "update of a counter row not locked by this transaction".into(),
                });
            }
            None => return Err(StoreError::MissingRow),
        }
        self.writes.insert(id, value);
        Ok(())
    }

    /// Runs `step` until it completes, parking on the condition variable while
    /// another transaction holds the row.
    fn blocking<T>(
        &mut self,
        id: &RowId,
        mut step: impl FnMut(&mut Self, &mut HashMap<RowId, Row>, &RowId) -> Step<T>,
    ) -> Result<T, StoreError> {
        let shared = self.shared;
        let deadline = Instant::now().checked_add(self.lock_timeout);
        let mut rows = shared.rows.lock();
        loop {
            if let Step::Done(out) = step(self, &mut *rows, id) {
                return Ok(out);
            }
            match deadline {
                Some(deadline) => {
                    if shared.released.wait_until(&mut rows, deadline).timed_out() {
                        if let Step::Done(out) = step(self, &mut *rows, id) {
                            return Ok(out);
                        }
                        return Err(StoreError::LockTimeout {
                            waited: self.lock_timeout,
                        });
                    }
                }
                None => shared.released.wait(&mut rows),
            }
        }
    }

    fn release(&mut self, commit: bool) {
        if self.finished {
            return;
        }
        self.finished = true;

        let shared = self.shared;
        let mut rows = shared.rows.lock();
        for id in self.held.drain(..) {
            if !commit && self.inserted.contains(&id) {
                rows.remove(&id);
                continue;
            }
            if let Some(row) = rows.get_mut(&id) {
                if commit {
                    if let Some(value) = self.writes.get(&id) {
                        row.value = *value;
                    }
                    row.committed = true;
                }
                row.holder = None;
            }
        }
        drop(rows);
        shared.released.notify_all();
    }
}

impl CounterTransaction for MemoryTransaction<'_> {
    fn lock(&mut self, tenant: &TenantId, key: &ScopeKey) -> Result<Option<u64>, StoreError> {
        self.blocking(&RowId::new(tenant, key), Self::try_lock)
    }

    fn insert(&mut self, tenant: &TenantId, key: &ScopeKey) -> Result<(), StoreError> {
        self.blocking(&RowId::new(tenant, key), Self::try_insert)?
    }

    fn update(&mut self, tenant: &TenantId, key: &ScopeKey, value: u64) -> Result<(), StoreError> {
        self.write(RowId::new(tenant, key), value)
    }

    fn commit(mut self) -> Result<(), StoreError> {
        self.release(true);
        Ok(())
    }

    fn rollback(mut self) -> Result<(), StoreError> {
        self.release(false);
        Ok(())
    }
}

impl Drop for MemoryTransaction<'_> {
    fn drop(&mut self) {
        self.release(false);
    }
}

#[cfg(feature = "async-tokio")]
mod nonblocking {
    use super::*;
    use crate::{AsyncCounterStore, AsyncCounterTransaction};

    /// How long an async waiter sleeps before looking at a busy row again.
    const POLL_INTERVAL: Duration = Duration::from_millis(1);

    impl MemoryTransaction<'_> {
        /// Like `blocking`, but yields to the runtime between attempts so the
        /// holder can make progress on the same worker thread.
        async fn polling<T>(
            &mut self,
            id: &RowId,
            mut step: impl FnMut(&mut Self, &mut HashMap<RowId, Row>, &RowId) -> Step<T>,
        ) -> Result<T, StoreError> {
            let deadline = Instant::now().checked_add(self.lock_timeout);
            loop {
                let shared = self.shared;
                let outcome = {
                    let mut rows = shared.rows.lock();
                    step(self, &mut *rows, id)
                };
                if let Step::Done(out) = outcome {
                    return Ok(out);
                }
                if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                    return Err(StoreError::LockTimeout {
                        waited: self.lock_timeout,
                    });
                }
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        }
    }

    impl AsyncCounterStore for MemoryStore {
        type Transaction<'a> = MemoryTransaction<'a>;

        async fn begin(&self, lock_timeout: Duration) -> Result<Self::Transaction<'_>, StoreError> {
            Ok(self.transaction(lock_timeout))
        }

        async fn peek(&self, tenant: &TenantId, key: &ScopeKey) -> Result<Option<u64>, StoreError> {
            Ok(self.peek_row(tenant, key))
        }
    }

    impl AsyncCounterTransaction for MemoryTransaction<'_> {
        async fn lock(
            &mut self,
            tenant: &TenantId,
            key: &ScopeKey,
        ) -> Result<Option<u64>, StoreError> {
            self.polling(&RowId::new(tenant, key), Self::try_lock).await
        }

        async fn insert(&mut self, tenant: &TenantId, key: &ScopeKey) -> Result<(), StoreError> {
            self.polling(&RowId::new(tenant, key), Self::try_insert)
                .await?
        }

        async fn update(
            &mut self,
            tenant: &TenantId,
            key: &ScopeKey,
            value: u64,
        ) -> Result<(), StoreError> {
            self.write(RowId::new(tenant, key), value)
        }

        async fn commit(mut self) -> Result<(), StoreError> {
            self.release(true);
            Ok(())
        }

        async fn rollback(mut self) -> Result<(), StoreError> {
            self.release(false);
            Ok(())
        }
    }
}
