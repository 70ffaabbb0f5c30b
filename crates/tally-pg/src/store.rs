use crate::{SetupError, error::store_error};
use core::time::Duration;
use sqlx::{
    PgConnection, PgPool, Postgres, Transaction,
    migrate::Migrator,
    postgres::{PgConnectOptions, PgPoolOptions},
};
use tally::{AsyncCounterStore, AsyncCounterTransaction, ScopeKey, StoreError, TenantId};
use tracing::instrument;

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Default upper bound on pooled connections.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;

/// Default time to wait for a pooled connection before reporting the store
/// unavailable.
pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Counters stored in the `tally_counters` table.
///
/// Cloning is cheap and shares the pool.
#[derive(Debug, Clone)]
pub struct PgCounterStore {
    pool: PgPool,
}

impl PgCounterStore {
    /// Connects with [`DEFAULT_MAX_CONNECTIONS`] and
    /// [`DEFAULT_ACQUIRE_TIMEOUT`].
    pub async fn connect(url: &str) -> Result<Self, SetupError> {
        let options: PgConnectOptions = url.parse().map_err(SetupError::Connect)?;
        Self::connect_with(default_pool_options(), options).await
    }

    #[instrument(level = "debug", skip_all)]
    pub async fn connect_with(
        pool: PgPoolOptions,
        options: PgConnectOptions,
    ) -> Result<Self, SetupError> {
        let pool = pool
            .connect_with(options)
            .await
            .map_err(SetupError::Connect)?;
        tracing::info!("connected to PostgreSQL");
        Ok(Self { pool })
    }

    /// Wraps an existing pool, e.g. one shared with the rest of an
    /// application.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Creates the counter table if it does not exist yet.
    #[instrument(level = "debug", skip_all)]
    pub async fn migrate(&self) -> Result<(), SetupError> {
        MIGRATOR.run(&self.pool).await?;
        tracing::info!("counter schema is up to date");
        Ok(())
    }
}

/// The pool settings [`PgCounterStore::connect`] uses.
pub fn default_pool_options() -> PgPoolOptions {
    PgPoolOptions::new()
        .max_connections(DEFAULT_MAX_CONNECTIONS)
        .acquire_timeout(DEFAULT_ACQUIRE_TIMEOUT)
}

impl AsyncCounterStore for PgCounterStore {
    type Transaction<'a> = PgCounterTransaction;

    /// `BIGINT` is signed.
    const MAX_VALUE: u64 = i64::MAX as u64;

    async fn begin(&self, lock_timeout: Duration) -> Result<Self::Transaction<'_>, StoreError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|err| store_error(err, lock_timeout))?;
        PgCounterTransaction::from_transaction(tx, lock_timeout).await
    }

    async fn peek(&self, tenant: &TenantId, key: &ScopeKey) -> Result<Option<u64>, StoreError> {
        let value: Option<i64> = sqlx::query_scalar(
            "SELECT value FROM tally_counters WHERE tenant_id = $1 AND scope_key = $2",
        )
        .bind(tenant.as_str())
        .bind(key.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|err| store_error(err, Duration::ZERO))?;

        value.map(to_u64).transpose()
    }
}

/// An open transaction on a [`PgCounterStore`].
///
/// Dropping it without committing returns the connection to the pool, where
/// sqlx rolls the transaction back before reuse.
///
/// To store a code on the record it belongs to atomically, allocate with
/// [`tally::AsyncAllocator::allocate_in`] and write the record through
/// [`PgCounterTransaction::connection`] before committing:
///
/// ```no_run
/// # use tally::{AsyncAllocator, AsyncCounterTransaction, ScopeKey, TenantId};
/// # use tally_pg::PgCounterStore;
/// # async fn enroll(allocator: &AsyncAllocator<PgCounterStore>) -> Result<(), Box<dyn std::error::Error>> {
/// let tenant = TenantId::new("org-1")?;
/// let key = ScopeKey::new("students")?;
///
/// let mut tx = allocator.begin().await?;
/// let number = allocator.allocate_in(&mut tx, &tenant, &key).await?;
/// sqlx::query("INSERT INTO students (tenant_id, number) VALUES ($1, $2)")
///     .bind(tenant.as_str())
///     .bind(i64::try_from(number)?)
///     .execute(tx.connection())
///     .await?;
/// tx.commit().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct PgCounterTransaction {
    tx: Transaction<'static, Postgres>,
    lock_timeout: Duration,
}

impl PgCounterTransaction {
    /// Takes over a transaction the caller already opened and bounds its row
    /// lock waits by `lock_timeout`.
    ///
    /// The transaction must run at `READ COMMITTED`, PostgreSQL's default, so
    /// that a counter row created concurrently becomes visible to it.
    pub async fn from_transaction(
        mut tx: Transaction<'static, Postgres>,
        lock_timeout: Duration,
    ) -> Result<Self, StoreError> {
        // A zero `lock_timeout` disables the limit in PostgreSQL.
        let millis = lock_timeout.as_millis().max(1);
        sqlx::query("SELECT set_config('lock_timeout', $1, true)")
            .bind(format!("{millis}ms"))
            .execute(&mut *tx)
            .await
            .map_err(|err| store_error(err, lock_timeout))?;

        Ok(Self { tx, lock_timeout })
    }

    /// The connection the transaction runs on, for the caller's own
    /// statements.
    pub fn connection(&mut self) -> &mut PgConnection {
        &mut self.tx
    }

    /// Gives the underlying sqlx transaction back to the caller.
    pub fn into_inner(self) -> Transaction<'static, Postgres> {
        self.tx
    }

    fn error(&self, err: sqlx::Error) -> StoreError {
        store_error(err, self.lock_timeout)
    }
}

impl AsyncCounterTransaction for PgCounterTransaction {
    async fn lock(&mut self, tenant: &TenantId, key: &ScopeKey) -> Result<Option<u64>, StoreError> {
        let value: Option<i64> = sqlx::query_scalar(
            "SELECT value FROM tally_counters \
             WHERE tenant_id = $1 AND scope_key = $2 \
             FOR UPDATE",
        )
        .bind(tenant.as_str())
        .bind(key.as_str())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|err| self.error(err))?;

        value.map(to_u64).transpose()
    }

    async fn insert(&mut self, tenant: &TenantId, key: &ScopeKey) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO tally_counters (tenant_id, scope_key) VALUES ($1, $2)")
            .bind(tenant.as_str())
            .bind(key.as_str())
            .execute(&mut *self.tx)
            .await
            .map_err(|err| self.error(err))?;
        Ok(())
    }

    /// Uses `ON CONFLICT DO NOTHING`: a unique violation would abort the
    /// caller's whole transaction.
    async fn insert_if_absent(
        &mut self,
        tenant: &TenantId,
        key: &ScopeKey,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "INSERT INTO tally_counters (tenant_id, scope_key) VALUES ($1, $2) \
             ON CONFLICT (tenant_id, scope_key) DO NOTHING",
        )
        .bind(tenant.as_str())
        .bind(key.as_str())
        .execute(&mut *self.tx)
        .await
        .map_err(|err| self.error(err))?;

        Ok(result.rows_affected() == 1)
    }

    async fn update(
        &mut self,
        tenant: &TenantId,
        key: &ScopeKey,
        value: u64,
    ) -> Result<(), StoreError> {
        let value = i64::try_from(value).map_err(|_| StoreError::Backend {
            context: format!("counter value {value} does not fit in BIGINT"),
        })?;
        let result = sqlx::query(
            "UPDATE tally_counters SET value = $3, updated_at = now() \
             WHERE tenant_id = $1 AND scope_key = $2",
        )
        .bind(tenant.as_str())
        .bind(key.as_str())
        .bind(value)
        .execute(&mut *self.tx)
        .await
        .map_err(|err| self.error(err))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::MissingRow);
        }
        Ok(())
    }

    async fn commit(self) -> Result<(), StoreError> {
        let lock_timeout = self.lock_timeout;
        self.tx
            .commit()
            .await
            .map_err(|err| store_error(err, lock_timeout))
    }

    async fn rollback(self) -> Result<(), StoreError> {
        let lock_timeout = self.lock_timeout;
        self.tx
            .rollback()
            .await
            .map_err(|err| store_error(err, lock_timeout))
    }
}

fn to_u64(value: i64) -> Result<u64, StoreError> {
    u64::try_from(value).map_err(|_| StoreError::Backend {
        context: format!("negative counter value {value}"),
    })
}
