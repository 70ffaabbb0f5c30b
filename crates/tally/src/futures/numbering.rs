use crate::{
    Allocation, AsyncAllocator, AsyncCounterStore, CodeContext, Derivation, NumberingConfig,
    PeriodSource, Result, SleepProvider, SystemPeriodSource, TenantId,
};
use crate::scope::derive;

/// Async counterpart of [`Numbering`](crate::Numbering).
#[derive(Debug, Clone)]
pub struct AsyncNumbering<S, P = SystemPeriodSource> {
    allocator: AsyncAllocator<S>,
    period: P,
    config: NumberingConfig,
}

impl<S, P> AsyncNumbering<S, P>
where
    S: AsyncCounterStore,
    P: PeriodSource + Sync,
{
    pub fn new(allocator: AsyncAllocator<S>, period: P, config: NumberingConfig) -> Self {
        Self {
            allocator,
            period,
            config,
        }
    }

    pub fn allocator(&self) -> &AsyncAllocator<S> {
        &self.allocator
    }

    pub fn config(&self) -> &NumberingConfig {
        &self.config
    }

    pub fn derivation(&self, context: &CodeContext) -> Result<Derivation> {
        derive(context, &self.config, self.period.today())
    }

    pub async fn issue<Z>(&self, tenant: &TenantId, context: &CodeContext) -> Result<Allocation>
    where
        Z: SleepProvider,
    {
        self.issue_with_config::<Z>(tenant, context, &self.config)
            .await
    }

    pub async fn issue_with_config<Z>(
        &self,
        tenant: &TenantId,
        context: &CodeContext,
        config: &NumberingConfig,
    ) -> Result<Allocation>
    where
        Z: SleepProvider,
    {
        let derivation = derive(context, config, self.period.today())?;
        let value = self
            .allocator
            .allocate::<Z>(tenant, &derivation.scope_key)
            .await?;
        Ok(Allocation::new(derivation, value))
    }

    /// Allocates inside `tx` without committing it. See
    /// [`Numbering::issue_in`](crate::Numbering::issue_in).
    pub async fn issue_in(
        &self,
        tx: &mut S::Transaction<'_>,
        tenant: &TenantId,
        context: &CodeContext,
    ) -> Result<Allocation> {
        let derivation = self.derivation(context)?;
        let value = self
            .allocator
            .allocate_in(tx, tenant, &derivation.scope_key)
            .await?;
        Ok(Allocation::new(derivation, value))
    }

    /// Advisory only. Another caller may take the previewed number first.
    pub async fn preview(&self, tenant: &TenantId, context: &CodeContext) -> Result<String> {
        let derivation = self.derivation(context)?;
        let last = self.allocator.peek(tenant, &derivation.scope_key).await?;
        Ok(derivation.render(last.unwrap_or(0).saturating_add(1)))
    }

    pub async fn last_issued(
        &self,
        tenant: &TenantId,
        context: &CodeContext,
    ) -> Result<Option<u64>> {
        let derivation = self.derivation(context)?;
        self.allocator.peek(tenant, &derivation.scope_key).await
    }
}
