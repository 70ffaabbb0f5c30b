use crate::{
    Allocator, CodeContext, CounterStore, Derivation, Family, NumberingConfig, PeriodSource,
    Result, ScopeKey, SystemPeriodSource, TenantId, derive,
};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
#[cfg(feature = "tracing")]
use tracing::instrument;

/// A committed number together with the code rendered from it.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Allocation {
    pub family: Family,
    pub scope_key: ScopeKey,
    pub value: u64,
    pub formatted: String,
}

impl Allocation {
    pub(crate) fn new(derivation: Derivation, value: u64) -> Self {
        let formatted = derivation.render(value);
        Self {
            family: derivation.family,
            scope_key: derivation.scope_key,
            value,
            formatted,
        }
    }
}

/// Issues finished codes: derives the scope key, allocates, then formats.
///
/// Every call to [`Numbering::issue`] consumes a number, even if the caller
/// later fails to persist the record it was meant for. Allocate only once the
/// record is otherwise ready to be written.
#[derive(Debug, Clone)]
pub struct Numbering<S, P = SystemPeriodSource> {
    allocator: Allocator<S>,
    period: P,
    config: NumberingConfig,
}

impl<S, P> Numbering<S, P>
where
    S: CounterStore,
    P: PeriodSource,
{
    pub fn new(allocator: Allocator<S>, period: P, config: NumberingConfig) -> Self {
        Self {
            allocator,
            period,
            config,
        }
    }

    pub fn allocator(&self) -> &Allocator<S> {
        &self.allocator
    }

    pub fn config(&self) -> &NumberingConfig {
        &self.config
    }

    /// The scope key and tokens `context` maps to today.
    pub fn derivation(&self, context: &CodeContext) -> Result<Derivation> {
        derive(context, &self.config, self.period.today())
    }

    /// Allocates the next number for `context` and renders its code.
    ///
    /// # Errors
    ///
    /// Any error of [`derive`] or [`Allocator::allocate`]. On error nothing
    /// was consumed, except that a transient failure after the store applied
    /// the increment can leave a gap.
    pub fn issue(&self, tenant: &TenantId, context: &CodeContext) -> Result<Allocation> {
        self.issue_with_config(tenant, context, &self.config)
    }

    /// Like [`Self::issue`], with settings for one school or organization that
    /// differ from the defaults this instance was built with.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip_all, fields(tenant = %tenant, family = %context.family()))
    )]
    pub fn issue_with_config(
        &self,
        tenant: &TenantId,
        context: &CodeContext,
        config: &NumberingConfig,
    ) -> Result<Allocation> {
        let derivation = derive(context, config, self.period.today())?;
        let value = self.allocator.allocate(tenant, &derivation.scope_key)?;
        let allocation = Allocation::new(derivation, value);
        #[cfg(feature = "tracing")]
        tracing::debug!(code = %allocation.formatted, "issued");
        Ok(allocation)
    }

    /// Like [`Self::issue`], but allocates inside `tx` and leaves committing
    /// it to the caller, who writes the code onto its record in the same
    /// transaction. Open `tx` with [`Allocator::begin`].
    ///
    /// See [`Allocator::allocate_in`] for the locking and error contract.
    pub fn issue_in(
        &self,
        tx: &mut S::Transaction<'_>,
        tenant: &TenantId,
        context: &CodeContext,
    ) -> Result<Allocation> {
        let derivation = self.derivation(context)?;
        let value = self
            .allocator
            .allocate_in(tx, tenant, &derivation.scope_key)?;
        Ok(Allocation::new(derivation, value))
    }

    /// The code the next successful `issue` would most likely return.
    ///
    /// Advisory only. Another caller may take that number first.
    pub fn preview(&self, tenant: &TenantId, context: &CodeContext) -> Result<String> {
        let derivation = self.derivation(context)?;
        let last = self.allocator.peek(tenant, &derivation.scope_key)?;
        Ok(derivation.render(last.unwrap_or(0).saturating_add(1)))
    }

    /// The last number committed for `context`, read without locking.
    pub fn last_issued(&self, tenant: &TenantId, context: &CodeContext) -> Result<Option<u64>> {
        let derivation = self.derivation(context)?;
        self.allocator.peek(tenant, &derivation.scope_key)
    }
}
