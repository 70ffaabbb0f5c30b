//! Transactional, tenant-scoped sequence allocation.
//!
//! `tally` hands out strictly increasing numbers per `(tenant, scope key)`
//! pair and renders them into human-facing codes such as `ST-25-000007`,
//! `CS-PHY-25-001` or `IN/2025/00042`.
//!
//! The crate is split into three layers:
//!
//! - [`Allocator`] - the only code that touches a [`CounterStore`]. It locks
//!   (or lazily creates) a counter row, increments it by exactly one and
//!   commits.
//! - [`derive`] - pure key derivation from a [`CodeContext`], a
//!   [`NumberingConfig`] and the current date.
//! - [`CodeFormat`] - pure, total rendering of a value plus its [`Tokens`].
//!
//! [`Numbering`] ties the three together for callers that just want the next
//! code.
//!
//! # Example
//!
//! ```
//! use chrono::NaiveDate;
//! use tally::{
//!     Allocator, CodeContext, FixedPeriod, MemoryStore, Numbering, NumberingConfig, TenantId,
//! };
//!
//! let today = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
//! let numbering = Numbering::new(
//!     Allocator::new(MemoryStore::new()),
//!     FixedPeriod::new(today),
//!     NumberingConfig::default(),
//! );
//!
//! let tenant = TenantId::new("org-1").unwrap();
//! let first = numbering.issue(&tenant, &CodeContext::Student).unwrap();
//! assert_eq!(first.value, 1);
//! assert_eq!(first.formatted, "ST-25-000001");
//! ```

mod allocator;
mod config;
mod error;
mod format;
#[cfg(feature = "futures")]
mod futures;
mod key;
mod numbering;
mod period;
mod scope;
mod store;

pub use crate::allocator::*;
pub use crate::config::*;
pub use crate::error::*;
pub use crate::format::*;
#[cfg_attr(docsrs, doc(cfg(feature = "futures")))]
#[cfg(feature = "futures")]
pub use crate::futures::*;
pub use crate::key::*;
pub use crate::numbering::*;
pub use crate::period::*;
pub use crate::scope::*;
pub use crate::store::*;
