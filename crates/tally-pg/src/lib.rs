//! PostgreSQL counter store for [`tally`].
//!
//! [`PgCounterStore`] implements [`tally::AsyncCounterStore`] over a `sqlx`
//! connection pool. Plug it into an [`tally::AsyncAllocator`] or
//! [`tally::AsyncNumbering`].
//!
//! The schema is embedded and applied with [`PgCounterStore::migrate`].

mod error;
mod store;

pub use error::*;
pub use store::*;

pub use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
