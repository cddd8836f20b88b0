//! # stowage-data-sqlx: SQLx backend for the stowage data layer
//!
//! Implements [`stowage_data::Repository`] on top of an `sqlx` Any pool, so a
//! single repository type serves every enabled driver. Statements are built
//! by [`stowage_data::QueryBuilder`] and friends with the dialect of the
//! configured driver.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`SqlxRepository`] | Repository bound to the pool or to one transaction |
//! | [`TxHandle`] | Shared handle to an open transaction |
//! | [`DatabaseConfig`] / [`Driver`] | Connection settings (`stowage.database.*`) |
//! | [`SqlxErrorExt`] | Extension trait to convert `sqlx::Error` into `DataError` (`.into_data_error()`) |
//!
//! # Feature flags
//!
//! | Feature    | Driver |
//! |------------|--------|
//! | `sqlite` (default) | SQLite via `sqlx/sqlite` |
//! | `postgres` | PostgreSQL via `sqlx/postgres` |
//!
//! # Transactions
//!
//! ```ignore
//! repo.transactional(&ctx, |ctx, tx_repo| async move {
//!     tx_repo.create(&ctx, &[order], false).await?;
//!     tx_repo.update(&ctx, &stock).await?;
//!     Ok::<_, DataError>(())
//! })
//! .await?;
//! ```
//!
//! Inside the callback, use the repository it receives. The outer repository
//! is not part of the transaction, and with a single-connection pool it
//! would wait forever for the connection the transaction holds.

pub mod connection;
pub mod error;
pub mod repository;
pub mod tx;

pub use connection::{connect, DatabaseConfig, Driver};
pub use error::{SqlxErrorExt, SqlxResult};
pub use repository::SqlxRepository;
pub use tx::TxHandle;

/// Re-exports of the most commonly used types from both `stowage-data` and this crate.
pub mod prelude {
    pub use crate::{DatabaseConfig, Driver, SqlxErrorExt, SqlxRepository, TxHandle};
    pub use stowage_data::prelude::*;
}
