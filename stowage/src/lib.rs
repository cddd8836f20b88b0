//! stowage: a pluggable persistence toolkit.
//!
//! This facade crate re-exports the stowage sub-crates through a single
//! dependency with feature flags, and adds the backend-independent
//! [`is_not_found`] predicate.
//!
//! ```ignore
//! use stowage::prelude::*;
//! ```
//!
//! # Feature flags
//!
//! | Feature     | Default | Crate                          |
//! |-------------|---------|--------------------------------|
//! | `cache`     | **yes** | `stowage-cache` (in-memory)    |
//! | `redis`     | no      | `stowage-cache/redis`          |
//! | `data`      | no      | `stowage-data` (abstractions)  |
//! | `data-sqlx` | no      | `stowage-data-sqlx`            |
//! | `sqlite`    | **yes** | `stowage-data-sqlx/sqlite`     |
//! | `postgres`  | no      | `stowage-data-sqlx/postgres`   |
//! | `full`      | no      | All of the above               |

pub extern crate stowage_core;

// Re-export everything from stowage-core at the top level for convenience.
pub use stowage_core::*;

#[cfg(feature = "cache")]
pub use stowage_cache;

#[cfg(feature = "data")]
pub use stowage_data;

#[cfg(feature = "data-sqlx")]
pub use stowage_data_sqlx;

/// `true` when `err`, or any error in its source chain, means "nothing there".
///
/// Recognises a cache miss ([`CacheError::NotFound`](stowage_cache::CacheError),
/// including a Redis nil reply), [`DataError::NotFound`](stowage_data::DataError)
/// and `sqlx::Error::RowNotFound`, whichever crate raised it.
pub fn is_not_found(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(err) = current {
        if is_not_found_here(err) {
            return true;
        }
        current = err.source();
    }
    false
}

fn is_not_found_here(err: &(dyn std::error::Error + 'static)) -> bool {
    #[cfg(feature = "cache")]
    {
        if let Some(err) = err.downcast_ref::<stowage_cache::CacheError>() {
            return err.is_not_found();
        }
    }
    #[cfg(feature = "data")]
    {
        if let Some(err) = err.downcast_ref::<stowage_data::DataError>() {
            return err.is_not_found();
        }
        if let Some(err) = err.downcast_ref::<stowage_data::sqlx::Error>() {
            return matches!(err, stowage_data::sqlx::Error::RowNotFound);
        }
    }
    false
}

pub mod prelude {
    //! Re-exports of the most commonly used stowage types.
    pub use crate::is_not_found;
    pub use stowage_core::{init_tracing, Classify, Context, ErrorKind, FromConfig, StowageConfig};

    #[cfg(feature = "cache")]
    pub use stowage_cache::prelude::*;

    #[cfg(feature = "data")]
    pub use stowage_data::prelude::*;

    #[cfg(feature = "data-sqlx")]
    pub use stowage_data_sqlx::{DatabaseConfig, Driver, SqlxRepository, TxHandle};
}
