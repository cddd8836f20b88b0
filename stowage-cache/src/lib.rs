//! Cache port with swappable backends.
//!
//! | Backend | Type | Notes |
//! |---------|------|-------|
//! | In-process | [`MemoryCache`] | `DashMap` with lazy eviction plus a background janitor |
//! | Redis | [`RedisCache`] | feature `redis`; optional 1-second client-side near-cache |
//!
//! Both backends report a miss as [`CacheError::NotFound`], whatever their
//! native absence signal is, and take their [`Codec`] at construction
//! ([`MsgPackCodec`] unless another is given).
//!
//! ```ignore
//! let cache = MemoryCache::new(MemoryCacheConfig::default());
//! cache.set(&ctx, "user:42", &user, Duration::from_secs(30)).await?;
//! let user: User = cache.get(&ctx, "user:42").await?;
//! ```

pub mod codec;
pub mod error;
pub mod memory;
#[cfg(feature = "redis")]
pub mod redis_backend;

use std::future::Future;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use stowage_core::Context;

pub use codec::{Codec, JsonCodec, MsgPackCodec};
pub use error::CacheError;
pub use memory::{MemoryCache, MemoryCacheConfig};
#[cfg(feature = "redis")]
pub use redis_backend::{RedisCache, RedisCacheConfig};

/// Capability interface shared by every cache backend.
///
/// Uses RPITIT (return-position `impl Trait` in traits) so methods can stay
/// generic over the cached value type.
pub trait Cache: Send + Sync {
    /// `true` iff an unexpired entry exists. Backend failures read as `false`.
    fn has(&self, ctx: &Context, key: &str) -> impl Future<Output = bool> + Send;

    /// Decode the entry under `key` into `T`.
    ///
    /// Fails with [`CacheError::NotFound`] on a miss and [`CacheError::Decode`]
    /// when the stored payload has a different shape.
    fn get<T>(&self, ctx: &Context, key: &str) -> impl Future<Output = Result<T, CacheError>> + Send
    where
        T: DeserializeOwned + Send;

    /// Store `value` under `key` until `ttl` elapses, replacing any previous entry.
    ///
    /// `ttl` must be positive; zero is rejected with [`CacheError::InvalidTtl`].
    fn set<T>(
        &self,
        ctx: &Context,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> impl Future<Output = Result<(), CacheError>> + Send
    where
        T: Serialize + Sync + ?Sized;

    /// Remove `key`. Removing an absent key succeeds.
    fn del(&self, ctx: &Context, key: &str) -> impl Future<Output = Result<(), CacheError>> + Send;

    /// Remove every entry reachable by this client.
    fn clear(&self, ctx: &Context) -> impl Future<Output = Result<(), CacheError>> + Send;

    /// Release backend resources. Calling it again is a no-op.
    fn close(&self) -> impl Future<Output = Result<(), CacheError>> + Send;
}

pub(crate) fn check_ttl(key: &str, ttl: Duration) -> Result<(), CacheError> {
    if ttl.is_zero() {
        return Err(CacheError::InvalidTtl(key.to_string()));
    }
    Ok(())
}

pub mod prelude {
    //! Re-exports of the most commonly used cache types.
    pub use crate::{Cache, CacheError, Codec, JsonCodec, MemoryCache, MemoryCacheConfig, MsgPackCodec};
    #[cfg(feature = "redis")]
    pub use crate::{RedisCache, RedisCacheConfig};
}
