use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use bytes::Bytes;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use stowage_core::config::{ConfigError, FromConfig, StowageConfig};
use stowage_core::Context;
use tokio_util::sync::CancellationToken;

use crate::codec::{Codec, MsgPackCodec};
use crate::error::CacheError;
use crate::{check_ttl, Cache};

/// Settings for [`MemoryCache`].
#[derive(Debug, Clone)]
pub struct MemoryCacheConfig {
    /// TTL used by [`MemoryCache::set_default`].
    pub default_ttl: Duration,
    /// How often the janitor sweeps expired entries. Zero disables the janitor.
    pub cleanup_interval: Duration,
}

impl Default for MemoryCacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(8),
            cleanup_interval: Duration::from_secs(60),
        }
    }
}

impl FromConfig for MemoryCacheConfig {
    fn prefix() -> &'static str {
        "stowage.cache.memory"
    }

    fn from_config(config: &StowageConfig) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            default_ttl: config.get_or("stowage.cache.memory.default_ttl", defaults.default_ttl)?,
            cleanup_interval: config
                .get_or("stowage.cache.memory.cleanup_interval", defaults.cleanup_interval)?,
        })
    }
}

struct Entry {
    payload: Bytes,
    /// `None` when `now + ttl` overflows `Instant`.
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| now < at)
    }
}

struct Store {
    entries: DashMap<String, Entry>,
    closed: AtomicBool,
    janitor: CancellationToken,
}

impl Store {
    fn evict_expired(&self) -> usize {
        let now = Instant::now();
        let mut evicted = 0;
        self.entries.retain(|_, entry| {
            let live = entry.is_live(now);
            if !live {
                evicted += 1;
            }
            live
        });
        evicted
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        self.janitor.cancel();
    }
}

/// In-process cache backed by `DashMap`.
///
/// Expired entries are invisible immediately and removed lazily on access;
/// when created inside a tokio runtime, a janitor task also sweeps them every
/// `cleanup_interval`. The janitor stops on [`close`](Cache::close) or when
/// the last clone of the cache is dropped.
pub struct MemoryCache<C = MsgPackCodec> {
    store: Arc<Store>,
    default_ttl: Duration,
    codec: C,
}

impl<C: Clone> Clone for MemoryCache<C> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            default_ttl: self.default_ttl,
            codec: self.codec.clone(),
        }
    }
}

impl MemoryCache<MsgPackCodec> {
    pub fn new(config: MemoryCacheConfig) -> Self {
        Self::with_codec(config, MsgPackCodec)
    }
}

impl Default for MemoryCache<MsgPackCodec> {
    fn default() -> Self {
        Self::new(MemoryCacheConfig::default())
    }
}

impl<C: Codec> MemoryCache<C> {
    pub fn with_codec(config: MemoryCacheConfig, codec: C) -> Self {
        let store = Arc::new(Store {
            entries: DashMap::new(),
            closed: AtomicBool::new(false),
            janitor: CancellationToken::new(),
        });
        spawn_janitor(
            Arc::downgrade(&store),
            config.cleanup_interval,
            store.janitor.clone(),
        );
        Self {
            store,
            default_ttl: config.default_ttl,
            codec,
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// [`set`](Cache::set) with the configured default TTL.
    pub async fn set_default<T>(&self, ctx: &Context, key: &str, value: &T) -> Result<(), CacheError>
    where
        T: Serialize + Sync + ?Sized,
    {
        self.set(ctx, key, value, self.default_ttl).await
    }

    /// Number of physically stored entries, expired ones included.
    pub fn entry_count(&self) -> usize {
        self.store.entries.len()
    }

    /// Drop every expired entry now, returning how many were removed.
    pub fn evict_expired(&self) -> usize {
        self.store.evict_expired()
    }

    fn ensure_open(&self) -> Result<(), CacheError> {
        if self.store.closed.load(Ordering::Acquire) {
            return Err(CacheError::Closed);
        }
        Ok(())
    }

    fn live_payload(&self, key: &str) -> Option<Bytes> {
        if let Some(entry) = self.store.entries.get(key) {
            if entry.is_live(Instant::now()) {
                return Some(entry.payload.clone());
            }
            // Expired: drop the read guard before removing
            drop(entry);
            self.store
                .entries
                .remove_if(key, |_, entry| !entry.is_live(Instant::now()));
        }
        None
    }
}

impl<C: Codec> Cache for MemoryCache<C> {
    async fn has(&self, ctx: &Context, key: &str) -> bool {
        if ctx.err().is_some() || self.ensure_open().is_err() {
            return false;
        }
        self.live_payload(key).is_some()
    }

    async fn get<T>(&self, ctx: &Context, key: &str) -> Result<T, CacheError>
    where
        T: DeserializeOwned + Send,
    {
        ctx.check()?;
        self.ensure_open()?;
        let payload = self
            .live_payload(key)
            .ok_or_else(|| CacheError::NotFound(key.to_string()))?;
        self.codec.decode(&payload)
    }

    async fn set<T>(&self, ctx: &Context, key: &str, value: &T, ttl: Duration) -> Result<(), CacheError>
    where
        T: Serialize + Sync + ?Sized,
    {
        ctx.check()?;
        self.ensure_open()?;
        check_ttl(key, ttl)?;
        let payload = self.codec.encode(value)?;
        self.store.entries.insert(
            key.to_string(),
            Entry {
                payload,
                expires_at: Instant::now().checked_add(ttl),
            },
        );
        Ok(())
    }

    async fn del(&self, ctx: &Context, key: &str) -> Result<(), CacheError> {
        ctx.check()?;
        self.ensure_open()?;
        self.store.entries.remove(key);
        Ok(())
    }

    async fn clear(&self, ctx: &Context) -> Result<(), CacheError> {
        ctx.check()?;
        self.ensure_open()?;
        self.store.entries.clear();
        Ok(())
    }

    async fn close(&self) -> Result<(), CacheError> {
        if !self.store.closed.swap(true, Ordering::AcqRel) {
            self.store.janitor.cancel();
            self.store.entries.clear();
            tracing::debug!("memory cache closed");
        }
        Ok(())
    }
}

fn spawn_janitor(store: Weak<Store>, every: Duration, stop: CancellationToken) {
    if every.is_zero() {
        return;
    }
    let Ok(handle) = tokio::runtime::Handle::try_current() else {
        tracing::debug!("no tokio runtime, memory cache relies on lazy eviction");
        return;
    };
    handle.spawn(async move {
        let mut ticker = tokio::time::interval(every);
        // The first tick completes immediately
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = stop.cancelled() => break,
                _ = ticker.tick() => {
                    let Some(store) = store.upgrade() else { break };
                    let evicted = store.evict_expired();
                    if evicted > 0 {
                        tracing::trace!(evicted, "memory cache janitor sweep");
                    }
                }
            }
        }
    });
}
