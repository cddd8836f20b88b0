use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use bytes::Bytes;
use dashmap::DashMap;
use rand::seq::SliceRandom;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use serde::de::DeserializeOwned;
use serde::Serialize;
use stowage_core::config::{ConfigError, FromConfig, StowageConfig};
use stowage_core::Context;
use tokio::sync::RwLock;
use url::Url;

use crate::codec::{Codec, MsgPackCodec};
use crate::error::CacheError;
use crate::{check_ttl, Cache};

/// How long a value read from Redis is served from the local near-cache.
const NEAR_CACHE_TTL: Duration = Duration::from_secs(1);

/// Keys scanned per `SCAN` round trip when clearing a namespace.
const SCAN_BATCH: usize = 100;

/// Configuration for [`RedisCache`].
#[derive(Debug, Clone)]
pub struct RedisCacheConfig {
    /// `host:port` pairs or `redis://` URLs. Tried in random order; the first
    /// one that accepts a connection is used.
    pub endpoints: Vec<String>,
    pub password: Option<String>,
    /// Skip the 1-second local near-cache on reads.
    pub disable_client_cache: bool,
    /// Prefix prepended to every key. When set, `clear` only removes keys
    /// under the prefix instead of flushing the database.
    pub namespace: Option<String>,
}

impl Default for RedisCacheConfig {
    fn default() -> Self {
        Self {
            endpoints: vec!["127.0.0.1:6379".to_string()],
            password: None,
            disable_client_cache: false,
            namespace: None,
        }
    }
}

impl FromConfig for RedisCacheConfig {
    fn prefix() -> &'static str {
        "stowage.cache.redis"
    }

    fn from_config(config: &StowageConfig) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            endpoints: config.get_or("stowage.cache.redis.endpoints", defaults.endpoints)?,
            password: config.get_or("stowage.cache.redis.password", None)?,
            disable_client_cache: config.get_or("stowage.cache.redis.disable_client_cache", false)?,
            namespace: config.get_or("stowage.cache.redis.namespace", None)?,
        })
    }
}

/// Short-lived local copies of payloads read from Redis.
///
/// A copy lives for [`NEAR_CACHE_TTL`] or until the key's own expiry,
/// whichever comes first. Only this client's own writes invalidate it;
/// writes from other clients become visible once the local copy expires.
struct NearCache {
    entries: DashMap<String, (Bytes, Instant)>,
    last_sweep: Mutex<Instant>,
}

impl NearCache {
    fn new() -> Self {
        Self {
            entries: DashMap::new(),
            last_sweep: Mutex::new(Instant::now()),
        }
    }

    fn get(&self, key: &str) -> Option<Bytes> {
        if let Some(entry) = self.entries.get(key) {
            let (payload, expires_at) = entry.value();
            if Instant::now() < *expires_at {
                return Some(payload.clone());
            }
            drop(entry);
            self.entries.remove(key);
        }
        None
    }

    /// Keep `payload` locally for `ttl`, then sweep if a sweep is due.
    fn insert(&self, key: String, payload: Bytes, ttl: Duration) {
        self.entries.insert(key, (payload, Instant::now() + ttl));

        let Ok(mut last) = self.last_sweep.try_lock() else {
            return;
        };
        if last.elapsed() >= NEAR_CACHE_TTL {
            *last = Instant::now();
            drop(last);
            self.evict_expired();
        }
    }

    fn evict_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, (_, expires_at)| now < *expires_at);
        before.saturating_sub(self.entries.len())
    }

    fn invalidate(&self, key: &str) {
        self.entries.remove(key);
    }

    fn clear(&self) {
        self.entries.clear();
    }
}

/// Local lifetime for a payload whose key reported `pttl` milliseconds left.
///
/// `-1` is a key without expiry; `-2` (or `0`) means the key is already gone.
fn near_ttl(pttl: i64) -> Option<Duration> {
    match pttl {
        -1 => Some(NEAR_CACHE_TTL),
        ms if ms > 0 => Some(NEAR_CACHE_TTL.min(Duration::from_millis(ms as u64))),
        _ => None,
    }
}

/// Redis-backed cache.
///
/// A nil reply to `GET` is reported as [`CacheError::NotFound`], the same
/// classification the in-memory backend uses for a miss.
#[derive(Clone)]
pub struct RedisCache<C = MsgPackCodec> {
    conn: Arc<RwLock<Option<MultiplexedConnection>>>,
    near: Option<Arc<NearCache>>,
    namespace: Option<String>,
    codec: C,
}

impl RedisCache<MsgPackCodec> {
    pub async fn connect(config: RedisCacheConfig) -> Result<Self, CacheError> {
        Self::connect_with_codec(config, MsgPackCodec).await
    }
}

impl<C: Codec> RedisCache<C> {
    pub async fn connect_with_codec(config: RedisCacheConfig, codec: C) -> Result<Self, CacheError> {
        let mut endpoints = config.endpoints.clone();
        if endpoints.is_empty() {
            return Err(CacheError::Backend("no redis endpoints configured".into()));
        }
        endpoints.shuffle(&mut rand::thread_rng());

        let mut last_err = None;
        for endpoint in &endpoints {
            let url = endpoint_url(endpoint, config.password.as_deref())?;
            match open(&url).await {
                Ok(conn) => {
                    tracing::info!(
                        endpoint = %endpoint,
                        client_cache = !config.disable_client_cache,
                        "connected to redis"
                    );
                    return Ok(Self {
                        conn: Arc::new(RwLock::new(Some(conn))),
                        near: (!config.disable_client_cache).then(|| Arc::new(NearCache::new())),
                        namespace: config.namespace.clone(),
                        codec,
                    });
                }
                Err(err) => {
                    tracing::warn!(endpoint = %endpoint, error = %err, "redis endpoint unreachable");
                    last_err = Some(err);
                }
            }
        }

        Err(match last_err {
            Some(err) => CacheError::backend(err),
            None => CacheError::Backend("no redis endpoint reachable".into()),
        })
    }

    fn key(&self, key: &str) -> String {
        match &self.namespace {
            Some(ns) => format!("{ns}{key}"),
            None => key.to_string(),
        }
    }

    async fn connection(&self) -> Result<MultiplexedConnection, CacheError> {
        self.conn.read().await.clone().ok_or(CacheError::Closed)
    }

    async fn clear_namespace(
        &self,
        ctx: &Context,
        con: &mut MultiplexedConnection,
        namespace: &str,
    ) -> Result<(), CacheError> {
        let pattern = format!("{namespace}*");
        let mut cursor: u64 = 0;
        loop {
            let mut scan = redis::cmd("SCAN");
            scan.arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH);
            let (next_cursor, keys): (u64, Vec<String>) =
                ctx.run(scan.query_async(con)).await?.map_err(CacheError::backend)?;

            if !keys.is_empty() {
                ctx.run(con.del::<_, ()>(&keys))
                    .await?
                    .map_err(CacheError::backend)?;
            }

            cursor = next_cursor;
            if cursor == 0 {
                return Ok(());
            }
        }
    }
}

impl<C: Codec> Cache for RedisCache<C> {
    async fn has(&self, ctx: &Context, key: &str) -> bool {
        let Ok(mut con) = self.connection().await else {
            return false;
        };
        let k = self.key(key);
        match ctx.run(con.exists::<_, bool>(&k)).await {
            Ok(Ok(found)) => found,
            Ok(Err(err)) => {
                tracing::debug!(key = %k, error = %err, "redis EXISTS failed");
                false
            }
            Err(_) => false,
        }
    }

    async fn get<T>(&self, ctx: &Context, key: &str) -> Result<T, CacheError>
    where
        T: DeserializeOwned + Send,
    {
        ctx.check()?;
        let k = self.key(key);
        if let Some(payload) = self.near.as_ref().and_then(|near| near.get(&k)) {
            return self.codec.decode(&payload);
        }

        let mut con = self.connection().await?;
        let Some(near) = &self.near else {
            let raw: Option<Vec<u8>> = ctx
                .run(con.get(&k))
                .await?
                .map_err(CacheError::backend)?;
            let payload = raw.ok_or_else(|| CacheError::NotFound(key.to_string()))?;
            return self.codec.decode(&payload);
        };

        let mut pipe = redis::pipe();
        pipe.cmd("GET").arg(&k).cmd("PTTL").arg(&k);
        let (raw, pttl): (Option<Vec<u8>>, i64) = ctx
            .run(pipe.query_async(&mut con))
            .await?
            .map_err(CacheError::backend)?;
        let payload = Bytes::from(raw.ok_or_else(|| CacheError::NotFound(key.to_string()))?);

        if let Some(ttl) = near_ttl(pttl) {
            near.insert(k, payload.clone(), ttl);
        }
        self.codec.decode(&payload)
    }

    async fn set<T>(&self, ctx: &Context, key: &str, value: &T, ttl: Duration) -> Result<(), CacheError>
    where
        T: Serialize + Sync + ?Sized,
    {
        ctx.check()?;
        check_ttl(key, ttl)?;
        let payload = self.codec.encode(value)?;
        let k = self.key(key);
        let millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);

        let mut con = self.connection().await?;
        let mut cmd = redis::cmd("SET");
        cmd.arg(&k).arg(payload.as_ref()).arg("PX").arg(millis);
        let () = ctx
            .run(cmd.query_async(&mut con))
            .await?
            .map_err(CacheError::backend)?;

        if let Some(near) = &self.near {
            near.invalidate(&k);
        }
        Ok(())
    }

    async fn del(&self, ctx: &Context, key: &str) -> Result<(), CacheError> {
        ctx.check()?;
        let k = self.key(key);
        let mut con = self.connection().await?;
        ctx.run(con.del::<_, ()>(&k))
            .await?
            .map_err(CacheError::backend)?;
        if let Some(near) = &self.near {
            near.invalidate(&k);
        }
        Ok(())
    }

    async fn clear(&self, ctx: &Context) -> Result<(), CacheError> {
        ctx.check()?;
        let mut con = self.connection().await?;
        match &self.namespace {
            Some(ns) => self.clear_namespace(ctx, &mut con, ns).await?,
            None => {
                let flush = redis::cmd("FLUSHDB");
                let () = ctx
                    .run(flush.query_async(&mut con))
                    .await?
                    .map_err(CacheError::backend)?;
            }
        }
        if let Some(near) = &self.near {
            near.clear();
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), CacheError> {
        if self.conn.write().await.take().is_some() {
            tracing::debug!("redis cache closed");
        }
        if let Some(near) = &self.near {
            near.clear();
        }
        Ok(())
    }
}

async fn open(url: &str) -> redis::RedisResult<MultiplexedConnection> {
    let client = redis::Client::open(url)?;
    client.get_multiplexed_async_connection().await
}

/// Normalise an endpoint into a `redis://` URL carrying the password.
fn endpoint_url(endpoint: &str, password: Option<&str>) -> Result<String, CacheError> {
    let raw = if endpoint.contains("://") {
        endpoint.to_string()
    } else {
        format!("redis://{endpoint}")
    };
    let mut url = Url::parse(&raw).map_err(CacheError::backend)?;
    if let Some(password) = password.filter(|p| !p.is_empty()) {
        if url.password().is_none() && url.set_password(Some(password)).is_err() {
            return Err(CacheError::Backend(
                format!("cannot attach a password to endpoint {endpoint}").into(),
            ));
        }
    }
    Ok(url.to_string())
}
