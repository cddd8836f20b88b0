use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::CacheError;

/// Serialization used by a cache backend to turn values into stored payloads.
///
/// Each backend takes its codec at construction time, so two caches in the
/// same process can use different formats.
pub trait Codec: Clone + Send + Sync + 'static {
    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Bytes, CacheError>;
    fn decode<T: DeserializeOwned>(&self, payload: &[u8]) -> Result<T, CacheError>;
}

/// Default codec: MessagePack via `rmp-serde`.
///
/// Structs are written as maps keyed by field name, so reordering fields
/// does not invalidate cached payloads.
#[derive(Debug, Clone, Copy, Default)]
pub struct MsgPackCodec;

impl Codec for MsgPackCodec {
    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Bytes, CacheError> {
        rmp_serde::to_vec_named(value)
            .map(Bytes::from)
            .map_err(CacheError::encode)
    }

    fn decode<T: DeserializeOwned>(&self, payload: &[u8]) -> Result<T, CacheError> {
        rmp_serde::from_slice(payload).map_err(CacheError::decode)
    }
}

/// Human-readable payloads, for stores shared with non-Rust readers.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Bytes, CacheError> {
        serde_json::to_vec(value)
            .map(Bytes::from)
            .map_err(CacheError::encode)
    }

    fn decode<T: DeserializeOwned>(&self, payload: &[u8]) -> Result<T, CacheError> {
        serde_json::from_slice(payload).map_err(CacheError::decode)
    }
}
