use stowage_core::{Classify, ErrorKind, Interrupted};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors returned by [`Cache`](crate::Cache) implementations.
#[derive(Debug)]
pub enum CacheError {
    /// No live entry under the key.
    NotFound(String),
    /// The value could not be serialized.
    Encode(BoxError),
    /// The stored payload does not deserialize into the requested type.
    Decode(BoxError),
    /// `set` was called with a zero TTL.
    InvalidTtl(String),
    /// The backend failed or could not be reached.
    Backend(BoxError),
    /// The cache was closed.
    Closed,
    Interrupted(Interrupted),
}

impl CacheError {
    pub fn encode(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        CacheError::Encode(Box::new(err))
    }

    pub fn decode(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        CacheError::Decode(Box::new(err))
    }

    /// Wrap a backend driver error.
    pub fn backend(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        CacheError::Backend(Box::new(err))
    }
}

impl std::fmt::Display for CacheError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheError::NotFound(key) => write!(f, "cache entry not found: {key}"),
            CacheError::Encode(err) => write!(f, "cache encode error: {err}"),
            CacheError::Decode(err) => write!(f, "cache decode error: {err}"),
            CacheError::InvalidTtl(key) => write!(f, "cache ttl must be positive (key {key})"),
            CacheError::Backend(err) => write!(f, "cache backend error: {err}"),
            CacheError::Closed => write!(f, "cache is closed"),
            CacheError::Interrupted(reason) => write!(f, "cache operation interrupted: {reason}"),
        }
    }
}

impl std::error::Error for CacheError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CacheError::Encode(err) | CacheError::Decode(err) | CacheError::Backend(err) => {
                Some(err.as_ref())
            }
            CacheError::Interrupted(reason) => Some(reason),
            _ => None,
        }
    }
}

impl From<Interrupted> for CacheError {
    fn from(reason: Interrupted) -> Self {
        CacheError::Interrupted(reason)
    }
}

impl Classify for CacheError {
    fn kind(&self) -> ErrorKind {
        match self {
            CacheError::NotFound(_) => ErrorKind::NotFound,
            CacheError::Encode(_) => ErrorKind::Encode,
            CacheError::Decode(_) => ErrorKind::Decode,
            CacheError::InvalidTtl(_) => ErrorKind::InvalidInput,
            CacheError::Backend(_) | CacheError::Closed => ErrorKind::Connection,
            CacheError::Interrupted(reason) => reason.kind(),
        }
    }
}
