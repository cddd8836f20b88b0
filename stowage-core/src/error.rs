/// Backend-independent classification of persistence errors.
///
/// Every error type in the stowage crates maps itself onto one of these kinds
/// through [`Classify`], so callers can branch on "what happened" without
/// knowing which cache or database produced the error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// No matching cache entry or row.
    NotFound,
    /// A stored or fetched payload does not deserialize into the requested shape.
    Decode,
    /// A value could not be serialized before storage.
    Encode,
    /// Malformed pagination token.
    InvalidToken,
    /// Pagination token carries an unknown direction.
    InvalidDirection,
    /// Uniqueness, foreign-key or check constraint failure on write.
    ConstraintViolation,
    /// The backend is unreachable or the connection was lost.
    Connection,
    /// The caller's context was cancelled.
    Cancelled,
    /// The caller's deadline passed.
    DeadlineExceeded,
    /// A precondition on the arguments was violated.
    InvalidInput,
    Other,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::NotFound => "not found",
            ErrorKind::Decode => "decode error",
            ErrorKind::Encode => "encode error",
            ErrorKind::InvalidToken => "invalid token",
            ErrorKind::InvalidDirection => "invalid direction",
            ErrorKind::ConstraintViolation => "constraint violation",
            ErrorKind::Connection => "connection error",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::DeadlineExceeded => "deadline exceeded",
            ErrorKind::InvalidInput => "invalid input",
            ErrorKind::Other => "other",
        };
        f.write_str(name)
    }
}

/// Maps an error onto an [`ErrorKind`].
pub trait Classify {
    fn kind(&self) -> ErrorKind;

    /// `true` when the error means "nothing there", whatever backend raised it.
    fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}
