//! Opaque cursor tokens and page windowing for keyset pagination.
//!
//! A token is the standard-alphabet base64 of `"<direction>:<value>"`, e.g.
//! `encode_token("123456789", Direction::Next)` is `bmV4dDoxMjM0NTY3ODk=`.
//!
//! The usual flow fetches `limit + 1` rows past the incoming token, then
//! hands them to [`build_page`], which trims the extra row and reports
//! whether another page exists.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Serialize;
use stowage_core::{Classify, ErrorKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Next,
    Prev,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Next => "next",
            Direction::Prev => "prev",
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            Direction::Next => Direction::Prev,
            Direction::Prev => Direction::Next,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Direction {
    type Err = CursorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "next" => Ok(Direction::Next),
            "prev" => Ok(Direction::Prev),
            other => Err(CursorError::InvalidDirection(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CursorError {
    /// Not base64, or not exactly `direction<sep>value`.
    InvalidToken(String),
    /// Well-formed token with a direction other than `next`/`prev`.
    InvalidDirection(String),
}

impl std::fmt::Display for CursorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CursorError::InvalidToken(reason) => write!(f, "Invalid cursor token: {reason}"),
            CursorError::InvalidDirection(dir) => {
                write!(f, "Invalid cursor direction '{dir}': expected 'next' or 'prev'")
            }
        }
    }
}

impl std::error::Error for CursorError {}

impl Classify for CursorError {
    fn kind(&self) -> ErrorKind {
        match self {
            CursorError::InvalidToken(_) => ErrorKind::InvalidToken,
            CursorError::InvalidDirection(_) => ErrorKind::InvalidDirection,
        }
    }
}

/// Token encoder with a configurable separator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenCodec {
    pub separator: char,
}

impl Default for TokenCodec {
    fn default() -> Self {
        Self { separator: ':' }
    }
}

impl TokenCodec {
    pub fn new(separator: char) -> Self {
        Self { separator }
    }

    /// Encode `value` for `direction`. An empty value yields an empty token.
    pub fn encode(&self, value: &str, direction: Direction) -> String {
        if value.is_empty() {
            return String::new();
        }
        STANDARD.encode(format!("{}{}{value}", direction.as_str(), self.separator))
    }

    pub fn decode(&self, token: &str) -> Result<(Direction, String), CursorError> {
        let raw = STANDARD
            .decode(token)
            .map_err(|e| CursorError::InvalidToken(e.to_string()))?;
        let payload =
            String::from_utf8(raw).map_err(|e| CursorError::InvalidToken(e.to_string()))?;

        let mut parts = payload.split(self.separator);
        let (Some(direction), Some(value), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(CursorError::InvalidToken(format!(
                "expected 'direction{}value'",
                self.separator
            )));
        };
        Ok((direction.parse()?, value.to_string()))
    }
}

/// [`TokenCodec::encode`] with the default `:` separator.
pub fn encode_token(value: &str, direction: Direction) -> String {
    TokenCodec::default().encode(value, direction)
}

/// [`TokenCodec::decode`] with the default `:` separator.
pub fn decode_token(token: &str) -> Result<(Direction, String), CursorError> {
    TokenCodec::default().decode(token)
}

/// Boundaries of one page of results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Cursor<K> {
    /// Number of entries on this page.
    pub total: usize,
    pub has_prev_page: bool,
    pub has_next_page: bool,
    /// Key of the first entry on the page.
    pub start: K,
    /// Key of the last entry on the page.
    pub end: K,
}

impl<K: ToString> Cursor<K> {
    /// Token for the page after this one, or `None` on the last page.
    pub fn next_token(&self) -> Option<String> {
        self.has_next_page
            .then(|| encode_token(&self.end.to_string(), Direction::Next))
    }

    /// Token for the page before this one, or `None` on the first page.
    pub fn prev_token(&self) -> Option<String> {
        self.has_prev_page
            .then(|| encode_token(&self.start.to_string(), Direction::Prev))
    }
}

/// Window `entries` to `limit` and describe the page.
///
/// `entries` should hold up to `limit + 1` rows; an extra row means a next
/// page exists and is dropped from the returned window. `key` extracts the
/// cursor value from an entry; on an empty page both bounds are `K::default()`.
pub fn build_page<T, K, F>(mut entries: Vec<T>, is_first_page: bool, limit: usize, key: F) -> (Cursor<K>, Vec<T>)
where
    K: Default,
    F: Fn(&T) -> K,
{
    let has_next_page = entries.len() > limit;
    entries.truncate(limit);

    let (start, end) = match (entries.first(), entries.last()) {
        (Some(first), Some(last)) => (key(first), key(last)),
        _ => (K::default(), K::default()),
    };

    (
        Cursor {
            total: entries.len(),
            has_prev_page: !is_first_page,
            has_next_page,
            start,
            end,
        },
        entries,
    )
}
