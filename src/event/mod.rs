//! Cache event model and wire codec.
//!
//! A [`CacheEvent`] is the one-shot notification exchanged between nodes:
//! a region path, a key and an event type. Events are immutable once
//! constructed; transports reconstruct them from the wire with
//! [`codec::decode`].
pub mod codec;
mod region;
pub use region::*;


use std::fmt;

use crate::constants::KEY_DELIMITER;
use crate::CodecError;

/// Key of a cache entry.
///
/// The host produces either plain integer keys or composite keys whose
/// parts are joined with [`KEY_DELIMITER`]. Only the latter survive the
/// wire as strings; everything else is parsed back into a number.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Numeric(i32),
    Composite(String),
}

impl CacheKey {
    /// Rebuilds a key from its wire form.
    ///
    /// A string containing the delimiter stays a string; anything else must
    /// parse as an `i32`.
    pub fn parse(raw: &str) -> Result<Self, CodecError> {
        if raw.contains(KEY_DELIMITER) {
            return Ok(CacheKey::Composite(raw.to_string()));
        }
        raw.parse::<i32>()
            .map(CacheKey::Numeric)
            .map_err(|source| CodecError::InvalidKey {
                key: raw.to_string(),
                source,
            })
    }

    /// Joins `parts` with the key delimiter
    pub fn composite<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let joined = parts
            .into_iter()
            .map(|p| p.as_ref().to_string())
            .collect::<Vec<_>>()
            .join(KEY_DELIMITER);
        CacheKey::Composite(joined)
    }

    pub fn as_numeric(&self) -> Option<i32> {
        match self {
            CacheKey::Numeric(n) => Some(*n),
            CacheKey::Composite(_) => None,
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            CacheKey::Numeric(n) => write!(f, "{n}"),
            CacheKey::Composite(s) => f.write_str(s),
        }
    }
}

impl From<i32> for CacheKey {
    fn from(value: i32) -> Self {
        CacheKey::Numeric(value)
    }
}

impl From<&str> for CacheKey {
    fn from(value: &str) -> Self {
        CacheKey::Composite(value.to_string())
    }
}

impl From<String> for CacheKey {
    fn from(value: String) -> Self {
        CacheKey::Composite(value)
    }
}

/// Raw event type code.
///
/// The code travels verbatim; codes this crate has no name for are
/// preserved unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheEventType(pub i32);

impl CacheEventType {
    /// Clear the whole region
    pub const FLUSH: CacheEventType = CacheEventType(0);
    /// Drop a single key
    pub const INVALIDATE: CacheEventType = CacheEventType(1);
    pub const REMOVE: CacheEventType = CacheEventType::INVALIDATE;
    pub const INSERT: CacheEventType = CacheEventType(2);

    pub fn code(self) -> i32 {
        self.0
    }
}

impl fmt::Display for CacheEventType {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i32> for CacheEventType {
    fn from(code: i32) -> Self {
        CacheEventType(code)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEvent {
    region_path: String,
    key: CacheKey,
    event_type: CacheEventType,
}

impl CacheEvent {
    pub fn new(
        region_path: impl Into<String>,
        key: impl Into<CacheKey>,
        event_type: CacheEventType,
    ) -> Self {
        Self {
            region_path: region_path.into(),
            key: key.into(),
            event_type,
        }
    }

    pub fn region_path(&self) -> &str {
        &self.region_path
    }

    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    pub fn event_type(&self) -> CacheEventType {
        self.event_type
    }

    /// Well-known region addressed by this event, `Unknown` otherwise
    pub fn region(&self) -> CacheRegion {
        CacheRegion::from_path(&self.region_path)
    }
}

impl fmt::Display for CacheEvent {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(
            f,
            "CacheEvent(region={}, key={}, type={})",
            self.region_path, self.key, self.event_type
        )
    }
}
