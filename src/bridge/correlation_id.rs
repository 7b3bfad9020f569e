//! Correlation ID type for request/reply matching.
//!
//! Every outbound request carries a fresh correlation ID; the remote service
//! echoes it back in its reply, and the dispatcher uses it as the sole key to
//! find the waiting caller.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use ulid::Ulid;

/// Correlation ID for one outstanding remote call.
///
/// Wraps a [`Ulid`] so IDs are unique across processes without coordination
/// and sort by creation time, which keeps broker-side traces readable.
///
/// # Wire Format
///
/// Serialized as the canonical 26-character ULID string. Replies whose `id`
/// is not a valid ULID cannot belong to this process and are treated as
/// foreign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CorrelationId(Ulid);

impl CorrelationId {
    /// Generate a fresh correlation ID.
    #[inline]
    pub fn generate() -> Self {
        Self(Ulid::new())
    }

    /// Parse a correlation ID received from the broker.
    ///
    /// Returns `None` for anything that is not a ULID string.
    pub fn parse(raw: &str) -> Option<Self> {
        Ulid::from_str(raw).ok().map(Self)
    }
}

impl From<Ulid> for CorrelationId {
    fn from(ulid: Ulid) -> Self {
        Self(ulid)
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for CorrelationId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for CorrelationId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid correlation id: {raw}")))
    }
}
