//! Request identifier type

use serde::{Deserialize, Serialize};
use std::fmt;

/// Upper bound (exclusive) for request identifiers.
///
/// Identifiers wrap back to 1 once they reach this value. The bound keeps ids
/// representable as exact integers on JSON peers that parse numbers as doubles.
pub const MAX_REQUEST_ID: u64 = 1 << 53;

/// Correlation key carried by every outbound and inbound envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub u64);

impl RequestId {
    /// Create a new request ID
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw ID value
    pub fn as_u64(&self) -> u64 {
        self.0
    }

    /// Map a monotonically increasing sequence number onto the id space.
    ///
    /// Ids run from 1 up to `MAX_REQUEST_ID - 1` and then wrap. Zero is never
    /// produced; it is reserved for envelopes that carry no correlation.
    pub fn from_sequence(seq: u64) -> Self {
        Self(seq % (MAX_REQUEST_ID - 1) + 1)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

impl From<u64> for RequestId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_id_display() {
        let id = RequestId::new(42);
        assert_eq!(format!("{}", id), "req-42");
    }

    #[test]
    fn test_request_id_from_sequence_wraps_and_skips_zero() {
        assert_eq!(RequestId::from_sequence(0), RequestId::new(1));
        assert_eq!(RequestId::from_sequence(1), RequestId::new(2));
        assert_eq!(
            RequestId::from_sequence(MAX_REQUEST_ID - 2),
            RequestId::new(MAX_REQUEST_ID - 1)
        );
        assert_eq!(RequestId::from_sequence(MAX_REQUEST_ID - 1), RequestId::new(1));
    }

    #[test]
    fn test_request_id_serializes_as_plain_number() {
        let json = serde_json::to_string(&RequestId::new(7)).unwrap();
        assert_eq!(json, "7");
    }
}
