//! Room topic type for `TaskMesh`.
//!
//! A room is identified by a 32-byte topic, shared out of band as a
//! 64-character hex string. Peers joining the same topic discover one
//! another and form the mesh. Malformed hex is the one error class the
//! protocol surfaces to the user; everything else is absorbed internally.

use serde::{Deserialize, Serialize};

/// Length of a topic in bytes.
pub const TOPIC_LEN: usize = 32;

/// A 32-byte value identifying a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Topic([u8; TOPIC_LEN]);

/// Error returned when a topic string fails to parse.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TopicError {
    /// The hex string does not have exactly 64 characters.
    #[error("topic must be {expected} hex characters, got {got}")]
    BadLength {
        /// Expected number of hex characters.
        expected: usize,
        /// Number of characters supplied.
        got: usize,
    },
    /// A character in the string is not a hex digit.
    #[error("topic contains a non-hex character at position {0}")]
    BadChar(usize),
}

impl Topic {
    /// Creates a topic from raw bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; TOPIC_LEN]) -> Self {
        Self(bytes)
    }

    /// Returns the raw topic bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; TOPIC_LEN] {
        &self.0
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl std::str::FromStr for Topic {
    type Err = TopicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != TOPIC_LEN * 2 {
            return Err(TopicError::BadLength {
                expected: TOPIC_LEN * 2,
                got: s.len(),
            });
        }
        let mut bytes = [0u8; TOPIC_LEN];
        for (i, chunk) in s.as_bytes().chunks_exact(2).enumerate() {
            let pair = std::str::from_utf8(chunk).map_err(|_| TopicError::BadChar(i * 2))?;
            // from_str_radix tolerates a leading sign, which is not hex.
            if !pair.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(TopicError::BadChar(i * 2));
            }
            bytes[i] = u8::from_str_radix(pair, 16).map_err(|_| TopicError::BadChar(i * 2))?;
        }
        Ok(Self(bytes))
    }
}
