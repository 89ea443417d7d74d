//! Ordered, non-contiguous payload matching.
//!
//! # Responsibilities
//! - Decode configured payloads (hex text or raw bytes) once, at setup
//! - Check that every expected fragment occurs in a response, in order
//!
//! # Design Decisions
//! - Fragments may be separated by arbitrary bytes ("fuzzy" match)
//! - Each fragment is searched from the end of the previous match
//! - An empty fragment list matches anything, including an empty stream

use crate::config::schema::Payload;
use thiserror::Error;

/// Errors raised while decoding a configured payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PayloadError {
    #[error("payload is empty")]
    Empty,

    #[error("payload is not valid hex: {0}")]
    InvalidHex(String),
}

/// Decode a payload into raw bytes.
pub fn decode_payload(payload: &Payload) -> Result<Vec<u8>, PayloadError> {
    let bytes = match payload {
        Payload::Text(text) => {
            if text.is_empty() {
                return Err(PayloadError::Empty);
            }
            hex::decode(text).map_err(|e| PayloadError::InvalidHex(e.to_string()))?
        }
        Payload::Binary(bytes) => bytes.clone(),
    };

    if bytes.is_empty() {
        return Err(PayloadError::Empty);
    }
    Ok(bytes)
}

/// Check that `fragments` occur in `stream` in order, not necessarily adjacent.
pub fn matches<F: AsRef<[u8]>>(stream: &[u8], fragments: &[F]) -> bool {
    let mut cursor = 0;
    for fragment in fragments {
        let fragment = fragment.as_ref();
        match find(&stream[cursor..], fragment) {
            Some(offset) => cursor += offset + fragment.len(),
            None => return false,
        }
    }
    true
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Pre-decoded list of expected response fragments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PayloadMatcher {
    fragments: Vec<Vec<u8>>,
}

impl PayloadMatcher {
    /// Decode every payload. Fails on the first empty or malformed one.
    pub fn new(payloads: &[Payload]) -> Result<Self, PayloadError> {
        let fragments = payloads
            .iter()
            .map(decode_payload)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { fragments })
    }

    /// True when no fragments are expected (connect-only checks).
    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    pub fn fragments(&self) -> &[Vec<u8>] {
        &self.fragments
    }

    pub fn matches(&self, stream: &[u8]) -> bool {
        matches(stream, &self.fragments)
    }
}
