//! Stream positions
//!
//! A position is an opaque token assigned by the change stream. It is stored,
//! compared and displayed, never parsed.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque, totally ordered token identifying a change in the stream
///
/// Ordering is unsigned byte-lexicographic; when one position is a prefix of
/// the other the shorter one sorts lower.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position(#[serde(with = "hex::serde")] Vec<u8>);

impl Position {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Parse a position from its hex rendering
    pub fn from_hex(text: &str) -> Option<Self> {
        hex::decode(text.trim()).ok().map(Self)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }
}

/// Compare two raw positions
///
/// The first differing byte decides; if all compared bytes tie, the shorter
/// array sorts lower.
pub fn compare_positions(lhs: &[u8], rhs: &[u8]) -> Ordering {
    let common = lhs.len().min(rhs.len());
    for (l, r) in lhs[..common].iter().zip(&rhs[..common]) {
        match l.cmp(r) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    lhs.len().cmp(&rhs.len())
}

impl Ord for Position {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_positions(&self.0, &other.0)
    }
}

impl PartialOrd for Position {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl From<Vec<u8>> for Position {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<&[u8]> for Position {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

impl fmt::Debug for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Position({})", self.to_hex())
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}
