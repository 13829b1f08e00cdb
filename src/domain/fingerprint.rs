//! Content fingerprints.
//!
//! A fingerprint is the cache/resume key of a request. It covers the title and
//! source text only: voice and duration choices are side metadata layered onto
//! the cached content.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Number of digest bytes kept (16 hex chars)
const FINGERPRINT_BYTES: usize = 8;

/// Stable identifier derived from a request's semantic inputs
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Wrap an existing fingerprint string (e.g. a directory name)
    ///
    /// Returns `None` unless the value is exactly 16 lowercase hex chars.
    pub fn parse(value: &str) -> Option<Self> {
        let valid = value.len() == FINGERPRINT_BYTES * 2
            && value
                .chars()
                .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c));
        valid.then(|| Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Derive the fingerprint of `(title, source_text)`.
///
/// The two fields are length-prefixed before hashing so that moving text
/// across the boundary (`"ab" + "c"` vs `"a" + "bc"`) changes the digest.
pub fn fingerprint(title: &str, source_text: &str) -> Fingerprint {
    let mut hasher = Sha256::new();
    hasher.update((title.len() as u64).to_le_bytes());
    hasher.update(title.as_bytes());
    hasher.update((source_text.len() as u64).to_le_bytes());
    hasher.update(source_text.as_bytes());
    let digest = hasher.finalize();
    Fingerprint(hex::encode(&digest[..FINGERPRINT_BYTES]))
}
