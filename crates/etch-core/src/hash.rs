//! Content hashing
//!
//! SHA-256 helpers used to derive write identities from record keys and
//! fragment payloads. Identity derivation is domain separated, so callers
//! prepend a context tag before the content bytes.

use sha2::{Digest, Sha256};

/// Compute the SHA-256 digest of `data`.
pub fn digest(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Incremental SHA-256 hasher for multi-part input.
///
/// Avoids concatenating a domain tag and a large payload into a scratch
/// buffer just to hash them.
pub struct Hasher {
    inner: Sha256,
}

impl Hasher {
    /// Create a fresh hasher.
    pub fn new() -> Self {
        Self {
            inner: Sha256::new(),
        }
    }

    /// Absorb more input.
    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    /// Consume the hasher and return the digest.
    pub fn finalize(self) -> [u8; 32] {
        self.inner.finalize().into()
    }
}

impl Default for Hasher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_is_deterministic() {
        assert_eq!(digest(b"hello"), digest(b"hello"));
        assert_ne!(digest(b"hello"), digest(b"world"));
    }

    #[test]
    fn test_incremental_matches_one_shot() {
        let mut hasher = Hasher::new();
        hasher.update(b"etch:");
        hasher.update(b"payload");
        assert_eq!(hasher.finalize(), digest(b"etch:payload"));
    }

    #[test]
    fn test_empty_input() {
        // SHA-256 of the empty string is a fixed well-known value
        assert_eq!(
            hex::encode(digest(b"")),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
