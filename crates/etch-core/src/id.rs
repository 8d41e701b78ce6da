//! Identifiers
//!
//! Newtype identifiers for writes, owners, transactions, and funding
//! payments. [`WriteId`] is the idempotency identity of a single write:
//! derived from the record key for keyed records and from the payload bytes
//! for fragments, with domain separation between the two.

use crate::errors::EtchError;
use crate::hash::Hasher;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Domain tag for record-keyed write identities.
const RECORD_DOMAIN: &[u8] = b"etch:record:";

/// Domain tag for fragment write identities.
const FRAGMENT_DOMAIN: &[u8] = b"etch:fragment:";

/// Identity of a single write (32-byte SHA-256 digest).
///
/// Two writes with the same id are the same write as far as idempotency is
/// concerned: if the store already holds it, submitting it again is skipped.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct WriteId(pub [u8; 32]);

impl WriteId {
    /// Create a write id from raw bytes.
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Derive the id of a keyed record write.
    pub fn for_record(key: &RecordKey) -> Self {
        let mut hasher = Hasher::new();
        hasher.update(RECORD_DOMAIN);
        hasher.update(key.as_str().as_bytes());
        Self(hasher.finalize())
    }

    /// Derive the id of a fragment write from its payload bytes.
    pub fn for_fragment(data: &[u8]) -> Self {
        let mut hasher = Hasher::new();
        hasher.update(FRAGMENT_DOMAIN);
        hasher.update(data);
        Self(hasher.finalize())
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Hex encoding of the id, without the `write:` prefix.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a bare hex id (64 hex characters).
    pub fn from_hex(s: &str) -> Result<Self, EtchError> {
        let bytes = hex::decode(s)
            .map_err(|e| EtchError::invalid(format!("invalid write id hex: {e}")))?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| EtchError::invalid("write id must be 32 bytes"))?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for WriteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "write:{}", hex::encode(self.0))
    }
}

impl FromStr for WriteId {
    type Err = EtchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex_part = s.strip_prefix("write:").unwrap_or(s);
        Self::from_hex(hex_part)
    }
}

/// Key under which a record is stored.
///
/// Keys are opaque non-empty UTF-8 strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordKey(String);

impl RecordKey {
    /// Create a record key, rejecting the empty string.
    pub fn new(key: impl Into<String>) -> Result<Self, EtchError> {
        let key = key.into();
        if key.is_empty() {
            return Err(EtchError::invalid("record key must not be empty"));
        }
        Ok(Self(key))
    }

    /// Get the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Account or namespace that owns the uploaded records.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwnerAddress(String);

impl OwnerAddress {
    /// Create an owner address.
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    /// Get the address as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque reference to a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxRef(String);

impl TxRef {
    /// Create a transaction reference.
    pub fn new(tx: impl Into<String>) -> Self {
        Self(tx.into())
    }

    /// Get the reference as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TxRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque reference to a funding payment issued by the relay.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PaymentRef(String);

impl PaymentRef {
    /// Create a payment reference.
    pub fn new(payment: impl Into<String>) -> Self {
        Self(payment.into())
    }

    /// Get the reference as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PaymentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_id_display_roundtrip() {
        let id = WriteId::for_fragment(b"fragment bytes");
        let displayed = id.to_string();
        assert!(displayed.starts_with("write:"));
        let parsed: WriteId = displayed.parse().expect("parse displayed id");
        assert_eq!(parsed, id);
    }

    #[test]
    fn test_write_id_accepts_bare_hex() {
        let id = WriteId::new([7u8; 32]);
        let parsed: WriteId = id.to_hex().parse().expect("parse bare hex");
        assert_eq!(parsed, id);
    }

    #[test]
    fn test_write_id_rejects_wrong_length() {
        assert!(WriteId::from_hex("abcd").is_err());
        assert!("write:abcd".parse::<WriteId>().is_err());
    }

    #[test]
    fn test_write_id_rejects_non_hex() {
        let bad = "z".repeat(64);
        assert!(WriteId::from_hex(&bad).is_err());
    }

    #[test]
    fn test_domain_separation() {
        // A key and a fragment with identical bytes must not collide.
        let key = RecordKey::new("same-bytes").expect("key");
        let record_id = WriteId::for_record(&key);
        let fragment_id = WriteId::for_fragment(b"same-bytes");
        assert_ne!(record_id, fragment_id);
    }

    #[test]
    fn test_record_key_rejects_empty() {
        assert!(RecordKey::new("").is_err());
        assert!(RecordKey::new("k").is_ok());
    }
}
