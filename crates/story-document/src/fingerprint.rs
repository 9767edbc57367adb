//! Content fingerprints for documents and rendered text
//!
//! Provides [`Fingerprint`], a Blake3 digest used to detect that a patch
//! batch was proposed against a stale version of a document.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// A 32-byte Blake3 fingerprint
///
/// Copy-cheap and totally ordered so it can key maps and appear in reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Wrap raw digest bytes
    #[inline]
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Raw digest bytes
    #[inline]
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Fingerprint arbitrary bytes
    #[inline]
    #[must_use]
    pub fn of_bytes(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    /// Fingerprint rendered text
    #[inline]
    #[must_use]
    pub fn of_text(text: &str) -> Self {
        Self::of_bytes(text.as_bytes())
    }

    /// Fingerprint the canonical JSON encoding of a value
    ///
    /// # Errors
    /// Returns error if the value cannot be encoded as JSON
    pub fn of_json<T: serde::Serialize>(value: &T) -> Result<Self, FingerprintError> {
        let json = serde_json::to_vec(value)?;
        Ok(Self::of_bytes(&json))
    }

    /// First 8 bytes as hex, for logs
    #[inline]
    #[must_use]
    pub fn short(&self) -> String {
        hex::encode(&self.0[..8])
    }
}

impl Display for Fingerprint {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl FromStr for Fingerprint {
    type Err = FingerprintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s)?;
        let arr: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| FingerprintError::InvalidLength(bytes.len()))?;
        Ok(Self(arr))
    }
}

impl serde::Serialize for Fingerprint {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for Fingerprint {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Errors produced while computing or parsing fingerprints
#[derive(Debug, thiserror::Error)]
pub enum FingerprintError {
    /// Decoded digest has the wrong size
    #[error("invalid fingerprint length: expected 32 bytes, got {0}")]
    InvalidLength(usize),

    /// Not hex
    #[error("hex decode error: {0}")]
    HexDecode(#[from] hex::FromHexError),

    /// Value could not be encoded
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_text_same_fingerprint() {
        assert_eq!(Fingerprint::of_text("a"), Fingerprint::of_text("a"));
        assert_ne!(Fingerprint::of_text("a"), Fingerprint::of_text("b"));
    }

    #[test]
    fn display_parses_back() {
        let fp = Fingerprint::of_text("story");
        let parsed: Fingerprint = fp.to_string().parse().unwrap();
        assert_eq!(fp, parsed);
    }

    #[test]
    fn short_is_prefix_of_display() {
        let fp = Fingerprint::of_text("story");
        assert_eq!(fp.short().len(), 16);
        assert!(fp.to_string().starts_with(&fp.short()));
    }

    #[test]
    fn wrong_length_rejected() {
        let result: Result<Fingerprint, _> = "abcd".parse();
        assert!(matches!(result, Err(FingerprintError::InvalidLength(2))));
    }

    #[test]
    fn serde_uses_hex_string() {
        let fp = Fingerprint::of_text("story");
        let json = serde_json::to_string(&fp).unwrap();
        assert_eq!(json, format!("\"{fp}\""));
        let back: Fingerprint = serde_json::from_str(&json).unwrap();
        assert_eq!(back, fp);
    }
}
