//! Commit identifiers.

use std::fmt;

use crate::error::Result;

/// An opaque identifier for a point-in-time state of the store.
///
/// Carried as a hex string on the wire and as raw bytes internally; the
/// display form is lowercase hex.
///
/// ```
/// use canopy_client::Commit;
///
/// let c = Commit::from_hex("ab12").unwrap();
/// assert_eq!(c.as_bytes(), &[0xab, 0x12]);
/// assert_eq!(c.to_string(), "ab12");
/// ```
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Commit(Vec<u8>);

impl Commit {
    /// Decode a commit from its wire (hex) form.
    pub fn from_hex(s: &str) -> Result<Self> {
        Ok(Commit(hex::decode(s)?))
    }

    /// Build a commit from raw hash bytes.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Commit(bytes.into())
    }

    /// The raw hash bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// The wire (lowercase hex) form.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }
}

impl fmt::Display for Commit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Commit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Commit({})", self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_round_trip() {
        let c = Commit::from_hex("deadbeef").unwrap();
        assert_eq!(c.as_bytes(), &[0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(c.to_hex(), "deadbeef");
    }

    #[test]
    fn rejects_invalid_hex() {
        assert!(Commit::from_hex("xyz").is_err());
        assert!(Commit::from_hex("abc").is_err());
    }
}
