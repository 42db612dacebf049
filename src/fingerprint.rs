//! Output fingerprints using BLAKE3 hashing
//!
//! Every converted document is fingerprinted so that logs and reports can
//! identify a specific output without carrying its bytes around.
//!
//! # Algorithm
//!
//! 1. Hash the output bytes using BLAKE3
//! 2. Encode the full 256-bit digest as lowercase hexadecimal
//! 3. [`Fingerprint::short`] keeps the first 64 bits for log lines
//!
//! # Example
//!
//! ```
//! use mobiconvert_gateway::fingerprint::Fingerprint;
//!
//! let fp = Fingerprint::of(b"PK\x03\x04");
//! assert_eq!(fp.to_hex().len(), 64);
//! assert_eq!(fp.short().len(), 16);
//! assert_eq!(fp, Fingerprint::of(b"PK\x03\x04"));
//! ```

use std::fmt;

/// BLAKE3 digest of a converted document
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Hash `bytes`
    pub fn of(bytes: &[u8]) -> Self {
        Self(*blake3::hash(bytes).as_bytes())
    }

    /// Full digest as lowercase hex (64 characters)
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// First 8 bytes of the digest as hex (16 characters)
    pub fn short(&self) -> String {
        hex::encode(&self.0[..8])
    }

    /// Raw digest bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.short())
    }
}
