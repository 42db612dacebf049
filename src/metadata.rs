//! Palm database header inspection
//!
//! MOBI and AZW3 files are Palm databases. The first 78 bytes hold a fixed
//! header naming the database and declaring its type and creator codes; the
//! native library only accepts `BOOK` and `TEXt` databases. This module reads
//! that header so inputs can be checked and logged before they cross the
//! boundary. It does not look at any record content.
//!
//! # Layout
//!
//! | Offset | Size | Field |
//! |---|---|---|
//! | 0 | 32 | name, NUL-terminated, CP1252 |
//! | 32 | 2 | attributes |
//! | 34 | 2 | version |
//! | 60 | 4 | type |
//! | 64 | 4 | creator |
//! | 76 | 2 | record count |
//!
//! All integers are big-endian.
//!
//! # Example
//!
//! ```rust
//! use mobiconvert_gateway::metadata::PalmDbHeader;
//!
//! let mut raw = vec![0u8; 78];
//! raw[..6].copy_from_slice(b"My_Boo");
//! raw[60..64].copy_from_slice(b"BOOK");
//! raw[64..68].copy_from_slice(b"MOBI");
//! raw[76..78].copy_from_slice(&12u16.to_be_bytes());
//!
//! let header = PalmDbHeader::parse(&raw).unwrap();
//! assert_eq!(header.name, "My_Boo");
//! assert!(header.is_ebook());
//! assert_eq!(header.record_count, 12);
//! ```

use std::fmt;

use encoding_rs::WINDOWS_1252;

/// Length of the fixed Palm database header
pub const PALMDB_HEADER_LEN: usize = 78;

/// Maximum length of the database name field
pub const PALMDB_NAME_SIZE_MAX: usize = 32;

const TYPE_OFFSET: usize = 60;
const CREATOR_OFFSET: usize = 64;
const RECORD_COUNT_OFFSET: usize = 76;

/// Database types the conversion library accepts
const EBOOK_TYPES: [&[u8; 4]; 2] = [b"BOOK", b"TEXt"];

/// Fixed header at the start of a Palm database file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PalmDbHeader {
    /// Database name, decoded from CP1252
    pub name: String,
    /// Attribute flags
    pub attributes: u16,
    /// File version
    pub version: u16,
    /// Four-byte type code (`BOOK` for MOBI/AZW3)
    pub type_code: [u8; 4],
    /// Four-byte creator code (`MOBI` for Mobipocket)
    pub creator: [u8; 4],
    /// Number of records following the header
    pub record_count: u16,
}

impl PalmDbHeader {
    /// Parse the header from the start of `data`
    ///
    /// Returns `None` if `data` is shorter than [`PALMDB_HEADER_LEN`].
    pub fn parse(data: &[u8]) -> Option<Self> {
        let header = data.get(..PALMDB_HEADER_LEN)?;

        let raw_name = &header[..PALMDB_NAME_SIZE_MAX];
        let name_end = raw_name
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(PALMDB_NAME_SIZE_MAX);
        let (name, _, _) = WINDOWS_1252.decode(&raw_name[..name_end]);

        Some(Self {
            name: name.into_owned(),
            attributes: be_u16(header, 32),
            version: be_u16(header, 34),
            type_code: four_cc(header, TYPE_OFFSET),
            creator: four_cc(header, CREATOR_OFFSET),
            record_count: be_u16(header, RECORD_COUNT_OFFSET),
        })
    }

    /// Whether the database type is one the conversion library handles
    pub fn is_ebook(&self) -> bool {
        EBOOK_TYPES.iter().any(|t| **t == self.type_code)
    }

    /// Whether the creator code is Mobipocket
    pub fn is_mobi(&self) -> bool {
        &self.creator == b"MOBI"
    }

    /// Type code as text, lossy for non-ASCII bytes
    pub fn type_str(&self) -> String {
        String::from_utf8_lossy(&self.type_code).into_owned()
    }

    /// Creator code as text, lossy for non-ASCII bytes
    pub fn creator_str(&self) -> String {
        String::from_utf8_lossy(&self.creator).into_owned()
    }
}

impl fmt::Display for PalmDbHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "\"{}\" ({}/{}, {} records)",
            self.name,
            self.type_str(),
            self.creator_str(),
            self.record_count
        )
    }
}

fn be_u16(data: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([data[offset], data[offset + 1]])
}

fn four_cc(data: &[u8], offset: usize) -> [u8; 4] {
    [
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ]
}
