//! Binary summary index file format.
//!
//! ```text
//! ┌──────────────────────────────────────┐
//! │ HEADER (128 bytes, fixed)            │
//! │  magic: [u8; 8] = b"MAILSXP\0"      │
//! │  version: u32                        │
//! │  message_count: u64                  │
//! │  mbox_file_size: u64                 │
//! │  mbox_modified_time: i64             │
//! │  sha256_first_4kb: [u8; 32]         │
//! │  (padding to 128 bytes)              │
//! ├──────────────────────────────────────┤
//! │ ENTRIES (variable)                   │
//! │  bincode-serialized Vec<MboxEntry>   │
//! └──────────────────────────────────────┘
//! ```

use crate::model::mail::MessageInfo;

/// Magic bytes identifying a mailsexp index file.
pub const MAGIC: &[u8; 8] = b"MAILSXP\0";

/// Current index format version.
pub const VERSION: u32 = 1;

/// Fixed header size in bytes.
pub const HEADER_SIZE: usize = 128;

/// Length of the file prefix hashed for change detection.
pub const HASH_PREFIX_LEN: usize = 4096;

/// One indexed message: where it lives in the MBOX and its summary record.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MboxEntry {
    /// Byte offset of the `From ` separator.
    pub offset: u64,
    /// Length of the raw message in bytes.
    pub length: u64,
    /// Summary record; its uid is the message's sequence number.
    pub info: MessageInfo,
}

/// Serializable index header.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct IndexHeader {
    pub magic: [u8; 8],
    pub version: u32,
    pub message_count: u64,
    /// Fingerprint of the MBOX file the entries were built from.
    pub stamp: MboxStamp,
}

/// Size, mtime and prefix hash of an MBOX file. An index is reused only
/// while all three still match.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MboxStamp {
    pub file_size: u64,
    pub modified_time: i64,
    pub sha256_first_4kb: [u8; 32],
}

impl IndexHeader {
    /// Validate that the header is well-formed and matches the current format.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.magic != *MAGIC {
            return Err("Invalid magic bytes".into());
        }
        if self.version != VERSION {
            return Err(format!(
                "Incompatible version: expected {VERSION}, found {}",
                self.version
            ));
        }
        Ok(())
    }
}
