//! DTA on-disk structures.
//!
//! Every structure here is stored encrypted with the session [`KeyPair`]
//! and is only interpreted after decryption. All integers are little-endian.
//!
//! [`KeyPair`]: crate::KeyPair

mod content;
mod header;
mod record;

pub use content::ContentEntry;
pub use header::ArchiveHeader;
pub use record::FileRecordHeader;

/// Magic identifier at the very start of every DTA stream.
pub const DTA_MAGIC: [u8; 4] = *b"ISD0";

/// Upper bound on a filename read from a file record.
///
/// The length field is a single byte, so this only matters for callers that
/// feed lengths from elsewhere.
pub const MAX_FILENAME_LEN: usize = 256;
