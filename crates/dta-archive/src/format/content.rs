//! Content table entry structure.

use zerocopy::byteorder::little_endian::U32;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

/// One entry of the content table.
///
/// The table is decrypted as a single block and then split into entries.
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
#[repr(C)]
pub struct ContentEntry {
    /// Unknown
    reserved1: U32,
    /// Absolute offset of the entry's file record
    file_offset: U32,
    /// Unknown
    reserved2: U32,
    /// Truncated filename, informational only
    filename_hint: [u8; 16],
}

impl ContentEntry {
    /// Size of one entry on disk.
    pub const SIZE: usize = std::mem::size_of::<Self>();

    pub fn new(file_offset: u32, filename_hint: [u8; 16]) -> Self {
        Self {
            file_offset: U32::new(file_offset),
            filename_hint,
            ..Default::default()
        }
    }

    #[inline]
    pub fn file_offset(&self) -> u32 {
        self.file_offset.get()
    }

    #[inline]
    pub fn reserved(&self) -> (u32, u32) {
        (self.reserved1.get(), self.reserved2.get())
    }

    /// Raw filename hint bytes. Not authoritative; the record's filename is.
    #[inline]
    pub fn filename_hint(&self) -> &[u8; 16] {
        &self.filename_hint
    }
}
