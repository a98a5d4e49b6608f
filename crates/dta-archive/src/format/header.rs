//! Archive header structure.

use zerocopy::byteorder::little_endian::U32;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

/// Archive header (without magic).
///
/// The 4-byte `ISD0` magic is read separately before this struct; the
/// following 16 bytes are encrypted.
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
#[repr(C)]
pub struct ArchiveHeader {
    /// Number of entries in the content table
    num_of_files: U32,
    /// Absolute offset of the content table
    content_offset: U32,
    /// Size of the content table (not interpreted)
    content_size: U32,
    /// Unknown
    reserved: U32,
}

impl ArchiveHeader {
    /// Encrypted size on disk.
    pub const SIZE: usize = std::mem::size_of::<Self>();

    pub fn new(num_of_files: u32, content_offset: u32, content_size: u32, reserved: u32) -> Self {
        Self {
            num_of_files: U32::new(num_of_files),
            content_offset: U32::new(content_offset),
            content_size: U32::new(content_size),
            reserved: U32::new(reserved),
        }
    }

    #[inline]
    pub fn num_of_files(&self) -> u32 {
        self.num_of_files.get()
    }

    #[inline]
    pub fn content_offset(&self) -> u32 {
        self.content_offset.get()
    }

    #[inline]
    pub fn content_size(&self) -> u32 {
        self.content_size.get()
    }

    #[inline]
    pub fn reserved(&self) -> u32 {
        self.reserved.get()
    }
}
