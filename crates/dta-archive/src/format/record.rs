//! File record header structure.

use zerocopy::byteorder::little_endian::U32;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

/// File record header.
///
/// This structure precedes each file in the stream. It is followed by
/// `filename_length` bytes of encrypted filename and then by `file_size`
/// bytes of plaintext payload.
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
#[repr(C)]
pub struct FileRecordHeader {
    /// Unknown
    reserved: [U32; 4],
    /// Payload size in bytes
    file_size: U32,
    /// Unknown
    reserved2: U32,
    /// Length of the filename that follows
    filename_length: u8,
    /// Unknown
    reserved3: [u8; 7],
}

impl FileRecordHeader {
    /// Encrypted size on disk.
    pub const SIZE: usize = std::mem::size_of::<Self>();

    pub fn new(file_size: u32, filename_length: u8) -> Self {
        Self {
            file_size: U32::new(file_size),
            filename_length,
            ..Default::default()
        }
    }

    #[inline]
    pub fn file_size(&self) -> u32 {
        self.file_size.get()
    }

    #[inline]
    pub fn filename_length(&self) -> usize {
        self.filename_length as usize
    }

    /// Unknown fields, in on-disk order.
    #[inline]
    pub fn reserved(&self) -> ([u32; 4], u32, [u8; 7]) {
        (
            self.reserved.map(|word| word.get()),
            self.reserved2.get(),
            self.reserved3,
        )
    }
}
