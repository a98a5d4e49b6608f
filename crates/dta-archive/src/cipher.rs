//! DTA structural cipher.
//!
//! Headers, the content table, file records and filenames are XORed with a
//! per-archive key pair. Payload bytes are never passed through this cipher.
//! The transform is an involution, so the same routine encrypts and decrypts.

use byteorder::{ByteOrder, LittleEndian};

/// The two 32-bit keys used for every structural decrypt in a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyPair {
    pub key1: u32,
    pub key2: u32,
}

impl KeyPair {
    /// Create a key pair.
    #[inline]
    pub const fn new(key1: u32, key2: u32) -> Self {
        Self { key1, key2 }
    }

    /// Decrypt (or encrypt) `data` in place with this key pair.
    #[inline]
    pub fn apply(&self, data: &mut [u8]) {
        decrypt(data, self.key1, self.key2);
    }

    /// The 8-byte key stream: `key2` then `key1`, both little-endian.
    fn stream(&self) -> [u8; 8] {
        let mut stream = [0u8; 8];
        LittleEndian::write_u32(&mut stream[..4], self.key2);
        LittleEndian::write_u32(&mut stream[4..], self.key1);
        stream
    }
}

/// Decrypt `data` in place.
///
/// Each 8-byte block is split into two little-endian words; the first is
/// XORed with `key2` and the second with `key1`. A trailing remainder of up
/// to 7 bytes is XORed byte-wise with the start of the `key2 ‖ key1` stream.
pub fn decrypt(data: &mut [u8], key1: u32, key2: u32) {
    let mut blocks = data.chunks_exact_mut(8);

    for block in &mut blocks {
        let (lo, hi) = block.split_at_mut(4);
        LittleEndian::write_u32(lo, LittleEndian::read_u32(lo) ^ key2);
        LittleEndian::write_u32(hi, LittleEndian::read_u32(hi) ^ key1);
    }

    let stream = KeyPair::new(key1, key2).stream();
    for (byte, key) in blocks.into_remainder().iter_mut().zip(stream) {
        *byte ^= key;
    }
}
