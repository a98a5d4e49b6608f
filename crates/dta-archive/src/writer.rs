//! DTA archive writer.
//!
//! Produces a decoded DTA stream: encrypted header, content table, file
//! records and filenames, each followed by its plaintext payload. The stream
//! can be served by [`MemoryAccess`](crate::MemoryAccess) or written to disk
//! for [`MappedAccess`](crate::MappedAccess).

use zerocopy::IntoBytes;

use crate::format::{ArchiveHeader, ContentEntry, FileRecordHeader, DTA_MAGIC};
use crate::{Error, KeyPair, Result};

/// Builder for DTA streams.
#[derive(Debug, Clone)]
pub struct ArchiveWriter {
    keys: KeyPair,
    files: Vec<(String, Vec<u8>)>,
}

/// Output of [`ArchiveWriter::build`].
#[derive(Debug, Clone)]
pub struct BuiltArchive {
    /// The complete stream, starting with `ISD0`
    pub image: Vec<u8>,
    /// Offset of each file record, in table order
    pub record_offsets: Vec<u32>,
    /// Name and payload of each file, in table order
    pub entries: Vec<(String, Vec<u8>)>,
}

impl ArchiveWriter {
    pub fn new(keys: KeyPair) -> Self {
        Self {
            keys,
            files: Vec::new(),
        }
    }

    /// Append a file. Names use `\` as the directory separator.
    pub fn file(mut self, name: impl Into<String>, payload: Vec<u8>) -> Self {
        self.files.push((name.into(), payload));
        self
    }

    /// Serialize the archive.
    pub fn build(self) -> Result<BuiltArchive> {
        let table_offset = 4 + ArchiveHeader::SIZE;
        let table_size = self.files.len() * ContentEntry::SIZE;

        let mut records = Vec::new();
        let mut record_offsets = Vec::with_capacity(self.files.len());
        let mut table = Vec::with_capacity(table_size);

        for (name, payload) in &self.files {
            let offset = to_u32(table_offset + table_size + records.len())?;
            record_offsets.push(offset);

            let name_len = u8::try_from(name.len()).map_err(|_| Error::FilenameTooLong {
                length: name.len(),
                max: u8::MAX as usize,
            })?;

            let mut hint = [0u8; 16];
            let hint_len = name.len().min(hint.len());
            hint[..hint_len].copy_from_slice(&name.as_bytes()[..hint_len]);
            table.extend_from_slice(ContentEntry::new(offset, hint).as_bytes());

            let mut header = FileRecordHeader::new(to_u32(payload.len())?, name_len)
                .as_bytes()
                .to_vec();
            self.keys.apply(&mut header);
            records.extend_from_slice(&header);

            let mut encrypted_name = name.as_bytes().to_vec();
            self.keys.apply(&mut encrypted_name);
            records.extend_from_slice(&encrypted_name);

            records.extend_from_slice(payload);
        }

        let header = ArchiveHeader::new(
            to_u32(self.files.len())?,
            to_u32(table_offset)?,
            to_u32(table_size)?,
            0,
        );
        let mut header = header.as_bytes().to_vec();
        self.keys.apply(&mut header);
        self.keys.apply(&mut table);

        let mut image = Vec::with_capacity(table_offset + table_size + records.len());
        image.extend_from_slice(&DTA_MAGIC);
        image.extend_from_slice(&header);
        image.extend_from_slice(&table);
        image.extend_from_slice(&records);

        Ok(BuiltArchive {
            image,
            record_offsets,
            entries: self.files,
        })
    }
}

fn to_u32(value: usize) -> Result<u32> {
    u32::try_from(value).map_err(|_| {
        Error::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "archive exceeds the 4 GiB offset range",
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        let keys = KeyPair::new(1, 2);
        let built = ArchiveWriter::new(keys)
            .file("a.txt", b"hello".to_vec())
            .build()
            .unwrap();

        assert_eq!(&built.image[..4], b"ISD0");
        assert_eq!(built.record_offsets, vec![20 + 28]);
        assert_eq!(built.image.len(), 20 + 28 + 32 + 5 + 5);
        // Payload is stored in the clear.
        assert_eq!(&built.image[built.image.len() - 5..], b"hello");
    }

    #[test]
    fn test_rejects_long_names() {
        let err = ArchiveWriter::new(KeyPair::new(1, 2))
            .file("x".repeat(256), Vec::new())
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::FilenameTooLong { length: 256, .. }));
    }
}
