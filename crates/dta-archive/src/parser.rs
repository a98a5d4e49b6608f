//! Archive header and content table parsing.

use std::io::SeekFrom;

use dta_common::BinaryReader;
use tracing::debug;

use crate::access::{RawArchiveAccess, ScopedHandle};
use crate::format::{ArchiveHeader, ContentEntry, DTA_MAGIC};
use crate::{Error, KeyPair, Result};

/// Read and validate the archive header.
///
/// Reads the 4-byte magic first and stops there if it is not `ISD0`.
/// Otherwise the next 16 bytes are decrypted into an [`ArchiveHeader`] and
/// the stream is left positioned at the start of the content table.
pub fn read_archive_header<A: RawArchiveAccess>(
    stream: &mut ScopedHandle<'_, A>,
    keys: KeyPair,
) -> Result<ArchiveHeader> {
    let mut magic = [0u8; 4];
    stream.read_exact(&mut magic)?;

    if magic != DTA_MAGIC {
        return Err(Error::InvalidMagic {
            expected: DTA_MAGIC,
            actual: magic,
        });
    }

    let mut raw = [0u8; ArchiveHeader::SIZE];
    stream.read_exact(&mut raw)?;
    keys.apply(&mut raw);

    let header: ArchiveHeader = BinaryReader::new(&raw).read_struct()?;
    debug!(
        files = header.num_of_files(),
        content_offset = header.content_offset(),
        content_size = header.content_size(),
        "read archive header"
    );

    stream.seek(SeekFrom::Start(header.content_offset() as u64))?;
    Ok(header)
}

/// Read and decrypt the content table at the current stream position.
///
/// The whole table is read and decrypted as a single block. `max_entries`
/// bounds the untrusted entry count before anything is allocated.
pub fn read_content_table<A: RawArchiveAccess>(
    stream: &mut ScopedHandle<'_, A>,
    keys: KeyPair,
    num_of_files: u32,
    max_entries: u32,
) -> Result<Vec<ContentEntry>> {
    if num_of_files > max_entries {
        return Err(Error::TableTooLarge {
            count: num_of_files as u64,
            limit: max_entries as u64,
        });
    }

    let count = num_of_files as usize;
    let table_size = count
        .checked_mul(ContentEntry::SIZE)
        .ok_or(Error::TableTooLarge {
            count: num_of_files as u64,
            limit: (usize::MAX / ContentEntry::SIZE) as u64,
        })?;

    let mut raw = Vec::new();
    raw.try_reserve_exact(table_size)
        .map_err(|_| Error::Allocation {
            requested: table_size,
        })?;
    raw.resize(table_size, 0);

    stream.read_exact(&mut raw)?;
    keys.apply(&mut raw);

    let mut entries = Vec::new();
    entries
        .try_reserve_exact(count)
        .map_err(|_| Error::Allocation {
            requested: table_size,
        })?;

    let mut reader = BinaryReader::new(&raw);
    for _ in 0..count {
        entries.push(reader.read_struct::<ContentEntry>()?);
    }

    debug!(entries = entries.len(), "read content table");
    Ok(entries)
}
