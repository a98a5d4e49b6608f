//! Memory-mapped archive backend.
//!
//! Works on DTA files whose stream is already decoded. At mount time the
//! content table is walked once to map entry names to their payload spans,
//! so `open_entry` is a hash lookup.
//!
//! Names are matched exactly first. A name with no exact match falls back to
//! a case-insensitive, separator-agnostic match, but only when a single
//! record answers to it.

use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use memmap2::Mmap;
use tracing::{debug, warn};

use crate::access::{resolve_seek, RawArchiveAccess, ScopedHandle};
use crate::extract::{output_path, read_file_record};
use crate::format::{ContentEntry, FileRecordHeader};
use crate::parser::{read_archive_header, read_content_table};
use crate::{Error, KeyPair, Result};

/// Handle issued by [`MappedAccess`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MappedHandle(u32);

#[derive(Debug, Clone, Copy)]
struct Span {
    start: usize,
    len: usize,
}

/// Entry names mapped to payload spans.
#[derive(Debug, Default)]
struct EntryIndex {
    exact: HashMap<String, Span>,
    /// `None` marks a folded name shared by several records.
    folded: HashMap<String, Option<Span>>,
}

impl EntryIndex {
    fn insert(&mut self, name: &str, span: Span) {
        if self.exact.contains_key(name) {
            warn!(name, "duplicate entry name, keeping the first record");
            return;
        }
        self.exact.insert(name.to_string(), span);

        self.folded
            .entry(fold_name(name))
            .and_modify(|slot| {
                if slot.is_some() {
                    warn!(name, "entry names differ only in case or separators");
                }
                *slot = None;
            })
            .or_insert(Some(span));
    }

    fn get(&self, name: &str) -> Option<Span> {
        self.exact
            .get(name)
            .copied()
            .or_else(|| self.folded.get(&fold_name(name)).copied().flatten())
    }

    fn len(&self) -> usize {
        self.exact.len()
    }
}

#[derive(Debug)]
enum Source {
    Image,
    Span(Span),
    Loose(File),
}

#[derive(Debug)]
struct Cursor {
    source: Source,
    position: u64,
}

/// Archive backend over a memory-mapped, pre-decoded DTA file.
#[derive(Debug)]
pub struct MappedAccess {
    keys: KeyPair,
    loose_root: Option<PathBuf>,
    disk_first: bool,
    mmap: Option<Mmap>,
    index: EntryIndex,
    handles: HashMap<u32, Cursor>,
    next_handle: u32,
}

impl MappedAccess {
    /// Create a backend. `keys` are needed to index entry names at mount.
    pub fn new(keys: KeyPair) -> Self {
        Self {
            keys,
            loose_root: None,
            disk_first: false,
            mmap: None,
            index: EntryIndex::default(),
            handles: HashMap::new(),
            next_handle: 0,
        }
    }

    /// Directory searched for loose files in disk-first mode.
    pub fn with_loose_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.loose_root = Some(root.into());
        self
    }

    /// Number of entries indexed at mount.
    pub fn indexed_entries(&self) -> usize {
        self.index.len()
    }

    fn issue(&mut self, source: Source) -> MappedHandle {
        let id = self.next_handle;
        self.next_handle += 1;
        self.handles.insert(
            id,
            Cursor {
                source,
                position: 0,
            },
        );
        MappedHandle(id)
    }

    fn open_loose(&self, name: &str) -> Option<File> {
        if !self.disk_first {
            return None;
        }

        let path = output_path(self.loose_root.as_deref()?, name).ok()?;
        if !path.is_file() {
            return None;
        }
        File::open(&path).ok()
    }

    fn image(&self) -> &[u8] {
        self.mmap.as_deref().unwrap_or(&[])
    }
}

fn fold_name(name: &str) -> String {
    name.replace('/', "\\").to_ascii_lowercase()
}

fn stale(handle: MappedHandle) -> Error {
    Error::Io(std::io::Error::new(
        std::io::ErrorKind::InvalidInput,
        format!("stale handle {:?}", handle),
    ))
}

/// Copy from `data` at `position` into `buf`, returning the count.
fn read_at(data: &[u8], position: u64, buf: &mut [u8]) -> usize {
    let start = usize::try_from(position).unwrap_or(usize::MAX).min(data.len());
    let count = buf.len().min(data.len() - start);
    buf[..count].copy_from_slice(&data[start..start + count]);
    count
}

impl RawArchiveAccess for MappedAccess {
    type Handle = MappedHandle;

    fn force_disk_first(&mut self) {
        self.disk_first = true;
    }

    fn mount(&mut self, path: &Path) -> Result<MappedHandle> {
        let mount_error = |reason: String| Error::Mount {
            path: path.to_path_buf(),
            reason,
        };

        // Spans from a previous mount do not apply to the new image.
        self.handles.clear();
        self.index = EntryIndex::default();
        self.mmap = None;

        let file = File::open(path).map_err(|e| mount_error(e.to_string()))?;
        let mmap = unsafe { Mmap::map(&file) }.map_err(|e| mount_error(e.to_string()))?;

        self.index = index_entries(&mmap, self.keys, path).map_err(|e| mount_error(e.to_string()))?;
        self.mmap = Some(mmap);

        debug!(archive = %path.display(), entries = self.index.len(), "indexed archive");
        Ok(self.issue(Source::Image))
    }

    fn open_entry(&mut self, name: &str, _flags: u32) -> Result<MappedHandle> {
        if let Some(file) = self.open_loose(name) {
            debug!(name, "opened loose file");
            return Ok(self.issue(Source::Loose(file)));
        }

        let span = self
            .index
            .get(name)
            .ok_or_else(|| Error::FileOpen(name.to_string()))?;
        Ok(self.issue(Source::Span(span)))
    }

    fn read(&mut self, handle: MappedHandle, buf: &mut [u8]) -> Result<usize> {
        let data: &[u8] = self.mmap.as_deref().unwrap_or(&[]);
        let cursor = self.handles.get_mut(&handle.0).ok_or_else(|| stale(handle))?;

        let count = match &mut cursor.source {
            Source::Image => read_at(data, cursor.position, buf),
            Source::Span(span) => {
                let bytes = data
                    .get(span.start..span.start + span.len)
                    .ok_or_else(|| stale(handle))?;
                read_at(bytes, cursor.position, buf)
            }
            Source::Loose(file) => {
                let mut filled = 0;
                while filled < buf.len() {
                    match file.read(&mut buf[filled..])? {
                        0 => break,
                        n => filled += n,
                    }
                }
                filled
            }
        };

        cursor.position += count as u64;
        Ok(count)
    }

    fn seek(&mut self, handle: MappedHandle, pos: SeekFrom) -> Result<u64> {
        let image_len = self.image().len() as u64;
        let cursor = self.handles.get_mut(&handle.0).ok_or_else(|| stale(handle))?;

        let target = match &mut cursor.source {
            Source::Image => resolve_seek(cursor.position, image_len, pos)?,
            Source::Span(span) => resolve_seek(cursor.position, span.len as u64, pos)?,
            Source::Loose(file) => file.seek(pos)?,
        };

        cursor.position = target;
        Ok(target)
    }

    fn close(&mut self, handle: MappedHandle) {
        self.handles.remove(&handle.0);
    }
}

/// Map every readable entry name to its payload span.
///
/// Entries whose record or payload falls outside the image are left out;
/// opening them later fails with a file-open error.
fn index_entries(data: &[u8], keys: KeyPair, path: &Path) -> Result<EntryIndex> {
    let mut slice = SliceAccess { data, position: 0 };
    let mut stream = ScopedHandle::mount(&mut slice, path)?;

    let header = read_archive_header(&mut stream, keys)?;
    let max_entries = u32::try_from(data.len() / ContentEntry::SIZE).unwrap_or(u32::MAX);
    let entries = read_content_table(&mut stream, keys, header.num_of_files(), max_entries)?;

    let mut index = EntryIndex::default();
    for (i, entry) in entries.iter().enumerate() {
        let offset = entry.file_offset() as usize;
        stream.seek(SeekFrom::Start(offset as u64))?;

        let record = match read_file_record(&mut stream, keys) {
            Ok(record) => record,
            Err(err) => {
                debug!(index = i, error = %err, "unreadable file record");
                continue;
            }
        };

        let start = offset + FileRecordHeader::SIZE + record.header().filename_length();
        let len = record.file_size() as usize;
        if start.checked_add(len).map_or(true, |end| end > data.len()) {
            debug!(index = i, name = record.name(), "payload outside image");
            continue;
        }

        index.insert(record.name(), Span { start, len });
    }

    Ok(index)
}

/// Single-stream backend over a byte slice, used while indexing.
struct SliceAccess<'a> {
    data: &'a [u8],
    position: u64,
}

impl RawArchiveAccess for SliceAccess<'_> {
    type Handle = ();

    fn force_disk_first(&mut self) {}

    fn mount(&mut self, _path: &Path) -> Result<()> {
        self.position = 0;
        Ok(())
    }

    fn open_entry(&mut self, name: &str, _flags: u32) -> Result<()> {
        Err(Error::FileOpen(name.to_string()))
    }

    fn read(&mut self, _handle: (), buf: &mut [u8]) -> Result<usize> {
        let count = read_at(self.data, self.position, buf);
        self.position += count as u64;
        Ok(count)
    }

    fn seek(&mut self, _handle: (), pos: SeekFrom) -> Result<u64> {
        self.position = resolve_seek(self.position, self.data.len() as u64, pos)?;
        Ok(self.position)
    }

    fn close(&mut self, _handle: ()) {}
}
