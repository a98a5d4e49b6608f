//! Per-entry file extraction.
//!
//! Each content entry points at a file record. The record header and the
//! filename are decrypted separately (the filename length is only known once
//! the header is read), the named entry is opened through the backend, and
//! its plaintext payload is streamed through the shared [`GrowableBuffer`]
//! to disk.

use std::fs;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use dta_common::BinaryReader;
use tracing::{debug, warn};

use crate::access::{RawArchiveAccess, ScopedHandle, DEFAULT_OPEN_FLAGS};
use crate::buffer::GrowableBuffer;
use crate::format::{ContentEntry, FileRecordHeader, MAX_FILENAME_LEN};
use crate::options::{ErrorPolicy, ExtractOptions};
use crate::{Error, KeyPair, Result};

/// A decrypted file record: header plus filename.
#[derive(Debug, Clone)]
pub struct FileRecord {
    header: FileRecordHeader,
    name: String,
}

impl FileRecord {
    /// Name inside the archive, with `\` separators.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Payload size in bytes.
    #[inline]
    pub fn file_size(&self) -> u32 {
        self.header.file_size()
    }

    /// The decrypted record header.
    #[inline]
    pub fn header(&self) -> &FileRecordHeader {
        &self.header
    }
}

/// A file written to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedFile {
    /// Position in the content table
    pub index: usize,
    /// Name inside the archive
    pub name: String,
    /// Where the payload was written
    pub path: PathBuf,
    /// Bytes written
    pub size: u64,
}

/// Summary of an extraction run.
#[derive(Debug, Default)]
pub struct ExtractReport {
    /// Files written, in table order
    pub extracted: Vec<ExtractedFile>,
    /// Entries rejected by the filter
    pub skipped: usize,
    /// Entry failures recorded under [`ErrorPolicy::Continue`]
    pub failures: Vec<Error>,
}

impl ExtractReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Total payload bytes written.
    pub fn bytes_written(&self) -> u64 {
        self.extracted.iter().map(|f| f.size).sum()
    }
}

/// Progress notification for a single entry.
#[derive(Debug)]
pub enum EntryEvent<'a> {
    Extracted(&'a ExtractedFile),
    Skipped { index: usize, name: &'a str },
    Failed(&'a Error),
}

enum Outcome {
    Extracted(ExtractedFile),
    Skipped(String),
}

/// Read and decrypt the file record at the current stream position.
pub fn read_file_record<A: RawArchiveAccess>(
    stream: &mut ScopedHandle<'_, A>,
    keys: KeyPair,
) -> Result<FileRecord> {
    let mut raw = [0u8; FileRecordHeader::SIZE];
    stream.read_exact(&mut raw)?;
    keys.apply(&mut raw);

    let header: FileRecordHeader = BinaryReader::new(&raw).read_struct()?;
    let name = read_filename(stream, keys, header.filename_length())?;

    Ok(FileRecord { header, name })
}

/// Read and decrypt a filename of `length` bytes.
pub fn read_filename<A: RawArchiveAccess>(
    stream: &mut ScopedHandle<'_, A>,
    keys: KeyPair,
    length: usize,
) -> Result<String> {
    if length > MAX_FILENAME_LEN {
        return Err(Error::FilenameTooLong {
            length,
            max: MAX_FILENAME_LEN,
        });
    }

    let mut raw = [0u8; MAX_FILENAME_LEN];
    let raw = &mut raw[..length];
    stream.read_exact(raw)?;
    keys.apply(raw);

    Ok(BinaryReader::new(raw).read_name(length)?)
}

/// Resolve an archive name to a path below `root`.
///
/// Both `\` and `/` separate directories. Empty and `.` components are
/// dropped; rooted names, `..` and drive prefixes are rejected.
pub fn output_path(root: &Path, name: &str) -> Result<PathBuf> {
    let unsafe_path = || Error::UnsafePath(name.to_string());

    if name.starts_with(|c: char| c == '\\' || c == '/') {
        return Err(unsafe_path());
    }

    let mut path = root.to_path_buf();
    let mut depth = 0usize;

    for component in name.split(|c: char| c == '\\' || c == '/') {
        match component {
            "" | "." => {}
            ".." => return Err(unsafe_path()),
            c if c.contains(':') => return Err(unsafe_path()),
            c => {
                path.push(c);
                depth += 1;
            }
        }
    }

    if depth == 0 {
        return Err(unsafe_path());
    }
    Ok(path)
}

/// Extracts content entries using a shared payload buffer.
pub struct Extractor<'s> {
    keys: KeyPair,
    options: &'s ExtractOptions,
    buffer: &'s mut GrowableBuffer,
}

impl<'s> Extractor<'s> {
    pub fn new(keys: KeyPair, options: &'s ExtractOptions, buffer: &'s mut GrowableBuffer) -> Self {
        Self {
            keys,
            options,
            buffer,
        }
    }

    /// Extract every entry in table order.
    pub fn extract_all<A, F>(
        &mut self,
        stream: &mut ScopedHandle<'_, A>,
        entries: &[ContentEntry],
        mut on_entry: F,
    ) -> Result<ExtractReport>
    where
        A: RawArchiveAccess,
        F: FnMut(EntryEvent<'_>),
    {
        let mut report = ExtractReport::default();

        for (index, entry) in entries.iter().enumerate() {
            match self.extract_entry(stream, index, entry) {
                Ok(Outcome::Extracted(file)) => {
                    on_entry(EntryEvent::Extracted(&file));
                    report.extracted.push(file);
                }
                Ok(Outcome::Skipped(name)) => {
                    on_entry(EntryEvent::Skipped {
                        index,
                        name: &name,
                    });
                    report.skipped += 1;
                }
                Err(err) => {
                    on_entry(EntryEvent::Failed(&err));
                    match self.options.policy {
                        ErrorPolicy::FailFast => return Err(err),
                        ErrorPolicy::Continue => {
                            warn!(index, error = %err, "entry failed, continuing");
                            report.failures.push(err);
                        }
                    }
                }
            }
        }

        Ok(report)
    }

    fn extract_entry<A: RawArchiveAccess>(
        &mut self,
        stream: &mut ScopedHandle<'_, A>,
        index: usize,
        entry: &ContentEntry,
    ) -> Result<Outcome> {
        let record = seek_record(stream, self.keys, entry)
            .map_err(|e| e.in_entry(index, hint_name(entry)))?;

        if !self.options.accepts(record.name()) {
            debug!(index, name = record.name(), "skipped by filter");
            return Ok(Outcome::Skipped(record.name));
        }

        self.extract_record(stream, index, &record)
            .map(Outcome::Extracted)
            .map_err(|e| e.in_entry(index, record.name()))
    }

    fn extract_record<A: RawArchiveAccess>(
        &mut self,
        stream: &mut ScopedHandle<'_, A>,
        index: usize,
        record: &FileRecord,
    ) -> Result<ExtractedFile> {
        let size = record.file_size() as usize;

        // Closed on drop, whichever step below fails.
        let mut entry = stream.open_entry(record.name(), DEFAULT_OPEN_FLAGS)?;

        self.buffer.ensure_capacity(size)?;
        entry.read_exact(self.buffer.prefix_mut(size)?)?;

        let path = output_path(&self.options.output_dir, record.name())?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        self.buffer.write_out(size, &path)?;

        debug!(index, name = record.name(), size, path = %path.display(), "extracted");
        Ok(ExtractedFile {
            index,
            name: record.name.clone(),
            path,
            size: size as u64,
        })
    }
}

/// Read the file record of every entry without opening any entry.
pub fn list_records<A: RawArchiveAccess>(
    stream: &mut ScopedHandle<'_, A>,
    keys: KeyPair,
    entries: &[ContentEntry],
) -> Result<Vec<FileRecord>> {
    entries
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            seek_record(stream, keys, entry).map_err(|e| e.in_entry(index, hint_name(entry)))
        })
        .collect()
}

fn seek_record<A: RawArchiveAccess>(
    stream: &mut ScopedHandle<'_, A>,
    keys: KeyPair,
    entry: &ContentEntry,
) -> Result<FileRecord> {
    stream.seek(SeekFrom::Start(entry.file_offset() as u64))?;
    read_file_record(stream, keys)
}

/// Best-effort name for an entry whose record could not be read.
fn hint_name(entry: &ContentEntry) -> String {
    let hint = entry.filename_hint();
    let end = hint.iter().position(|&b| b == 0).unwrap_or(hint.len());
    String::from_utf8_lossy(&hint[..end]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{read_archive_header, read_content_table};
    use crate::writer::{ArchiveWriter, BuiltArchive};
    use crate::{ErrorCategory, MemoryAccess};

    const KEYS: KeyPair = KeyPair::new(0x10ACB252, 0x5D805259);

    fn two_file_archive() -> BuiltArchive {
        ArchiveWriter::new(KEYS)
            .file("models\\tree.4ds", b"tree model bytes".to_vec())
            .file("maps\\city\\scene2.bin", vec![0xAB; 3000])
            .build()
            .unwrap()
    }

    fn run(
        access: &mut MemoryAccess,
        options: &ExtractOptions,
        buffer: &mut GrowableBuffer,
    ) -> Result<ExtractReport> {
        let mut stream = ScopedHandle::mount(access, Path::new("Models.dta"))?;
        let header = read_archive_header(&mut stream, KEYS)?;
        let entries = read_content_table(&mut stream, KEYS, header.num_of_files(), 64)?;

        Extractor::new(KEYS, options, buffer).extract_all(&mut stream, &entries, |_| {})
    }

    #[test]
    fn test_extracts_two_entries() {
        let dir = tempfile::tempdir().unwrap();
        let built = two_file_archive();
        let mut access = MemoryAccess::new(built.image).with_entries(built.entries.clone());
        let options = ExtractOptions::default().with_output_dir(dir.path());
        let mut buffer = GrowableBuffer::new(16).unwrap();

        let report = run(&mut access, &options, &mut buffer).unwrap();

        assert!(report.is_success());
        assert_eq!(report.extracted.len(), 2);
        for ((name, payload), file) in built.entries.iter().zip(&report.extracted) {
            assert_eq!(&file.name, name);
            assert_eq!(file.size, payload.len() as u64);
            assert_eq!(&fs::read(&file.path).unwrap(), payload);
        }
        assert_eq!(
            report.extracted[1].path,
            dir.path().join("maps").join("city").join("scene2.bin")
        );
        assert_eq!(buffer.last_write(), Some(3000));
        assert!(buffer.capacity() >= 3000);
        assert_eq!(report.bytes_written(), 16 + 3000);
    }

    #[test]
    fn test_every_opened_entry_is_closed() {
        let dir = tempfile::tempdir().unwrap();
        let built = two_file_archive();

        // The second payload is shorter than its record claims.
        let mut entries = built.entries.clone();
        entries[1].1.truncate(10);
        let mut access = MemoryAccess::new(built.image).with_entries(entries);

        let options = ExtractOptions::default()
            .with_output_dir(dir.path())
            .with_policy(ErrorPolicy::Continue);
        let mut buffer = GrowableBuffer::new(16).unwrap();

        let report = run(&mut access, &options, &mut buffer).unwrap();
        assert_eq!(report.extracted.len(), 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].category(), ErrorCategory::Io);

        let stats = access.stats();
        for (name, _) in &built.entries {
            assert_eq!(stats.opens[name], 1, "{name} opens");
            assert_eq!(stats.closes[name], 1, "{name} closes");
        }
        assert_eq!(stats.open_handles(), 0);
    }

    #[test]
    fn test_buffer_limit_closes_opened_entry() {
        let dir = tempfile::tempdir().unwrap();
        let built = two_file_archive();
        let mut access = MemoryAccess::new(built.image).with_entries(built.entries);
        let options = ExtractOptions::default()
            .with_output_dir(dir.path())
            .with_policy(ErrorPolicy::Continue);
        let mut buffer = GrowableBuffer::with_limit(16, 1024).unwrap();

        let report = run(&mut access, &options, &mut buffer).unwrap();

        assert_eq!(report.extracted.len(), 1);
        assert_eq!(report.failures.len(), 1);
        assert!(matches!(
            report.failures[0].root(),
            Error::Allocation { requested: 3000 }
        ));

        let stats = access.stats();
        assert_eq!(stats.opens["maps\\city\\scene2.bin"], 1);
        assert_eq!(stats.closes["maps\\city\\scene2.bin"], 1);
        assert_eq!(stats.open_handles(), 0);
        assert_eq!(buffer.capacity(), 16);
        assert!(!dir.path().join("maps").join("city").join("scene2.bin").exists());
    }

    #[test]
    fn test_fail_fast_stops_at_first_error() {
        let dir = tempfile::tempdir().unwrap();
        let built = ArchiveWriter::new(KEYS)
            .file("a.bin", b"a".to_vec())
            .file("b.bin", b"b".to_vec())
            .file("c.bin", b"c".to_vec())
            .build()
            .unwrap();
        let mut access = MemoryAccess::new(built.image)
            .with_entries(built.entries)
            .failing_open("b.bin");
        let options = ExtractOptions::default().with_output_dir(dir.path());
        let mut buffer = GrowableBuffer::new(16).unwrap();

        let err = run(&mut access, &options, &mut buffer).unwrap_err();

        assert!(matches!(err, Error::Entry { index: 1, .. }));
        assert_eq!(err.category(), ErrorCategory::FileOpen);
        assert!(dir.path().join("a.bin").exists());
        assert!(!dir.path().join("c.bin").exists());
        assert!(!access.stats().opens.contains_key("c.bin"));
    }

    #[test]
    fn test_continue_extracts_after_failure() {
        let dir = tempfile::tempdir().unwrap();
        let built = ArchiveWriter::new(KEYS)
            .file("a.bin", b"a".to_vec())
            .file("..\\escape.bin", b"x".to_vec())
            .file("c.bin", b"c".to_vec())
            .build()
            .unwrap();
        let mut access = MemoryAccess::new(built.image).with_entries(built.entries);
        let options = ExtractOptions::default()
            .with_output_dir(dir.path())
            .with_policy(ErrorPolicy::Continue);
        let mut buffer = GrowableBuffer::new(16).unwrap();

        let report = run(&mut access, &options, &mut buffer).unwrap();

        assert_eq!(report.extracted.len(), 2);
        assert_eq!(report.failures.len(), 1);
        assert!(matches!(report.failures[0].root(), Error::UnsafePath(_)));
        assert!(dir.path().join("c.bin").exists());
        assert_eq!(access.stats().closes["..\\escape.bin"], 1);
    }

    #[test]
    fn test_filter_skips_without_opening() {
        let dir = tempfile::tempdir().unwrap();
        let built = two_file_archive();
        let mut access = MemoryAccess::new(built.image).with_entries(built.entries);
        let options = ExtractOptions::default()
            .with_output_dir(dir.path())
            .with_filter(glob::Pattern::new("maps/**").unwrap());
        let mut buffer = GrowableBuffer::new(16).unwrap();

        let report = run(&mut access, &options, &mut buffer).unwrap();

        assert_eq!(report.extracted.len(), 1);
        assert_eq!(report.skipped, 1);
        assert!(!access.stats().opens.contains_key("models\\tree.4ds"));
    }

    #[test]
    fn test_filename_length_bounds() {
        let long_name = format!("d\\{}", "n".repeat(253));
        assert_eq!(long_name.len(), 255);

        let built = ArchiveWriter::new(KEYS)
            .file("", Vec::new())
            .file(long_name.clone(), b"x".to_vec())
            .build()
            .unwrap();
        let mut access = MemoryAccess::new(built.image);
        let mut stream = ScopedHandle::mount(&mut access, Path::new("t.dta")).unwrap();
        let header = read_archive_header(&mut stream, KEYS).unwrap();
        let entries = read_content_table(&mut stream, KEYS, header.num_of_files(), 64).unwrap();

        let records = list_records(&mut stream, KEYS, &entries).unwrap();
        assert_eq!(records[0].name(), "");
        assert_eq!(records[0].file_size(), 0);
        assert_eq!(records[1].name(), long_name);
    }

    #[test]
    fn test_filename_over_limit_rejected() {
        let mut access = MemoryAccess::new(vec![0u8; 512]);
        {
            let mut stream = ScopedHandle::mount(&mut access, Path::new("t.dta")).unwrap();
            let err = read_filename(&mut stream, KEYS, MAX_FILENAME_LEN + 1).unwrap_err();

            assert!(matches!(err, Error::FilenameTooLong { length: 257, max: 256 }));
            assert_eq!(err.category(), ErrorCategory::Format);
        }
        assert_eq!(access.stats().bytes_read, 0);
    }

    #[test]
    fn test_output_path() {
        let root = Path::new("out");

        assert_eq!(
            output_path(root, "maps\\city/scene2.bin").unwrap(),
            root.join("maps").join("city").join("scene2.bin")
        );
        assert_eq!(
            output_path(root, "a\\\\.\\b.bin").unwrap(),
            root.join("a").join("b.bin")
        );
        assert!(output_path(root, "..\\evil.bin").is_err());
        assert!(output_path(root, "\\abs.bin").is_err());
        assert!(output_path(root, "C:\\evil.bin").is_err());
        assert!(output_path(root, "").is_err());
    }

    #[test]
    fn test_hint_name_trims_padding() {
        let mut hint = [0u8; 16];
        hint[..5].copy_from_slice(b"a.bin");
        assert_eq!(hint_name(&ContentEntry::new(0, hint)), "a.bin");
    }
}
