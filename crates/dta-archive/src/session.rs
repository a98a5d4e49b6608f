//! Extraction session.
//!
//! A [`Session`] owns the backend, the key pair, the options and the payload
//! buffer. Mounting an archive yields a [`MountedArchive`] that holds the
//! archive stream open until it is dropped.

use std::path::Path;

use tracing::info;

use crate::access::{RawArchiveAccess, ScopedHandle};
use crate::buffer::GrowableBuffer;
use crate::extract::{list_records, EntryEvent, ExtractReport, Extractor, FileRecord};
use crate::format::{ArchiveHeader, ContentEntry};
use crate::options::ExtractOptions;
use crate::parser::{read_archive_header, read_content_table};
use crate::{KeyPair, Result};

/// Session state shared by every archive processed with it.
#[derive(Debug)]
pub struct Session<A: RawArchiveAccess> {
    access: A,
    keys: KeyPair,
    options: ExtractOptions,
    buffer: GrowableBuffer,
    primed: bool,
}

impl<A: RawArchiveAccess> Session<A> {
    /// Create a session. Allocates the payload buffer up front.
    pub fn new(access: A, keys: KeyPair, options: ExtractOptions) -> Result<Self> {
        let buffer = GrowableBuffer::with_limit(
            options.initial_buffer_capacity,
            options.max_buffer_capacity,
        )?;
        Ok(Self {
            access,
            keys,
            options,
            buffer,
            primed: false,
        })
    }

    #[inline]
    pub fn access(&self) -> &A {
        &self.access
    }

    #[inline]
    pub fn buffer(&self) -> &GrowableBuffer {
        &self.buffer
    }

    #[inline]
    pub fn options(&self) -> &ExtractOptions {
        &self.options
    }

    /// End the session and hand back the backend.
    pub fn into_access(self) -> A {
        self.access
    }

    /// Mount an archive, validate its header and read the content table.
    pub fn mount(&mut self, path: &Path) -> Result<MountedArchive<'_, A>> {
        if !self.primed {
            self.access.force_disk_first();
            self.primed = true;
        }

        let mut stream = ScopedHandle::mount(&mut self.access, path)?;
        let header = read_archive_header(&mut stream, self.keys)?;
        let entries = read_content_table(
            &mut stream,
            self.keys,
            header.num_of_files(),
            self.options.max_entries,
        )?;

        info!(
            archive = %path.display(),
            entries = entries.len(),
            "mounted archive"
        );

        Ok(MountedArchive {
            stream,
            header,
            entries,
            keys: self.keys,
            options: &self.options,
            buffer: &mut self.buffer,
        })
    }

    /// Mount `path` and extract every entry.
    pub fn extract(&mut self, path: &Path) -> Result<ExtractReport> {
        self.mount(path)?.extract()
    }

    /// Mount `path` and read every file record.
    pub fn list(&mut self, path: &Path) -> Result<Vec<FileRecord>> {
        self.mount(path)?.list()
    }
}

/// A mounted archive with its header and content table parsed.
pub struct MountedArchive<'s, A: RawArchiveAccess> {
    stream: ScopedHandle<'s, A>,
    header: ArchiveHeader,
    entries: Vec<ContentEntry>,
    keys: KeyPair,
    options: &'s ExtractOptions,
    buffer: &'s mut GrowableBuffer,
}

impl<A: RawArchiveAccess> MountedArchive<'_, A> {
    #[inline]
    pub fn header(&self) -> &ArchiveHeader {
        &self.header
    }

    #[inline]
    pub fn entries(&self) -> &[ContentEntry] {
        &self.entries
    }

    /// Extract every entry.
    pub fn extract(&mut self) -> Result<ExtractReport> {
        self.extract_with(|_| {})
    }

    /// Extract every entry, reporting each one to `on_entry`.
    pub fn extract_with<F>(&mut self, on_entry: F) -> Result<ExtractReport>
    where
        F: FnMut(EntryEvent<'_>),
    {
        let report = Extractor::new(self.keys, self.options, self.buffer).extract_all(
            &mut self.stream,
            &self.entries,
            on_entry,
        )?;

        info!(
            extracted = report.extracted.len(),
            skipped = report.skipped,
            failed = report.failures.len(),
            bytes = report.bytes_written(),
            "extraction finished"
        );
        Ok(report)
    }

    /// Read the file record of every entry that passes the filter.
    pub fn list(&mut self) -> Result<Vec<FileRecord>> {
        let mut records = list_records(&mut self.stream, self.keys, &self.entries)?;
        records.retain(|r| self.options.accepts(r.name()));
        Ok(records)
    }
}

impl<A: RawArchiveAccess> std::fmt::Debug for MountedArchive<'_, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MountedArchive")
            .field("header", &self.header)
            .field("entries", &self.entries.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::writer::ArchiveWriter;
    use crate::{ErrorCategory, ErrorPolicy, MemoryAccess};

    const KEYS: KeyPair = KeyPair::new(0xD8D0A975, 0x467ACDE0);

    #[test]
    fn test_end_to_end_two_entries() {
        let dir = tempfile::tempdir().unwrap();
        let built = ArchiveWriter::new(KEYS)
            .file("missions\\intro\\scene.bin", b"scene data".to_vec())
            .file("tables\\sound.def", vec![0x5A; 2048])
            .build()
            .unwrap();

        let access = MemoryAccess::new(built.image).with_entries(built.entries.clone());
        let options = ExtractOptions::default().with_output_dir(dir.path());
        let mut session = Session::new(access, KEYS, options).unwrap();

        let report = session.extract(Path::new("A0.dta")).unwrap();
        assert_eq!(report.extracted.len(), 2);

        let written: Vec<_> = walk(dir.path());
        assert_eq!(written.len(), 2);
        assert_eq!(
            fs::read(dir.path().join("missions/intro/scene.bin")).unwrap(),
            b"scene data"
        );
        assert_eq!(
            fs::read(dir.path().join("tables/sound.def")).unwrap(),
            vec![0x5A; 2048]
        );
        assert_eq!(session.buffer().last_write(), Some(2048));

        let access = session.into_access();
        assert_eq!(access.stats().disk_first_calls, 1);
        assert_eq!(access.stats().open_handles(), 0);
        assert_eq!(access.mounted_path(), Some(Path::new("A0.dta")));
    }

    #[test]
    fn test_disk_first_called_once_per_session() {
        let built = ArchiveWriter::new(KEYS).build().unwrap();
        let access = MemoryAccess::new(built.image);
        let mut session = Session::new(access, KEYS, ExtractOptions::default()).unwrap();

        session.list(Path::new("A1.dta")).unwrap();
        session.list(Path::new("A1.dta")).unwrap();

        assert_eq!(session.access().stats().disk_first_calls, 1);
        assert_eq!(session.access().stats().archive_closes, 2);
    }

    #[test]
    fn test_mount_failure() {
        let access = MemoryAccess::new(Vec::new()).failing_mount();
        let mut session = Session::new(access, KEYS, ExtractOptions::default()).unwrap();

        let err = session.extract(Path::new("missing.dta")).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Mount);
    }

    #[test]
    fn test_wrong_keys_fail_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let built = ArchiveWriter::new(KEYS)
            .file("a.bin", b"a".to_vec())
            .build()
            .unwrap();
        let access = MemoryAccess::new(built.image).with_entries(built.entries);
        let options = ExtractOptions::default()
            .with_output_dir(dir.path())
            .with_max_entries(64)
            .with_policy(ErrorPolicy::Continue);
        let mut session = Session::new(access, KeyPair::new(1, 2), options).unwrap();

        // Garbage entry counts are caught by the table ceiling or turn into
        // short reads; nothing is written either way.
        assert!(session.extract(Path::new("A0.dta")).is_err());
        assert!(walk(dir.path()).is_empty());
        assert_eq!(session.access().stats().open_handles(), 0);
    }

    #[test]
    fn test_oversized_payload_fails_fast() {
        let dir = tempfile::tempdir().unwrap();
        let built = ArchiveWriter::new(KEYS)
            .file("big.bin", vec![0x11; 4096])
            .build()
            .unwrap();
        let access = MemoryAccess::new(built.image).with_entries(built.entries);
        let options = ExtractOptions::default()
            .with_output_dir(dir.path())
            .with_max_buffer_capacity(2048);
        let mut session = Session::new(access, KEYS, options).unwrap();

        let err = session.extract(Path::new("A0.dta")).unwrap_err();

        assert_eq!(err.category(), ErrorCategory::Allocation);
        assert_eq!(session.buffer().limit(), 2048);
        assert_eq!(session.buffer().capacity(), 1024);
        assert_eq!(session.access().stats().open_handles(), 0);
        assert!(walk(dir.path()).is_empty());
    }

    #[test]
    fn test_list_applies_filter() {
        let built = ArchiveWriter::new(KEYS)
            .file("maps\\a.bin", b"a".to_vec())
            .file("models\\b.4ds", b"bb".to_vec())
            .build()
            .unwrap();
        let access = MemoryAccess::new(built.image);
        let options =
            ExtractOptions::default().with_filter(glob::Pattern::new("*.4ds").unwrap());
        let mut session = Session::new(access, KEYS, options).unwrap();

        let records = session.list(Path::new("A0.dta")).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name(), "models\\b.4ds");
        assert_eq!(records[0].file_size(), 2);
        assert!(session.access().stats().opens.is_empty());
    }

    fn walk(root: &Path) -> Vec<std::path::PathBuf> {
        let mut files = Vec::new();
        let mut pending = vec![root.to_path_buf()];
        while let Some(dir) = pending.pop() {
            for entry in fs::read_dir(dir).unwrap() {
                let path = entry.unwrap().path();
                if path.is_dir() {
                    pending.push(path);
                } else {
                    files.push(path);
                }
            }
        }
        files
    }
}
