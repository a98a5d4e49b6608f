//! In-memory archive backend.
//!
//! Serves an archive image and a set of named payloads from memory. Every
//! open, close and read is recorded so callers can check handle hygiene.

use std::collections::{HashMap, HashSet};
use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use crate::access::{resolve_seek, RawArchiveAccess};
use crate::{Error, Result};

/// Handle issued by [`MemoryAccess`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemoryHandle(u32);

#[derive(Debug, Clone)]
enum Source {
    Image,
    Entry(String),
}

#[derive(Debug)]
struct Cursor {
    source: Source,
    position: u64,
}

/// Counters collected by [`MemoryAccess`].
#[derive(Debug, Default, Clone)]
pub struct AccessStats {
    /// Number of `force_disk_first` calls
    pub disk_first_calls: usize,
    /// Mount calls that succeeded
    pub mounts: usize,
    /// Bytes read through every handle
    pub bytes_read: u64,
    /// Successful opens per entry name
    pub opens: HashMap<String, usize>,
    /// Closes per entry name
    pub closes: HashMap<String, usize>,
    /// Closes of archive stream handles
    pub archive_closes: usize,
}

impl AccessStats {
    /// Handles issued and not yet closed.
    pub fn open_handles(&self) -> usize {
        let opened: usize = self.opens.values().sum::<usize>() + self.mounts;
        let closed: usize = self.closes.values().sum::<usize>() + self.archive_closes;
        opened.saturating_sub(closed)
    }
}

/// Archive backend over bytes held in memory.
#[derive(Debug, Default)]
pub struct MemoryAccess {
    image: Vec<u8>,
    entries: HashMap<String, Vec<u8>>,
    mounted: Option<PathBuf>,
    handles: HashMap<u32, Cursor>,
    next_handle: u32,
    disk_first: bool,
    fail_mount: bool,
    fail_open: HashSet<String>,
    stats: AccessStats,
}

impl MemoryAccess {
    /// Create a backend serving `image` as the archive stream.
    pub fn new(image: Vec<u8>) -> Self {
        Self {
            image,
            ..Default::default()
        }
    }

    /// Register a payload served by `open_entry(name)`.
    pub fn with_entry(mut self, name: impl Into<String>, payload: Vec<u8>) -> Self {
        self.entries.insert(name.into(), payload);
        self
    }

    /// Register every payload in `entries`.
    pub fn with_entries<I, S>(mut self, entries: I) -> Self
    where
        I: IntoIterator<Item = (S, Vec<u8>)>,
        S: Into<String>,
    {
        self.entries
            .extend(entries.into_iter().map(|(name, data)| (name.into(), data)));
        self
    }

    /// Make every mount attempt fail.
    pub fn failing_mount(mut self) -> Self {
        self.fail_mount = true;
        self
    }

    /// Make opening `name` fail even if a payload exists.
    pub fn failing_open(mut self, name: impl Into<String>) -> Self {
        self.fail_open.insert(name.into());
        self
    }

    /// Collected counters.
    pub fn stats(&self) -> &AccessStats {
        &self.stats
    }

    /// Whether `force_disk_first` has been called.
    pub fn is_disk_first(&self) -> bool {
        self.disk_first
    }

    /// Path of the mounted archive, if any.
    pub fn mounted_path(&self) -> Option<&Path> {
        self.mounted.as_deref()
    }

    fn issue(&mut self, source: Source) -> MemoryHandle {
        let id = self.next_handle;
        self.next_handle += 1;
        self.handles.insert(
            id,
            Cursor {
                source,
                position: 0,
            },
        );
        MemoryHandle(id)
    }

    fn bytes_of(&self, source: &Source) -> &[u8] {
        match source {
            Source::Image => &self.image,
            Source::Entry(name) => self.entries.get(name).map(Vec::as_slice).unwrap_or(&[]),
        }
    }
}

fn stale(handle: MemoryHandle) -> Error {
    Error::Io(std::io::Error::new(
        std::io::ErrorKind::InvalidInput,
        format!("stale handle {:?}", handle),
    ))
}

impl RawArchiveAccess for MemoryAccess {
    type Handle = MemoryHandle;

    fn force_disk_first(&mut self) {
        self.disk_first = true;
        self.stats.disk_first_calls += 1;
    }

    fn mount(&mut self, path: &Path) -> Result<MemoryHandle> {
        if self.fail_mount {
            return Err(Error::Mount {
                path: path.to_path_buf(),
                reason: "mount rejected".to_string(),
            });
        }

        self.mounted = Some(path.to_path_buf());
        self.stats.mounts += 1;
        Ok(self.issue(Source::Image))
    }

    fn open_entry(&mut self, name: &str, _flags: u32) -> Result<MemoryHandle> {
        if self.fail_open.contains(name) || !self.entries.contains_key(name) {
            return Err(Error::FileOpen(name.to_string()));
        }

        *self.stats.opens.entry(name.to_string()).or_default() += 1;
        Ok(self.issue(Source::Entry(name.to_string())))
    }

    fn read(&mut self, handle: MemoryHandle, buf: &mut [u8]) -> Result<usize> {
        let cursor = self.handles.get(&handle.0).ok_or_else(|| stale(handle))?;
        let data = self.bytes_of(&cursor.source);

        let start = usize::try_from(cursor.position)
            .unwrap_or(usize::MAX)
            .min(data.len());
        let count = buf.len().min(data.len() - start);
        buf[..count].copy_from_slice(&data[start..start + count]);

        if let Some(cursor) = self.handles.get_mut(&handle.0) {
            cursor.position += count as u64;
        }
        self.stats.bytes_read += count as u64;
        Ok(count)
    }

    fn seek(&mut self, handle: MemoryHandle, pos: SeekFrom) -> Result<u64> {
        let cursor = self.handles.get(&handle.0).ok_or_else(|| stale(handle))?;
        let len = self.bytes_of(&cursor.source).len() as u64;
        let target = resolve_seek(cursor.position, len, pos)?;

        if let Some(cursor) = self.handles.get_mut(&handle.0) {
            cursor.position = target;
        }
        Ok(target)
    }

    fn close(&mut self, handle: MemoryHandle) {
        match self.handles.remove(&handle.0).map(|c| c.source) {
            Some(Source::Entry(name)) => *self.stats.closes.entry(name).or_default() += 1,
            Some(Source::Image) => self.stats.archive_closes += 1,
            None => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::ScopedHandle;

    #[test]
    fn test_read_and_seek() {
        let mut access = MemoryAccess::new(b"ISD0payload".to_vec());
        let mut stream = ScopedHandle::mount(&mut access, Path::new("a.dta")).unwrap();

        let mut magic = [0u8; 4];
        stream.read_exact(&mut magic).unwrap();
        assert_eq!(&magic, b"ISD0");

        stream.seek(SeekFrom::End(-4)).unwrap();
        let mut tail = [0u8; 4];
        stream.read_exact(&mut tail).unwrap();
        assert_eq!(&tail, b"load");
    }

    #[test]
    fn test_short_read_is_error() {
        let mut access = MemoryAccess::new(vec![1, 2, 3]);
        let mut stream = ScopedHandle::mount(&mut access, Path::new("a.dta")).unwrap();

        let mut buf = [0u8; 8];
        assert!(matches!(
            stream.read_exact(&mut buf),
            Err(Error::ShortRead { requested: 8, actual: 3 })
        ));
    }

    #[test]
    fn test_scoped_handles_close_on_drop() {
        let mut access = MemoryAccess::new(Vec::new()).with_entry("x.bin", vec![7; 4]);
        {
            let mut stream = ScopedHandle::mount(&mut access, Path::new("a.dta")).unwrap();
            let mut entry = stream.open_entry("x.bin", 0).unwrap();
            let mut buf = [0u8; 4];
            entry.read_exact(&mut buf).unwrap();
            assert_eq!(buf, [7; 4]);
        }

        assert_eq!(access.stats().opens["x.bin"], 1);
        assert_eq!(access.stats().closes["x.bin"], 1);
        assert_eq!(access.stats().archive_closes, 1);
        assert_eq!(access.stats().open_handles(), 0);
    }

    #[test]
    fn test_open_failures() {
        let mut access = MemoryAccess::new(Vec::new())
            .with_entry("x.bin", vec![])
            .failing_open("x.bin");

        assert!(matches!(access.open_entry("x.bin", 0), Err(Error::FileOpen(_))));
        assert!(matches!(access.open_entry("missing", 0), Err(Error::FileOpen(_))));
        assert!(access.stats().opens.is_empty());
    }

    #[test]
    fn test_failing_mount() {
        let mut access = MemoryAccess::new(Vec::new()).failing_mount();
        assert!(matches!(
            access.mount(Path::new("a.dta")),
            Err(Error::Mount { .. })
        ));
    }
}
