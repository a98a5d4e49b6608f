//! Raw archive access boundary.
//!
//! The DTA stream itself is produced by whatever mounts the archive; this
//! crate only needs handle-based read and seek primitives over the decoded
//! bytes. [`RawArchiveAccess`] is that boundary and [`ScopedHandle`] is the
//! guard that guarantees every handle is closed exactly once.

use std::io::SeekFrom;
use std::path::Path;

use crate::{Error, Result};

/// Flags passed to [`RawArchiveAccess::open_entry`]. Always zero in practice.
pub const DEFAULT_OPEN_FLAGS: u32 = 0;

/// Handle-based access to a mounted archive.
pub trait RawArchiveAccess {
    /// Handle to an open stream.
    type Handle: Copy + std::fmt::Debug;

    /// Prefer loose files on disk over archive contents.
    ///
    /// Called once per session before any other operation.
    fn force_disk_first(&mut self);

    /// Mount the archive at `path` and open its own stream.
    fn mount(&mut self, path: &Path) -> Result<Self::Handle>;

    /// Open a named entry inside the mounted archive.
    fn open_entry(&mut self, name: &str, flags: u32) -> Result<Self::Handle>;

    /// Read up to `buf.len()` bytes, returning how many were read.
    fn read(&mut self, handle: Self::Handle, buf: &mut [u8]) -> Result<usize>;

    /// Move the stream position, returning the new absolute position.
    fn seek(&mut self, handle: Self::Handle, pos: SeekFrom) -> Result<u64>;

    /// Release a handle.
    fn close(&mut self, handle: Self::Handle);
}

/// An open handle that is closed when dropped.
///
/// Entry handles are opened from the archive handle and reborrow its
/// backend, so an entry must be finished before the archive stream is used
/// again.
pub struct ScopedHandle<'a, A: RawArchiveAccess> {
    access: &'a mut A,
    handle: A::Handle,
}

impl<'a, A: RawArchiveAccess> ScopedHandle<'a, A> {
    /// Mount an archive and take ownership of its stream handle.
    pub fn mount(access: &'a mut A, path: &Path) -> Result<Self> {
        let handle = access.mount(path)?;
        Ok(Self { access, handle })
    }

    /// Open a named entry on `access`.
    pub fn open(access: &'a mut A, name: &str, flags: u32) -> Result<Self> {
        let handle = access.open_entry(name, flags)?;
        Ok(Self { access, handle })
    }

    /// Open a named entry on the same backend as this handle.
    pub fn open_entry(&mut self, name: &str, flags: u32) -> Result<ScopedHandle<'_, A>> {
        ScopedHandle::open(&mut *self.access, name, flags)
    }

    /// The raw backend handle.
    #[inline]
    pub fn raw(&self) -> A::Handle {
        self.handle
    }

    /// Read exactly `buf.len()` bytes. A short count is an error.
    pub fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        if buf.is_empty() {
            return Ok(());
        }

        let actual = self.access.read(self.handle, buf)?;
        if actual != buf.len() {
            return Err(Error::ShortRead {
                requested: buf.len(),
                actual,
            });
        }
        Ok(())
    }

    /// Seek the underlying stream.
    pub fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        self.access.seek(self.handle, pos)
    }

    /// Current absolute stream position.
    pub fn position(&mut self) -> Result<u64> {
        self.seek(SeekFrom::Current(0))
    }
}

impl<A: RawArchiveAccess> Drop for ScopedHandle<'_, A> {
    fn drop(&mut self) {
        self.access.close(self.handle);
    }
}

impl<A: RawArchiveAccess> std::fmt::Debug for ScopedHandle<'_, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopedHandle")
            .field("handle", &self.handle)
            .finish()
    }
}

/// Cursor arithmetic shared by the in-process backends.
pub(crate) fn resolve_seek(position: u64, len: u64, pos: SeekFrom) -> Result<u64> {
    let target = match pos {
        SeekFrom::Start(offset) => Some(offset),
        SeekFrom::Current(delta) => position.checked_add_signed(delta),
        SeekFrom::End(delta) => len.checked_add_signed(delta),
    };

    target.ok_or_else(|| {
        Error::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "seek to a negative or overflowing position",
        ))
    })
}
