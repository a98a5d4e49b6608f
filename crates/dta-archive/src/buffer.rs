//! Reusable payload buffer.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::{Error, Result};

/// Initial capacity of a fresh buffer.
pub const DEFAULT_BUFFER_CAPACITY: usize = 1024;

/// Largest payload a buffer grows to unless configured otherwise.
pub const DEFAULT_MAX_BUFFER_CAPACITY: usize = 256 * 1024 * 1024;

/// Scratch buffer shared by every entry of a session.
///
/// Capacity only grows, up to a fixed limit. Contents are not preserved meaningfully between
/// entries; each entry overwrites the prefix it needs.
#[derive(Debug)]
pub struct GrowableBuffer {
    storage: Vec<u8>,
    limit: usize,
    last_write: Option<usize>,
}

impl GrowableBuffer {
    /// Allocate a buffer of `capacity` zeroed bytes, limited to
    /// [`DEFAULT_MAX_BUFFER_CAPACITY`].
    pub fn new(capacity: usize) -> Result<Self> {
        Self::with_limit(capacity, DEFAULT_MAX_BUFFER_CAPACITY)
    }

    /// Allocate a buffer of `capacity` zeroed bytes that never grows past `limit`.
    pub fn with_limit(capacity: usize, limit: usize) -> Result<Self> {
        let mut buffer = Self {
            storage: Vec::new(),
            limit,
            last_write: None,
        };
        buffer.ensure_capacity(capacity)?;
        Ok(buffer)
    }

    /// Usable size in bytes.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    /// Largest capacity this buffer may reach.
    #[inline]
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Byte count of the most recent `write_out`.
    #[inline]
    pub fn last_write(&self) -> Option<usize> {
        self.last_write
    }

    /// Grow to at least `n` bytes. Never shrinks.
    ///
    /// Requests above the limit fail without allocating.
    pub fn ensure_capacity(&mut self, n: usize) -> Result<()> {
        if self.storage.len() >= n {
            return Ok(());
        }
        if n > self.limit {
            return Err(Error::Allocation { requested: n });
        }

        let additional = n - self.storage.len();
        self.storage
            .try_reserve_exact(additional)
            .map_err(|_| Error::Allocation { requested: n })?;
        self.storage.resize(n, 0);
        Ok(())
    }

    /// Mutable view of the first `n` bytes.
    pub fn prefix_mut(&mut self, n: usize) -> Result<&mut [u8]> {
        let capacity = self.storage.len();
        self.storage.get_mut(..n).ok_or(Error::BufferOverrun {
            requested: n,
            capacity,
        })
    }

    /// Write the first `n` bytes to `path`, replacing any existing file.
    pub fn write_out(&mut self, n: usize, path: &Path) -> Result<()> {
        let bytes = self.storage.get(..n).ok_or(Error::BufferOverrun {
            requested: n,
            capacity: self.storage.len(),
        })?;

        let mut file = File::create(path)?;
        file.write_all(bytes)?;
        file.flush()?;

        self.last_write = Some(n);
        Ok(())
    }
}
