//! DTA archive reader for Hidden & Dangerous 2 and Mafia game files.
//!
//! A DTA archive starts with the `ISD0` magic, followed by an encrypted
//! header, an encrypted content table and one file record per entry. Every
//! structure is obscured with a symmetric XOR cipher keyed by a pair of
//! 32-bit words that differs per archive.
//!
//! Archive I/O goes through the [`RawArchiveAccess`] trait so that the
//! extractor can sit on top of whatever mount layer decodes the stream:
//!
//! - [`MappedAccess`] memory-maps a pre-decoded archive from disk
//! - [`MemoryAccess`] serves an in-memory image, mostly for tests
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//!
//! use dta_archive::{keys, ExtractOptions, MappedAccess, Session};
//!
//! let path = Path::new("Others.dta");
//! let known = keys::lookup(path).expect("retail archive");
//!
//! let options = ExtractOptions::default().with_output_dir("out");
//! let mut session = Session::new(MappedAccess::new(known.keys), known.keys, options)?;
//!
//! let report = session.extract(path)?;
//! println!("{} files, {} bytes", report.extracted.len(), report.bytes_written());
//! # Ok::<(), dta_archive::Error>(())
//! ```

mod access;
mod buffer;
mod cipher;
mod error;
mod extract;
pub mod format;
pub mod keys;
mod mapped;
mod memory;
mod options;
mod parser;
mod session;
mod writer;

pub use access::{RawArchiveAccess, ScopedHandle, DEFAULT_OPEN_FLAGS};
pub use buffer::{GrowableBuffer, DEFAULT_BUFFER_CAPACITY, DEFAULT_MAX_BUFFER_CAPACITY};
pub use cipher::{decrypt, KeyPair};
pub use error::{Error, ErrorCategory, Result};
pub use extract::{
    list_records, output_path, read_file_record, read_filename, EntryEvent, ExtractReport,
    ExtractedFile, Extractor, FileRecord,
};
pub use mapped::{MappedAccess, MappedHandle};
pub use memory::{AccessStats, MemoryAccess, MemoryHandle};
pub use options::{ErrorPolicy, ExtractOptions, DEFAULT_MAX_ENTRIES};
pub use parser::{read_archive_header, read_content_table};
pub use session::{MountedArchive, Session};
pub use writer::{ArchiveWriter, BuiltArchive};
