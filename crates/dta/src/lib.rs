//! DTA - extraction library for Hidden & Dangerous 2 and Mafia archives.
//!
//! This crate provides a unified interface to the DTA crates.
//!
//! # Crates
//!
//! - [`dta_common`] - Binary reading over decrypted blocks
//! - [`dta_archive`] - ISD0 archive parsing and extraction
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//!
//! use dta::prelude::*;
//!
//! let keys = KeyPair::new(0x65F7AB23, 0xEA85902A);
//! let options = ExtractOptions::default().with_output_dir("Others");
//! let mut session = Session::new(MappedAccess::new(keys), keys, options)?;
//!
//! for record in session.list(Path::new("Others.dta"))? {
//!     println!("{}: {} bytes", record.name(), record.file_size());
//! }
//! # Ok::<(), dta::archive::Error>(())
//! ```

pub use dta_archive as archive;
pub use dta_common as common;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use dta_archive::keys::{lookup, parse_key, KnownArchive};
    pub use dta_archive::{
        ErrorPolicy, ExtractOptions, ExtractReport, KeyPair, MappedAccess, RawArchiveAccess,
        Session,
    };
    pub use dta_common::BinaryReader;
}

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
