//! Common utilities for the DTA unpacker.
//!
//! This crate provides the foundational pieces shared by the archive crates:
//!
//! - [`BinaryReader`] - Zero-copy cursor over decrypted byte blocks
//! - [`Error`] - Errors raised while interpreting those blocks

mod error;
mod reader;

pub use error::{Error, Result};
pub use reader::BinaryReader;
