//! Extraction options.

use std::path::PathBuf;

use glob::{MatchOptions, Pattern};

use crate::buffer::{DEFAULT_BUFFER_CAPACITY, DEFAULT_MAX_BUFFER_CAPACITY};

/// Default ceiling on the number of content table entries.
pub const DEFAULT_MAX_ENTRIES: u32 = 1 << 20;

/// What to do when a single entry fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorPolicy {
    /// Stop at the first failing entry and return its error.
    #[default]
    FailFast,
    /// Record the failure and carry on with the next entry.
    Continue,
}

/// Options for a session.
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    /// Directory that extracted paths are resolved against
    pub output_dir: PathBuf,
    /// Per-entry failure handling
    pub policy: ErrorPolicy,
    /// Largest content table accepted from the header
    pub max_entries: u32,
    /// Starting size of the payload buffer
    pub initial_buffer_capacity: usize,
    /// Largest payload the buffer may grow to
    pub max_buffer_capacity: usize,
    /// Only entries whose name matches are extracted or listed
    pub filter: Option<Pattern>,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            policy: ErrorPolicy::FailFast,
            max_entries: DEFAULT_MAX_ENTRIES,
            initial_buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            max_buffer_capacity: DEFAULT_MAX_BUFFER_CAPACITY,
            filter: None,
        }
    }
}

impl ExtractOptions {
    pub fn with_output_dir(mut self, output_dir: impl Into<PathBuf>) -> Self {
        self.output_dir = output_dir.into();
        self
    }

    pub fn with_policy(mut self, policy: ErrorPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_max_entries(mut self, max_entries: u32) -> Self {
        self.max_entries = max_entries;
        self
    }

    pub fn with_initial_buffer_capacity(mut self, capacity: usize) -> Self {
        self.initial_buffer_capacity = capacity;
        self
    }

    pub fn with_max_buffer_capacity(mut self, capacity: usize) -> Self {
        self.max_buffer_capacity = capacity;
        self
    }

    pub fn with_filter(mut self, filter: Pattern) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Whether an archive name passes the filter.
    ///
    /// Names are matched case-insensitively with `/` as the separator.
    pub fn accepts(&self, name: &str) -> bool {
        let Some(filter) = &self.filter else {
            return true;
        };

        let options = MatchOptions {
            case_sensitive: false,
            require_literal_separator: false,
            require_literal_leading_dot: false,
        };
        filter.matches_with(&name.replace('\\', "/"), options)
    }
}
