//! Checkpoint state serialization.

use serde::{Deserialize, Serialize};

/// Current checkpoint schema version.
pub const CHECKPOINT_SCHEMA_VERSION: u32 = 1;

/// Durable marker of the last successfully committed source position.
///
/// Source files are ingested in sorted path order, so a single high-water
/// mark identifies everything already committed: a file is ingested iff its
/// path sorts at or before `last_source_path`. `table_version` records the
/// table version produced by the commit that the mark refers to, and is
/// monotonic across triggers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Version of this checkpoint layout, for forward-compatible recovery.
    pub schema_version: u32,
    /// High-water mark: the last source path fully committed, if any.
    pub last_source_path: Option<String>,
    /// Table version produced by the commit this checkpoint refers to.
    pub table_version: i64,
}

impl Checkpoint {
    /// Create a checkpoint at the given position.
    pub fn new(last_source_path: Option<String>, table_version: i64) -> Self {
        Self {
            schema_version: CHECKPOINT_SCHEMA_VERSION,
            last_source_path,
            table_version,
        }
    }

    /// Check whether a source file is already covered by this checkpoint.
    pub fn is_file_committed(&self, path: &str) -> bool {
        match &self.last_source_path {
            Some(mark) => path <= mark.as_str(),
            None => false,
        }
    }

    /// Advance to a new position, never regressing either field.
    ///
    /// Replaying an already committed batch after a crash yields the current
    /// table version rather than a new one; taking the max keeps the
    /// checkpoint monotonic in that case.
    pub fn advanced(&self, last_source_path: Option<String>, table_version: i64) -> Self {
        let mark = match (&self.last_source_path, last_source_path) {
            (Some(current), Some(new)) if new.as_str() > current.as_str() => Some(new),
            (Some(current), _) => Some(current.clone()),
            (None, new) => new,
        };

        Self {
            schema_version: CHECKPOINT_SCHEMA_VERSION,
            last_source_path: mark,
            table_version: table_version.max(self.table_version),
        }
    }
}
