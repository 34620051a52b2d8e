//! Source delta enumeration.
//!
//! The scanner lists the source tree and computes which files are not yet
//! covered by the checkpoint. It never mutates anything: given the same
//! checkpoint and the same source state, two scans produce the same plan.

use snafu::prelude::*;
use tracing::{debug, info};

use crate::checkpoint::Checkpoint;
use crate::error::{ScanError, SourceUnavailableSnafu};
use crate::storage::StorageProviderRef;

/// The pending work for one trigger: unprocessed source files in the order
/// they will be ingested.
#[derive(Debug, Clone)]
pub struct ScanPlan {
    pub files: Vec<String>,
}

impl ScanPlan {
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// The path that becomes the new high-water mark once this plan commits.
    pub fn high_water_mark(&self) -> Option<&str> {
        self.files.last().map(|s| s.as_str())
    }
}

/// Enumerates new source files relative to a checkpoint.
pub struct SourceScanner {
    storage: StorageProviderRef,
    extension: String,
}

impl SourceScanner {
    /// Create a scanner over the source location.
    pub fn new(storage: StorageProviderRef, extension: impl Into<String>) -> Self {
        Self {
            storage,
            extension: extension.into(),
        }
    }

    /// Compute the set of files not yet committed.
    ///
    /// Listing failures surface as `SourceUnavailable` and abort the
    /// trigger; they are not retried here.
    pub async fn scan(&self, checkpoint: Option<&Checkpoint>) -> Result<ScanPlan, ScanError> {
        let all_files = self
            .storage
            .list_sorted(&self.extension)
            .await
            .context(SourceUnavailableSnafu)?;
        debug!("Listed {} source files", all_files.len());

        let files: Vec<String> = match checkpoint {
            Some(checkpoint) => all_files
                .into_iter()
                .filter(|f| !checkpoint.is_file_committed(f))
                .collect(),
            None => all_files,
        };

        info!("{} source files pending ingestion", files.len());
        Ok(ScanPlan { files })
    }
}
