//! Internal events for metrics emission.
//!
//! Each event struct represents a measurable occurrence in the trigger.
//! Events implement the `InternalEvent` trait, which records the
//! corresponding counter or histogram.

use metrics::{counter, histogram};
use std::time::Duration;
use tracing::trace;

/// Trait for internal events that can be emitted as metrics.
pub trait InternalEvent {
    /// Emit this event as a metric.
    fn emit(self);
}

/// Event emitted when records are appended to the table.
pub struct RecordsIngested {
    pub count: u64,
}

impl InternalEvent for RecordsIngested {
    fn emit(self) {
        trace!(count = self.count, "Records ingested");
        counter!("snowdrift_records_ingested_total").increment(self.count);
    }
}

/// Event emitted when source bytes are read.
pub struct BytesRead {
    pub bytes: u64,
}

impl InternalEvent for BytesRead {
    fn emit(self) {
        trace!(bytes = self.bytes, "Bytes read");
        counter!("snowdrift_bytes_read_total").increment(self.bytes);
    }
}

/// Event emitted when data file bytes are uploaded.
pub struct BytesWritten {
    pub bytes: u64,
}

impl InternalEvent for BytesWritten {
    fn emit(self) {
        trace!(bytes = self.bytes, "Bytes written");
        counter!("snowdrift_bytes_written_total").increment(self.bytes);
    }
}

/// Status of a scanned source file.
#[derive(Debug, Clone, Copy)]
pub enum FileStatus {
    Success,
    Empty,
}

impl FileStatus {
    fn as_str(&self) -> &'static str {
        match self {
            FileStatus::Success => "success",
            FileStatus::Empty => "empty",
        }
    }
}

/// Event emitted when a source file is ingested.
pub struct SourceFileIngested {
    pub status: FileStatus,
}

impl InternalEvent for SourceFileIngested {
    fn emit(self) {
        trace!(status = self.status.as_str(), "Source file ingested");
        counter!("snowdrift_source_files_total", "status" => self.status.as_str()).increment(1);
    }
}

/// Event emitted when an append commit to the table completes.
pub struct DeltaCommitCompleted {
    pub duration: Duration,
}

impl InternalEvent for DeltaCommitCompleted {
    fn emit(self) {
        trace!(duration_ms = self.duration.as_millis() as u64, "Commit completed");
        counter!("snowdrift_commits_total").increment(1);
        histogram!("snowdrift_commit_duration_seconds").record(self.duration.as_secs_f64());
    }
}

/// Event emitted when the checkpoint is advanced.
pub struct CheckpointCommitted {
    pub table_version: i64,
}

impl InternalEvent for CheckpointCommitted {
    fn emit(self) {
        trace!(table_version = self.table_version, "Checkpoint committed");
        counter!("snowdrift_checkpoints_committed_total").increment(1);
    }
}

/// Event emitted when staged files are skipped as already committed.
pub struct DuplicatesSkipped {
    pub count: u64,
}

impl InternalEvent for DuplicatesSkipped {
    fn emit(self) {
        trace!(count = self.count, "Duplicate files skipped");
        counter!("snowdrift_duplicate_files_skipped_total").increment(self.count);
    }
}
