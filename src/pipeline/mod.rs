//! Trigger orchestration.
//!
//! One trigger is a single pass through a fixed sequence of phases:
//!
//! ```text
//! Idle -> Scanning -> Writing -> Checkpointing -> Idle
//! ```
//!
//! Scanning enumerates source files past the checkpoint, Writing stages and
//! commits them to the table as one atomic append, and Checkpointing
//! advances the durable high-water mark. A failure in any phase ends the
//! run without advancing the checkpoint, so the next trigger replays the
//! same work and the committer's idempotent writes absorb anything that
//! already landed.
//!
//! There is exactly one writer: triggers never overlap, and each phase
//! starts only after the previous one fully completed.

use snafu::prelude::*;
use std::sync::Arc;
use tracing::{debug, info};

use crate::checkpoint::{Checkpoint, CheckpointStore};
use crate::config::{Config, PARTITION_COLUMNS};
use crate::emit;
use crate::error::{
    CheckpointSnafu, CommitSnafu, ConfigSnafu, ScanSnafu, SourceReadSnafu, TriggerError,
    TriggerStorageSnafu,
};
use crate::metrics::events::{
    BytesRead, BytesWritten, CheckpointCommitted, FileStatus, RecordsIngested, SourceFileIngested,
};
use crate::sink::{AppendCommitter, StagedFile, stage_batches};
use crate::source::{CsvReader, CsvReaderConfig, SourceScanner};
use crate::storage::{StorageProvider, StorageProviderRef};

/// Phases of a trigger run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerPhase {
    Idle,
    Scanning,
    Writing,
    Checkpointing,
}

/// Statistics for one trigger run.
#[derive(Debug, Clone, Default)]
pub struct TriggerStats {
    /// Source files covered by this trigger's scan.
    pub files_scanned: usize,
    /// Records decoded from those files.
    pub records_read: usize,
    /// Data files appended to the table.
    pub files_committed: usize,
    /// Records contained in the appended files.
    pub records_committed: usize,
    /// Staged files skipped because the table already contained them.
    pub duplicates_skipped: usize,
    /// Bytes uploaded to the table.
    pub bytes_written: usize,
    /// Table version after the run, if known.
    pub table_version: Option<i64>,
    /// Whether the checkpoint was advanced.
    pub checkpoint_committed: bool,
}

/// The single-writer ingestion pipeline.
///
/// Holds explicit handles to the three storage locations; nothing here is
/// process-global, so two pipelines over different tables can coexist in
/// one process.
pub struct Pipeline {
    config: Config,
    source_storage: StorageProviderRef,
    sink_storage: StorageProviderRef,
    checkpoint_storage: StorageProviderRef,
    phase: TriggerPhase,
    dry_run: bool,
}

impl Pipeline {
    /// Create a pipeline from configuration.
    pub fn new(config: Config) -> Result<Self, TriggerError> {
        config.validate().context(ConfigSnafu)?;

        let source_storage = Arc::new(
            StorageProvider::for_url_with_options(
                &config.source.path,
                config.source.storage_options.clone(),
            )
            .context(TriggerStorageSnafu)?,
        );
        let sink_storage = Arc::new(
            StorageProvider::for_url_with_options(
                &config.sink.path,
                config.sink.storage_options.clone(),
            )
            .context(TriggerStorageSnafu)?,
        );
        let checkpoint_storage = Arc::new(
            StorageProvider::for_url_with_options(
                &config.checkpoint.path,
                config.checkpoint.storage_options.clone(),
            )
            .context(TriggerStorageSnafu)?,
        );

        Ok(Self {
            config,
            source_storage,
            sink_storage,
            checkpoint_storage,
            phase: TriggerPhase::Idle,
            dry_run: false,
        })
    }

    /// Scan and report without writing anything.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    fn transition(&mut self, next: TriggerPhase) {
        debug!("Trigger phase {:?} -> {:?}", self.phase, next);
        self.phase = next;
    }

    /// Execute one trigger.
    ///
    /// Processes everything the scan returns and then stops. An empty scan
    /// is a no-op: no table write, no table version change, no checkpoint
    /// commit.
    pub async fn run_trigger(&mut self) -> Result<TriggerStats, TriggerError> {
        let mut stats = TriggerStats::default();

        self.transition(TriggerPhase::Scanning);
        let checkpoint_store = CheckpointStore::new(self.checkpoint_storage.clone());
        let checkpoint = checkpoint_store.load().await.context(CheckpointSnafu)?;

        let scanner = SourceScanner::new(
            self.source_storage.clone(),
            self.config.source.extension.clone(),
        );
        let plan = scanner.scan(checkpoint.as_ref()).await.context(ScanSnafu)?;
        stats.files_scanned = plan.files.len();

        if plan.is_empty() {
            info!("No new source files, trigger is a no-op");
            stats.table_version = checkpoint.map(|c| c.table_version);
            self.transition(TriggerPhase::Idle);
            return Ok(stats);
        }

        if self.dry_run {
            info!(
                "Dry run: {} files would be ingested up to {:?}",
                plan.files.len(),
                plan.high_water_mark()
            );
            stats.table_version = checkpoint.map(|c| c.table_version);
            self.transition(TriggerPhase::Idle);
            return Ok(stats);
        }

        self.transition(TriggerPhase::Writing);
        let schema = self.config.to_arrow_schema();
        let reader = CsvReader::new(
            schema.clone(),
            CsvReaderConfig::new(
                self.config.source.batch_size,
                self.config.source.delimiter as u8,
                self.config.source.has_header,
            ),
        );

        let mut staged: Vec<StagedFile> = Vec::new();
        for path in &plan.files {
            let bytes = self
                .source_storage
                .get(path.as_str())
                .await
                .context(SourceReadSnafu { path: path.clone() })
                .context(ScanSnafu)?;
            emit!(BytesRead {
                bytes: bytes.len() as u64,
            });

            let result = reader.read(bytes, path).context(ScanSnafu)?;
            stats.records_read += result.total_records;

            if result.total_records == 0 {
                emit!(SourceFileIngested {
                    status: FileStatus::Empty,
                });
                continue;
            }

            staged.extend(
                stage_batches(path, &result.batches, self.config.sink.compression)
                    .context(CommitSnafu)?,
            );
            emit!(SourceFileIngested {
                status: FileStatus::Success,
            });
        }

        let mut committer = AppendCommitter::new(
            self.sink_storage.clone(),
            &schema,
            &PARTITION_COLUMNS,
        )
        .await
        .context(CommitSnafu)?;

        let outcome = committer.commit(staged).await.context(CommitSnafu)?;
        stats.files_committed = outcome.files_committed;
        stats.records_committed = outcome.records_committed;
        stats.duplicates_skipped = outcome.duplicates_skipped;
        stats.bytes_written = outcome.bytes_written;
        stats.table_version = Some(outcome.version);

        emit!(RecordsIngested {
            count: outcome.records_committed as u64,
        });
        emit!(BytesWritten {
            bytes: outcome.bytes_written as u64,
        });

        self.transition(TriggerPhase::Checkpointing);
        let next_checkpoint = match checkpoint {
            Some(current) => current.advanced(
                plan.high_water_mark().map(|s| s.to_string()),
                outcome.version,
            ),
            None => Checkpoint::new(
                plan.high_water_mark().map(|s| s.to_string()),
                outcome.version,
            ),
        };
        checkpoint_store
            .commit(&next_checkpoint)
            .await
            .context(CheckpointSnafu)?;
        stats.checkpoint_committed = true;
        emit!(CheckpointCommitted {
            table_version: next_checkpoint.table_version,
        });

        self.transition(TriggerPhase::Idle);
        info!(
            files = stats.files_committed,
            records = stats.records_committed,
            duplicates = stats.duplicates_skipped,
            version = ?stats.table_version,
            "Trigger complete"
        );
        Ok(stats)
    }
}

/// Run a single trigger with the given configuration.
pub async fn run_trigger(config: Config) -> Result<TriggerStats, TriggerError> {
    let mut pipeline = Pipeline::new(config)?;
    pipeline.run_trigger().await
}
