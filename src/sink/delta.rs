//! Delta table commit logic.
//!
//! Uploads staged parquet files and commits them to the table log in a
//! single atomic append. Idempotence comes from deterministic staged file
//! names: a replayed trigger stages the same paths, and any path already
//! present in the table is skipped instead of re-added, so duplicates are
//! absorbed rather than surfaced.

use arrow::datatypes::Schema;
use deltalake::DeltaTable;
use deltalake::kernel::transaction::CommitBuilder;
use deltalake::kernel::{Action, Add};
use deltalake::operations::create::CreateBuilder;
use deltalake::protocol::{DeltaOperation, SaveMode};
use snafu::prelude::*;
use std::collections::HashSet;
use std::time::{Instant, SystemTime};
use tracing::{debug, info};
use url::Url;

use super::parquet::StagedFile;
use crate::emit;
use crate::error::{
    CommitError, DataFileUploadSnafu, DeltaTableSnafu, StructTypeSnafu, TableUrlParseSnafu,
    UnsupportedArrowTypeSnafu, WriteFailedSnafu,
};
use crate::metrics::events::{DeltaCommitCompleted, DuplicatesSkipped};
use crate::storage::StorageProviderRef;

/// Result of one append commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitOutcome {
    /// Table version after the commit (unchanged if nothing was appended).
    pub version: i64,
    /// Number of data files appended by this commit.
    pub files_committed: usize,
    /// Staged files skipped because the table already contained them.
    pub duplicates_skipped: usize,
    /// Records contained in the appended files.
    pub records_committed: usize,
    /// Bytes uploaded for the appended files.
    pub bytes_written: usize,
}

/// Commits staged files to a Delta table as atomic appends.
pub struct AppendCommitter {
    table: DeltaTable,
    storage: StorageProviderRef,
    partition_columns: Vec<String>,
}

impl AppendCommitter {
    /// Open the table at the storage location, creating it on first use.
    pub async fn new(
        storage: StorageProviderRef,
        schema: &Schema,
        partition_columns: &[&str],
    ) -> Result<Self, CommitError> {
        deltalake::aws::register_handlers(None);

        let table = load_or_create_table(&storage, schema, partition_columns).await?;
        Ok(Self {
            table,
            storage,
            partition_columns: partition_columns.iter().map(|c| c.to_string()).collect(),
        })
    }

    /// Current table version.
    pub fn version(&self) -> i64 {
        self.table.version().unwrap_or(-1)
    }

    /// Relative paths of all data files currently referenced by the table.
    pub fn data_files(&self) -> Result<Vec<String>, CommitError> {
        let mut files: Vec<String> = self
            .table
            .get_files_iter()
            .context(DeltaTableSnafu)?
            .map(|p| p.to_string())
            .collect();
        files.sort();
        Ok(files)
    }

    /// Upload staged files and append them to the table in one commit.
    ///
    /// Files whose path already exists in the table are skipped; an empty
    /// set of new files leaves the table version untouched. Either the
    /// whole commit lands or none of it does.
    pub async fn commit(&mut self, staged: Vec<StagedFile>) -> Result<CommitOutcome, CommitError> {
        let existing: HashSet<String> = self
            .table
            .get_files_iter()
            .context(DeltaTableSnafu)?
            .map(|p| p.to_string())
            .collect();

        let mut new_files = Vec::new();
        let mut duplicates_skipped = 0;
        for file in staged {
            if existing.contains(&file.path) {
                debug!("Skipping already committed file {}", file.path);
                duplicates_skipped += 1;
            } else {
                new_files.push(file);
            }
        }

        if duplicates_skipped > 0 {
            emit!(DuplicatesSkipped {
                count: duplicates_skipped as u64,
            });
        }

        if new_files.is_empty() {
            return Ok(CommitOutcome {
                version: self.version(),
                files_committed: 0,
                duplicates_skipped,
                records_committed: 0,
                bytes_written: 0,
            });
        }

        let mut records_committed = 0;
        let mut bytes_written = 0;
        for file in &new_files {
            records_committed += file.num_records;
            bytes_written += file.size();
            self.storage
                .put(file.path.as_str(), file.bytes.clone())
                .await
                .context(DataFileUploadSnafu {
                    path: file.path.clone(),
                })?;
        }

        let actions: Vec<Action> = new_files.iter().map(create_add_action).collect();
        let version = self.commit_actions(actions).await?;

        info!(
            version,
            files = new_files.len(),
            records = records_committed,
            "Committed append to table"
        );

        Ok(CommitOutcome {
            version,
            files_committed: new_files.len(),
            duplicates_skipped,
            records_committed,
            bytes_written,
        })
    }

    async fn commit_actions(&mut self, actions: Vec<Action>) -> Result<i64, CommitError> {
        let start = Instant::now();
        let partition_by = if self.partition_columns.is_empty() {
            None
        } else {
            Some(self.partition_columns.clone())
        };

        let version = CommitBuilder::default()
            .with_actions(actions)
            .build(
                Some(self.table.snapshot().context(DeltaTableSnafu)?),
                self.table.log_store(),
                DeltaOperation::Write {
                    mode: SaveMode::Append,
                    partition_by,
                    predicate: None,
                },
            )
            .await
            .context(WriteFailedSnafu)?
            .version;

        // Reload so the next duplicate check sees this commit
        self.table.load().await.context(DeltaTableSnafu)?;

        emit!(DeltaCommitCompleted {
            duration: start.elapsed(),
        });

        Ok(version)
    }
}

/// Open a Delta table at the storage location, creating it with the given
/// schema and partitioning if it does not exist yet.
pub async fn load_or_create_table(
    storage: &StorageProviderRef,
    schema: &Schema,
    partition_columns: &[&str],
) -> Result<DeltaTable, CommitError> {
    let table_url = storage.url();
    let parsed_url = Url::parse(&table_url).context(TableUrlParseSnafu)?;

    match deltalake::open_table_with_storage_options(
        parsed_url,
        storage.storage_options().clone(),
    )
    .await
    {
        Ok(table) => {
            info!(
                "Loaded existing table at version {}",
                table.version().unwrap_or(-1)
            );
            Ok(table)
        }
        Err(_) => {
            info!("Creating new table at {}", table_url);
            let delta_schema = arrow_schema_to_delta(schema)?;

            let mut builder = CreateBuilder::new()
                .with_location(&table_url)
                .with_columns(delta_schema.fields().cloned())
                .with_storage_options(storage.storage_options().clone());
            if !partition_columns.is_empty() {
                builder = builder.with_partition_columns(partition_columns.iter().copied());
            }

            builder.await.context(DeltaTableSnafu)
        }
    }
}

fn create_add_action(file: &StagedFile) -> Action {
    Action::Add(Add {
        path: file.path.clone(),
        size: file.size() as i64,
        partition_values: file.partition_values.clone(),
        modification_time: SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as i64,
        data_change: true,
        ..Default::default()
    })
}

/// Convert an Arrow schema to a Delta schema.
fn arrow_schema_to_delta(schema: &Schema) -> Result<deltalake::kernel::StructType, CommitError> {
    use deltalake::kernel::{StructField, StructType};

    let fields: Vec<StructField> = schema
        .fields()
        .iter()
        .map(|field| {
            let delta_type = arrow_type_to_delta(field.data_type())?;
            Ok(StructField::new(
                field.name(),
                delta_type,
                field.is_nullable(),
            ))
        })
        .collect::<Result<Vec<_>, CommitError>>()?;

    StructType::try_new(fields.into_iter().map(Ok::<_, deltalake::kernel::Error>)).map_err(|e| {
        StructTypeSnafu {
            message: e.to_string(),
        }
        .build()
    })
}

fn arrow_type_to_delta(
    arrow_type: &arrow::datatypes::DataType,
) -> Result<deltalake::kernel::DataType, CommitError> {
    use arrow::datatypes::DataType as ArrowType;
    use deltalake::kernel::DataType as DeltaType;

    let delta_type = match arrow_type {
        ArrowType::Boolean => DeltaType::BOOLEAN,
        ArrowType::Int32 => DeltaType::INTEGER,
        ArrowType::Int64 => DeltaType::LONG,
        ArrowType::Float32 => DeltaType::FLOAT,
        ArrowType::Float64 => DeltaType::DOUBLE,
        ArrowType::Utf8 | ArrowType::LargeUtf8 => DeltaType::STRING,
        ArrowType::Date32 | ArrowType::Date64 => DeltaType::DATE,
        ArrowType::Timestamp(_, _) => DeltaType::TIMESTAMP,
        other => {
            return UnsupportedArrowTypeSnafu {
                arrow_type: other.clone(),
            }
            .fail();
        }
    };

    Ok(delta_type)
}
