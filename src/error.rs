//! Error types for snowdrift using snafu.
//!
//! Each pipeline component gets its own error enum; `TriggerError`
//! aggregates them at the top level. The taxonomy follows the trigger
//! contract: scan failures abort with no state change, checkpoint
//! corruption is fatal, and write failures are safe to retry because the
//! checkpoint never advances past a failed commit.

use snafu::prelude::*;

// ============ Storage Errors ============

/// Errors that can occur during storage operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum StorageError {
    /// Invalid storage URL format.
    #[snafu(display("Invalid storage URL: {url}"))]
    InvalidUrl { url: String },

    /// Object store operation failed.
    #[snafu(display("Storage operation failed"))]
    ObjectStore { source: object_store::Error },

    /// S3 configuration error.
    #[snafu(display("S3 configuration error"))]
    S3Config { source: object_store::Error },
}

impl StorageError {
    /// Check if this error represents a "not found" condition (404, NoSuchKey, etc.)
    pub fn is_not_found(&self) -> bool {
        match self {
            StorageError::ObjectStore { source } => {
                matches!(source, object_store::Error::NotFound { .. })
            }
            _ => false,
        }
    }
}

// ============ Config Errors ============

/// Errors that can occur during configuration parsing and validation.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConfigError {
    /// Source path is empty.
    #[snafu(display("Source path cannot be empty"))]
    EmptySourcePath,

    /// Sink path is empty.
    #[snafu(display("Sink path cannot be empty"))]
    EmptySinkPath,

    /// Checkpoint path is empty.
    #[snafu(display("Checkpoint path cannot be empty"))]
    EmptyCheckpointPath,

    /// Checkpoint state must not live inside the data path.
    #[snafu(display("Checkpoint path must be distinct from the sink path: {path}"))]
    CheckpointPathNotDistinct { path: String },

    /// Schema has no fields.
    #[snafu(display("Schema must have at least one field"))]
    EmptySchema,

    /// A partition column is missing from the declared schema.
    #[snafu(display("Partition column '{column}' is missing from the schema"))]
    MissingPartitionField { column: String },

    /// A partition column has the wrong declared type.
    #[snafu(display("Partition column '{column}' must be declared as int32"))]
    PartitionFieldType { column: String },

    /// Environment variable interpolation failed.
    #[snafu(display("Environment variable interpolation failed:\n{message}"))]
    EnvInterpolation { message: String },

    /// Failed to parse YAML configuration.
    #[snafu(display("Failed to parse YAML configuration"))]
    YamlParse { source: serde_yaml::Error },

    /// Failed to read configuration file.
    #[snafu(display("Failed to read configuration file"))]
    ReadFile { source: std::io::Error },
}

// ============ Scan Errors ============

/// Errors raised while enumerating or decoding source files.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ScanError {
    /// The source could not be enumerated. Aborts the trigger; no state change.
    #[snafu(display("Source unavailable: listing failed"))]
    SourceUnavailable { source: StorageError },

    /// A pending source file could not be read.
    #[snafu(display("Failed to read source file {path}"))]
    SourceRead { path: String, source: StorageError },

    /// The file header does not match the declared schema.
    #[snafu(display(
        "Schema drift detected in {path}: expected columns [{expected}], found [{found}]"
    ))]
    SchemaDrift {
        path: String,
        expected: String,
        found: String,
    },

    /// CSV decoding failed.
    #[snafu(display("Failed to decode CSV for {path}: {message}"))]
    CsvDecode { path: String, message: String },
}

// ============ Checkpoint Errors ============

/// Errors raised by the durable checkpoint store.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum CheckpointError {
    /// Checkpoint state exists but cannot be parsed. Fatal for the run.
    #[snafu(display("Checkpoint corrupt: stored state is unreadable"))]
    CheckpointCorrupt { source: serde_json::Error },

    /// The durable store could not be read (other than not-found).
    #[snafu(display("Checkpoint store unreadable"))]
    CheckpointUnreadable { source: StorageError },

    /// The durable store rejected the replacement checkpoint.
    #[snafu(display("Failed to persist checkpoint"))]
    CheckpointPersist { source: StorageError },

    /// Checkpoint state failed to serialize.
    #[snafu(display("Failed to encode checkpoint state"))]
    CheckpointEncode { source: serde_json::Error },
}

// ============ Commit Errors ============

/// Errors raised while staging data files or committing to the table.
///
/// All variants are retryable at the trigger level: the checkpoint is only
/// advanced after a successful commit.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum CommitError {
    /// The atomic append commit to the table log failed.
    #[snafu(display("Write failed: table commit did not complete"))]
    WriteFailed { source: deltalake::DeltaTableError },

    /// Delta table operation failed (open, create, load).
    #[snafu(display("Delta table operation failed"))]
    DeltaTable { source: deltalake::DeltaTableError },

    /// Failed to create struct type for the table schema.
    #[snafu(display("Failed to create struct type: {message}"))]
    StructType { message: String },

    /// Arrow type with no Delta equivalent.
    #[snafu(display("Unsupported Arrow type: {arrow_type}"))]
    UnsupportedArrowType {
        arrow_type: arrow::datatypes::DataType,
    },

    /// Failed to parse the table URL.
    #[snafu(display("Failed to parse table URL"))]
    TableUrlParse { source: url::ParseError },

    /// Parquet encoding failed.
    #[snafu(display("Parquet write error"))]
    ParquetWrite {
        source: deltalake::parquet::errors::ParquetError,
    },

    /// Uploading a staged data file failed.
    #[snafu(display("Failed to upload data file {path}"))]
    DataFileUpload { path: String, source: StorageError },

    /// A record carries a null partition key.
    #[snafu(display("Null partition key in batch from {path}"))]
    NullPartitionKey { path: String },

    /// A partition column is missing from a decoded batch.
    #[snafu(display("Partition column '{column}' missing from record batch"))]
    PartitionColumnMissing { column: String },

    /// A partition column decoded to the wrong Arrow type.
    #[snafu(display("Partition column '{column}' is not int32"))]
    PartitionColumnType { column: String },

    /// Row shuffling during partition split failed.
    #[snafu(display("Failed to split batch by partition"))]
    PartitionSplit { source: arrow::error::ArrowError },
}

// ============ Extract Errors ============

/// Errors raised by the one-shot partition re-extraction.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ExtractError {
    /// Delta or parquet write failure while republishing.
    #[snafu(display("Failed to republish extracted rows"))]
    Republish { source: CommitError },

    /// A committed data file could not be downloaded.
    #[snafu(display("Failed to read committed data file {path}"))]
    CommittedFileRead { path: String, source: StorageError },

    /// Parquet decoding of a committed data file failed.
    #[snafu(display("Failed to decode parquet for {path}"))]
    ParquetRead {
        path: String,
        source: deltalake::parquet::errors::ParquetError,
    },

    /// Rebuilding full-schema batches failed.
    #[snafu(display("Failed to rebuild batch for {path}"))]
    BatchRebuild {
        path: String,
        source: arrow::error::ArrowError,
    },

    /// A committed file path does not carry the expected partition layout.
    #[snafu(display("Malformed partition path: {path}"))]
    MalformedPartitionPath { path: String },

    /// The extraction request itself is invalid.
    #[snafu(display("Invalid extraction request: {message}"))]
    InvalidRequest { message: String },
}

// ============ Trigger Error (top-level) ============

/// Top-level trigger errors that aggregate all error types.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum TriggerError {
    /// Storage error.
    #[snafu(display("Storage error"))]
    TriggerStorage { source: StorageError },

    /// Configuration error.
    #[snafu(display("Configuration error"))]
    Config { source: ConfigError },

    /// Source scan error.
    #[snafu(display("Scan error"))]
    Scan { source: ScanError },

    /// Checkpoint store error.
    #[snafu(display("Checkpoint error"))]
    Checkpoint { source: CheckpointError },

    /// Commit error.
    #[snafu(display("Commit error"))]
    Commit { source: CommitError },

    /// Re-extraction error.
    #[snafu(display("Extract error"))]
    Extract { source: ExtractError },
}
