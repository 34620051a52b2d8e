//! Configuration parsing and schema management.
//!
//! Handles loading configuration from YAML files, interpolating environment
//! variables, and converting the declared record schema to an Arrow schema.
//! The schema is declared once and fixed thereafter; files that do not match
//! it fail the trigger with a schema drift error instead of being coerced.

mod vars;

use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use serde::{Deserialize, Serialize};
use snafu::prelude::*;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::error::{
    CheckpointPathNotDistinctSnafu, ConfigError, EmptyCheckpointPathSnafu, EmptySchemaSnafu,
    EmptySinkPathSnafu, EmptySourcePathSnafu, EnvInterpolationSnafu, MissingPartitionFieldSnafu,
    PartitionFieldTypeSnafu, ReadFileSnafu, YamlParseSnafu,
};

/// Partition columns of the target table, in layout order.
pub const PARTITION_COLUMNS: [&str; 3] = ["Year", "Month", "DayOfMonth"];

/// Main configuration structure for the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub source: SourceConfig,
    pub sink: SinkConfig,
    pub checkpoint: CheckpointConfig,
    pub schema: SchemaConfig,
}

/// Source configuration for reading delimited files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Root of the source directory tree.
    /// Examples: "s3://bucket/input", "/data/flights/incoming"
    pub path: String,

    /// File extension to ingest (default: ".csv").
    #[serde(default = "default_extension")]
    pub extension: String,

    /// Field delimiter (default: ',').
    #[serde(default = "default_delimiter")]
    pub delimiter: char,

    /// Whether source files carry a header row (default: true).
    /// The header is validated against the declared schema.
    #[serde(default = "default_has_header")]
    pub has_header: bool,

    /// Number of records per decoded batch (default: 8192).
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Storage options (credentials, region, etc.)
    #[serde(default)]
    pub storage_options: HashMap<String, String>,
}

fn default_extension() -> String {
    ".csv".to_string()
}

fn default_delimiter() -> char {
    ','
}

fn default_has_header() -> bool {
    true
}

fn default_batch_size() -> usize {
    8192
}

/// Sink configuration for the target Delta Lake table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Path to the Delta Lake table.
    /// Examples: "s3://bucket/tables/flights", "/data/tables/flights"
    pub path: String,

    /// Parquet compression codec.
    #[serde(default)]
    pub compression: ParquetCompression,

    /// Storage options (credentials, region, etc.)
    #[serde(default)]
    pub storage_options: HashMap<String, String>,
}

/// Checkpoint configuration.
///
/// The checkpoint lives at a durable path distinct from the data path and is
/// scoped to a single pipeline instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointConfig {
    /// Directory holding the checkpoint object.
    pub path: String,

    /// Storage options (credentials, region, etc.)
    #[serde(default)]
    pub storage_options: HashMap<String, String>,
}

/// Schema configuration defining the structure of input data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaConfig {
    pub fields: Vec<FieldConfig>,
}

/// Configuration for a single schema field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub nullable: bool,
}

/// Supported field types for the schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    #[default]
    String,
    Int32,
    Int64,
    Float32,
    Float64,
    Boolean,
    Timestamp,
    Date,
}

/// Parquet compression codec.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ParquetCompression {
    Uncompressed,
    #[default]
    Snappy,
    Gzip,
    Zstd,
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_file_with_options(path, true)
    }

    /// Load configuration from a YAML file with optional environment variable interpolation.
    pub fn from_file_with_options(
        path: impl AsRef<Path>,
        interpolate_env: bool,
    ) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).context(ReadFileSnafu)?;

        let content = if interpolate_env {
            let result = vars::interpolate(&content);
            if !result.is_ok() {
                let error_msg = result.errors.join("\n");
                return EnvInterpolationSnafu { message: error_msg }.fail();
            }
            result.text
        } else {
            content
        };

        let config: Config = serde_yaml::from_str(&content).context(YamlParseSnafu)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// Beyond non-empty paths, this checks the two invariants the trigger
    /// relies on: the checkpoint lives outside the data path, and the
    /// partition columns are declared as int32 fields.
    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure!(!self.source.path.is_empty(), EmptySourcePathSnafu);
        ensure!(!self.sink.path.is_empty(), EmptySinkPathSnafu);
        ensure!(!self.checkpoint.path.is_empty(), EmptyCheckpointPathSnafu);
        ensure!(
            self.checkpoint.path != self.sink.path
                && !self
                    .checkpoint
                    .path
                    .starts_with(&format!("{}/", self.sink.path)),
            CheckpointPathNotDistinctSnafu {
                path: self.checkpoint.path.clone(),
            }
        );
        ensure!(!self.schema.fields.is_empty(), EmptySchemaSnafu);

        for column in PARTITION_COLUMNS {
            let field = self
                .schema
                .fields
                .iter()
                .find(|f| f.name == column)
                .context(MissingPartitionFieldSnafu { column })?;
            ensure!(
                field.field_type == FieldType::Int32,
                PartitionFieldTypeSnafu { column }
            );
        }

        Ok(())
    }

    /// Convert the schema configuration to an Arrow schema.
    pub fn to_arrow_schema(&self) -> Arc<Schema> {
        let fields: Vec<Field> = self
            .schema
            .fields
            .iter()
            .map(|f| {
                let data_type = match f.field_type {
                    FieldType::String => DataType::Utf8,
                    FieldType::Int32 => DataType::Int32,
                    FieldType::Int64 => DataType::Int64,
                    FieldType::Float32 => DataType::Float32,
                    FieldType::Float64 => DataType::Float64,
                    FieldType::Boolean => DataType::Boolean,
                    FieldType::Timestamp => {
                        DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into()))
                    }
                    FieldType::Date => DataType::Date32,
                };
                Field::new(&f.name, data_type, f.nullable)
            })
            .collect();

        Arc::new(Schema::new(fields))
    }
}
