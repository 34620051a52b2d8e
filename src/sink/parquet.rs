//! Parquet encoding of partitioned batches.

use arrow::array::RecordBatch;
use arrow::datatypes::SchemaRef;
use bytes::Bytes;
use deltalake::parquet::arrow::ArrowWriter;
use deltalake::parquet::basic::{Compression, GzipLevel, ZstdLevel};
use deltalake::parquet::file::properties::WriterProperties;
use snafu::prelude::*;
use std::collections::HashMap;

use crate::config::ParquetCompression;
use crate::error::{CommitError, ParquetWriteSnafu};

/// An encoded data file awaiting upload and commit.
///
/// `path` is relative to the table root and fully determined by the
/// partition key and the source file, which is what makes replayed writes
/// land on the same object.
#[derive(Debug, Clone)]
pub struct StagedFile {
    pub path: String,
    pub partition_values: HashMap<String, Option<String>>,
    pub bytes: Bytes,
    pub num_records: usize,
}

impl StagedFile {
    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

fn writer_properties(compression: ParquetCompression) -> WriterProperties {
    let compression = match compression {
        ParquetCompression::Uncompressed => Compression::UNCOMPRESSED,
        ParquetCompression::Snappy => Compression::SNAPPY,
        ParquetCompression::Gzip => Compression::GZIP(GzipLevel::default()),
        ParquetCompression::Zstd => Compression::ZSTD(ZstdLevel::default()),
    };
    WriterProperties::builder()
        .set_compression(compression)
        .build()
}

/// Encode batches of one schema into a single in-memory parquet file.
///
/// An empty slice yields a valid file with zero rows.
pub fn encode_batches(
    schema: SchemaRef,
    batches: &[RecordBatch],
    compression: ParquetCompression,
) -> Result<Bytes, CommitError> {
    let mut writer = ArrowWriter::try_new(
        Vec::new(),
        schema,
        Some(writer_properties(compression)),
    )
    .context(ParquetWriteSnafu)?;

    for batch in batches {
        writer.write(batch).context(ParquetWriteSnafu)?;
    }

    let buffer = writer.into_inner().context(ParquetWriteSnafu)?;
    Ok(Bytes::from(buffer))
}
