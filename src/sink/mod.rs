//! Sink side of the pipeline: partition splitting, parquet staging, and
//! atomic table commits.

pub mod delta;
pub mod parquet;
pub mod partition;

pub use delta::{AppendCommitter, CommitOutcome, load_or_create_table};
pub use parquet::{StagedFile, encode_batches};
pub use partition::{PartitionKey, split_by_partition};

use arrow::array::RecordBatch;
use std::collections::BTreeMap;

use crate::config::ParquetCompression;
use crate::error::CommitError;

/// Deterministic data file name for one (partition, source file) pair.
///
/// The identity of a staged file is fully derived from where its rows land
/// and where they came from, so replaying a source file reproduces the
/// exact same table paths. The escaping is injective: distinct source
/// paths can never collide on one table path, which the committer's
/// duplicate check relies on.
pub fn data_file_name(key: &PartitionKey, source_path: &str) -> String {
    format!("{}/part-{}.parquet", key.path_prefix(), sanitize(source_path))
}

/// Deterministic file name in a derived table for one committed data file.
pub fn derived_file_name(committed_path: &str) -> String {
    format!("part-{}.parquet", sanitize(committed_path))
}

/// Escape a source path into a flat file-name component.
///
/// `[A-Za-z0-9_]` pass through; every other byte becomes `-XX` (lowercase
/// hex). `-` itself is escaped, so the mapping is reversible and two
/// different paths always map to two different names.
fn sanitize(source_path: &str) -> String {
    let mut out = String::with_capacity(source_path.len());
    for byte in source_path.bytes() {
        match byte {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'_' => out.push(byte as char),
            other => out.push_str(&format!("-{other:02x}")),
        }
    }
    out
}

/// Split a source file's batches by partition and encode one staged parquet
/// file per partition key.
pub fn stage_batches(
    source_path: &str,
    batches: &[RecordBatch],
    compression: ParquetCompression,
) -> Result<Vec<StagedFile>, CommitError> {
    let mut grouped: BTreeMap<PartitionKey, Vec<RecordBatch>> = BTreeMap::new();
    for batch in batches {
        for (key, sub) in split_by_partition(batch, source_path)? {
            grouped.entry(key).or_default().push(sub);
        }
    }

    let mut staged = Vec::with_capacity(grouped.len());
    for (key, parts) in grouped {
        let num_records = parts.iter().map(|b| b.num_rows()).sum();
        let bytes = encode_batches(parts[0].schema(), &parts, compression)?;
        staged.push(StagedFile {
            path: data_file_name(&key, source_path),
            partition_values: key.partition_values(),
            bytes,
            num_records,
        });
    }

    Ok(staged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Int32Array, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};
    use std::sync::Arc;

    fn batch(rows: &[(i32, i32, i32, &str)]) -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("Year", DataType::Int32, false),
            Field::new("Month", DataType::Int32, false),
            Field::new("DayOfMonth", DataType::Int32, false),
            Field::new("Carrier", DataType::Utf8, false),
        ]));
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int32Array::from_iter_values(rows.iter().map(|r| r.0))),
                Arc::new(Int32Array::from_iter_values(rows.iter().map(|r| r.1))),
                Arc::new(Int32Array::from_iter_values(rows.iter().map(|r| r.2))),
                Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.3))),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_data_file_name_is_deterministic() {
        let key = PartitionKey::new(2008, 1, 3);
        let first = data_file_name(&key, "2008/january.csv");
        let second = data_file_name(&key, "2008/january.csv");

        assert_eq!(first, second);
        assert_eq!(
            first,
            "Year=2008/Month=1/DayOfMonth=3/part-2008-2fjanuary-2ecsv.parquet"
        );
    }

    #[test]
    fn test_data_file_name_distinguishes_sources() {
        let key = PartitionKey::new(2008, 1, 3);
        assert_ne!(
            data_file_name(&key, "2008/january.csv"),
            data_file_name(&key, "2008/february.csv")
        );
    }

    #[test]
    fn test_data_file_name_injective_for_punctuation_variants() {
        // Paths that differ only in punctuation must keep distinct
        // identities, otherwise one file's rows would be absorbed as a
        // duplicate of the other.
        let key = PartitionKey::new(2008, 1, 3);
        assert_ne!(
            data_file_name(&key, "2008.jan.csv"),
            data_file_name(&key, "2008-jan.csv")
        );
        assert_ne!(
            data_file_name(&key, "a/b.csv"),
            data_file_name(&key, "a.b.csv")
        );
        assert_ne!(
            data_file_name(&key, "a-2f.csv"),
            data_file_name(&key, "a/.csv")
        );
    }

    #[test]
    fn test_stage_batches_one_file_per_partition() {
        let batches = vec![
            batch(&[(2008, 1, 3, "WN"), (2008, 1, 4, "AA")]),
            batch(&[(2008, 1, 3, "DL")]),
        ];

        let staged = stage_batches("jan.csv", &batches, ParquetCompression::Snappy).unwrap();
        assert_eq!(staged.len(), 2);

        // Rows for day 3 from both batches land in one file
        assert_eq!(
            staged[0].path,
            "Year=2008/Month=1/DayOfMonth=3/part-jan-2ecsv.parquet"
        );
        assert_eq!(staged[0].num_records, 2);
        assert_eq!(staged[1].num_records, 1);
    }

    #[test]
    fn test_stage_batches_partition_values() {
        let staged = stage_batches(
            "jan.csv",
            &[batch(&[(2008, 1, 3, "WN")])],
            ParquetCompression::Snappy,
        )
        .unwrap();

        assert_eq!(staged[0].partition_values["Year"], Some("2008".to_string()));
        assert_eq!(staged[0].partition_values["Month"], Some("1".to_string()));
        assert_eq!(
            staged[0].partition_values["DayOfMonth"],
            Some("3".to_string())
        );
    }

    #[test]
    fn test_stage_batches_empty_input() {
        let staged = stage_batches("empty.csv", &[], ParquetCompression::Snappy).unwrap();
        assert!(staged.is_empty());
    }
}
