//! Partition key extraction and per-partition batch splitting.
//!
//! The target table is partitioned by (Year, Month, DayOfMonth). Every
//! decoded batch is split into one sub-batch per distinct key before
//! staging, so each data file lands entirely inside one partition
//! directory.

use arrow::array::{Array, Int32Array, RecordBatch, UInt32Array};
use arrow::compute::take;
use snafu::prelude::*;
use std::collections::{BTreeMap, HashMap};

use crate::config::PARTITION_COLUMNS;
use crate::error::{
    CommitError, NullPartitionKeySnafu, PartitionColumnMissingSnafu, PartitionColumnTypeSnafu,
    PartitionSplitSnafu,
};

/// Partition key for one row group: (Year, Month, DayOfMonth).
///
/// Ordering follows calendar order, which keeps staged files and commit
/// actions in a stable order across runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PartitionKey {
    pub year: i32,
    pub month: i32,
    pub day: i32,
}

impl PartitionKey {
    pub fn new(year: i32, month: i32, day: i32) -> Self {
        Self { year, month, day }
    }

    /// Hive-style directory prefix for this partition.
    pub fn path_prefix(&self) -> String {
        format!(
            "Year={}/Month={}/DayOfMonth={}",
            self.year, self.month, self.day
        )
    }

    /// Partition values as recorded in the table log.
    pub fn partition_values(&self) -> HashMap<String, Option<String>> {
        HashMap::from([
            ("Year".to_string(), Some(self.year.to_string())),
            ("Month".to_string(), Some(self.month.to_string())),
            ("DayOfMonth".to_string(), Some(self.day.to_string())),
        ])
    }
}

impl std::fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{:02}-{:02}", self.year, self.month, self.day)
    }
}

fn partition_column<'a>(
    batch: &'a RecordBatch,
    column: &str,
) -> Result<&'a Int32Array, CommitError> {
    let index = batch
        .schema()
        .index_of(column)
        .ok()
        .context(PartitionColumnMissingSnafu { column })?;
    batch
        .column(index)
        .as_any()
        .downcast_ref::<Int32Array>()
        .context(PartitionColumnTypeSnafu { column })
}

/// Split a batch into per-partition sub-batches, dropping the partition
/// columns from each.
///
/// Returns a map ordered by key so downstream staging is deterministic.
pub fn split_by_partition(
    batch: &RecordBatch,
    source_path: &str,
) -> Result<BTreeMap<PartitionKey, RecordBatch>, CommitError> {
    let years = partition_column(batch, PARTITION_COLUMNS[0])?;
    let months = partition_column(batch, PARTITION_COLUMNS[1])?;
    let days = partition_column(batch, PARTITION_COLUMNS[2])?;

    let mut groups: BTreeMap<PartitionKey, Vec<u32>> = BTreeMap::new();
    for row in 0..batch.num_rows() {
        ensure!(
            !years.is_null(row) && !months.is_null(row) && !days.is_null(row),
            NullPartitionKeySnafu { path: source_path }
        );
        let key = PartitionKey::new(years.value(row), months.value(row), days.value(row));
        groups.entry(key).or_default().push(row as u32);
    }

    let data_indices: Vec<usize> = batch
        .schema()
        .fields()
        .iter()
        .enumerate()
        .filter(|(_, f)| !PARTITION_COLUMNS.contains(&f.name().as_str()))
        .map(|(i, _)| i)
        .collect();
    let projected = batch
        .project(&data_indices)
        .context(PartitionSplitSnafu)?;

    let mut result = BTreeMap::new();
    for (key, rows) in groups {
        let indices = UInt32Array::from(rows);
        let columns = projected
            .columns()
            .iter()
            .map(|c| take(c.as_ref(), &indices, None))
            .collect::<Result<Vec<_>, _>>()
            .context(PartitionSplitSnafu)?;
        let sub = RecordBatch::try_new(projected.schema(), columns).context(PartitionSplitSnafu)?;
        result.insert(key, sub);
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::StringArray;
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
    fn test_path_prefix_is_hive_style() {
        let key = PartitionKey::new(2008, 1, 3);
        assert_eq!(key.path_prefix(), "Year=2008/Month=1/DayOfMonth=3");
    }

    #[test]
    fn test_partition_values_match_key() {
        let values = PartitionKey::new(2008, 12, 31).partition_values();
        assert_eq!(values["Year"], Some("2008".to_string()));
        assert_eq!(values["Month"], Some("12".to_string()));
        assert_eq!(values["DayOfMonth"], Some("31".to_string()));
    }

    #[test]
    fn test_split_groups_rows_by_key() {
        let batch = batch(&[
            (2008, 1, 3, "WN"),
            (2008, 1, 4, "AA"),
            (2008, 1, 3, "DL"),
        ]);

        let split = split_by_partition(&batch, "jan.csv").unwrap();
        assert_eq!(split.len(), 2);

        let day3 = &split[&PartitionKey::new(2008, 1, 3)];
        assert_eq!(day3.num_rows(), 2);
        let day4 = &split[&PartitionKey::new(2008, 1, 4)];
        assert_eq!(day4.num_rows(), 1);
    }

    #[test]
    fn test_split_drops_partition_columns() {
        let batch = batch(&[(2008, 1, 3, "WN")]);
        let split = split_by_partition(&batch, "jan.csv").unwrap();
        let sub = &split[&PartitionKey::new(2008, 1, 3)];

        assert_eq!(sub.num_columns(), 1);
        assert_eq!(sub.schema().field(0).name(), "Carrier");
    }

    #[test]
    fn test_split_preserves_row_values() {
        let batch = batch(&[(2008, 1, 3, "WN"), (2007, 12, 1, "AA")]);
        let split = split_by_partition(&batch, "mix.csv").unwrap();

        let older = &split[&PartitionKey::new(2007, 12, 1)];
        let carriers = older
            .column(0)
            .as_any()
            .downcast_ref::<StringArray>()
            .unwrap();
        assert_eq!(carriers.value(0), "AA");
    }

    #[test]
    fn test_null_partition_key_rejected() {
        let schema = Arc::new(Schema::new(vec![
            Field::new("Year", DataType::Int32, true),
            Field::new("Month", DataType::Int32, false),
            Field::new("DayOfMonth", DataType::Int32, false),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int32Array::from(vec![None])),
                Arc::new(Int32Array::from(vec![Some(1)])),
                Arc::new(Int32Array::from(vec![Some(3)])),
            ],
        )
        .unwrap();

        let err = split_by_partition(&batch, "nulls.csv").unwrap_err();
        assert!(matches!(err, CommitError::NullPartitionKey { .. }));
    }

    #[test]
    fn test_missing_partition_column_rejected() {
        let schema = Arc::new(Schema::new(vec![Field::new(
            "Year",
            DataType::Int32,
            false,
        )]));
        let batch = RecordBatch::try_new(
            schema,
            vec![Arc::new(Int32Array::from_iter_values([2008]))],
        )
        .unwrap();

        let err = split_by_partition(&batch, "partial.csv").unwrap_err();
        assert!(matches!(
            err,
            CommitError::PartitionColumnMissing { .. }
        ));
    }

    #[test]
    fn test_keys_order_by_calendar() {
        let mut keys = vec![
            PartitionKey::new(2008, 2, 1),
            PartitionKey::new(2007, 12, 31),
            PartitionKey::new(2008, 1, 15),
        ];
        keys.sort();
        assert_eq!(keys[0], PartitionKey::new(2007, 12, 31));
        assert_eq!(keys[2], PartitionKey::new(2008, 2, 1));
    }
}
