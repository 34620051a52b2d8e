//! Source side of the pipeline: delta enumeration and CSV decoding.

pub mod reader;
pub mod scanner;

pub use reader::{CsvReader, CsvReaderConfig, ReadResult};
pub use scanner::{ScanPlan, SourceScanner};
