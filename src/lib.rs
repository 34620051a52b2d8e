//! snowdrift: incremental CSV to Delta Lake ingestion.
//!
//! This library implements a run-once ingestion trigger: it scans a source
//! directory tree for CSV files not yet covered by a durable checkpoint,
//! appends their rows to a date-partitioned Delta table in one atomic
//! commit, and advances the checkpoint. Replayed triggers are absorbed
//! through deterministic data file identities, so crash recovery never
//! duplicates rows.
//!
//! # Example
//!
//! ```ignore
//! use snowdrift::{Config, error::TriggerError, run_trigger};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), TriggerError> {
//!     let config = Config::from_file("config.yaml")?;
//!     let stats = run_trigger(config).await?;
//!     println!("Committed {} records", stats.records_committed);
//!     Ok(())
//! }
//! ```

pub mod checkpoint;
pub mod config;
pub mod error;
pub mod extract;
pub mod metrics;
pub mod pipeline;
pub mod sink;
pub mod source;
pub mod storage;

// Re-export main types
pub use config::Config;
pub use extract::{ExtractRequest, ExtractStats, run_extract};
pub use pipeline::{Pipeline, TriggerStats, run_trigger};
pub use storage::{StorageProvider, StorageProviderRef};
