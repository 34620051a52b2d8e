//! Durable checkpoint store for exactly-once ingestion.
//!
//! The checkpoint records the last source position that was successfully
//! committed to the target table. It is persisted as a single JSON object at
//! a durable path distinct from the data path, and replaced atomically (the
//! storage backend stages the write and renames into place).
//!
//! Only the trigger advances the checkpoint, and only after a successful
//! table commit. A crash between the commit and the checkpoint write leaves
//! the checkpoint at its previous value; the next trigger re-scans from
//! there and relies on the committer's idempotent writes to absorb the
//! replay.

pub mod state;

pub use state::Checkpoint;

use snafu::prelude::*;
use tracing::{debug, info};

use crate::error::{
    CheckpointCorruptSnafu, CheckpointEncodeSnafu, CheckpointError, CheckpointPersistSnafu,
    CheckpointUnreadableSnafu,
};
use crate::storage::StorageProviderRef;

/// Name of the checkpoint object within the checkpoint path.
pub const CHECKPOINT_OBJECT: &str = "checkpoint.json";

/// Durable store holding exactly one checkpoint per pipeline instance.
pub struct CheckpointStore {
    storage: StorageProviderRef,
}

impl CheckpointStore {
    /// Create a store over the given checkpoint location.
    pub fn new(storage: StorageProviderRef) -> Self {
        Self { storage }
    }

    /// Load the durable checkpoint, or `None` on first run.
    ///
    /// A missing object is the expected first-run state. Anything else that
    /// prevents reading a previously written checkpoint is surfaced as
    /// corruption; silently restarting from scratch would re-ingest the
    /// whole source.
    pub async fn load(&self) -> Result<Option<Checkpoint>, CheckpointError> {
        let bytes = match self.storage.get(CHECKPOINT_OBJECT).await {
            Ok(bytes) => bytes,
            Err(e) if e.is_not_found() => {
                debug!("No checkpoint found, starting from the beginning");
                return Ok(None);
            }
            Err(e) => return Err(e).context(CheckpointUnreadableSnafu),
        };

        let checkpoint: Checkpoint =
            serde_json::from_slice(&bytes).context(CheckpointCorruptSnafu)?;

        info!(
            table_version = checkpoint.table_version,
            high_water_mark = ?checkpoint.last_source_path,
            "Loaded checkpoint"
        );
        Ok(Some(checkpoint))
    }

    /// Atomically replace the stored checkpoint.
    pub async fn commit(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        let json = serde_json::to_vec_pretty(checkpoint).context(CheckpointEncodeSnafu)?;

        self.storage
            .put(CHECKPOINT_OBJECT, json.into())
            .await
            .context(CheckpointPersistSnafu)?;

        info!(
            table_version = checkpoint.table_version,
            high_water_mark = ?checkpoint.last_source_path,
            "Checkpoint committed"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StorageProvider;
    use bytes::Bytes;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn store_at(dir: &TempDir) -> CheckpointStore {
        let storage = StorageProvider::for_url(dir.path().to_str().unwrap()).unwrap();
        CheckpointStore::new(Arc::new(storage))
    }

    #[tokio::test]
    async fn test_load_returns_none_on_first_run() {
        let dir = TempDir::new().unwrap();
        let store = store_at(&dir);
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_commit_then_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = store_at(&dir);

        let checkpoint = Checkpoint::new(Some("2008/march.csv".to_string()), 3);
        store.commit(&checkpoint).await.unwrap();

        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded.table_version, 3);
        assert_eq!(loaded.last_source_path.as_deref(), Some("2008/march.csv"));
    }

    #[tokio::test]
    async fn test_commit_replaces_previous_checkpoint() {
        let dir = TempDir::new().unwrap();
        let store = store_at(&dir);

        store
            .commit(&Checkpoint::new(Some("a.csv".to_string()), 1))
            .await
            .unwrap();
        store
            .commit(&Checkpoint::new(Some("b.csv".to_string()), 2))
            .await
            .unwrap();

        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded.table_version, 2);
        assert_eq!(loaded.last_source_path.as_deref(), Some("b.csv"));
    }

    #[tokio::test]
    async fn test_corrupt_checkpoint_is_fatal() {
        let dir = TempDir::new().unwrap();
        let storage = Arc::new(
            StorageProvider::for_url(dir.path().to_str().unwrap()).unwrap(),
        );
        storage
            .put(CHECKPOINT_OBJECT, Bytes::from_static(b"{ not json {{"))
            .await
            .unwrap();

        let store = CheckpointStore::new(storage);
        let err = store.load().await.unwrap_err();
        assert!(matches!(err, CheckpointError::CheckpointCorrupt { .. }));
    }
}
