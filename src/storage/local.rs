//! Local filesystem storage backend implementation.

use object_store::ObjectStore;
use object_store::local::LocalFileSystem;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::StorageError;

use super::{BackendConfig, StorageProvider};

/// Local filesystem storage configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalConfig {
    /// Absolute directory path acting as the storage root.
    pub path: String,
}

impl StorageProvider {
    pub(super) fn construct_local(
        config: LocalConfig,
        options: HashMap<String, String>,
    ) -> Result<Self, StorageError> {
        // Rooted at the filesystem root with the configured path as key
        // prefix, so construction never touches the filesystem. Listing a
        // missing directory yields an empty stream, matching object-store
        // semantics, and puts create parent directories on demand.
        let object_store: Arc<dyn ObjectStore> =
            Arc::new(LocalFileSystem::new().with_automatic_cleanup(true));

        Ok(Self {
            config: BackendConfig::Local(config),
            object_store,
            storage_options: options,
        })
    }
}
