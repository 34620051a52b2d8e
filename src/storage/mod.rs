//! Storage abstraction shared by the source, sink, and checkpoint paths.
//!
//! Provides a unified interface over the local filesystem and S3. Every
//! component receives its provider as an explicit handle; there is no
//! process-wide storage state.

mod local;
mod s3;

use bytes::Bytes;
use futures::StreamExt;
use object_store::path::Path;
use object_store::{ObjectStore, PutPayload};
use regex::Regex;
use snafu::prelude::*;
use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

pub use local::LocalConfig;
pub use s3::S3Config;

use crate::error::{InvalidUrlSnafu, ObjectStoreSnafu, StorageError};

/// A reference-counted storage provider.
pub type StorageProviderRef = Arc<StorageProvider>;

// URL patterns for the supported backends
const S3_URL: &str = r"^[sS]3[aA]?://(?P<bucket>[a-z0-9\-\.]+)(/(?P<key>.+))?$";
const S3_REGIONAL: &str =
    r"^https://s3\.(?P<region>[\w\-]+)\.amazonaws\.com/(?P<bucket>[a-z0-9\-\.]+)(/(?P<key>.+))?$";
const FILE_URI: &str = r"^file://(?P<path>.*)$";
const FILE_PATH: &str = r"^/(?P<path>.*)$";

fn matchers() -> &'static [(Backend, Regex)] {
    static MATCHERS: OnceLock<Vec<(Backend, Regex)>> = OnceLock::new();
    MATCHERS.get_or_init(|| {
        vec![
            (Backend::S3, Regex::new(S3_URL).unwrap()),
            (Backend::S3, Regex::new(S3_REGIONAL).unwrap()),
            (Backend::Local, Regex::new(FILE_URI).unwrap()),
            (Backend::Local, Regex::new(FILE_PATH).unwrap()),
        ]
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Backend {
    S3,
    Local,
}

/// Backend configuration enum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendConfig {
    S3(S3Config),
    Local(LocalConfig),
}

impl BackendConfig {
    /// Parse a URL into a backend configuration.
    pub fn parse_url(url: &str) -> Result<Self, StorageError> {
        for (backend, regex) in matchers() {
            if let Some(captures) = regex.captures(url) {
                return match backend {
                    Backend::S3 => Ok(Self::parse_s3(captures)),
                    Backend::Local => Ok(Self::parse_local(captures)),
                };
            }
        }

        InvalidUrlSnafu {
            url: url.to_string(),
        }
        .fail()
    }

    fn parse_s3(captures: regex::Captures) -> Self {
        let bucket = captures
            .name("bucket")
            .expect("bucket should always be available")
            .as_str()
            .to_string();

        let region = std::env::var("AWS_DEFAULT_REGION")
            .ok()
            .or_else(|| captures.name("region").map(|m| m.as_str().to_string()));

        let key = captures.name("key").map(|m| m.as_str().into());

        BackendConfig::S3(S3Config {
            region,
            bucket,
            key,
        })
    }

    fn parse_local(captures: regex::Captures) -> Self {
        let path = captures
            .name("path")
            .expect("path regex must contain a path group")
            .as_str();

        let path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{path}")
        };

        BackendConfig::Local(LocalConfig { path })
    }

    pub(crate) fn key(&self) -> Option<Path> {
        match self {
            BackendConfig::S3(s3) => s3.key.clone(),
            BackendConfig::Local(local) => Some(Path::from(local.path.as_str())),
        }
    }
}

/// Storage provider that abstracts over the supported backends.
#[derive(Clone)]
pub struct StorageProvider {
    pub(crate) config: BackendConfig,
    pub(crate) object_store: Arc<dyn ObjectStore>,
    pub(crate) storage_options: HashMap<String, String>,
}

impl std::fmt::Debug for StorageProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "StorageProvider<{}>", self.url())
    }
}

impl StorageProvider {
    /// Create a storage provider for the given URL.
    pub fn for_url(url: &str) -> Result<Self, StorageError> {
        Self::for_url_with_options(url, HashMap::new())
    }

    /// Create a storage provider for the given URL with storage options.
    pub fn for_url_with_options(
        url: &str,
        options: HashMap<String, String>,
    ) -> Result<Self, StorageError> {
        match BackendConfig::parse_url(url)? {
            BackendConfig::S3(config) => Self::construct_s3(config, options),
            BackendConfig::Local(config) => Self::construct_local(config, options),
        }
    }

    /// The canonical URL of this location, usable as a Delta table root.
    pub fn url(&self) -> String {
        match &self.config {
            BackendConfig::S3(s3) => match &s3.key {
                Some(key) => format!("s3://{}/{}", s3.bucket, key),
                None => format!("s3://{}", s3.bucket),
            },
            BackendConfig::Local(local) => format!("file://{}", local.path),
        }
    }

    /// List files under this location recursively, filtered by extension.
    ///
    /// Returns paths relative to the configured prefix, sorted for
    /// deterministic scan ordering.
    pub async fn list_sorted(&self, extension: &str) -> Result<Vec<String>, StorageError> {
        let prefix = self.config.key();
        let prefix_parts = prefix
            .as_ref()
            .map(|p| p.parts().count())
            .unwrap_or_default();

        let mut stream = self.object_store.list(prefix.as_ref());
        let mut files = Vec::new();

        while let Some(result) = stream.next().await {
            let meta = result.context(ObjectStoreSnafu)?;
            if meta.location.as_ref().ends_with(extension) {
                // Strip the prefix so callers get relative paths
                let relative: Path = meta.location.parts().skip(prefix_parts).collect();
                files.push(relative.to_string());
            }
        }

        files.sort();
        Ok(files)
    }

    /// Get the contents of a file.
    pub async fn get(&self, path: impl Into<Path>) -> Result<Bytes, StorageError> {
        let path = path.into();
        let bytes = self
            .object_store
            .get(&self.qualify_path(&path))
            .await
            .context(ObjectStoreSnafu)?
            .bytes()
            .await
            .context(ObjectStoreSnafu)?;
        Ok(bytes)
    }

    /// Put bytes to a path.
    ///
    /// The local backend stages the write and renames into place, so a
    /// single put is atomic: readers observe either the old object or the
    /// new one, never a torn write.
    pub async fn put(&self, path: impl Into<Path>, bytes: Bytes) -> Result<(), StorageError> {
        let path = path.into();
        self.object_store
            .put(&self.qualify_path(&path), PutPayload::from(bytes))
            .await
            .context(ObjectStoreSnafu)?;
        Ok(())
    }

    /// Check whether an object exists.
    pub async fn exists(&self, path: impl Into<Path>) -> Result<bool, StorageError> {
        let path = path.into();
        match self.object_store.head(&self.qualify_path(&path)).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(source) => Err(StorageError::ObjectStore { source }),
        }
    }

    /// Qualify a path with the configured key prefix.
    pub fn qualify_path<'a>(&self, path: &'a Path) -> Cow<'a, Path> {
        match self.config.key() {
            Some(prefix) => Cow::Owned(prefix.parts().chain(path.parts()).collect()),
            None => Cow::Borrowed(path),
        }
    }

    /// Get storage options for external integrations (e.g., Delta Lake).
    pub fn storage_options(&self) -> &HashMap<String, String> {
        &self.storage_options
    }

    /// Get the backend configuration.
    pub fn config(&self) -> &BackendConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_s3_url_parsing() {
        let config = BackendConfig::parse_url("s3://mybucket/path/to/data").unwrap();
        match config {
            BackendConfig::S3(s3) => {
                assert_eq!(s3.bucket, "mybucket");
                assert_eq!(s3.key, Some(Path::from("path/to/data")));
            }
            _ => panic!("Expected S3 config"),
        }
    }

    #[test]
    fn test_local_url_parsing() {
        let config = BackendConfig::parse_url("/data/flights/incoming").unwrap();
        match config {
            BackendConfig::Local(local) => {
                assert_eq!(local.path, "/data/flights/incoming");
            }
            _ => panic!("Expected Local config"),
        }
    }

    #[test]
    fn test_file_uri_parsing() {
        let config = BackendConfig::parse_url("file:///data/tables/flights").unwrap();
        match config {
            BackendConfig::Local(local) => {
                assert_eq!(local.path, "/data/tables/flights");
            }
            _ => panic!("Expected Local config"),
        }
    }

    #[test]
    fn test_invalid_url_rejected() {
        let err = BackendConfig::parse_url("ftp://nope/data").unwrap_err();
        assert!(matches!(err, StorageError::InvalidUrl { .. }));
    }

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let storage =
            StorageProvider::for_url(temp_dir.path().to_str().unwrap()).unwrap();

        storage
            .put("Year=2008/part-a.parquet", Bytes::from_static(b"payload"))
            .await
            .unwrap();

        let bytes = storage.get("Year=2008/part-a.parquet").await.unwrap();
        assert_eq!(bytes.as_ref(), b"payload");
        assert!(storage.exists("Year=2008/part-a.parquet").await.unwrap());
        assert!(!storage.exists("Year=2008/part-b.parquet").await.unwrap());
    }

    #[tokio::test]
    async fn test_list_sorted_returns_relative_paths() {
        let temp_dir = TempDir::new().unwrap();
        let base = temp_dir.path();

        let nested = base.join("2008");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(nested.join("march.csv"), b"a,b\n1,2\n").unwrap();
        std::fs::write(nested.join("january.csv"), b"a,b\n1,2\n").unwrap();
        std::fs::write(nested.join("notes.txt"), b"ignore me").unwrap();

        let storage = StorageProvider::for_url(base.to_str().unwrap()).unwrap();
        let files = storage.list_sorted(".csv").await.unwrap();

        assert_eq!(files, vec!["2008/january.csv", "2008/march.csv"]);
    }
}
