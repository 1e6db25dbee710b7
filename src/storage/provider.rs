// Copyright 2022 Adobe. All rights reserved.
// This file is licensed to you under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License. You may obtain a copy
// of the License at http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software distributed under
// the License is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR REPRESENTATIONS
// OF ANY KIND, either express or implied. See the License for the specific language
// governing permissions and limitations under the License.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use object_store::path::Path as ObjectPath;
use std::fmt::{Debug, Formatter, Result as FmtResult};

use super::error::StorageResult;

/// Metadata about a file in storage
#[derive(Debug, Clone)]
pub struct FileMetadata {
    /// Store-relative path to the file
    pub path: String,

    /// File size in bytes
    pub size: u64,

    /// Last modified timestamp (if available)
    pub last_modified: Option<chrono::DateTime<chrono::Utc>>,
}

/// Storage access used by the metadata reader, the catalog resolvers and the
/// orphan detector.
///
/// Locations handed to a provider may be full URIs under [`base_path`]
/// (`s3://bucket/warehouse/...`, `file:///tmp/warehouse/...`), absolute local
/// paths, or paths already relative to the store root.
///
/// [`base_path`]: StorageProvider::base_path
#[async_trait]
pub trait StorageProvider: Send + Sync {
    /// Get the base path/prefix for this storage provider.
    fn base_path(&self) -> &str;

    /// Read the full contents of a file.
    ///
    /// # Errors
    ///
    /// This function will return an error if:
    /// * The file does not exist (`StorageError::NotFound`)
    /// * Permission denied (`StorageError::AccessDenied`)
    /// * Network or storage access errors persist after retries
    async fn read_file(&self, location: &str) -> StorageResult<Bytes>;

    /// Check if a file exists. A missing file is `Ok(false)`, not an error.
    async fn exists(&self, location: &str) -> StorageResult<bool>;

    /// Recursively list every file under `prefix`.
    ///
    /// The listing is streamed; callers that only need a summary never hold
    /// the whole listing in memory.
    fn list_files<'a>(&'a self, prefix: &str) -> BoxStream<'a, StorageResult<FileMetadata>>;

    /// Convert a location into a path relative to the store root.
    fn relative_path(&self, location: &str) -> String {
        relative_to_base(self.base_path(), location)
    }

    /// Get a full provider-specific URL for a path
    /// (e.g., "s3://bucket/path", "file:///path").
    fn uri_from_path(&self, path: &str) -> String;
}

impl Debug for dyn StorageProvider {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "StorageProvider(base_path={})", self.base_path())
    }
}

/// Helper function to create an ObjectPath from a string
pub(crate) fn string_to_path(s: &str) -> ObjectPath {
    ObjectPath::from(s)
}

/// Strip the scheme and the provider base from `location`.
///
/// `file:` URIs are reduced to plain absolute paths first so that a local
/// base such as `/tmp/wh` matches both `file:///tmp/wh/x` and `/tmp/wh/x`.
pub(crate) fn relative_to_base(base: &str, location: &str) -> String {
    let location = location.replace('\\', "/");
    let base = base.replace('\\', "/");

    let location = match location.strip_prefix("file:") {
        Some(rest) => format!("/{}", rest.trim_start_matches('/')),
        None => location,
    };
    let base = match base.strip_prefix("file:") {
        Some(rest) => format!("/{}", rest.trim_start_matches('/')),
        None => base,
    };
    let base = base.trim_end_matches('/');

    let under_base = location
        .strip_prefix(base)
        .filter(|rest| !base.is_empty() && (rest.is_empty() || rest.starts_with('/') || base.ends_with(':')));

    let stripped = if let Some(rest) = under_base {
        rest
    } else if let Some((_, rest)) = location.split_once("://") {
        // Different authority than the base: keep everything after it
        rest.split_once('/').map(|(_, path)| path).unwrap_or("")
    } else {
        location.as_str()
    };

    stripped.trim_start_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use futures::stream::{self, StreamExt};

    #[test]
    fn test_file_metadata_with_timestamp() {
        let now = Utc::now();
        let metadata = FileMetadata {
            path: "warehouse/db/t/data/00000-0.parquet".to_string(),
            size: 2048,
            last_modified: Some(now),
        };

        assert_eq!(metadata.size, 2048);
        assert_eq!(metadata.last_modified, Some(now));
    }

    #[test]
    fn test_string_to_path_with_slashes() {
        let path_str = "a/b/c/d/file.parquet";
        let object_path = string_to_path(path_str);
        assert_eq!(object_path.as_ref(), path_str);
    }

    #[test]
    fn test_relative_to_base_cloud_uri() {
        assert_eq!(
            relative_to_base("s3://lake", "s3://lake/wh/t/metadata/v1.metadata.json"),
            "wh/t/metadata/v1.metadata.json"
        );
        assert_eq!(
            relative_to_base("s3://lake/", "s3://lake/wh/t/data/a.parquet"),
            "wh/t/data/a.parquet"
        );
    }

    #[test]
    fn test_relative_to_base_local_forms() {
        let base = "/tmp/wh";
        assert_eq!(relative_to_base(base, "/tmp/wh/t/m.avro"), "t/m.avro");
        assert_eq!(relative_to_base(base, "file:///tmp/wh/t/m.avro"), "t/m.avro");
        assert_eq!(relative_to_base(base, "file:/tmp/wh/t/m.avro"), "t/m.avro");
    }

    #[test]
    fn test_relative_to_base_already_relative() {
        assert_eq!(relative_to_base("s3://lake", "wh/t/m.avro"), "wh/t/m.avro");
        assert_eq!(relative_to_base("memory://", "/wh/t/m.avro"), "wh/t/m.avro");
    }

    #[test]
    fn test_relative_to_base_foreign_authority() {
        assert_eq!(
            relative_to_base("s3://lake", "s3://other/wh/t/m.avro"),
            "wh/t/m.avro"
        );
        assert_eq!(relative_to_base("s3://lake", "s3://lakehouse/x.avro"), "x.avro");
    }

    #[test]
    fn test_storage_provider_debug() {
        struct MockProvider;

        #[async_trait]
        impl StorageProvider for MockProvider {
            fn base_path(&self) -> &str {
                "s3://mock"
            }

            async fn read_file(&self, _location: &str) -> StorageResult<Bytes> {
                Ok(Bytes::new())
            }

            async fn exists(&self, _location: &str) -> StorageResult<bool> {
                Ok(true)
            }

            fn list_files<'a>(
                &'a self,
                _prefix: &str,
            ) -> BoxStream<'a, StorageResult<FileMetadata>> {
                stream::empty().boxed()
            }

            fn uri_from_path(&self, path: &str) -> String {
                format!("s3://mock/{}", path)
            }
        }

        let provider: &dyn StorageProvider = &MockProvider;
        let debug_str = format!("{:?}", provider);
        assert!(debug_str.contains("StorageProvider"));
        assert!(debug_str.contains("s3://mock"));
        assert_eq!(provider.relative_path("s3://mock/a/b"), "a/b");
    }
}
