// Copyright 2025 Adobe. All rights reserved.
// This file is licensed to you under the Apache License,
// Version 2.0 (http://www.apache.org/licenses/LICENSE-2.0)
// or the MIT license (http://opensource.org/licenses/MIT),
// at your option.
//
// Unless required by applicable law or agreed to in writing,
// this software is distributed on an "AS IS" BASIS, WITHOUT
// WARRANTIES OR REPRESENTATIONS OF ANY KIND, either express or
// implied. See the LICENSE-MIT and LICENSE-APACHE files for the
// specific language governing permissions and limitations under
// each license.

use super::config::{StorageConfig, StorageType, CLIENT_OPTION_KEYS};
use super::error::{StorageError, StorageResult};
use super::provider::{string_to_path, FileMetadata, StorageProvider};
use crate::util::retry::retry_with_backoff;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{BoxStream, StreamExt};
use object_store::{
    aws::AmazonS3Builder, azure::MicrosoftAzureBuilder, gcp::GoogleCloudStorageBuilder,
    local::LocalFileSystem, memory::InMemory, ClientOptions, ObjectStore, ObjectStoreExt,
    RetryConfig,
};
use std::fmt::{Debug, Formatter};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const BASE_BACKOFF: Duration = Duration::from_millis(100);
const MEMORY_BASE: &str = "memory://";

/// Storage provider that works with any object_store backend
pub struct ObjectStoreProvider {
    pub config: StorageConfig,
    pub store: Arc<dyn ObjectStore>,
    pub base_path: String,
}

impl ObjectStoreProvider {
    /// Create a new storage provider from configuration.
    ///
    /// # Errors
    ///
    /// This function will return an error if:
    /// * Required configuration options are missing
    /// * The storage backend cannot be created (e.g., invalid credentials)
    pub async fn new(config: StorageConfig) -> StorageResult<Self> {
        let (store, base_path) = Self::build_store(&config)?;
        debug!(
            "Built object store, type={}, base_path={}",
            config.storage_type_str(),
            base_path
        );

        Ok(Self {
            config,
            store: Arc::from(store),
            base_path,
        })
    }

    /// Wrap an already built store, e.g. an `InMemory` store shared with a test.
    pub fn from_store(
        config: StorageConfig,
        store: Arc<dyn ObjectStore>,
        base_path: impl Into<String>,
    ) -> Self {
        Self {
            config,
            store,
            base_path: base_path.into(),
        }
    }

    fn build_store(config: &StorageConfig) -> StorageResult<(Box<dyn ObjectStore>, String)> {
        match config.storage_type {
            StorageType::Local => Self::build_local_store(config),
            StorageType::Memory => Ok((Box::new(InMemory::new()), MEMORY_BASE.to_string())),
            StorageType::Aws => Self::build_aws_store(config),
            StorageType::Azure => Self::build_azure_store(config),
            StorageType::Gcs => Self::build_gcs_store(config),
        }
    }

    /// Build a local filesystem store rooted at the canonical form of the
    /// `path` option, which must be an existing directory.
    fn build_local_store(config: &StorageConfig) -> StorageResult<(Box<dyn ObjectStore>, String)> {
        let path = config.get_option("path").ok_or_else(|| {
            StorageError::ConfigError("Local storage requires 'path' option".to_string())
        })?;

        let canonical_path = PathBuf::from(path).canonicalize().map_err(|e| {
            StorageError::ConfigError(format!(
                "Failed to resolve path '{}': {} (path must exist)",
                path, e
            ))
        })?;

        if !canonical_path.is_dir() {
            return Err(StorageError::ConfigError(format!(
                "Base path is not a directory: {}",
                canonical_path.display()
            )));
        }

        let store = LocalFileSystem::new_with_prefix(&canonical_path).map_err(|e| {
            StorageError::ConfigError(format!("Failed to create local store: {}", e))
        })?;

        let base_path = canonical_path
            .to_string_lossy()
            .replace('\\', "/")
            .trim_start_matches("//?/")
            .to_string();
        Ok((Box::new(store), base_path))
    }

    /// Map the shared timeout and pool options onto object_store's `ClientOptions`.
    ///
    /// "0" or "disabled" turns a timeout off; unparseable values are ignored.
    fn build_connection_options(config: &StorageConfig) -> ClientOptions {
        let mut client_options = ClientOptions::default();
        let disabled = |v: &String| v == "0" || v == "disabled";

        if let Some(timeout) = config.get_option("timeout") {
            if disabled(timeout) {
                client_options = client_options.with_timeout_disabled();
            } else if let Ok(sec) = timeout.parse::<u64>() {
                client_options = client_options.with_timeout(Duration::from_secs(sec));
            }
        }
        if let Some(connect_timeout) = config.get_option("connect_timeout") {
            if disabled(connect_timeout) {
                client_options = client_options.with_connect_timeout_disabled();
            } else if let Ok(sec) = connect_timeout.parse::<u64>() {
                client_options = client_options.with_connect_timeout(Duration::from_secs(sec));
            }
        }
        if let Some(sec) = config
            .get_option("pool_idle_timeout")
            .and_then(|v| v.parse::<u64>().ok())
        {
            client_options = client_options.with_pool_idle_timeout(Duration::from_secs(sec));
        }
        if let Some(max_idle) = config
            .get_option("pool_max_idle_per_host")
            .and_then(|v| v.parse::<usize>().ok())
        {
            client_options = client_options.with_pool_max_idle_per_host(max_idle);
        }
        client_options
    }

    fn build_retry_options(config: &StorageConfig) -> RetryConfig {
        let defaults = RetryConfig::default();
        RetryConfig {
            backoff: Default::default(),
            max_retries: config.numeric_option("max_retries", defaults.max_retries),
            retry_timeout: config
                .get_option("retry_timeout")
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.retry_timeout),
        }
    }

    fn max_retries(&self) -> usize {
        self.config.numeric_option("max_retries", 5)
    }

    /// Custom endpoints must be absolute URLs.
    fn checked_endpoint(value: &str) -> StorageResult<String> {
        url::Url::parse(value)?;
        Ok(value.to_string())
    }

    fn build_aws_store(config: &StorageConfig) -> StorageResult<(Box<dyn ObjectStore>, String)> {
        let mut builder = AmazonS3Builder::new()
            .with_client_options(Self::build_connection_options(config))
            .with_retry(Self::build_retry_options(config));
        let mut bucket: Option<&String> = None;

        for (key, value) in &config.options {
            match key.as_str() {
                "bucket" => {
                    bucket = Some(value);
                    builder = builder.with_bucket_name(value);
                }
                "region" => builder = builder.with_region(value),
                "access_key_id" => builder = builder.with_access_key_id(value),
                "secret_access_key" => builder = builder.with_secret_access_key(value),
                "session_token" | "token" => builder = builder.with_token(value),
                "endpoint" => builder = builder.with_endpoint(Self::checked_endpoint(value)?),
                "allow_http" => builder = builder.with_allow_http(value.eq_ignore_ascii_case("true")),
                k if CLIENT_OPTION_KEYS.contains(&k) => (),
                _ => warn!("Unknown AWS S3 option: {}", key),
            }
        }

        let bucket = bucket.ok_or_else(|| {
            StorageError::ConfigError("AWS S3 requires 'bucket' option".to_string())
        })?;
        let store = builder
            .build()
            .map_err(|e| StorageError::ConfigError(format!("Failed to create S3 store: {}", e)))?;

        // Metadata files always reference s3:// locations, even behind custom endpoints
        Ok((Box::new(store), format!("s3://{}", bucket)))
    }

    fn build_azure_store(config: &StorageConfig) -> StorageResult<(Box<dyn ObjectStore>, String)> {
        let account_name = config.get_option("account_name").ok_or_else(|| {
            StorageError::ConfigError("Azure requires 'account_name' option".to_string())
        })?;
        let container = config.get_option("container").ok_or_else(|| {
            StorageError::ConfigError("Azure requires 'container' option".to_string())
        })?;

        let mut builder = MicrosoftAzureBuilder::new()
            .with_client_options(Self::build_connection_options(config))
            .with_retry(Self::build_retry_options(config))
            .with_account(account_name)
            .with_container_name(container);
        let mut use_fabric_endpoint = false;

        for (key, value) in &config.options {
            match key.as_str() {
                "container" | "account_name" => (),
                "access_key" | "account_key" => builder = builder.with_access_key(value),
                "sas_token" => {
                    let pairs: Vec<(String, String)> = value
                        .trim_start_matches('?')
                        .split('&')
                        .filter_map(|pair| {
                            pair.split_once('=')
                                .map(|(k, v)| (k.to_string(), v.to_string()))
                        })
                        .collect();
                    builder = builder.with_sas_authorization(pairs);
                }
                "tenant_id" => builder = builder.with_tenant_id(value),
                "client_id" => builder = builder.with_client_id(value),
                "client_secret" => builder = builder.with_client_secret(value),
                "use_fabric_endpoint" => {
                    use_fabric_endpoint = value.eq_ignore_ascii_case("true");
                    builder = builder.with_use_fabric_endpoint(use_fabric_endpoint);
                }
                "endpoint" => builder = builder.with_endpoint(Self::checked_endpoint(value)?),
                k if CLIENT_OPTION_KEYS.contains(&k) => (),
                _ => warn!("Unknown Azure option: {}", key),
            }
        }

        let store = builder.build().map_err(|e| {
            StorageError::ConfigError(format!("Failed to create Azure store: {}", e))
        })?;

        let endpoint_domain = if use_fabric_endpoint {
            "dfs.fabric.microsoft.com"
        } else {
            "dfs.core.windows.net"
        };
        let base_url = format!("abfss://{}@{}.{}", container, account_name, endpoint_domain);
        Ok((Box::new(store), base_url))
    }

    fn build_gcs_store(config: &StorageConfig) -> StorageResult<(Box<dyn ObjectStore>, String)> {
        let mut builder = GoogleCloudStorageBuilder::new()
            .with_client_options(Self::build_connection_options(config))
            .with_retry(Self::build_retry_options(config));
        let mut bucket: Option<&String> = None;

        for (key, value) in &config.options {
            match key.as_str() {
                "bucket" => {
                    bucket = Some(value);
                    builder = builder.with_bucket_name(value);
                }
                "service_account_key_path" => builder = builder.with_service_account_path(value),
                "service_account_key" => builder = builder.with_service_account_key(value),
                k if CLIENT_OPTION_KEYS.contains(&k) => (),
                _ => warn!("Unknown GCS option: {}", key),
            }
        }

        let bucket = bucket
            .ok_or_else(|| StorageError::ConfigError("GCS requires 'bucket' option".to_string()))?;
        let store = builder
            .build()
            .map_err(|e| StorageError::ConfigError(format!("Failed to create GCS store: {}", e)))?;

        Ok((Box::new(store), format!("gs://{}", bucket)))
    }
}

#[async_trait]
impl StorageProvider for ObjectStoreProvider {
    fn base_path(&self) -> &str {
        &self.base_path
    }

    async fn read_file(&self, location: &str) -> StorageResult<Bytes> {
        let object_path = string_to_path(&self.relative_path(location));
        let store = Arc::clone(&self.store);

        retry_with_backoff(
            self.max_retries(),
            BASE_BACKOFF,
            &format!("read_file({})", object_path),
            || async {
                let result = store.get(&object_path).await?;
                Ok::<Bytes, StorageError>(result.bytes().await?)
            },
        )
        .await
    }

    async fn exists(&self, location: &str) -> StorageResult<bool> {
        let object_path = string_to_path(&self.relative_path(location));
        match self.store.head(&object_path).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn list_files<'a>(&'a self, prefix: &str) -> BoxStream<'a, StorageResult<FileMetadata>> {
        let relative = self.relative_path(prefix);
        let object_path = (!relative.is_empty()).then(|| string_to_path(&relative));

        self.store
            .list(object_path.as_ref())
            .map(|meta| -> StorageResult<FileMetadata> {
                let meta = meta?;
                Ok(FileMetadata {
                    path: meta.location.to_string(),
                    size: meta.size,
                    last_modified: Some(meta.last_modified),
                })
            })
            .boxed()
    }

    fn uri_from_path(&self, path: &str) -> String {
        let relative = self.relative_path(path);
        match self.config.storage_type {
            StorageType::Local => {
                format!("file:///{}/{}", self.base_path.trim_start_matches('/'), relative)
            }
            StorageType::Memory => format!("{}/{}", MEMORY_BASE, relative),
            _ => format!("{}/{}", self.base_path.trim_end_matches('/'), relative),
        }
    }
}

impl Debug for ObjectStoreProvider {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "StorageProvider(type=object_store, backend={}, base_path={})",
            self.config.storage_type_str(),
            self.base_path
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;
    use object_store::PutPayload;
    use std::fs;
    use tempfile::TempDir;

    async fn local_provider(temp_dir: &TempDir) -> ObjectStoreProvider {
        let config = StorageConfig::local().with_option("path", temp_dir.path().to_str().unwrap());
        ObjectStoreProvider::new(config).await.unwrap()
    }

    #[test]
    fn test_build_retry_options_custom() {
        let config = StorageConfig::aws()
            .with_option("max_retries", "3")
            .with_option("retry_timeout", "60");
        let retry = ObjectStoreProvider::build_retry_options(&config);
        assert_eq!(retry.max_retries, 3);
        assert_eq!(retry.retry_timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_build_retry_options_invalid_values() {
        let config = StorageConfig::aws()
            .with_option("max_retries", "lots")
            .with_option("retry_timeout", "soon");
        let retry = ObjectStoreProvider::build_retry_options(&config);
        let defaults = RetryConfig::default();
        assert_eq!(retry.max_retries, defaults.max_retries);
        assert_eq!(retry.retry_timeout, defaults.retry_timeout);
    }

    #[tokio::test]
    async fn test_new_local_provider_missing_path() {
        let result = ObjectStoreProvider::new(StorageConfig::local()).await;
        match result {
            Err(StorageError::ConfigError(msg)) => assert!(msg.contains("path")),
            _ => panic!("Expected ConfigError"),
        }
    }

    #[tokio::test]
    async fn test_new_local_provider_file_not_directory() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("v1.metadata.json");
        fs::write(&file_path, "{}").unwrap();

        let config = StorageConfig::local().with_option("path", file_path.to_str().unwrap());
        let result = ObjectStoreProvider::new(config).await;
        assert!(matches!(result, Err(StorageError::ConfigError(_))));
    }

    #[tokio::test]
    async fn test_aws_requires_bucket() {
        let result = ObjectStoreProvider::new(StorageConfig::aws().with_option("region", "us-east-1")).await;
        match result {
            Err(StorageError::ConfigError(msg)) => assert!(msg.contains("bucket")),
            _ => panic!("Expected ConfigError"),
        }
    }

    #[tokio::test]
    async fn test_aws_rejects_malformed_endpoint() {
        let config = StorageConfig::aws()
            .with_option("bucket", "lake")
            .with_option("endpoint", "minio-9000");
        let result = ObjectStoreProvider::new(config).await;
        assert!(matches!(result, Err(StorageError::UrlParseError(_))));
    }

    #[tokio::test]
    async fn test_read_file_by_absolute_and_uri_location() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir_all(temp_dir.path().join("t/metadata")).unwrap();
        fs::write(temp_dir.path().join("t/metadata/v1.metadata.json"), b"{\"a\":1}").unwrap();
        let provider = local_provider(&temp_dir).await;

        let relative = provider.read_file("t/metadata/v1.metadata.json").await.unwrap();
        let uri = provider.uri_from_path("t/metadata/v1.metadata.json");
        assert!(uri.starts_with("file:///"));
        let via_uri = provider.read_file(&uri).await.unwrap();

        assert_eq!(relative, Bytes::from_static(b"{\"a\":1}"));
        assert_eq!(relative, via_uri);
    }

    #[tokio::test]
    async fn test_read_file_nonexistent() {
        let temp_dir = TempDir::new().unwrap();
        let provider = local_provider(&temp_dir).await;

        let result = provider.read_file("missing/v9.metadata.json").await;
        assert!(matches!(result, Err(StorageError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_exists() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("version-hint.text"), "3").unwrap();
        let provider = local_provider(&temp_dir).await;

        assert!(provider.exists("version-hint.text").await.unwrap());
        assert!(!provider.exists("nope.text").await.unwrap());
    }

    #[tokio::test]
    async fn test_list_files_recursive_stream() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir_all(temp_dir.path().join("t/data/p=1")).unwrap();
        fs::create_dir_all(temp_dir.path().join("t/metadata")).unwrap();
        fs::create_dir_all(temp_dir.path().join("other")).unwrap();
        fs::write(temp_dir.path().join("t/data/p=1/a.parquet"), vec![0u8; 10]).unwrap();
        fs::write(temp_dir.path().join("t/metadata/v1.metadata.json"), "{}").unwrap();
        fs::write(temp_dir.path().join("other/x.parquet"), "x").unwrap();
        let provider = local_provider(&temp_dir).await;

        let mut files: Vec<FileMetadata> = provider.list_files("t").try_collect().await.unwrap();
        files.sort_by(|a, b| a.path.cmp(&b.path));

        let paths: Vec<&str> = files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["t/data/p=1/a.parquet", "t/metadata/v1.metadata.json"]);
        assert_eq!(files[0].size, 10);
    }

    #[tokio::test]
    async fn test_memory_store_shared_with_caller() {
        let store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
        store
            .put(
                &string_to_path("wh/t/metadata/v1.metadata.json"),
                PutPayload::from(Bytes::from_static(b"{}")),
            )
            .await
            .unwrap();

        let provider = ObjectStoreProvider::from_store(StorageConfig::memory(), store, MEMORY_BASE);
        let bytes = provider
            .read_file("memory:///wh/t/metadata/v1.metadata.json")
            .await
            .unwrap();
        assert_eq!(bytes, Bytes::from_static(b"{}"));
        assert_eq!(
            provider.uri_from_path("wh/t/metadata/v1.metadata.json"),
            "memory:///wh/t/metadata/v1.metadata.json"
        );
    }

    #[tokio::test]
    async fn test_debug_implementation() {
        let provider = ObjectStoreProvider::new(StorageConfig::memory()).await.unwrap();
        let debug_str = format!("{:?}", provider);
        assert!(debug_str.contains("backend=memory"));
    }
}
