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

use super::error::{StorageError, StorageResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

/// Option keys consumed by the client/retry layer rather than a backend builder.
pub const CLIENT_OPTION_KEYS: [&str; 6] = [
    "timeout",
    "connect_timeout",
    "max_retries",
    "retry_timeout",
    "pool_idle_timeout",
    "pool_max_idle_per_host",
];

/// Storage provider type
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    /// Local filesystem storage
    Local,
    /// Process-local in-memory store, mostly for tests
    Memory,
    /// AWS S3 storage
    Aws,
    /// Azure Data Lake Storage
    Azure,
    /// Google Cloud Storage
    Gcs,
}

impl FromStr for StorageType {
    type Err = StorageError;

    fn from_str(s: &str) -> StorageResult<Self> {
        match s.to_lowercase().as_str() {
            "local" | "file" => Ok(StorageType::Local),
            "memory" => Ok(StorageType::Memory),
            "aws" | "s3" => Ok(StorageType::Aws),
            "azure" | "abfs" | "abfss" => Ok(StorageType::Azure),
            "gcs" | "gcp" | "gs" => Ok(StorageType::Gcs),
            other => Err(StorageError::ConfigError(format!(
                "Unknown storage type: {}",
                other
            ))),
        }
    }
}

/// Generic configuration for storage providers using object_store
///
/// Provider-specific options are kept in a string map and handed to the
/// matching object_store builder.
///
/// # Examples
///
/// ## Local filesystem
/// ```
/// use iceberg_pulse::storage::StorageConfig;
///
/// let config = StorageConfig::local()
///     .with_option("path", "/tmp/warehouse");
/// ```
///
/// ## AWS S3
/// ```
/// use iceberg_pulse::storage::StorageConfig;
///
/// let config = StorageConfig::aws()
///     .with_option("bucket", "my-bucket")
///     .with_option("region", "us-east-1");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Storage provider type
    #[serde(rename = "type")]
    pub storage_type: StorageType,

    /// Provider-specific configuration options
    ///
    /// AWS S3: bucket, region, access_key_id, secret_access_key,
    /// session_token, endpoint, allow_http
    ///
    /// Azure: container, account_name, access_key, sas_token, tenant_id,
    /// client_id, client_secret
    ///
    /// GCS: bucket, service_account_key_path, service_account_key
    ///
    /// Local: path
    ///
    /// All types: timeout, connect_timeout, max_retries, retry_timeout,
    /// pool_idle_timeout, pool_max_idle_per_host
    #[serde(default)]
    pub options: HashMap<String, String>,
}

impl StorageConfig {
    /// Create a new storage configuration from a type name
    /// ("local", "memory", "aws"/"s3", "azure", "gcs").
    pub fn new(storage_type: &str) -> StorageResult<Self> {
        Ok(Self::of(storage_type.parse()?))
    }

    fn of(storage_type: StorageType) -> Self {
        Self {
            storage_type,
            options: Self::default_options(),
        }
    }

    /// Local filesystem storage rooted at the `path` option.
    pub fn local() -> Self {
        Self::of(StorageType::Local)
    }

    /// In-memory storage. Every provider built from it starts empty.
    pub fn memory() -> Self {
        Self::of(StorageType::Memory)
    }

    /// AWS S3 storage.
    pub fn aws() -> Self {
        Self::of(StorageType::Aws)
    }

    /// Azure Data Lake / Blob storage.
    pub fn azure() -> Self {
        Self::of(StorageType::Azure)
    }

    /// Google Cloud Storage.
    pub fn gcs() -> Self {
        Self::of(StorageType::Gcs)
    }

    /// Get default options for all storage types.
    ///
    /// # Returns
    ///
    /// A HashMap containing default timeout, retry, and connection pool settings.
    pub fn default_options() -> HashMap<String, String> {
        [
            ("timeout", "300"),
            ("connect_timeout", "30"),
            ("max_retries", "5"),
            ("retry_timeout", "300"),
            ("pool_idle_timeout", "15"),
            ("pool_max_idle_per_host", "5"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    /// Build a configuration from environment variables.
    ///
    /// `<PREFIX>TYPE` selects the storage type (default "local") and every
    /// other `<PREFIX><KEY>` variable becomes the lower-cased option `<key>`.
    /// For example `ICEBERG_PULSE_STORAGE_BUCKET=lake` sets `bucket=lake`.
    pub fn from_env(prefix: &str) -> StorageResult<Self> {
        Self::from_vars(prefix, std::env::vars())
    }

    fn from_vars(
        prefix: &str,
        vars: impl IntoIterator<Item = (String, String)>,
    ) -> StorageResult<Self> {
        let mut storage_type = StorageType::Local;
        let mut options = HashMap::new();
        for (key, value) in vars {
            let Some(option) = key.strip_prefix(prefix) else {
                continue;
            };
            if option == "TYPE" {
                storage_type = value.parse()?;
            } else if !option.is_empty() {
                options.insert(option.to_lowercase(), value);
            }
        }
        Ok(Self::of(storage_type).with_options(options))
    }

    /// Add a configuration option.
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Add multiple configuration options.
    pub fn with_options(mut self, options: HashMap<String, String>) -> Self {
        self.options.extend(options);
        self
    }

    /// Get a configuration option.
    pub fn get_option(&self, key: &str) -> Option<&String> {
        self.options.get(key)
    }

    /// Parse a numeric option, falling back to `default` when missing or invalid.
    pub fn numeric_option<T: FromStr>(&self, key: &str, default: T) -> T {
        self.options
            .get(key)
            .and_then(|v| v.parse::<T>().ok())
            .unwrap_or(default)
    }

    /// Get the storage type as a string.
    pub fn storage_type_str(&self) -> &str {
        match self.storage_type {
            StorageType::Local => "local",
            StorageType::Memory => "memory",
            StorageType::Aws => "aws",
            StorageType::Azure => "azure",
            StorageType::Gcs => "gcs",
        }
    }
}
