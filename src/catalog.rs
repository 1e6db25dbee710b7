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

//! Catalog resolution: turn a table identifier into the location of its
//! current root metadata document.
//!
//! Only in-process resolvers live here. Remote catalogs plug in through
//! [`CatalogResolver`].

use crate::analyze::orphan::VERSION_HINT_FILE;
use crate::error::{AnalysisError, AnalysisResult};
use crate::storage::{StorageError, StorageProvider};
use async_trait::async_trait;
use futures::TryStreamExt;
use std::collections::HashMap;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};

/// `namespace.table`, where the namespace may have several levels.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableIdentifier {
    pub namespace: Vec<String>,
    pub name: String,
}

impl TableIdentifier {
    pub fn new(namespace: &[&str], name: &str) -> Self {
        Self {
            namespace: namespace.iter().map(|s| s.to_string()).collect(),
            name: name.to_string(),
        }
    }
}

impl FromStr for TableIdentifier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('.').collect();
        if parts.len() < 2 || parts.iter().any(|p| p.is_empty()) {
            return Err(format!(
                "Invalid table identifier '{}', expected <namespace>.<table>",
                s
            ));
        }
        let (name, namespace) = parts.split_last().ok_or_else(|| s.to_string())?;
        Ok(Self::new(namespace, name))
    }
}

impl Display for TableIdentifier {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}.{}", self.namespace.join("."), self.name)
    }
}

/// Resolves table identifiers to root metadata locations.
#[async_trait]
pub trait CatalogResolver: Send + Sync {
    /// # Errors
    ///
    /// `AnalysisError::CatalogResolution` when the table is unknown or its
    /// catalog entry cannot be read.
    async fn resolve(&self, table: &TableIdentifier) -> AnalysisResult<String>;
}

fn resolution_error(table: &TableIdentifier, reason: impl Into<String>) -> AnalysisError {
    AnalysisError::CatalogResolution {
        table: table.to_string(),
        reason: reason.into(),
    }
}

/// Fixed identifier to metadata location map.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    tables: HashMap<TableIdentifier, String>,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, table: TableIdentifier, metadata_location: &str) -> Self {
        self.tables.insert(table, metadata_location.to_string());
        self
    }
}

#[async_trait]
impl CatalogResolver for StaticCatalog {
    async fn resolve(&self, table: &TableIdentifier) -> AnalysisResult<String> {
        self.tables
            .get(table)
            .cloned()
            .ok_or_else(|| resolution_error(table, "table not registered"))
    }
}

/// Hadoop-style warehouse layout:
/// `<warehouse>/<namespace...>/<table>/metadata/version-hint.text` names the
/// current `v<N>.metadata.json`. Without a hint file the highest listed
/// version wins.
pub struct VersionHintCatalog {
    storage: Arc<dyn StorageProvider>,
    warehouse: String,
}

impl VersionHintCatalog {
    pub fn new(storage: Arc<dyn StorageProvider>, warehouse: &str) -> Self {
        Self {
            storage,
            warehouse: warehouse.trim_end_matches('/').to_string(),
        }
    }

    fn metadata_dir(&self, table: &TableIdentifier) -> String {
        let mut parts = vec![self.warehouse.as_str()];
        parts.extend(table.namespace.iter().map(String::as_str));
        parts.push(table.name.as_str());
        parts.push("metadata");
        parts.join("/")
    }

    /// Metadata file name for the contents of a hint file.
    fn hinted_file(hint: &str) -> Option<String> {
        let hint = hint.trim();
        if hint.is_empty() {
            return None;
        }
        if hint.ends_with(".metadata.json") {
            return Some(hint.to_string());
        }
        hint.parse::<u64>()
            .ok()
            .map(|version| format!("v{}.metadata.json", version))
    }

    /// Version number of a root metadata file name: `v12.metadata.json` or
    /// `00012-<uuid>.metadata.json`.
    fn metadata_version(file_name: &str) -> Option<u64> {
        let stem = file_name.strip_suffix(".metadata.json")?;
        let digits = match stem.strip_prefix('v') {
            Some(rest) => rest,
            None => stem.split('-').next()?,
        };
        digits.parse().ok()
    }

    async fn latest_listed(&self, table: &TableIdentifier, dir: &str) -> AnalysisResult<String> {
        let files: Vec<_> = self
            .storage
            .list_files(dir)
            .try_collect()
            .await
            .map_err(|e| resolution_error(table, format!("listing {}: {}", dir, e)))?;

        files
            .iter()
            .filter_map(|file| {
                let name = file.path.rsplit('/').next()?;
                Self::metadata_version(name).map(|v| (v, name))
            })
            .max_by_key(|(version, _)| *version)
            .map(|(_, name)| format!("{}/{}", dir, name))
            .ok_or_else(|| resolution_error(table, format!("no metadata files under {}", dir)))
    }
}

#[async_trait]
impl CatalogResolver for VersionHintCatalog {
    async fn resolve(&self, table: &TableIdentifier) -> AnalysisResult<String> {
        let dir = self.metadata_dir(table);
        let hint_location = format!("{}/{}", dir, VERSION_HINT_FILE);

        let location = match self.storage.read_file(&hint_location).await {
            Ok(bytes) => {
                let hint = String::from_utf8_lossy(&bytes);
                let file = Self::hinted_file(&hint).ok_or_else(|| {
                    resolution_error(table, format!("unreadable version hint '{}'", hint.trim()))
                })?;
                format!("{}/{}", dir, file)
            }
            Err(StorageError::NotFound { .. }) => {
                debug!("No version hint, listing metadata dir={}", dir);
                self.latest_listed(table, &dir).await?
            }
            Err(e) => return Err(resolution_error(table, e.to_string())),
        };

        info!("Resolved table={} to metadata location={}", table, location);
        Ok(location)
    }
}
