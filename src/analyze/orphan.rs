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

//! Orphan file detection: files under the table location that no metadata
//! references.

use crate::error::{AnalysisWarning, WarningCollector};
use crate::reader::iceberg::location::{parent_dir, resolve_reference};
use crate::reader::iceberg::metadata::ManifestSource;
use crate::reader::iceberg::{LoadedTable, MetadataReader, RetainedManifests};
use crate::storage::{FileMetadata, StorageProvider, StorageResult};
use async_trait::async_trait;
use bloomfilter::Bloom;
use futures::stream::{BoxStream, StreamExt};
use serde::Serialize;
use std::collections::HashSet;
use tracing::{debug, info};

pub const VERSION_HINT_FILE: &str = "version-hint.text";

/// Store-relative paths of every file the table metadata points at.
#[derive(Debug, Clone, Default)]
pub struct ReferencedFiles {
    paths: HashSet<String>,
}

impl ReferencedFiles {
    pub fn new() -> Self {
        Self::default()
    }

    /// Root document, metadata log, version hint, every snapshot's manifest
    /// list, the current manifests and the files they list.
    pub fn from_table(table: &LoadedTable, storage: &dyn StorageProvider) -> Self {
        let root = table.metadata_location.as_str();
        let mut referenced = Self::new();

        referenced.insert(storage, root);
        referenced.insert(
            storage,
            &format!("{}/{}", parent_dir(root), VERSION_HINT_FILE),
        );
        for entry in &table.metadata.metadata_log {
            referenced.insert(storage, &resolve_reference(root, &entry.metadata_file));
        }
        for snapshot in &table.metadata.snapshots {
            match &snapshot.manifests {
                ManifestSource::List(list) => {
                    referenced.insert(storage, &resolve_reference(root, list))
                }
                ManifestSource::Manifests(paths) => {
                    for path in paths {
                        referenced.insert(storage, &resolve_reference(root, path));
                    }
                }
            }
        }
        for manifest in &table.manifest_list {
            referenced.insert(storage, &manifest.manifest_path);
        }
        for entry in table.arena.entries() {
            referenced.insert(storage, &entry.file_path);
        }
        referenced
    }

    /// Add the manifests of retained snapshots and the files they list.
    pub fn extend_retained(&mut self, retained: &RetainedManifests, storage: &dyn StorageProvider) {
        for manifest in &retained.manifest_list {
            self.insert(storage, &manifest.manifest_path);
        }
        for entry in retained.arena.entries() {
            self.insert(storage, &entry.file_path);
        }
    }

    pub fn insert(&mut self, storage: &dyn StorageProvider, location: &str) {
        self.paths.insert(storage.relative_path(location));
    }

    pub fn contains(&self, path: &str) -> bool {
        self.paths.contains(path)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.paths.iter()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrphanFile {
    pub path: String,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrphanSummary {
    pub prefix: String,
    pub listed_files: u64,
    pub referenced_files: usize,
    pub orphan_count: usize,
    pub orphan_size_bytes: u64,
    /// Sorted by path.
    pub orphans: Vec<OrphanFile>,
}

/// Strategy for diffing a storage listing against the referenced set.
#[async_trait]
pub trait OrphanFileDetector: Send + Sync {
    /// Consume `listing` once and return the listed files that are not in
    /// `referenced`. Listing paths are store-relative.
    ///
    /// # Errors
    ///
    /// The first error yielded by the listing.
    async fn detect(
        &self,
        prefix: &str,
        referenced: &ReferencedFiles,
        listing: BoxStream<'_, StorageResult<FileMetadata>>,
    ) -> StorageResult<OrphanSummary>;
}

/// Bloom filter pre-check over the referenced side with exact confirmation
/// of every hit. Only orphans are kept in memory.
#[derive(Debug, Clone)]
pub struct BloomOrphanDetector {
    false_positive_rate: f64,
}

impl BloomOrphanDetector {
    pub fn new(false_positive_rate: f64) -> Self {
        Self {
            false_positive_rate: false_positive_rate.clamp(f64::MIN_POSITIVE, 0.5),
        }
    }
}

impl Default for BloomOrphanDetector {
    fn default() -> Self {
        Self::new(0.01)
    }
}

#[async_trait]
impl OrphanFileDetector for BloomOrphanDetector {
    async fn detect(
        &self,
        prefix: &str,
        referenced: &ReferencedFiles,
        mut listing: BoxStream<'_, StorageResult<FileMetadata>>,
    ) -> StorageResult<OrphanSummary> {
        let mut bloom: Bloom<String> =
            Bloom::new_for_fp_rate(referenced.len().max(1), self.false_positive_rate);
        for path in referenced.iter() {
            bloom.set(path);
        }

        let mut listed_files = 0u64;
        let mut false_positives = 0u64;
        let mut orphans = Vec::new();
        while let Some(file) = listing.next().await {
            let file = file?;
            listed_files += 1;
            if bloom.check(&file.path) {
                if referenced.contains(&file.path) {
                    continue;
                }
                false_positives += 1;
            }
            orphans.push(OrphanFile {
                path: file.path,
                size_bytes: file.size,
            });
        }
        orphans.sort_by(|a, b| a.path.cmp(&b.path));

        debug!(
            "Bloom orphan check, listed={}, referenced={}, false_positives={}",
            listed_files,
            referenced.len(),
            false_positives
        );
        Ok(OrphanSummary {
            prefix: prefix.to_string(),
            listed_files,
            referenced_files: referenced.len(),
            orphan_count: orphans.len(),
            orphan_size_bytes: orphans.iter().map(|o| o.size_bytes).sum(),
            orphans,
        })
    }
}

/// List the table location and diff it against everything any snapshot of
/// `table` references.
///
/// Manifests of retained snapshots are read through `reader`; their
/// failures land in `warnings` as `ManifestParse`.
///
/// # Errors
///
/// The warning to report instead of a summary:
/// * `IncompleteReferences` if any manifest list or manifest could not be
///   read, since files it lists would look unreferenced
/// * `OrphanListing` if the listing fails
pub async fn find_orphans(
    detector: &dyn OrphanFileDetector,
    reader: &MetadataReader,
    storage: &dyn StorageProvider,
    table: &LoadedTable,
    warnings: &mut WarningCollector,
) -> Result<OrphanSummary, AnalysisWarning> {
    let prefix = storage.relative_path(&table.metadata.location);
    let retained = reader.read_retained(table, warnings).await;

    let unreadable = table.skipped_manifests + retained.skipped_manifests;
    if unreadable > 0 {
        return Err(AnalysisWarning::IncompleteReferences {
            prefix,
            unreadable_manifests: unreadable,
        });
    }

    let mut referenced = ReferencedFiles::from_table(table, storage);
    referenced.extend_retained(&retained, storage);
    let summary = detector
        .detect(&prefix, &referenced, storage.list_files(&prefix))
        .await
        .map_err(|e| AnalysisWarning::OrphanListing {
            prefix: prefix.clone(),
            reason: e.to_string(),
        })?;
    info!(
        "Found orphan files, prefix={}, listed={}, orphans={}, orphan_bytes={}",
        summary.prefix, summary.listed_files, summary.orphan_count, summary.orphan_size_bytes
    );
    Ok(summary)
}
