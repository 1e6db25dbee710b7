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

use super::location::resolve_reference;
use super::manifest::{
    parse_manifest, parse_manifest_list, ManifestArena, ManifestContent, ManifestId,
    ManifestListEntry,
};
use super::metadata::{ManifestSource, Snapshot, TableMetadata};
use crate::error::{AnalysisError, AnalysisResult, AnalysisWarning, WarningCollector};
use crate::storage::StorageProvider;
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

/// Everything read from one metadata tree.
#[derive(Debug, Clone)]
pub struct LoadedTable {
    pub metadata_location: String,
    pub metadata: TableMetadata,
    /// Manifests of the current snapshot, paths resolved, in list order.
    pub manifest_list: Vec<ManifestListEntry>,
    /// Entries of every manifest that decoded successfully.
    pub arena: ManifestArena,
    /// Manifests (or the manifest list) excluded after a fetch/decode failure.
    pub skipped_manifests: usize,
}

/// Manifests referenced only by retained, non-current snapshots.
#[derive(Debug, Clone, Default)]
pub struct RetainedManifests {
    /// Paths resolved, deduplicated against the current snapshot's manifests.
    pub manifest_list: Vec<ManifestListEntry>,
    pub arena: ManifestArena,
    pub skipped_manifests: usize,
}

/// Reads Iceberg root metadata and the manifest tree of its current snapshot.
pub struct MetadataReader {
    storage: Arc<dyn StorageProvider>,
    parallelism: usize,
}

impl MetadataReader {
    pub fn new(storage: Arc<dyn StorageProvider>, parallelism: usize) -> Self {
        Self {
            storage,
            parallelism: parallelism.max(1),
        }
    }

    /// Fetch and validate the root metadata document.
    ///
    /// # Errors
    ///
    /// * `UnreachableRoot` if the document cannot be fetched
    /// * `UnsupportedFormat` / `InvalidMetadata` if it cannot be used
    pub async fn read_root(&self, location: &str) -> AnalysisResult<TableMetadata> {
        let bytes = self
            .storage
            .read_file(location)
            .await
            .map_err(|source| AnalysisError::UnreachableRoot {
                location: location.to_string(),
                source,
            })?;
        let metadata = TableMetadata::from_json(location, &bytes)?;
        info!(
            "Read table metadata, location={}, format_version={}, snapshots={}, current_snapshot_id={:?}",
            location,
            metadata.format_version,
            metadata.snapshots.len(),
            metadata.current_snapshot_id
        );
        Ok(metadata)
    }

    /// Read the root document plus the manifests of its current snapshot.
    ///
    /// Manifest list and manifest failures are recorded in `warnings` and the
    /// failing file contributes nothing; only root failures are errors.
    pub async fn read_table(
        &self,
        location: &str,
        warnings: &mut WarningCollector,
    ) -> AnalysisResult<LoadedTable> {
        let metadata = self.read_root(location).await?;

        let (manifest_list, list_skipped) = match metadata.current_snapshot() {
            Some(snapshot) => self.read_manifest_list(location, &metadata, snapshot, warnings).await,
            None => (Vec::new(), 0),
        };
        let (arena, skipped) = self.read_manifests(&manifest_list, warnings).await;

        Ok(LoadedTable {
            metadata_location: location.to_string(),
            metadata,
            manifest_list,
            arena,
            skipped_manifests: list_skipped + skipped,
        })
    }

    /// Manifest list of `snapshot` with every manifest path resolved.
    async fn read_manifest_list(
        &self,
        root_location: &str,
        metadata: &TableMetadata,
        snapshot: &Snapshot,
        warnings: &mut WarningCollector,
    ) -> (Vec<ManifestListEntry>, usize) {
        match self.fetch_manifest_list(root_location, metadata, snapshot).await {
            Ok(entries) => (entries, 0),
            Err(warning) => {
                warnings.push(warning);
                (Vec::new(), 1)
            }
        }
    }

    async fn fetch_manifest_list(
        &self,
        root_location: &str,
        metadata: &TableMetadata,
        snapshot: &Snapshot,
    ) -> Result<Vec<ManifestListEntry>, AnalysisWarning> {
        let mut entries = match &snapshot.manifests {
            ManifestSource::List(list) => {
                let list_location = resolve_reference(root_location, list);
                let outcome = match self.storage.read_file(&list_location).await {
                    Ok(bytes) => parse_manifest_list(&bytes, metadata.default_spec_id)
                        .map_err(|e| e.to_string()),
                    Err(e) => Err(e.to_string()),
                };
                outcome.map_err(|reason| AnalysisWarning::ManifestParse {
                    path: list_location,
                    reason,
                })?
            }
            ManifestSource::Manifests(paths) => paths
                .iter()
                .map(|path| ManifestListEntry {
                    manifest_path: path.clone(),
                    manifest_length: 0,
                    partition_spec_id: metadata.default_spec_id,
                    content: ManifestContent::Data,
                    sequence_number: None,
                    added_snapshot_id: Some(snapshot.snapshot_id),
                    added_files_count: 0,
                    existing_files_count: 0,
                    deleted_files_count: 0,
                    added_rows_count: 0,
                    existing_rows_count: 0,
                    deleted_rows_count: 0,
                })
                .collect(),
        };

        for entry in entries.iter_mut() {
            entry.manifest_path = resolve_reference(root_location, &entry.manifest_path);
        }
        debug!(
            "Read manifest list, snapshot_id={}, manifests={}",
            snapshot.snapshot_id,
            entries.len()
        );
        Ok(entries)
    }

    /// Manifests reachable only from snapshots other than the current one.
    ///
    /// Manifest lists and manifests are fetched with at most `parallelism`
    /// in flight; manifests already in `table` are not read again.
    /// Failures are recorded in `warnings` and counted in
    /// [`RetainedManifests::skipped_manifests`].
    pub async fn read_retained(
        &self,
        table: &LoadedTable,
        warnings: &mut WarningCollector,
    ) -> RetainedManifests {
        let root = table.metadata_location.as_str();
        let metadata = &table.metadata;
        let retained: Vec<&Snapshot> = metadata
            .snapshots
            .iter()
            .filter(|s| Some(s.snapshot_id) != metadata.current_snapshot_id)
            .collect();

        let mut lists: Vec<(usize, Result<Vec<ManifestListEntry>, AnalysisWarning>)> =
            stream::iter(retained.iter().enumerate())
                .map(|(i, snapshot)| async move {
                    (i, self.fetch_manifest_list(root, metadata, snapshot).await)
                })
                .buffer_unordered(self.parallelism)
                .collect()
                .await;
        lists.sort_by_key(|(i, _)| *i);

        let mut known: HashSet<String> = table
            .manifest_list
            .iter()
            .map(|m| m.manifest_path.clone())
            .collect();
        let mut manifest_list = Vec::new();
        let mut skipped = 0;
        for (_, outcome) in lists {
            match outcome {
                Ok(entries) => manifest_list.extend(
                    entries
                        .into_iter()
                        .filter(|m| known.insert(m.manifest_path.clone())),
                ),
                Err(warning) => {
                    skipped += 1;
                    warnings.push(warning);
                }
            }
        }

        let (arena, manifest_skipped) = self.read_manifests(&manifest_list, warnings).await;
        debug!(
            "Read retained manifests, snapshots={}, manifests={}, skipped={}",
            retained.len(),
            manifest_list.len(),
            skipped + manifest_skipped
        );
        RetainedManifests {
            manifest_list,
            arena,
            skipped_manifests: skipped + manifest_skipped,
        }
    }

    /// Fetch and decode manifests with at most `parallelism` in flight.
    async fn read_manifests(
        &self,
        manifest_list: &[ManifestListEntry],
        warnings: &mut WarningCollector,
    ) -> (ManifestArena, usize) {
        let storage = &self.storage;
        let mut results: Vec<(usize, Result<_, String>)> = stream::iter(manifest_list.iter().enumerate())
            .map(|(i, entry)| async move {
                let outcome = match storage.read_file(&entry.manifest_path).await {
                    Ok(bytes) => parse_manifest(&bytes, ManifestId(i), entry.partition_spec_id)
                        .map_err(|e| e.to_string()),
                    Err(e) => Err(e.to_string()),
                };
                (i, outcome)
            })
            .buffer_unordered(self.parallelism)
            .collect()
            .await;
        results.sort_by_key(|(i, _)| *i);

        let mut arena = ManifestArena::new();
        let mut skipped = 0;
        for (i, outcome) in results {
            let path = manifest_list[i].manifest_path.clone();
            match outcome {
                Ok(manifest) => arena.push(ManifestId(i), path, manifest),
                Err(reason) => {
                    skipped += 1;
                    warnings.push(AnalysisWarning::ManifestParse { path, reason });
                }
            }
        }

        info!(
            "Read manifests, count={}, skipped={}, entries={}, parallelism={}",
            arena.manifest_count(),
            skipped,
            arena.entries().len(),
            self.parallelism
        );
        (arena, skipped)
    }
}
