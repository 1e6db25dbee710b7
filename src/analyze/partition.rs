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

//! Partition level statistics over the live entries of the current snapshot.

use crate::reader::iceberg::manifest::{DataContent, DataFileEntry, PartitionKey};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PartitionStats {
    pub partition: PartitionKey,
    /// Live data plus delete files.
    pub file_count: u64,
    pub data_file_count: u64,
    pub delete_file_count: u64,
    pub total_size_bytes: u64,
    /// Records of live data files only.
    pub total_records: u64,
    pub avg_file_size_bytes: f64,
    /// Entries carrying the deleted status.
    pub deleted_entries: u64,
    /// `(size - mean) / mean` over partitions with live files; 0.0 for a
    /// partition that only has deleted entries.
    pub size_skew_score: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PartitionSkew {
    /// Partitions holding at least one live file.
    pub partition_count: usize,
    /// Coefficient of variation of partition sizes.
    pub skew: f64,
    pub largest_partition_size: u64,
    pub smallest_partition_size: u64,
    pub avg_partition_size: f64,
    pub partition_size_std_dev: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileTypeMetrics {
    pub content: DataContent,
    pub file_count: u64,
    pub min_records: u64,
    pub max_records: u64,
    pub avg_records: f64,
    pub min_size_bytes: u64,
    pub max_size_bytes: u64,
    pub avg_size_bytes: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TableTotals {
    pub total_size_bytes: u64,
    pub total_files: u64,
    /// Data records minus delete-file records, floored at zero.
    pub total_records: u64,
    pub data_file_count: u64,
    pub data_size_bytes: u64,
    pub data_records: u64,
    pub delete_file_count: u64,
    pub delete_size_bytes: u64,
    pub delete_records: u64,
    pub partition_count: usize,
    pub manifest_count: usize,
    pub skipped_manifests: usize,
    pub deleted_entries: u64,
}

impl PartitionStats {
    pub fn is_live(&self) -> bool {
        self.file_count > 0
    }
}

/// Everything [`PartitionStatsEngine::analyze`] derives from one entry set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PartitionAnalysis {
    pub partitions: Vec<PartitionStats>,
    pub skew: PartitionSkew,
    pub file_types: Vec<FileTypeMetrics>,
    pub totals: TableTotals,
}

#[derive(Default)]
struct PartitionAccumulator {
    data_file_count: u64,
    delete_file_count: u64,
    total_size_bytes: u64,
    total_records: u64,
    deleted_entries: u64,
}

pub struct PartitionStatsEngine<'a> {
    entries: &'a [DataFileEntry],
}

impl<'a> PartitionStatsEngine<'a> {
    pub fn new(entries: &'a [DataFileEntry]) -> Self {
        Self { entries }
    }

    /// One row per distinct partition key, largest partitions first.
    pub fn partition_stats(&self) -> Vec<PartitionStats> {
        let mut groups: BTreeMap<&PartitionKey, PartitionAccumulator> = BTreeMap::new();
        for entry in self.entries {
            let acc = groups.entry(&entry.partition).or_default();
            if !entry.status.is_live() {
                acc.deleted_entries += 1;
                continue;
            }
            acc.total_size_bytes = acc.total_size_bytes.saturating_add(entry.file_size_in_bytes);
            if entry.content.is_delete() {
                acc.delete_file_count += 1;
            } else {
                acc.data_file_count += 1;
                acc.total_records = acc.total_records.saturating_add(entry.record_count);
            }
        }

        // Churn-only partitions hold no data and stay out of the mean
        let live_sizes: Vec<f64> = groups
            .values()
            .filter(|a| a.data_file_count + a.delete_file_count > 0)
            .map(|a| a.total_size_bytes as f64)
            .collect();
        let mean = if live_sizes.is_empty() {
            0.0
        } else {
            live_sizes.iter().sum::<f64>() / live_sizes.len() as f64
        };

        let mut stats: Vec<PartitionStats> = groups
            .into_iter()
            .map(|(key, acc)| {
                let file_count = acc.data_file_count + acc.delete_file_count;
                PartitionStats {
                    partition: key.clone(),
                    file_count,
                    data_file_count: acc.data_file_count,
                    delete_file_count: acc.delete_file_count,
                    total_size_bytes: acc.total_size_bytes,
                    total_records: acc.total_records,
                    avg_file_size_bytes: if file_count > 0 {
                        acc.total_size_bytes as f64 / file_count as f64
                    } else {
                        0.0
                    },
                    deleted_entries: acc.deleted_entries,
                    size_skew_score: if file_count > 0 && mean > 0.0 {
                        (acc.total_size_bytes as f64 - mean) / mean
                    } else {
                        0.0
                    },
                }
            })
            .collect();

        // BTreeMap iteration already ordered keys; a stable sort keeps that for ties
        stats.sort_by(|a, b| b.total_size_bytes.cmp(&a.total_size_bytes));
        stats
    }

    /// Live file statistics per content type: data, position deletes, equality deletes.
    pub fn file_type_metrics(&self) -> Vec<FileTypeMetrics> {
        let mut by_type: BTreeMap<DataContent, Vec<&DataFileEntry>> = BTreeMap::new();
        for entry in self.entries.iter().filter(|e| e.status.is_live()) {
            by_type.entry(entry.content).or_default().push(entry);
        }

        by_type
            .into_iter()
            .map(|(content, files)| {
                let count = files.len() as u64;
                let records: Vec<u64> = files.iter().map(|f| f.record_count).collect();
                let sizes: Vec<u64> = files.iter().map(|f| f.file_size_in_bytes).collect();
                FileTypeMetrics {
                    content,
                    file_count: count,
                    min_records: records.iter().copied().min().unwrap_or(0),
                    max_records: records.iter().copied().max().unwrap_or(0),
                    avg_records: records.iter().map(|&r| r as f64).sum::<f64>() / count as f64,
                    min_size_bytes: sizes.iter().copied().min().unwrap_or(0),
                    max_size_bytes: sizes.iter().copied().max().unwrap_or(0),
                    avg_size_bytes: sizes.iter().map(|&s| s as f64).sum::<f64>() / count as f64,
                }
            })
            .collect()
    }

    pub fn totals(&self, partition_count: usize) -> TableTotals {
        let mut totals = TableTotals {
            partition_count,
            ..TableTotals::default()
        };
        for entry in self.entries {
            if !entry.status.is_live() {
                totals.deleted_entries += 1;
                continue;
            }
            if entry.content.is_delete() {
                totals.delete_file_count += 1;
                totals.delete_size_bytes =
                    totals.delete_size_bytes.saturating_add(entry.file_size_in_bytes);
                totals.delete_records = totals.delete_records.saturating_add(entry.record_count);
            } else {
                totals.data_file_count += 1;
                totals.data_size_bytes =
                    totals.data_size_bytes.saturating_add(entry.file_size_in_bytes);
                totals.data_records = totals.data_records.saturating_add(entry.record_count);
            }
        }
        totals.total_files = totals.data_file_count + totals.delete_file_count;
        totals.total_size_bytes = totals.data_size_bytes.saturating_add(totals.delete_size_bytes);
        totals.total_records = totals.data_records.saturating_sub(totals.delete_records);
        totals
    }

    pub fn analyze(&self) -> PartitionAnalysis {
        let partitions = self.partition_stats();
        let skew = partition_skew(&partitions);
        let file_types = self.file_type_metrics();
        let totals = self.totals(skew.partition_count);
        debug!(
            "Computed partition stats, partitions={}, live_files={}, skew={:.4}",
            partitions.len(),
            totals.total_files,
            skew.skew
        );
        PartitionAnalysis {
            partitions,
            skew,
            file_types,
            totals,
        }
    }
}

/// Size distribution over partitions with live files. The coefficient of
/// variation is 0.0 for zero or one such partition and for a zero mean.
pub fn partition_skew(partitions: &[PartitionStats]) -> PartitionSkew {
    let sizes: Vec<u64> = partitions
        .iter()
        .filter(|p| p.is_live())
        .map(|p| p.total_size_bytes)
        .collect();
    if sizes.is_empty() {
        return PartitionSkew::default();
    }
    let n = sizes.len() as f64;
    let mean = sizes.iter().map(|&s| s as f64).sum::<f64>() / n;
    let variance = sizes
        .iter()
        .map(|&s| (s as f64 - mean).powi(2))
        .sum::<f64>()
        / n;
    let std_dev = variance.sqrt();
    let skew = if sizes.len() > 1 && mean > 0.0 {
        std_dev / mean
    } else {
        0.0
    };

    PartitionSkew {
        partition_count: sizes.len(),
        skew,
        largest_partition_size: sizes.iter().copied().max().unwrap_or(0),
        smallest_partition_size: sizes.iter().copied().min().unwrap_or(0),
        avg_partition_size: mean,
        partition_size_std_dev: std_dev,
    }
}
