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

//! Snapshot lineage analysis.
//!
//! Walks parent links from the current snapshot back to the lineage root and
//! turns each snapshot summary into a [`SnapshotMetric`], oldest first.

use crate::error::{AnalysisWarning, WarningCollector};
use crate::reader::iceberg::metadata::{Operation, Snapshot, TableMetadata};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tracing::debug;

/// Snapshots older than this (relative to the table's last update) are
/// listed as expirable unless configured otherwise.
pub const DEFAULT_SNAPSHOT_RETENTION: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Change metrics of one snapshot on the current lineage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMetric {
    pub snapshot_id: i64,
    /// Parent on the walked lineage; `None` for the lineage root.
    pub parent_snapshot_id: Option<i64>,
    pub timestamp_ms: i64,
    pub operation: Operation,
    pub records_added: u64,
    pub records_removed: u64,
    pub data_files_added: u64,
    pub data_files_removed: u64,
    pub delete_files_added: u64,
    pub delete_files_removed: u64,
    pub bytes_added: u64,
    pub bytes_removed: u64,
    pub changed_partitions: u64,
    pub elapsed_ms_since_parent: Option<i64>,
    pub cumulative_records: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpirableSnapshot {
    pub snapshot_id: i64,
    pub timestamp_ms: i64,
    pub operation: Operation,
}

pub struct SnapshotAnalyzer<'a> {
    metadata: &'a TableMetadata,
}

impl<'a> SnapshotAnalyzer<'a> {
    pub fn new(metadata: &'a TableMetadata) -> Self {
        Self { metadata }
    }

    /// Snapshots from the lineage root to the current snapshot.
    ///
    /// Stops at a missing parent or at a link that revisits a snapshot
    /// already walked, recording a warning in either case.
    pub fn lineage(&self, warnings: &mut WarningCollector) -> Vec<&'a Snapshot> {
        let Some(current) = self.metadata.current_snapshot() else {
            return Vec::new();
        };
        let by_id: HashMap<i64, &Snapshot> = self
            .metadata
            .snapshots
            .iter()
            .map(|s| (s.snapshot_id, s))
            .collect();

        let mut chain = vec![current];
        let mut visited = HashSet::from([current.snapshot_id]);
        let mut cursor = current;
        while let Some(parent_id) = cursor.parent_snapshot_id {
            let Some(parent) = by_id.get(&parent_id).copied() else {
                warnings.push(AnalysisWarning::MissingParent {
                    snapshot_id: cursor.snapshot_id,
                    parent_id,
                });
                break;
            };
            if !visited.insert(parent_id) {
                warnings.push(AnalysisWarning::LineageCycle {
                    snapshot_id: cursor.snapshot_id,
                });
                break;
            }
            chain.push(parent);
            cursor = parent;
        }
        chain.reverse();
        chain
    }

    /// One metric per lineage snapshot, oldest first.
    pub fn analyze(&self, warnings: &mut WarningCollector) -> Vec<SnapshotMetric> {
        let lineage = self.lineage(warnings);
        let mut metrics = Vec::with_capacity(lineage.len());
        let mut cumulative: u64 = 0;
        let mut previous: Option<&Snapshot> = None;

        for snapshot in lineage {
            let summary = &snapshot.summary;
            let records_added = summary.added_records();
            let records_removed = summary.deleted_records();
            cumulative = cumulative
                .saturating_add(records_added)
                .saturating_sub(records_removed);

            let elapsed = previous.map(|parent| snapshot.timestamp_ms - parent.timestamp_ms);
            if let (Some(parent), Some(elapsed)) = (previous, elapsed) {
                if elapsed <= 0 {
                    warnings.push(AnalysisWarning::NonMonotonicTimestamp {
                        snapshot_id: snapshot.snapshot_id,
                        parent_id: parent.snapshot_id,
                    });
                }
            }

            metrics.push(SnapshotMetric {
                snapshot_id: snapshot.snapshot_id,
                parent_snapshot_id: previous.map(|p| p.snapshot_id),
                timestamp_ms: snapshot.timestamp_ms,
                operation: summary.operation,
                records_added,
                records_removed,
                data_files_added: summary.added_data_files(),
                data_files_removed: summary.deleted_data_files(),
                delete_files_added: summary.added_delete_files(),
                delete_files_removed: summary.removed_delete_files(),
                bytes_added: summary.added_files_size(),
                bytes_removed: summary.removed_files_size(),
                changed_partitions: summary.changed_partition_count(),
                elapsed_ms_since_parent: elapsed,
                cumulative_records: cumulative,
            });
            previous = Some(snapshot);
        }

        debug!(
            "Analyzed snapshot lineage, lineage_len={}, total_snapshots={}",
            metrics.len(),
            self.metadata.snapshots.len()
        );
        metrics
    }

    /// Snapshots other than the current one committed before
    /// `last-updated-ms - retention`, ordered by timestamp then id.
    pub fn expirable(&self, retention: Duration) -> Vec<ExpirableSnapshot> {
        let retention_ms = i64::try_from(retention.as_millis()).unwrap_or(i64::MAX);
        let cutoff = self.metadata.last_updated_ms.saturating_sub(retention_ms);

        let mut expirable: Vec<ExpirableSnapshot> = self
            .metadata
            .snapshots
            .iter()
            .filter(|s| Some(s.snapshot_id) != self.metadata.current_snapshot_id)
            .filter(|s| s.timestamp_ms < cutoff)
            .map(|s| ExpirableSnapshot {
                snapshot_id: s.snapshot_id,
                timestamp_ms: s.timestamp_ms,
                operation: s.summary.operation,
            })
            .collect();
        expirable.sort_by_key(|s| (s.timestamp_ms, s.snapshot_id));
        expirable
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::iceberg::fixtures::{metadata_json, FixtureSnapshot};

    const ROOT: &str = "memory:///wh/db/events/metadata/v3.metadata.json";
    const DAY_MS: i64 = 24 * 60 * 60 * 1000;

    fn table(current: Option<i64>, snapshots: &[FixtureSnapshot]) -> TableMetadata {
        TableMetadata::from_json(ROOT, metadata_json(current, snapshots).as_bytes()).unwrap()
    }

    fn snap(id: i64, parent: Option<i64>, ts: i64) -> FixtureSnapshot {
        FixtureSnapshot::new(id, parent, ts, "snap.avro")
    }

    #[test]
    fn test_lineage_is_oldest_first_regardless_of_source_order() {
        let metadata = table(
            Some(3),
            &[
                snap(3, Some(2), 3_000).with_summary(&[("added-records", "5")]),
                snap(1, None, 1_000).with_summary(&[("added-records", "100"), ("added-data-files", "2")]),
                snap(2, Some(1), 2_000).with_summary(&[("added-records", "50"), ("deleted-records", "20")]),
            ],
        );
        let mut warnings = WarningCollector::new();
        let metrics = SnapshotAnalyzer::new(&metadata).analyze(&mut warnings);

        assert!(warnings.is_empty());
        let ids: Vec<i64> = metrics.iter().map(|m| m.snapshot_id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(metrics[0].parent_snapshot_id, None);
        assert_eq!(metrics[0].elapsed_ms_since_parent, None);
        assert_eq!(metrics[0].data_files_added, 2);
        assert_eq!(metrics[1].elapsed_ms_since_parent, Some(1_000));
        assert_eq!(metrics[1].records_removed, 20);
        assert_eq!(
            metrics.iter().map(|m| m.cumulative_records).collect::<Vec<_>>(),
            vec![100, 130, 135]
        );
        assert!(metrics.windows(2).all(|w| w[0].timestamp_ms < w[1].timestamp_ms));
    }

    #[test]
    fn test_snapshots_off_lineage_are_skipped() {
        let metadata = table(
            Some(3),
            &[snap(1, None, 1), snap(2, Some(1), 2), snap(3, Some(1), 3)],
        );
        let mut warnings = WarningCollector::new();
        let metrics = SnapshotAnalyzer::new(&metadata).analyze(&mut warnings);
        let ids: Vec<i64> = metrics.iter().map(|m| m.snapshot_id).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[test]
    fn test_missing_parent_becomes_root() {
        let metadata = table(Some(8), &[snap(7, Some(99), 5_000), snap(8, Some(7), 6_000)]);
        let mut warnings = WarningCollector::new();
        let metrics = SnapshotAnalyzer::new(&metadata).analyze(&mut warnings);

        assert_eq!(metrics.len(), 2);
        assert_eq!(metrics[0].snapshot_id, 7);
        assert_eq!(metrics[0].parent_snapshot_id, None);
        assert_eq!(
            warnings.into_warnings(),
            vec![AnalysisWarning::MissingParent {
                snapshot_id: 7,
                parent_id: 99
            }]
        );
    }

    #[test]
    fn test_cycle_stops_the_walk() {
        let metadata = table(Some(2), &[snap(1, Some(2), 1_000), snap(2, Some(1), 2_000)]);
        let mut warnings = WarningCollector::new();
        let metrics = SnapshotAnalyzer::new(&metadata).analyze(&mut warnings);

        assert_eq!(metrics.iter().map(|m| m.snapshot_id).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(
            warnings.into_warnings(),
            vec![AnalysisWarning::LineageCycle { snapshot_id: 1 }]
        );
    }

    #[test]
    fn test_non_monotonic_timestamp_warns() {
        let metadata = table(Some(2), &[snap(1, None, 5_000), snap(2, Some(1), 5_000)]);
        let mut warnings = WarningCollector::new();
        let metrics = SnapshotAnalyzer::new(&metadata).analyze(&mut warnings);

        assert_eq!(metrics.len(), 2);
        assert_eq!(metrics[1].elapsed_ms_since_parent, Some(0));
        assert_eq!(
            warnings.into_warnings(),
            vec![AnalysisWarning::NonMonotonicTimestamp {
                snapshot_id: 2,
                parent_id: 1
            }]
        );
    }

    #[test]
    fn test_cumulative_records_saturate_at_zero() {
        let metadata = table(
            Some(2),
            &[
                snap(1, None, 1).with_summary(&[("added-records", "10")]),
                snap(2, Some(1), 2)
                    .with_operation("delete")
                    .with_summary(&[("deleted-records", "25")]),
            ],
        );
        let mut warnings = WarningCollector::new();
        let metrics = SnapshotAnalyzer::new(&metadata).analyze(&mut warnings);
        assert_eq!(metrics[1].operation, Operation::Delete);
        assert_eq!(metrics[1].cumulative_records, 0);
    }

    #[test]
    fn test_no_current_snapshot() {
        let metadata = table(None, &[]);
        let mut warnings = WarningCollector::new();
        assert!(SnapshotAnalyzer::new(&metadata).analyze(&mut warnings).is_empty());
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_expirable_snapshots() {
        let now = 100 * DAY_MS;
        let metadata = table(
            Some(4),
            &[
                snap(2, None, now - 50 * DAY_MS),
                snap(1, None, now - 50 * DAY_MS),
                snap(3, Some(2), now - 40 * DAY_MS),
                snap(5, Some(3), now - 5 * DAY_MS),
                snap(4, Some(5), now),
            ],
        );
        let analyzer = SnapshotAnalyzer::new(&metadata);

        let expirable = analyzer.expirable(DEFAULT_SNAPSHOT_RETENTION);
        let ids: Vec<i64> = expirable.iter().map(|s| s.snapshot_id).collect();
        assert_eq!(ids, vec![1, 2, 3]);

        let ids: Vec<i64> = analyzer
            .expirable(Duration::from_secs(0))
            .iter()
            .map(|s| s.snapshot_id)
            .collect();
        assert_eq!(ids, vec![1, 2, 3, 5]);
    }
}
