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

use crate::analyze::metrics::HealthReport;
use crate::analyze::orphan::OrphanSummary;
use crate::analyze::partition::PartitionAnalysis;
use crate::analyze::snapshot::{ExpirableSnapshot, SnapshotMetric};
use crate::error::WarningCollector;
use crate::reader::iceberg::LoadedTable;

/// Combines the stage outputs of one run into a [`HealthReport`].
pub struct HealthReportAggregator<'a> {
    table: &'a LoadedTable,
}

impl<'a> HealthReportAggregator<'a> {
    pub fn new(table: &'a LoadedTable) -> Self {
        Self { table }
    }

    pub fn aggregate(
        &self,
        snapshots: Vec<SnapshotMetric>,
        expirable_snapshots: Vec<ExpirableSnapshot>,
        partitions: PartitionAnalysis,
        orphans: Option<OrphanSummary>,
        warnings: WarningCollector,
    ) -> HealthReport {
        let metadata = &self.table.metadata;
        let PartitionAnalysis {
            partitions,
            skew,
            file_types,
            mut totals,
        } = partitions;
        totals.manifest_count = self.table.manifest_list.len();
        totals.skipped_manifests = self.table.skipped_manifests;

        HealthReport {
            table_uuid: metadata.table_uuid.clone(),
            table_location: metadata.location.clone(),
            metadata_location: self.table.metadata_location.clone(),
            format_version: metadata.format_version,
            current_snapshot_id: metadata.current_snapshot_id,
            snapshot_count: metadata.snapshots.len(),
            snapshots,
            expirable_snapshots,
            partitions,
            partition_skew: skew,
            file_types,
            totals,
            orphans,
            warnings: warnings.into_warnings(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyze::partition::PartitionStatsEngine;
    use crate::analyze::snapshot::SnapshotAnalyzer;
    use crate::error::AnalysisWarning;
    use crate::reader::iceberg::fixtures::TableFixture;
    use crate::reader::iceberg::MetadataReader;

    #[tokio::test]
    async fn test_aggregate_scenario() {
        let fixture = TableFixture::new();
        let root = fixture.scenario().await;
        let mut warnings = WarningCollector::new();
        let table = MetadataReader::new(fixture.provider(), 2)
            .read_table(&root, &mut warnings)
            .await
            .unwrap();

        let snapshots = SnapshotAnalyzer::new(&table.metadata).analyze(&mut warnings);
        let partitions = PartitionStatsEngine::new(table.arena.entries()).analyze();
        warnings.push(AnalysisWarning::LineageCycle { snapshot_id: 0 });

        let report = HealthReportAggregator::new(&table).aggregate(
            snapshots,
            Vec::new(),
            partitions,
            None,
            warnings,
        );

        assert_eq!(report.metadata_location, root);
        assert_eq!(report.table_location, "memory:///wh/db/events");
        assert_eq!(report.current_snapshot_id, Some(2));
        assert_eq!(report.snapshot_count, 2);
        assert_eq!(report.totals.manifest_count, 2);
        assert_eq!(report.totals.skipped_manifests, 0);
        assert_eq!(report.totals.total_files, 3);
        assert_eq!(report.totals.total_records, 150);
        assert_eq!(report.warnings.len(), 1);
        assert!(report.orphans.is_none());
    }
}
