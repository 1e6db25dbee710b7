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

use crate::analyze::orphan::OrphanSummary;
use crate::analyze::partition::{FileTypeMetrics, PartitionSkew, PartitionStats, TableTotals};
use crate::analyze::snapshot::{ExpirableSnapshot, SnapshotMetric};
use crate::error::AnalysisWarning;
use crate::reader::iceberg::metadata::FormatVersion;
use serde::Serialize;
use serde_json::Error as JsonError;
use std::fmt::{Display, Formatter, Result as FmtResult};

const DISPLAY_SNAPSHOTS: usize = 10;
const DISPLAY_PARTITIONS: usize = 10;
const DISPLAY_ORPHANS: usize = 10;

/// Health of one table, derived from its metadata tree only.
///
/// Two runs over the same metadata tree produce equal reports, and
/// [`to_json`](HealthReport::to_json) renders them byte-identically.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub table_uuid: Option<String>,
    pub table_location: String,
    pub metadata_location: String,
    pub format_version: FormatVersion,
    pub current_snapshot_id: Option<i64>,
    pub snapshot_count: usize,
    /// Current lineage, oldest first.
    pub snapshots: Vec<SnapshotMetric>,
    pub expirable_snapshots: Vec<ExpirableSnapshot>,
    /// Largest partitions first.
    pub partitions: Vec<PartitionStats>,
    pub partition_skew: PartitionSkew,
    pub file_types: Vec<FileTypeMetrics>,
    pub totals: TableTotals,
    pub orphans: Option<OrphanSummary>,
    pub warnings: Vec<AnalysisWarning>,
}

impl HealthReport {
    /// Pretty JSON export. `exclude_files` drops the per-file orphan list
    /// and keeps only its counters.
    pub fn to_json(&self, exclude_files: bool) -> Result<String, JsonError> {
        if exclude_files {
            let mut report = self.clone();
            if let Some(orphans) = report.orphans.as_mut() {
                orphans.orphans = Vec::new();
            }
            serde_json::to_string_pretty(&report)
        } else {
            serde_json::to_string_pretty(self)
        }
    }
}

fn format_size(bytes: u64) -> String {
    let gb = bytes as f64 / (1024.0 * 1024.0 * 1024.0);
    if gb >= 1.0 {
        return format!("{:.2} GB", gb);
    }
    let mb = bytes as f64 / (1024.0 * 1024.0);
    if mb >= 1.0 {
        format!("{:.2} MB", mb)
    } else {
        format!("{:.2} KB", bytes as f64 / 1024.0)
    }
}

impl Display for HealthReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let rule = "━".repeat(80);
        let totals = &self.totals;

        writeln!(f, "\n{}", rule)?;
        writeln!(
            f,
            " {:<60} Iceberg {:>6} ",
            "Table Health Report",
            self.format_version.to_string()
        )?;
        writeln!(f, "{}", rule)?;
        writeln!(f, " {}", self.table_location)?;
        writeln!(f, " {}", self.metadata_location)?;
        if let Some(uuid) = &self.table_uuid {
            writeln!(f, " uuid={}", uuid)?;
        }
        writeln!(f, "{}", rule)?;

        writeln!(f)?;
        writeln!(f, " {:<41} {}", "Key Metrics", "Snapshots")?;
        writeln!(f, "{}", rule)?;
        writeln!(
            f,
            " {:<19} {:>12}          {:<19} {:>8}",
            "Live Files",
            totals.total_files,
            "Total",
            self.snapshot_count
        )?;
        writeln!(
            f,
            " {:<19} {:>12}          {:<19} {:>8}",
            "Total Size",
            format_size(totals.total_size_bytes),
            "On Lineage",
            self.snapshots.len()
        )?;
        writeln!(
            f,
            " {:<19} {:>12}          {:<19} {:>8}",
            "Records",
            totals.total_records,
            "Expirable",
            self.expirable_snapshots.len()
        )?;
        writeln!(
            f,
            " {:<19} {:>12}          {:<19} {:>8}",
            "Partitions",
            totals.partition_count,
            "Current",
            self.current_snapshot_id
                .map(|id| id.to_string())
                .unwrap_or_else(|| "-".to_string())
        )?;
        writeln!(
            f,
            " {:<19} {:>12}          {:<19} {:>8}",
            "Partition Skew",
            format!("{:.2}", self.partition_skew.skew),
            "Manifests",
            totals.manifest_count
        )?;
        writeln!(
            f,
            " {:<19} {:>12}          {:<19} {:>8}",
            "Delete Files",
            totals.delete_file_count,
            "Skipped",
            totals.skipped_manifests
        )?;

        if !self.snapshots.is_empty() {
            writeln!(f)?;
            writeln!(f, " Snapshot History (latest {})", DISPLAY_SNAPSHOTS)?;
            writeln!(f, "{}", rule)?;
            writeln!(
                f,
                " {:<20} {:<10} {:>10} {:>10} {:>8} {:>8} {:>10}",
                "Snapshot", "Operation", "+Records", "-Records", "+Files", "-Files", "Cumulative"
            )?;
            let skip = self.snapshots.len().saturating_sub(DISPLAY_SNAPSHOTS);
            for s in self.snapshots.iter().skip(skip) {
                writeln!(
                    f,
                    " {:<20} {:<10} {:>10} {:>10} {:>8} {:>8} {:>10}",
                    s.snapshot_id,
                    s.operation.to_string(),
                    s.records_added,
                    s.records_removed,
                    s.data_files_added,
                    s.data_files_removed,
                    s.cumulative_records
                )?;
            }
        }

        if !self.partitions.is_empty() {
            writeln!(f)?;
            writeln!(f, " Largest Partitions (top {})", DISPLAY_PARTITIONS)?;
            writeln!(f, "{}", rule)?;
            writeln!(
                f,
                " {:<36} {:>8} {:>12} {:>12} {:>7}",
                "Partition", "Files", "Size", "Records", "Skew"
            )?;
            for p in self.partitions.iter().take(DISPLAY_PARTITIONS) {
                let mut name = p.partition.to_string();
                if name.chars().count() > 36 {
                    name = name.chars().take(33).collect::<String>() + "...";
                }
                writeln!(
                    f,
                    " {:<36} {:>8} {:>12} {:>12} {:>+7.2}",
                    name,
                    p.file_count,
                    format_size(p.total_size_bytes),
                    p.total_records,
                    p.size_skew_score
                )?;
            }
        }

        if !self.file_types.is_empty() {
            writeln!(f)?;
            writeln!(f, " File Types")?;
            writeln!(f, "{}", rule)?;
            for t in &self.file_types {
                writeln!(
                    f,
                    " {:<19} files={:<8} avg_size={:<12} avg_records={:.1}",
                    t.content.to_string(),
                    t.file_count,
                    format_size(t.avg_size_bytes as u64),
                    t.avg_records
                )?;
            }
        }

        if let Some(orphans) = &self.orphans {
            writeln!(f)?;
            writeln!(
                f,
                " Orphan Files ({} of {} listed, {})",
                orphans.orphan_count,
                orphans.listed_files,
                format_size(orphans.orphan_size_bytes)
            )?;
            writeln!(f, "{}", rule)?;
            for o in orphans.orphans.iter().take(DISPLAY_ORPHANS) {
                writeln!(f, " {} ({})", o.path, format_size(o.size_bytes))?;
            }
            if orphans.orphan_count > DISPLAY_ORPHANS {
                writeln!(f, " ... and {} more", orphans.orphan_count - DISPLAY_ORPHANS)?;
            }
        }

        if !self.warnings.is_empty() {
            writeln!(f)?;
            writeln!(f, " Warnings ({})", self.warnings.len())?;
            writeln!(f, "{}", rule)?;
            for w in &self.warnings {
                writeln!(f, " - {}", w)?;
            }
        }
        writeln!(f, "{}", rule)
    }
}
