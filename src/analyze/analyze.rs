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
use crate::analyze::orphan::{find_orphans, BloomOrphanDetector, OrphanFileDetector, OrphanSummary};
use crate::analyze::partition::{PartitionAnalysis, PartitionStatsEngine};
use crate::analyze::report::HealthReportAggregator;
use crate::analyze::snapshot::{
    ExpirableSnapshot, SnapshotAnalyzer, SnapshotMetric, DEFAULT_SNAPSHOT_RETENTION,
};
use crate::catalog::{CatalogResolver, TableIdentifier};
use crate::error::{AnalysisError, AnalysisResult, WarningCollector};
use crate::reader::iceberg::{LoadedTable, MetadataReader};
use crate::storage::{StorageConfig, StorageProvider, StorageProviderFactory, StorageResult};
use crate::util::util::{measure_dur, measure_dur_async};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Manifests fetched concurrently unless configured otherwise.
pub const DEFAULT_PARALLELISM: usize = 8;
pub const MAX_PARALLELISM: usize = 256;

fn clamp_parallelism(parallelism: usize) -> usize {
    parallelism.clamp(1, MAX_PARALLELISM)
}

/// What to analyze: a root metadata document, or a table known to the
/// configured catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableSource {
    MetadataLocation(String),
    Catalog(TableIdentifier),
}

impl From<&str> for TableSource {
    fn from(location: &str) -> Self {
        TableSource::MetadataLocation(location.to_string())
    }
}

impl From<String> for TableSource {
    fn from(location: String) -> Self {
        TableSource::MetadataLocation(location)
    }
}

impl From<TableIdentifier> for TableSource {
    fn from(table: TableIdentifier) -> Self {
        TableSource::Catalog(table)
    }
}

/// Per-call overrides of the analyzer settings.
#[derive(Debug, Clone, Default)]
pub struct AnalyzeOptions {
    pub deadline: Option<Duration>,
    pub parallelism: Option<usize>,
}

enum StorageSource {
    Config(StorageConfig),
    Provider(Arc<dyn StorageProvider>),
}

/// Builder for constructing an `Analyzer` instance.
///
/// # Examples
///
/// ```no_run
/// use iceberg_pulse::analyze::Analyzer;
/// use iceberg_pulse::storage::StorageConfig;
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
/// let config = StorageConfig::aws().with_option("bucket", "lake");
/// let analyzer = Analyzer::builder(config)
///     .with_parallelism(16)
///     .with_deadline(Duration::from_secs(60))
///     .with_orphan_detection(true)
///     .build()
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct AnalyzerBuilder {
    storage: StorageSource,
    parallelism: Option<usize>,
    deadline: Option<Duration>,
    catalog: Option<Arc<dyn CatalogResolver>>,
    orphan_detector: Option<Arc<dyn OrphanFileDetector>>,
    snapshot_retention: Duration,
}

impl AnalyzerBuilder {
    pub fn new(config: StorageConfig) -> Self {
        Self::with_source(StorageSource::Config(config))
    }

    fn with_source(storage: StorageSource) -> Self {
        Self {
            storage,
            parallelism: None,
            deadline: None,
            catalog: None,
            orphan_detector: None,
            snapshot_retention: DEFAULT_SNAPSHOT_RETENTION,
        }
    }

    /// Maximum number of manifests fetched and decoded at once, clamped to
    /// `1..=256`.
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = Some(parallelism);
        self
    }

    /// Abort any run that takes longer than `deadline`.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_catalog(mut self, catalog: Arc<dyn CatalogResolver>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// List the table location and report files no metadata references.
    pub fn with_orphan_detection(mut self, enabled: bool) -> Self {
        self.orphan_detector = if enabled {
            Some(Arc::new(BloomOrphanDetector::default()))
        } else {
            None
        };
        self
    }

    /// Enable orphan detection with a custom strategy.
    pub fn with_orphan_detector(mut self, detector: Arc<dyn OrphanFileDetector>) -> Self {
        self.orphan_detector = Some(detector);
        self
    }

    /// Age (relative to the table's last update) after which a snapshot
    /// other than the current one is reported as expirable.
    pub fn with_snapshot_retention(mut self, retention: Duration) -> Self {
        self.snapshot_retention = retention;
        self
    }

    /// # Errors
    ///
    /// Returns an error if the storage provider cannot be initialized.
    pub async fn build(self) -> StorageResult<Analyzer> {
        let storage_provider = match self.storage {
            StorageSource::Config(config) => StorageProviderFactory::from_config(config).await?,
            StorageSource::Provider(provider) => provider,
        };
        Ok(Analyzer {
            storage_provider,
            parallelism: clamp_parallelism(self.parallelism.unwrap_or(DEFAULT_PARALLELISM)),
            deadline: self.deadline,
            catalog: self.catalog,
            orphan_detector: self.orphan_detector,
            snapshot_retention: self.snapshot_retention,
        })
    }
}

/// Health analyzer for Iceberg tables.
///
/// Reads the metadata tree of one table per call and produces a
/// [`HealthReport`]. Nothing is cached between calls.
///
/// ```no_run
/// use iceberg_pulse::{Analyzer, StorageConfig};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
/// let config = StorageConfig::local().with_option("path", "/warehouse");
/// let analyzer = Analyzer::builder(config).build().await?;
///
/// let report = analyzer
///     .analyze("/warehouse/db/events/metadata/v12.metadata.json")
///     .await?;
/// println!("{}", report);
/// # Ok(())
/// # }
/// ```
pub struct Analyzer {
    storage_provider: Arc<dyn StorageProvider>,
    parallelism: usize,
    deadline: Option<Duration>,
    catalog: Option<Arc<dyn CatalogResolver>>,
    orphan_detector: Option<Arc<dyn OrphanFileDetector>>,
    snapshot_retention: Duration,
}

impl Analyzer {
    pub fn builder(config: StorageConfig) -> AnalyzerBuilder {
        AnalyzerBuilder::new(config)
    }

    /// Builder over an already constructed storage provider.
    pub fn builder_with_storage(storage: Arc<dyn StorageProvider>) -> AnalyzerBuilder {
        AnalyzerBuilder::with_source(StorageSource::Provider(storage))
    }

    pub fn parallelism(&self) -> usize {
        self.parallelism
    }

    /// Analyze a table with the analyzer's own settings.
    ///
    /// # Errors
    ///
    /// * `UnreachableRoot` if the root metadata document cannot be fetched
    /// * `UnsupportedFormat` / `InvalidMetadata` if it cannot be used
    /// * `CatalogResolution` if a catalog source cannot be resolved
    /// * `Timeout` if the deadline passes first
    ///
    /// Problems below the root (unreadable manifests, broken lineage, a
    /// failed listing) are reported as warnings inside the report instead.
    pub async fn analyze(&self, source: impl Into<TableSource>) -> AnalysisResult<HealthReport> {
        self.analyze_with(source, AnalyzeOptions::default()).await
    }

    /// Analyze a table, overriding the deadline and parallelism for this call.
    pub async fn analyze_with(
        &self,
        source: impl Into<TableSource>,
        options: AnalyzeOptions,
    ) -> AnalysisResult<HealthReport> {
        let source = source.into();
        let parallelism = options
            .parallelism
            .map(clamp_parallelism)
            .unwrap_or(self.parallelism);
        let run = self.run(&source, parallelism);

        match options.deadline.or(self.deadline) {
            Some(deadline) => tokio::time::timeout(deadline, run)
                .await
                .map_err(|_| AnalysisError::Timeout { deadline })?,
            None => run.await,
        }
    }

    async fn resolve(&self, source: &TableSource) -> AnalysisResult<String> {
        match source {
            TableSource::MetadataLocation(location) => Ok(location.clone()),
            TableSource::Catalog(table) => match &self.catalog {
                Some(catalog) => catalog.resolve(table).await,
                None => Err(AnalysisError::CatalogResolution {
                    table: table.to_string(),
                    reason: "no catalog configured".to_string(),
                }),
            },
        }
    }

    async fn run(&self, source: &TableSource, parallelism: usize) -> AnalysisResult<HealthReport> {
        let mut warnings = WarningCollector::new();

        let location = measure_dur_async(
            "resolve_source",
            || self.resolve(source),
            Some(|l: &String| format!("Resolved metadata location={}", l)),
        )
        .await?;

        info!(
            "Analyzing, base_path={}, location={}, parallelism={}",
            self.storage_provider.base_path(),
            location,
            parallelism
        );

        let reader = MetadataReader::new(Arc::clone(&self.storage_provider), parallelism);
        let collector = &mut warnings;
        let table = measure_dur_async(
            "read_metadata_tree",
            || async move { reader.read_table(&location, collector).await },
            Some(|t: &LoadedTable| {
                format!(
                    "Read metadata tree, manifests={}, entries={}, skipped={}",
                    t.arena.manifest_count(),
                    t.arena.entries().len(),
                    t.skipped_manifests
                )
            }),
        )
        .await?;

        let snapshots = measure_dur(
            "analyze_snapshots",
            || SnapshotAnalyzer::new(&table.metadata).analyze(&mut warnings),
            Some(|m: &Vec<SnapshotMetric>| format!("Analyzed lineage, snapshots={}", m.len())),
        );

        let expirable = measure_dur(
            "find_expirable_snapshots",
            || SnapshotAnalyzer::new(&table.metadata).expirable(self.snapshot_retention),
            Some(|e: &Vec<ExpirableSnapshot>| format!("Found expirable snapshots, count={}", e.len())),
        );

        let partitions = measure_dur(
            "analyze_partitions",
            || PartitionStatsEngine::new(table.arena.entries()).analyze(),
            Some(|p: &PartitionAnalysis| {
                format!(
                    "Analyzed partitions, count={}, skew={:.4}",
                    p.partitions.len(),
                    p.skew.skew
                )
            }),
        );

        let orphans = match &self.orphan_detector {
            Some(detector) => {
                let reader = MetadataReader::new(Arc::clone(&self.storage_provider), parallelism);
                let storage = self.storage_provider.as_ref();
                let (table, collector) = (&table, &mut warnings);
                let result = measure_dur_async(
                    "find_orphans",
                    || async move {
                        find_orphans(detector.as_ref(), &reader, storage, table, collector).await
                    },
                    Some(|s: &OrphanSummary| format!("Found orphans, count={}", s.orphan_count)),
                )
                .await;
                match result {
                    Ok(summary) => Some(summary),
                    Err(warning) => {
                        warnings.push(warning);
                        None
                    }
                }
            }
            None => None,
        };

        let report = HealthReportAggregator::new(&table).aggregate(
            snapshots,
            expirable,
            partitions,
            orphans,
            warnings,
        );
        info!(
            "Analyzed table, location={}, snapshots={}, partitions={}, live_files={}, warnings={}",
            report.metadata_location,
            report.snapshots.len(),
            report.partitions.len(),
            report.totals.total_files,
            report.warnings.len()
        );
        Ok(report)
    }
}
