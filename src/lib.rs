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

//! # Iceberg Pulse
//!
//! Structural health analysis for Apache Iceberg tables (format versions 1
//! and 2), read straight from the metadata tree: root metadata document,
//! snapshot history, manifest lists and manifests.
//!
//! ## Features
//!
//! - **Snapshot lineage**: per-snapshot record and file deltas, elapsed time
//!   between commits, running record totals, expirable snapshots
//! - **Partition statistics**: size and file count per partition, partition
//!   skew, per content type file statistics
//! - **Orphan files**: files under the table location that no metadata
//!   references (opt-in, streamed listing)
//! - **Storage**: AWS S3, Azure Data Lake Storage, Google Cloud Storage,
//!   local filesystem and in-memory stores through `object_store`
//!
//! Unreadable manifests, broken lineage and failed listings do not abort a
//! run; they show up as warnings in the report.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use iceberg_pulse::{Analyzer, StorageConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//! let config = StorageConfig::aws()
//!     .with_option("bucket", "lake")
//!     .with_option("region", "us-east-1");
//!
//! let analyzer = Analyzer::builder(config)
//!     .with_parallelism(16)
//!     .with_orphan_detection(true)
//!     .build()
//!     .await?;
//!
//! let report = analyzer
//!     .analyze("s3://lake/db/events/metadata/v42.metadata.json")
//!     .await?;
//! println!("{}", report);
//! println!("{}", report.to_json(true)?);
//! # Ok(())
//! # }
//! ```
//!
//! ### Resolving through a catalog
//!
//! ```rust,no_run
//! use iceberg_pulse::catalog::{TableIdentifier, VersionHintCatalog};
//! use iceberg_pulse::storage::StorageProviderFactory;
//! use iceberg_pulse::{Analyzer, StorageConfig};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//! let storage =
//!     StorageProviderFactory::from_config(StorageConfig::local().with_option("path", "/wh")).await?;
//! let catalog = VersionHintCatalog::new(Arc::clone(&storage), "/wh");
//!
//! let analyzer = Analyzer::builder_with_storage(storage)
//!     .with_catalog(Arc::new(catalog))
//!     .build()
//!     .await?;
//! let report = analyzer.analyze(TableIdentifier::new(&["db"], "events")).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`analyze`] - Analyzer entry point, snapshot/partition/orphan stages, report
//! - [`reader`] - Iceberg metadata tree reader
//! - [`catalog`] - Table identifier resolution
//! - [`storage`] - Cloud storage abstraction layer
//! - [`error`] - Analysis errors and warnings
//! - [`util`] - Retry and stage timing helpers

pub mod analyze;
pub mod catalog;
pub mod error;
pub mod reader;
pub mod storage;
pub mod util;

// Re-export commonly used types
pub use analyze::metrics::HealthReport;
pub use analyze::{AnalyzeOptions, Analyzer, TableSource};
pub use error::{AnalysisError, AnalysisResult, AnalysisWarning};
pub use storage::StorageConfig;
