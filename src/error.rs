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

//! Fatal and recoverable analysis outcomes.
//!
//! An [`AnalysisError`] aborts the run and no report is produced. An
//! [`AnalysisWarning`] is recorded and the run continues; warnings are
//! frozen into the final report.

use crate::storage::error::StorageError;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Errors that abort an analysis run
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Metadata root unreachable, location={location}: {source}")]
    UnreachableRoot {
        location: String,
        #[source]
        source: StorageError,
    },

    #[error(
        "Unsupported table format version={version} at location={location}, max_supported={max_supported}"
    )]
    UnsupportedFormat {
        location: String,
        version: i64,
        max_supported: i32,
    },

    #[error("Invalid table metadata at location={location}: {reason}")]
    InvalidMetadata { location: String, reason: String },

    #[error("Analysis did not finish within deadline={}ms", .deadline.as_millis())]
    Timeout { deadline: Duration },

    #[error("Could not resolve table={table} through catalog: {reason}")]
    CatalogResolution { table: String, reason: String },
}

impl AnalysisError {
    /// Name of the stage that failed, for logs and user-facing messages.
    pub fn stage(&self) -> &'static str {
        match self {
            AnalysisError::UnreachableRoot { .. } => "fetch_metadata_root",
            AnalysisError::UnsupportedFormat { .. } | AnalysisError::InvalidMetadata { .. } => {
                "parse_metadata_root"
            }
            AnalysisError::Timeout { .. } => "deadline",
            AnalysisError::CatalogResolution { .. } => "resolve_catalog",
        }
    }

    pub(crate) fn invalid(location: &str, reason: impl Into<String>) -> Self {
        AnalysisError::InvalidMetadata {
            location: location.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result type for analysis operations
pub type AnalysisResult<T> = Result<T, AnalysisError>;

/// Non-fatal problems found while analyzing a table
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnalysisWarning {
    /// A manifest list or manifest could not be fetched or decoded; its
    /// entries are excluded from every statistic.
    #[error("Skipped manifest, path={path}: {reason}")]
    ManifestParse { path: String, reason: String },

    #[error("Snapshot id={snapshot_id} references missing parent id={parent_id}, treated as lineage root")]
    MissingParent { snapshot_id: i64, parent_id: i64 },

    #[error("Snapshot lineage cycle detected at snapshot id={snapshot_id}, walk stopped")]
    LineageCycle { snapshot_id: i64 },

    #[error("Snapshot id={snapshot_id} is not newer than its parent id={parent_id}")]
    NonMonotonicTimestamp { snapshot_id: i64, parent_id: i64 },

    #[error("Could not list files under prefix={prefix}: {reason}")]
    OrphanListing { prefix: String, reason: String },

    /// Orphan detection was skipped: files listed by unreadable manifests
    /// would have been reported as orphans.
    #[error("Skipped orphan detection under prefix={prefix}, unreadable_manifests={unreadable_manifests}")]
    IncompleteReferences {
        prefix: String,
        unreadable_manifests: usize,
    },
}

/// Accumulates warnings for one analysis run, in the order they were raised.
#[derive(Debug, Default)]
pub struct WarningCollector {
    warnings: Vec<AnalysisWarning>,
}

impl WarningCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, warning: AnalysisWarning) {
        tracing::warn!("{}", warning);
        self.warnings.push(warning);
    }

    pub fn len(&self) -> usize {
        self.warnings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.warnings.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AnalysisWarning> {
        self.warnings.iter()
    }

    /// Freeze the collected warnings.
    pub fn into_warnings(self) -> Vec<AnalysisWarning> {
        self.warnings
    }
}

impl Extend<AnalysisWarning> for WarningCollector {
    fn extend<I: IntoIterator<Item = AnalysisWarning>>(&mut self, iter: I) {
        for warning in iter {
            self.push(warning);
        }
    }
}
