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

//! Typed view of the root `vN.metadata.json` document.
//!
//! Parsing happens in two steps: the JSON is decoded into loosely typed
//! `Raw*` structs that accept both format v1 and v2 field layouts, then
//! [`TableMetadata::from_json`] validates the cross references and builds
//! the strict types used by the analyzers.

use crate::error::{AnalysisError, AnalysisResult};
use serde::{Deserialize, Serialize, Serializer};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;

/// Highest table format version this crate understands.
pub const MAX_SUPPORTED_FORMAT_VERSION: i32 = 2;

/// Field id assigned to the first partition field of legacy v1 specs.
const PARTITION_FIELD_ID_START: i32 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FormatVersion {
    V1,
    V2,
}

impl FormatVersion {
    pub fn as_i32(&self) -> i32 {
        match self {
            FormatVersion::V1 => 1,
            FormatVersion::V2 => 2,
        }
    }
}

impl fmt::Display for FormatVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.as_i32())
    }
}

impl Serialize for FormatVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i32(self.as_i32())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct NestedField {
    pub id: i32,
    pub name: String,
    pub required: bool,
    /// Primitive type name, or the nested struct/list/map definition.
    #[serde(rename = "type")]
    pub field_type: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,
}

impl NestedField {
    /// "long", "string", "decimal(9,2)", ... or "struct"/"list"/"map" for nested types.
    pub fn type_name(&self) -> &str {
        match &self.field_type {
            serde_json::Value::String(s) => s,
            serde_json::Value::Object(o) => o
                .get("type")
                .and_then(|t| t.as_str())
                .unwrap_or("unknown"),
            _ => "unknown",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct Schema {
    #[serde(default)]
    pub schema_id: i32,
    #[serde(default)]
    pub fields: Vec<NestedField>,
}

impl Schema {
    pub fn field(&self, id: i32) -> Option<&NestedField> {
        self.fields.iter().find(|f| f.id == id)
    }
}

/// Partition transform applied to a source column.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Transform {
    Identity,
    Bucket(u32),
    Truncate(u32),
    Year,
    Month,
    Day,
    Hour,
    Void,
    /// Transform names introduced by later writers, kept verbatim.
    Unknown(String),
}

impl FromStr for Transform {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parametrized = |name: &str| {
            s.strip_prefix(name)
                .and_then(|rest| rest.strip_prefix('['))
                .and_then(|rest| rest.strip_suffix(']'))
                .and_then(|n| n.trim().parse::<u32>().ok())
        };

        Ok(match s {
            "identity" => Transform::Identity,
            "year" => Transform::Year,
            "month" => Transform::Month,
            "day" => Transform::Day,
            "hour" => Transform::Hour,
            "void" => Transform::Void,
            _ => {
                if let Some(n) = parametrized("bucket") {
                    Transform::Bucket(n)
                } else if let Some(w) = parametrized("truncate") {
                    Transform::Truncate(w)
                } else {
                    Transform::Unknown(s.to_string())
                }
            }
        })
    }
}

impl fmt::Display for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transform::Identity => write!(f, "identity"),
            Transform::Bucket(n) => write!(f, "bucket[{}]", n),
            Transform::Truncate(w) => write!(f, "truncate[{}]", w),
            Transform::Year => write!(f, "year"),
            Transform::Month => write!(f, "month"),
            Transform::Day => write!(f, "day"),
            Transform::Hour => write!(f, "hour"),
            Transform::Void => write!(f, "void"),
            Transform::Unknown(s) => write!(f, "{}", s),
        }
    }
}

impl Serialize for Transform {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Transform {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        match s.parse::<Transform>() {
            Ok(transform) => Ok(transform),
            Err(never) => match never {},
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PartitionField {
    pub source_id: i32,
    pub field_id: i32,
    pub name: String,
    pub transform: Transform,
}

/// Ordered list of partition transforms; an empty spec means unpartitioned.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PartitionSpec {
    pub spec_id: i32,
    pub fields: Vec<PartitionField>,
}

impl PartitionSpec {
    pub fn is_unpartitioned(&self) -> bool {
        self.fields.iter().all(|f| f.transform == Transform::Void)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct SortField {
    pub source_id: i32,
    pub transform: Transform,
    pub direction: String,
    pub null_order: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct SortOrder {
    pub order_id: i32,
    #[serde(default)]
    pub fields: Vec<SortField>,
}

/// Kind of change a snapshot committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Append,
    Overwrite,
    Delete,
    Replace,
}

impl FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "append" => Ok(Operation::Append),
            "overwrite" => Ok(Operation::Overwrite),
            "delete" => Ok(Operation::Delete),
            "replace" => Ok(Operation::Replace),
            other => Err(format!("unknown snapshot operation '{}'", other)),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Operation::Append => "append",
            Operation::Overwrite => "overwrite",
            Operation::Delete => "delete",
            Operation::Replace => "replace",
        };
        write!(f, "{}", s)
    }
}

/// Snapshot summary: the operation plus the writer's string counters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub operation: Operation,
    pub properties: BTreeMap<String, String>,
}

impl Summary {
    /// Numeric summary counter; missing or malformed counters read as 0.
    pub fn counter(&self, key: &str) -> u64 {
        self.properties
            .get(key)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .unwrap_or(0)
    }

    pub fn added_records(&self) -> u64 {
        self.counter("added-records")
    }

    pub fn deleted_records(&self) -> u64 {
        self.counter("deleted-records")
    }

    pub fn added_data_files(&self) -> u64 {
        self.counter("added-data-files")
    }

    pub fn deleted_data_files(&self) -> u64 {
        self.counter("deleted-data-files")
    }

    pub fn added_delete_files(&self) -> u64 {
        self.counter("added-delete-files")
    }

    pub fn removed_delete_files(&self) -> u64 {
        self.counter("removed-delete-files")
    }

    pub fn added_files_size(&self) -> u64 {
        self.counter("added-files-size")
    }

    pub fn removed_files_size(&self) -> u64 {
        self.counter("removed-files-size")
    }

    pub fn changed_partition_count(&self) -> u64 {
        self.counter("changed-partition-count")
    }
}

/// Where a snapshot's manifests are listed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ManifestSource {
    /// Avro manifest list file
    List(String),
    /// Legacy v1 inline list of manifest paths
    Manifests(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub snapshot_id: i64,
    pub parent_snapshot_id: Option<i64>,
    pub sequence_number: Option<i64>,
    pub timestamp_ms: i64,
    pub schema_id: Option<i32>,
    pub summary: Summary,
    pub manifests: ManifestSource,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct MetadataLogEntry {
    pub timestamp_ms: i64,
    pub metadata_file: String,
}

/// Validated root metadata of one table version.
#[derive(Debug, Clone, PartialEq)]
pub struct TableMetadata {
    pub format_version: FormatVersion,
    pub table_uuid: Option<String>,
    pub location: String,
    pub last_updated_ms: i64,
    pub last_sequence_number: Option<i64>,
    pub schemas: Vec<Schema>,
    pub current_schema_id: i32,
    pub partition_specs: Vec<PartitionSpec>,
    pub default_spec_id: i32,
    pub sort_orders: Vec<SortOrder>,
    pub default_sort_order_id: Option<i32>,
    pub properties: BTreeMap<String, String>,
    pub current_snapshot_id: Option<i64>,
    /// In document order; never mutated after load.
    pub snapshots: Vec<Snapshot>,
    pub metadata_log: Vec<MetadataLogEntry>,
    /// Top-level fields this crate does not interpret.
    pub extra: BTreeMap<String, serde_json::Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RawPartitionField {
    source_id: i32,
    field_id: Option<i32>,
    name: String,
    transform: Transform,
}

#[derive(Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RawPartitionSpec {
    spec_id: i32,
    #[serde(default)]
    fields: Vec<RawPartitionField>,
}

#[derive(Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RawSnapshot {
    snapshot_id: i64,
    parent_snapshot_id: Option<i64>,
    sequence_number: Option<i64>,
    timestamp_ms: i64,
    manifest_list: Option<String>,
    manifests: Option<Vec<String>>,
    summary: Option<BTreeMap<String, String>>,
    schema_id: Option<i32>,
}

#[derive(Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RawTableMetadata {
    format_version: i64,
    table_uuid: Option<String>,
    location: String,
    last_updated_ms: i64,
    last_sequence_number: Option<i64>,
    schema: Option<Schema>,
    #[serde(default)]
    schemas: Vec<Schema>,
    current_schema_id: Option<i32>,
    partition_spec: Option<Vec<RawPartitionField>>,
    #[serde(default)]
    partition_specs: Vec<RawPartitionSpec>,
    default_spec_id: Option<i32>,
    #[serde(default)]
    sort_orders: Vec<SortOrder>,
    default_sort_order_id: Option<i32>,
    #[serde(default)]
    properties: BTreeMap<String, String>,
    current_snapshot_id: Option<i64>,
    #[serde(default)]
    snapshots: Vec<RawSnapshot>,
    #[serde(default)]
    metadata_log: Vec<MetadataLogEntry>,
    #[serde(flatten)]
    extra: BTreeMap<String, serde_json::Value>,
}

impl TableMetadata {
    /// Parse and validate a root metadata document read from `location`.
    ///
    /// # Errors
    ///
    /// * `UnsupportedFormat` when `format-version` is above
    ///   [`MAX_SUPPORTED_FORMAT_VERSION`]
    /// * `InvalidMetadata` for malformed JSON, a missing or non-positive
    ///   format version, or dangling schema/spec/snapshot references
    pub fn from_json(location: &str, bytes: &[u8]) -> AnalysisResult<Self> {
        let value: serde_json::Value = serde_json::from_slice(bytes)
            .map_err(|e| AnalysisError::invalid(location, format!("malformed JSON: {}", e)))?;

        let version = value
            .get("format-version")
            .and_then(|v| v.as_i64())
            .ok_or_else(|| AnalysisError::invalid(location, "missing 'format-version'"))?;
        if version > MAX_SUPPORTED_FORMAT_VERSION as i64 {
            return Err(AnalysisError::UnsupportedFormat {
                location: location.to_string(),
                version,
                max_supported: MAX_SUPPORTED_FORMAT_VERSION,
            });
        }
        if version < 1 {
            return Err(AnalysisError::invalid(
                location,
                format!("invalid format-version={}", version),
            ));
        }

        let raw: RawTableMetadata = serde_json::from_value(value)
            .map_err(|e| AnalysisError::invalid(location, e.to_string()))?;
        Self::validate(location, raw)
    }

    fn validate(location: &str, raw: RawTableMetadata) -> AnalysisResult<Self> {
        let format_version = if raw.format_version == 1 {
            FormatVersion::V1
        } else {
            FormatVersion::V2
        };
        if format_version == FormatVersion::V2 && raw.table_uuid.is_none() {
            return Err(AnalysisError::invalid(location, "v2 metadata requires 'table-uuid'"));
        }

        // Schemas: v2 list, or the single v1 schema
        let schemas = if !raw.schemas.is_empty() {
            raw.schemas
        } else if let Some(schema) = raw.schema {
            vec![schema]
        } else {
            return Err(AnalysisError::invalid(location, "no schema defined"));
        };
        let current_schema_id = raw.current_schema_id.unwrap_or(schemas[0].schema_id);
        if !schemas.iter().any(|s| s.schema_id == current_schema_id) {
            return Err(AnalysisError::invalid(
                location,
                format!("current-schema-id={} does not resolve", current_schema_id),
            ));
        }

        // Specs: v2 list, or the legacy v1 field list as spec 0
        let partition_specs: Vec<PartitionSpec> = if !raw.partition_specs.is_empty() {
            raw.partition_specs
                .into_iter()
                .map(|s| PartitionSpec {
                    spec_id: s.spec_id,
                    fields: Self::partition_fields(s.fields),
                })
                .collect()
        } else {
            vec![PartitionSpec {
                spec_id: 0,
                fields: Self::partition_fields(raw.partition_spec.unwrap_or_default()),
            }]
        };
        let default_spec_id = raw.default_spec_id.unwrap_or(partition_specs[0].spec_id);
        if !partition_specs.iter().any(|s| s.spec_id == default_spec_id) {
            return Err(AnalysisError::invalid(
                location,
                format!("default-spec-id={} does not resolve", default_spec_id),
            ));
        }

        let mut seen = HashSet::with_capacity(raw.snapshots.len());
        let mut snapshots = Vec::with_capacity(raw.snapshots.len());
        for raw_snapshot in raw.snapshots {
            if !seen.insert(raw_snapshot.snapshot_id) {
                return Err(AnalysisError::invalid(
                    location,
                    format!("duplicate snapshot-id={}", raw_snapshot.snapshot_id),
                ));
            }
            snapshots.push(Self::parse_snapshot(location, raw_snapshot)?);
        }

        // v1 writers use -1 for "no current snapshot"
        let current_snapshot_id = raw.current_snapshot_id.filter(|id| *id != -1);
        if let Some(id) = current_snapshot_id {
            if !seen.contains(&id) {
                return Err(AnalysisError::invalid(
                    location,
                    format!("current-snapshot-id={} is not in the snapshot list", id),
                ));
            }
        }

        Ok(TableMetadata {
            format_version,
            table_uuid: raw.table_uuid,
            location: raw.location,
            last_updated_ms: raw.last_updated_ms,
            last_sequence_number: raw.last_sequence_number,
            schemas,
            current_schema_id,
            partition_specs,
            default_spec_id,
            sort_orders: raw.sort_orders,
            default_sort_order_id: raw.default_sort_order_id,
            properties: raw.properties,
            current_snapshot_id,
            snapshots,
            metadata_log: raw.metadata_log,
            extra: raw.extra,
        })
    }

    fn partition_fields(fields: Vec<RawPartitionField>) -> Vec<PartitionField> {
        fields
            .into_iter()
            .enumerate()
            .map(|(i, f)| PartitionField {
                source_id: f.source_id,
                field_id: f.field_id.unwrap_or(PARTITION_FIELD_ID_START + i as i32),
                name: f.name,
                transform: f.transform,
            })
            .collect()
    }

    fn parse_snapshot(location: &str, raw: RawSnapshot) -> AnalysisResult<Snapshot> {
        let mut properties = raw.summary.unwrap_or_default();
        let operation = match properties.remove("operation") {
            Some(op) => op.parse::<Operation>().map_err(|e| {
                AnalysisError::invalid(location, format!("snapshot-id={}: {}", raw.snapshot_id, e))
            })?,
            None => Operation::Append,
        };

        let manifests = match (raw.manifest_list, raw.manifests) {
            (Some(list), _) => ManifestSource::List(list),
            (None, Some(paths)) => ManifestSource::Manifests(paths),
            (None, None) => {
                return Err(AnalysisError::invalid(
                    location,
                    format!(
                        "snapshot-id={} has neither 'manifest-list' nor 'manifests'",
                        raw.snapshot_id
                    ),
                ))
            }
        };

        Ok(Snapshot {
            snapshot_id: raw.snapshot_id,
            parent_snapshot_id: raw.parent_snapshot_id,
            sequence_number: raw.sequence_number,
            timestamp_ms: raw.timestamp_ms,
            schema_id: raw.schema_id,
            summary: Summary {
                operation,
                properties,
            },
            manifests,
        })
    }

    pub fn current_schema(&self) -> Option<&Schema> {
        self.schemas
            .iter()
            .find(|s| s.schema_id == self.current_schema_id)
    }

    pub fn partition_spec(&self, spec_id: i32) -> Option<&PartitionSpec> {
        self.partition_specs.iter().find(|s| s.spec_id == spec_id)
    }

    pub fn default_partition_spec(&self) -> Option<&PartitionSpec> {
        self.partition_spec(self.default_spec_id)
    }

    pub fn default_sort_order(&self) -> Option<&SortOrder> {
        let id = self.default_sort_order_id?;
        self.sort_orders.iter().find(|o| o.order_id == id)
    }

    pub fn snapshot(&self, snapshot_id: i64) -> Option<&Snapshot> {
        self.snapshots.iter().find(|s| s.snapshot_id == snapshot_id)
    }

    pub fn current_snapshot(&self) -> Option<&Snapshot> {
        self.current_snapshot_id.and_then(|id| self.snapshot(id))
    }
}
