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

//! Avro manifest lists and manifests.
//!
//! Both v1 and v2 layouts are read by field name, so optional and renamed
//! fields (`added_data_files_count` vs `added_files_count`) are tolerated.
//! A manifest either decodes completely or yields a [`ManifestError`]; no
//! partial entry list is ever returned.

use apache_avro::types::Value;
use apache_avro::Reader as AvroReader;
use serde::{Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Range;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("Avro decode error: {0}")]
    Avro(#[from] apache_avro::Error),

    #[error("missing field '{0}'")]
    MissingField(&'static str),

    #[error("invalid field '{field}': {reason}")]
    InvalidField { field: &'static str, reason: String },
}

pub type ManifestResult<T> = Result<T, ManifestError>;

/// Position of a manifest in the current snapshot's manifest list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ManifestId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ManifestContent {
    Data,
    Deletes,
}

/// One row of a manifest list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ManifestListEntry {
    /// As written in the list; resolved by the reader before fetching.
    pub manifest_path: String,
    pub manifest_length: i64,
    pub partition_spec_id: i32,
    pub content: ManifestContent,
    pub sequence_number: Option<i64>,
    pub added_snapshot_id: Option<i64>,
    pub added_files_count: u64,
    pub existing_files_count: u64,
    pub deleted_files_count: u64,
    pub added_rows_count: u64,
    pub existing_rows_count: u64,
    pub deleted_rows_count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    Existing,
    Added,
    Deleted,
}

impl EntryStatus {
    /// Added and existing entries describe files that are part of the table.
    pub fn is_live(&self) -> bool {
        !matches!(self, EntryStatus::Deleted)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DataContent {
    Data,
    PositionDeletes,
    EqualityDeletes,
}

impl DataContent {
    pub fn is_delete(&self) -> bool {
        !matches!(self, DataContent::Data)
    }
}

impl fmt::Display for DataContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DataContent::Data => "data",
            DataContent::PositionDeletes => "position_deletes",
            DataContent::EqualityDeletes => "equality_deletes",
        };
        write!(f, "{}", s)
    }
}

/// A typed partition value as stored in a manifest's partition tuple.
#[derive(Debug, Clone)]
pub enum PartitionValue {
    Null,
    Boolean(bool),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    Bytes(Vec<u8>),
    /// Days since epoch
    Date(i32),
    /// Microseconds (or milliseconds for millis-typed writers) since midnight
    Time(i64),
    /// Microseconds since epoch, as written
    Timestamp(i64),
    /// Decimals, uuids and anything else, rendered once at decode time
    Other(String),
}

impl PartitionValue {
    fn rank(&self) -> u8 {
        match self {
            PartitionValue::Null => 0,
            PartitionValue::Boolean(_) => 1,
            PartitionValue::Int(_) => 2,
            PartitionValue::Long(_) => 3,
            PartitionValue::Float(_) => 4,
            PartitionValue::Double(_) => 5,
            PartitionValue::Date(_) => 6,
            PartitionValue::Time(_) => 7,
            PartitionValue::Timestamp(_) => 8,
            PartitionValue::String(_) => 9,
            PartitionValue::Bytes(_) => 10,
            PartitionValue::Other(_) => 11,
        }
    }

    fn from_avro(value: &Value) -> Self {
        match value {
            Value::Null => PartitionValue::Null,
            Value::Union(_, inner) => PartitionValue::from_avro(inner),
            Value::Boolean(b) => PartitionValue::Boolean(*b),
            Value::Int(i) => PartitionValue::Int(*i),
            Value::Long(l) => PartitionValue::Long(*l),
            Value::Float(f) => PartitionValue::Float(*f),
            Value::Double(d) => PartitionValue::Double(*d),
            Value::String(s) => PartitionValue::String(s.clone()),
            Value::Bytes(b) | Value::Fixed(_, b) => PartitionValue::Bytes(b.clone()),
            Value::Date(d) => PartitionValue::Date(*d),
            Value::TimeMillis(t) => PartitionValue::Time(*t as i64),
            Value::TimeMicros(t) => PartitionValue::Time(*t),
            Value::TimestampMillis(t)
            | Value::TimestampMicros(t)
            | Value::LocalTimestampMillis(t)
            | Value::LocalTimestampMicros(t) => PartitionValue::Timestamp(*t),
            other => PartitionValue::Other(format!("{:?}", other)),
        }
    }
}

impl PartialEq for PartitionValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for PartitionValue {}

impl PartialOrd for PartitionValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Null first, then by type, then by value; floats use IEEE total order.
impl Ord for PartitionValue {
    fn cmp(&self, other: &Self) -> Ordering {
        use PartitionValue::*;
        match (self, other) {
            (Boolean(a), Boolean(b)) => a.cmp(b),
            (Int(a), Int(b)) => a.cmp(b),
            (Long(a), Long(b)) => a.cmp(b),
            (Float(a), Float(b)) => a.total_cmp(b),
            (Double(a), Double(b)) => a.total_cmp(b),
            (Date(a), Date(b)) => a.cmp(b),
            (Time(a), Time(b)) => a.cmp(b),
            (Timestamp(a), Timestamp(b)) => a.cmp(b),
            (String(a), String(b)) => a.cmp(b),
            (Bytes(a), Bytes(b)) => a.cmp(b),
            (Other(a), Other(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl Hash for PartitionValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        match self {
            PartitionValue::Null => {}
            PartitionValue::Boolean(b) => b.hash(state),
            PartitionValue::Int(i) | PartitionValue::Date(i) => i.hash(state),
            PartitionValue::Long(l) | PartitionValue::Time(l) | PartitionValue::Timestamp(l) => {
                l.hash(state)
            }
            PartitionValue::Float(f) => f.to_bits().hash(state),
            PartitionValue::Double(d) => d.to_bits().hash(state),
            PartitionValue::String(s) | PartitionValue::Other(s) => s.hash(state),
            PartitionValue::Bytes(b) => b.hash(state),
        }
    }
}

impl fmt::Display for PartitionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartitionValue::Null => write!(f, "null"),
            PartitionValue::Boolean(b) => write!(f, "{}", b),
            PartitionValue::Int(i) | PartitionValue::Date(i) => write!(f, "{}", i),
            PartitionValue::Long(l) | PartitionValue::Time(l) | PartitionValue::Timestamp(l) => {
                write!(f, "{}", l)
            }
            PartitionValue::Float(v) => write!(f, "{}", v),
            PartitionValue::Double(v) => write!(f, "{}", v),
            PartitionValue::String(s) | PartitionValue::Other(s) => write!(f, "{}", s),
            PartitionValue::Bytes(b) => {
                for byte in b {
                    write!(f, "{:02x}", byte)?;
                }
                Ok(())
            }
        }
    }
}

impl Serialize for PartitionValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            PartitionValue::Null => serializer.serialize_none(),
            PartitionValue::Boolean(b) => serializer.serialize_bool(*b),
            PartitionValue::Int(i) | PartitionValue::Date(i) => serializer.serialize_i32(*i),
            PartitionValue::Long(l) | PartitionValue::Time(l) | PartitionValue::Timestamp(l) => {
                serializer.serialize_i64(*l)
            }
            PartitionValue::Float(v) => serializer.serialize_f32(*v),
            PartitionValue::Double(v) => serializer.serialize_f64(*v),
            PartitionValue::String(s) => serializer.serialize_str(s),
            PartitionValue::Bytes(_) | PartitionValue::Other(_) => serializer.collect_str(self),
        }
    }
}

/// Partition spec id plus the ordered partition tuple of a data file.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct PartitionKey {
    pub spec_id: i32,
    pub values: Vec<PartitionValue>,
}

impl PartitionKey {
    pub fn unpartitioned(spec_id: i32) -> Self {
        Self {
            spec_id,
            values: Vec::new(),
        }
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.values.is_empty() {
            return write!(f, "<unpartitioned>");
        }
        for (i, value) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, "/")?;
            }
            write!(f, "{}", value)?;
        }
        Ok(())
    }
}

/// One data or delete file entry of a manifest.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataFileEntry {
    pub manifest: ManifestId,
    pub status: EntryStatus,
    pub snapshot_id: Option<i64>,
    pub content: DataContent,
    pub file_path: String,
    pub file_format: String,
    pub partition: PartitionKey,
    pub record_count: u64,
    pub file_size_in_bytes: u64,
}

/// A decoded manifest file.
#[derive(Debug, Clone)]
pub struct Manifest {
    pub spec_id: i32,
    pub entries: Vec<DataFileEntry>,
}

/// Flat storage for the entries of every successfully decoded manifest.
///
/// Entries of one manifest are contiguous; manifests are kept in manifest
/// list order regardless of the order their fetches completed in.
#[derive(Debug, Clone, Default)]
pub struct ManifestArena {
    manifests: Vec<ManifestSlot>,
    entries: Vec<DataFileEntry>,
}

#[derive(Debug, Clone)]
pub struct ManifestSlot {
    pub id: ManifestId,
    pub path: String,
    pub spec_id: i32,
    range: Range<usize>,
}

impl ManifestArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, id: ManifestId, path: String, manifest: Manifest) {
        let start = self.entries.len();
        self.entries.extend(manifest.entries);
        self.manifests.push(ManifestSlot {
            id,
            path,
            spec_id: manifest.spec_id,
            range: start..self.entries.len(),
        });
    }

    /// All entries, manifest by manifest.
    pub fn entries(&self) -> &[DataFileEntry] {
        &self.entries
    }

    pub fn manifests(&self) -> impl Iterator<Item = &ManifestSlot> {
        self.manifests.iter()
    }

    pub fn entries_of(&self, id: ManifestId) -> &[DataFileEntry] {
        self.manifests
            .iter()
            .find(|m| m.id == id)
            .map(|m| &self.entries[m.range.clone()])
            .unwrap_or(&[])
    }

    pub fn manifest_count(&self) -> usize {
        self.manifests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn unwrap_union(value: &Value) -> &Value {
    match value {
        Value::Union(_, inner) => unwrap_union(inner),
        other => other,
    }
}

fn record_fields(value: &Value) -> ManifestResult<&[(String, Value)]> {
    match unwrap_union(value) {
        Value::Record(fields) => Ok(fields),
        other => Err(ManifestError::InvalidField {
            field: "record",
            reason: format!("expected record, got {:?}", other),
        }),
    }
}

/// Field by name; a null value reads as absent.
fn field<'a>(record: &'a [(String, Value)], name: &str) -> Option<&'a Value> {
    record
        .iter()
        .find(|(n, _)| n == name)
        .map(|(_, v)| unwrap_union(v))
        .filter(|v| !matches!(v, Value::Null))
}

fn opt_long(record: &[(String, Value)], name: &'static str) -> ManifestResult<Option<i64>> {
    match field(record, name) {
        None => Ok(None),
        Some(Value::Int(i)) => Ok(Some(*i as i64)),
        Some(Value::Long(l)) => Ok(Some(*l)),
        Some(other) => Err(ManifestError::InvalidField {
            field: name,
            reason: format!("expected int or long, got {:?}", other),
        }),
    }
}

fn long(record: &[(String, Value)], name: &'static str) -> ManifestResult<i64> {
    opt_long(record, name)?.ok_or(ManifestError::MissingField(name))
}

fn non_negative(record: &[(String, Value)], name: &'static str) -> ManifestResult<u64> {
    let v = long(record, name)?;
    u64::try_from(v).map_err(|_| ManifestError::InvalidField {
        field: name,
        reason: format!("negative value {}", v),
    })
}

/// Absent counts are 0.
fn counter(record: &[(String, Value)], name: &'static str) -> ManifestResult<u64> {
    Ok(opt_long(record, name)?.unwrap_or(0).max(0) as u64)
}

/// File count under either its v2 name or its v1 name.
fn count(record: &[(String, Value)], v2: &'static str, v1: &'static str) -> ManifestResult<u64> {
    match opt_long(record, v2)? {
        Some(v) => Ok(v.max(0) as u64),
        None => counter(record, v1),
    }
}

fn string(record: &[(String, Value)], name: &'static str) -> ManifestResult<String> {
    match field(record, name) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Enum(_, s)) => Ok(s.clone()),
        Some(other) => Err(ManifestError::InvalidField {
            field: name,
            reason: format!("expected string, got {:?}", other),
        }),
        None => Err(ManifestError::MissingField(name)),
    }
}

fn avro_reader(bytes: &[u8]) -> ManifestResult<AvroReader<'_, &[u8]>> {
    Ok(AvroReader::new(bytes)?)
}

/// Decode a manifest list. v1 lists without `partition_spec_id` use `default_spec_id`.
pub fn parse_manifest_list(
    bytes: &[u8],
    default_spec_id: i32,
) -> ManifestResult<Vec<ManifestListEntry>> {
    let mut entries = Vec::new();
    for value in avro_reader(bytes)? {
        let value = value?;
        let record = record_fields(&value)?;

        let content = match opt_long(record, "content")?.unwrap_or(0) {
            0 => ManifestContent::Data,
            1 => ManifestContent::Deletes,
            other => {
                return Err(ManifestError::InvalidField {
                    field: "content",
                    reason: format!("unknown manifest content {}", other),
                })
            }
        };

        entries.push(ManifestListEntry {
            manifest_path: string(record, "manifest_path")?,
            manifest_length: opt_long(record, "manifest_length")?.unwrap_or(0),
            partition_spec_id: opt_long(record, "partition_spec_id")?
                .map(|v| v as i32)
                .unwrap_or(default_spec_id),
            content,
            sequence_number: opt_long(record, "sequence_number")?,
            added_snapshot_id: opt_long(record, "added_snapshot_id")?,
            added_files_count: count(record, "added_files_count", "added_data_files_count")?,
            existing_files_count: count(
                record,
                "existing_files_count",
                "existing_data_files_count",
            )?,
            deleted_files_count: count(record, "deleted_files_count", "deleted_data_files_count")?,
            added_rows_count: counter(record, "added_rows_count")?,
            existing_rows_count: counter(record, "existing_rows_count")?,
            deleted_rows_count: counter(record, "deleted_rows_count")?,
        });
    }
    Ok(entries)
}

/// Decode a manifest whose entries belong to manifest `id`.
///
/// The spec id is taken from the `partition-spec-id` header when present,
/// otherwise `fallback_spec_id` (the manifest list's value) is used.
pub fn parse_manifest(
    bytes: &[u8],
    id: ManifestId,
    fallback_spec_id: i32,
) -> ManifestResult<Manifest> {
    let reader = avro_reader(bytes)?;
    let spec_id = reader
        .user_metadata()
        .get("partition-spec-id")
        .and_then(|v| std::str::from_utf8(v).ok())
        .and_then(|v| v.trim().parse::<i32>().ok())
        .unwrap_or(fallback_spec_id);

    let mut entries = Vec::new();
    for value in reader {
        let value = value?;
        let record = record_fields(&value)?;

        let status = match long(record, "status")? {
            0 => EntryStatus::Existing,
            1 => EntryStatus::Added,
            2 => EntryStatus::Deleted,
            other => {
                return Err(ManifestError::InvalidField {
                    field: "status",
                    reason: format!("unknown entry status {}", other),
                })
            }
        };

        let data_file = record_fields(
            field(record, "data_file").ok_or(ManifestError::MissingField("data_file"))?,
        )?;

        let content = match opt_long(data_file, "content")?.unwrap_or(0) {
            0 => DataContent::Data,
            1 => DataContent::PositionDeletes,
            2 => DataContent::EqualityDeletes,
            other => {
                return Err(ManifestError::InvalidField {
                    field: "content",
                    reason: format!("unknown data file content {}", other),
                })
            }
        };

        let values = match field(data_file, "partition") {
            Some(partition) => record_fields(partition)?
                .iter()
                .map(|(_, v)| PartitionValue::from_avro(v))
                .collect(),
            None => Vec::new(),
        };

        entries.push(DataFileEntry {
            manifest: id,
            status,
            snapshot_id: opt_long(record, "snapshot_id")?,
            content,
            file_path: string(data_file, "file_path")?,
            file_format: string(data_file, "file_format")
                .map(|f| f.to_lowercase())
                .unwrap_or_else(|_| "unknown".to_string()),
            partition: PartitionKey { spec_id, values },
            record_count: non_negative(data_file, "record_count")?,
            file_size_in_bytes: non_negative(data_file, "file_size_in_bytes")?,
        });
    }

    Ok(Manifest { spec_id, entries })
}
