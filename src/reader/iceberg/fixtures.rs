//! Test tables written into an in-memory object store.
//!
//! Manifest lists and manifests are real Avro container files carrying the
//! subset of the Iceberg fields the reader looks at.

use crate::storage::{ObjectStoreProvider, StorageConfig, StorageProvider};
use apache_avro::types::Value;
use apache_avro::{Schema as AvroSchema, Writer};
use bytes::Bytes;
use object_store::memory::InMemory;
use object_store::path::Path;
use object_store::{ObjectStore, ObjectStoreExt, PutPayload};
use serde_json::json;
use std::sync::Arc;

pub const TABLE_LOCATION: &str = "memory:///wh/db/events";
pub const METADATA_DIR: &str = "memory:///wh/db/events/metadata";

const MANIFEST_LIST_SCHEMA: &str = r#"{
  "type": "record", "name": "manifest_file", "fields": [
    {"name": "manifest_path", "type": "string"},
    {"name": "manifest_length", "type": "long"},
    {"name": "partition_spec_id", "type": "int"},
    {"name": "content", "type": "int"},
    {"name": "added_snapshot_id", "type": "long"},
    {"name": "added_files_count", "type": "int"},
    {"name": "existing_files_count", "type": "int"},
    {"name": "deleted_files_count", "type": "int"},
    {"name": "added_rows_count", "type": "long"},
    {"name": "existing_rows_count", "type": "long"},
    {"name": "deleted_rows_count", "type": "long"}
  ]}"#;

const MANIFEST_LIST_V1_SCHEMA: &str = r#"{
  "type": "record", "name": "manifest_file", "fields": [
    {"name": "manifest_path", "type": "string"},
    {"name": "manifest_length", "type": "long"},
    {"name": "partition_spec_id", "type": "int"},
    {"name": "added_snapshot_id", "type": ["null", "long"], "default": null},
    {"name": "added_data_files_count", "type": ["null", "int"], "default": null},
    {"name": "existing_data_files_count", "type": ["null", "int"], "default": null},
    {"name": "deleted_data_files_count", "type": ["null", "int"], "default": null}
  ]}"#;

#[derive(Debug, Clone)]
pub struct FixtureFile {
    pub path: String,
    pub status: i32,
    pub content: i32,
    pub partition: Vec<Option<String>>,
    pub record_count: i64,
    pub size: i64,
}

impl FixtureFile {
    pub fn data(path: &str, partition: Option<&str>, record_count: i64, size: i64) -> Self {
        Self {
            path: path.to_string(),
            status: 1,
            content: 0,
            partition: vec![partition.map(str::to_string)],
            record_count,
            size,
        }
    }

    pub fn position_deletes(path: &str, partition: Option<&str>, record_count: i64, size: i64) -> Self {
        Self {
            content: 1,
            ..Self::data(path, partition, record_count, size)
        }
    }

    pub fn unpartitioned(path: &str, record_count: i64, size: i64) -> Self {
        Self {
            partition: Vec::new(),
            ..Self::data(path, None, record_count, size)
        }
    }

    pub fn existing(mut self) -> Self {
        self.status = 0;
        self
    }

    pub fn deleted(mut self) -> Self {
        self.status = 2;
        self
    }
}

#[derive(Debug, Clone)]
pub struct FixtureManifest {
    pub path: String,
    pub spec_id: i32,
    pub content: i32,
    pub added_snapshot_id: i64,
}

impl FixtureManifest {
    pub fn data(path: &str, spec_id: i32, added_snapshot_id: i64) -> Self {
        Self {
            path: path.to_string(),
            spec_id,
            content: 0,
            added_snapshot_id,
        }
    }

    pub fn deletes(path: &str, spec_id: i32, added_snapshot_id: i64) -> Self {
        Self {
            content: 1,
            ..Self::data(path, spec_id, added_snapshot_id)
        }
    }
}

fn write_avro(schema: &str, user_metadata: &[(&str, String)], records: Vec<Value>) -> Vec<u8> {
    let schema = AvroSchema::parse_str(schema).unwrap();
    let mut writer = Writer::new(&schema, Vec::new());
    for (key, value) in user_metadata {
        writer.add_user_metadata(key.to_string(), value.as_bytes()).unwrap();
    }
    for record in records {
        writer.append(record).unwrap();
    }
    writer.into_inner().unwrap()
}

fn manifest_schema(partition_width: usize) -> String {
    let partition_fields: Vec<serde_json::Value> = (0..partition_width)
        .map(|i| json!({"name": format!("p{}", i), "type": ["null", "string"], "default": null}))
        .collect();
    json!({
        "type": "record", "name": "manifest_entry", "fields": [
            {"name": "status", "type": "int"},
            {"name": "snapshot_id", "type": ["null", "long"], "default": null},
            {"name": "data_file", "type": {"type": "record", "name": "r2", "fields": [
                {"name": "content", "type": "int"},
                {"name": "file_path", "type": "string"},
                {"name": "file_format", "type": "string"},
                {"name": "partition", "type": {"type": "record", "name": "r102", "fields": partition_fields}},
                {"name": "record_count", "type": "long"},
                {"name": "file_size_in_bytes", "type": "long"}
            ]}}
        ]
    })
    .to_string()
}

/// Avro bytes of a manifest holding `files`, with the spec id in its header.
pub fn manifest_bytes(spec_id: i32, files: &[FixtureFile]) -> Vec<u8> {
    let width = files.first().map(|f| f.partition.len()).unwrap_or(0);
    let records = files
        .iter()
        .map(|f| {
            let partition = f
                .partition
                .iter()
                .enumerate()
                .map(|(i, v)| {
                    let value = match v {
                        Some(s) => Value::Union(1, Box::new(Value::String(s.clone()))),
                        None => Value::Union(0, Box::new(Value::Null)),
                    };
                    (format!("p{}", i), value)
                })
                .collect();
            Value::Record(vec![
                ("status".to_string(), Value::Int(f.status)),
                (
                    "snapshot_id".to_string(),
                    Value::Union(1, Box::new(Value::Long(1))),
                ),
                (
                    "data_file".to_string(),
                    Value::Record(vec![
                        ("content".to_string(), Value::Int(f.content)),
                        ("file_path".to_string(), Value::String(f.path.clone())),
                        ("file_format".to_string(), Value::String("PARQUET".to_string())),
                        ("partition".to_string(), Value::Record(partition)),
                        ("record_count".to_string(), Value::Long(f.record_count)),
                        ("file_size_in_bytes".to_string(), Value::Long(f.size)),
                    ]),
                ),
            ])
        })
        .collect();
    write_avro(
        &manifest_schema(width),
        &[("partition-spec-id", spec_id.to_string())],
        records,
    )
}

/// Avro bytes of a manifest list pointing at `manifests`.
pub fn manifest_list_bytes(manifests: &[FixtureManifest]) -> Vec<u8> {
    let records = manifests
        .iter()
        .map(|m| {
            Value::Record(vec![
                ("manifest_path".to_string(), Value::String(m.path.clone())),
                ("manifest_length".to_string(), Value::Long(1024)),
                ("partition_spec_id".to_string(), Value::Int(m.spec_id)),
                ("content".to_string(), Value::Int(m.content)),
                ("added_snapshot_id".to_string(), Value::Long(m.added_snapshot_id)),
                ("added_files_count".to_string(), Value::Int(0)),
                ("existing_files_count".to_string(), Value::Int(0)),
                ("deleted_files_count".to_string(), Value::Int(0)),
                ("added_rows_count".to_string(), Value::Long(0)),
                ("existing_rows_count".to_string(), Value::Long(0)),
                ("deleted_rows_count".to_string(), Value::Long(0)),
            ])
        })
        .collect();
    write_avro(MANIFEST_LIST_SCHEMA, &[], records)
}

/// Avro bytes of a v1 manifest list; `counts` are the added, existing and
/// deleted data file counts of each manifest.
pub fn manifest_list_v1_bytes(manifests: &[(FixtureManifest, [i32; 3])]) -> Vec<u8> {
    let int = |v: i32| Value::Union(1, Box::new(Value::Int(v)));
    let records = manifests
        .iter()
        .map(|(m, [added, existing, deleted])| {
            Value::Record(vec![
                ("manifest_path".to_string(), Value::String(m.path.clone())),
                ("manifest_length".to_string(), Value::Long(1024)),
                ("partition_spec_id".to_string(), Value::Int(m.spec_id)),
                (
                    "added_snapshot_id".to_string(),
                    Value::Union(1, Box::new(Value::Long(m.added_snapshot_id))),
                ),
                ("added_data_files_count".to_string(), int(*added)),
                ("existing_data_files_count".to_string(), int(*existing)),
                ("deleted_data_files_count".to_string(), int(*deleted)),
            ])
        })
        .collect();
    write_avro(MANIFEST_LIST_V1_SCHEMA, &[], records)
}

#[derive(Debug, Clone)]
pub struct FixtureSnapshot {
    pub id: i64,
    pub parent: Option<i64>,
    pub timestamp_ms: i64,
    pub operation: &'static str,
    pub summary: Vec<(&'static str, &'static str)>,
    pub manifest_list: String,
}

impl FixtureSnapshot {
    pub fn new(id: i64, parent: Option<i64>, timestamp_ms: i64, manifest_list: &str) -> Self {
        Self {
            id,
            parent,
            timestamp_ms,
            operation: "append",
            summary: Vec::new(),
            manifest_list: manifest_list.to_string(),
        }
    }

    pub fn with_summary(mut self, summary: &[(&'static str, &'static str)]) -> Self {
        self.summary = summary.to_vec();
        self
    }

    pub fn with_operation(mut self, operation: &'static str) -> Self {
        self.operation = operation;
        self
    }
}

/// A v2 root metadata document with a single-column identity partition spec.
pub fn metadata_json(current: Option<i64>, snapshots: &[FixtureSnapshot]) -> String {
    let snapshots: Vec<serde_json::Value> = snapshots
        .iter()
        .enumerate()
        .map(|(i, s)| {
            let mut summary = serde_json::Map::new();
            summary.insert("operation".to_string(), json!(s.operation));
            for (k, v) in &s.summary {
                summary.insert(k.to_string(), json!(v));
            }
            let mut snapshot = json!({
                "snapshot-id": s.id,
                "sequence-number": i + 1,
                "timestamp-ms": s.timestamp_ms,
                "manifest-list": s.manifest_list,
                "summary": summary,
            });
            if let Some(parent) = s.parent {
                snapshot["parent-snapshot-id"] = json!(parent);
            }
            snapshot
        })
        .collect();
    let last_updated = snapshots
        .iter()
        .filter_map(|s| s["timestamp-ms"].as_i64())
        .max()
        .unwrap_or(1_700_000_000_000);

    json!({
        "format-version": 2,
        "table-uuid": "5f0e3c1a-7d42-4b8e-9a51-0c6f2d8e4b11",
        "location": TABLE_LOCATION,
        "last-sequence-number": snapshots.len(),
        "last-updated-ms": last_updated,
        "last-column-id": 2,
        "current-schema-id": 0,
        "schemas": [{"type": "struct", "schema-id": 0, "fields": [
            {"id": 1, "name": "id", "required": true, "type": "long"},
            {"id": 2, "name": "region", "required": false, "type": "string"}
        ]}],
        "default-spec-id": 0,
        "partition-specs": [{"spec-id": 0, "fields": [
            {"source-id": 2, "field-id": 1000, "name": "region", "transform": "identity"}
        ]}],
        "last-partition-id": 1000,
        "default-sort-order-id": 0,
        "sort-orders": [{"order-id": 0, "fields": []}],
        "properties": {},
        "current-snapshot-id": current.unwrap_or(-1),
        "snapshots": snapshots,
        "metadata-log": [{"timestamp-ms": 1_600_000_000_000i64, "metadata-file": format!("{}/v1.metadata.json", METADATA_DIR)}]
    })
    .to_string()
}

/// Iceberg table files in a shared in-memory store.
pub struct TableFixture {
    pub store: Arc<InMemory>,
}

impl TableFixture {
    pub fn new() -> Self {
        Self {
            store: Arc::new(InMemory::new()),
        }
    }

    /// Write `bytes` at `location` (a `memory://` URI or store-relative path).
    pub async fn put(&self, location: &str, bytes: impl Into<Bytes>) {
        let path = location
            .strip_prefix("memory://")
            .unwrap_or(location)
            .trim_start_matches('/');
        self.store
            .put(&Path::from(path), PutPayload::from(bytes.into()))
            .await
            .unwrap();
    }

    pub fn provider(&self) -> Arc<dyn StorageProvider> {
        let store: Arc<dyn ObjectStore> = self.store.clone();
        Arc::new(ObjectStoreProvider::from_store(
            StorageConfig::memory(),
            store,
            "memory://",
        ))
    }

    /// Two snapshots on one lineage:
    ///
    /// * A (id 1): append, +100 records, +2 files (a1 in p1 200 bytes, a2 in p2 100 bytes)
    /// * B (id 2, parent A): append, +50 records, +1 file (b1 in p1 100 bytes)
    ///
    /// Live partition sizes are p1=300 and p2=100. Data files are written to
    /// the store together with one unreferenced file. Returns the root
    /// metadata location.
    pub async fn scenario(&self) -> String {
        let a1 = format!("{}/data/region=p1/a1.parquet", TABLE_LOCATION);
        let a2 = format!("{}/data/region=p2/a2.parquet", TABLE_LOCATION);
        let b1 = format!("{}/data/region=p1/b1.parquet", TABLE_LOCATION);

        let m_a = format!("{}/m-a.avro", METADATA_DIR);
        let m_b = format!("{}/m-b.avro", METADATA_DIR);
        self.put(
            &m_a,
            manifest_bytes(
                0,
                &[
                    FixtureFile::data(&a1, Some("p1"), 60, 200),
                    FixtureFile::data(&a2, Some("p2"), 40, 100),
                ],
            ),
        )
        .await;
        self.put(&m_b, manifest_bytes(0, &[FixtureFile::data(&b1, Some("p1"), 50, 100)]))
            .await;

        let list_a = format!("{}/snap-1.avro", METADATA_DIR);
        let list_b = format!("{}/snap-2.avro", METADATA_DIR);
        self.put(&list_a, manifest_list_bytes(&[FixtureManifest::data(&m_a, 0, 1)]))
            .await;
        self.put(
            &list_b,
            manifest_list_bytes(&[
                FixtureManifest::data(&m_a, 0, 1),
                FixtureManifest::data(&m_b, 0, 2),
            ]),
        )
        .await;

        for (path, size) in [(&a1, 200usize), (&a2, 100), (&b1, 100)] {
            self.put(path, vec![0u8; size]).await;
        }
        self.put(
            &format!("{}/data/region=p2/stray.parquet", TABLE_LOCATION),
            vec![0u8; 42],
        )
        .await;

        let snapshots = [
            FixtureSnapshot::new(1, None, 1_700_000_000_000, &list_a).with_summary(&[
                ("added-records", "100"),
                ("added-data-files", "2"),
                ("added-files-size", "300"),
                ("changed-partition-count", "2"),
            ]),
            FixtureSnapshot::new(2, Some(1), 1_700_000_060_000, &list_b).with_summary(&[
                ("added-records", "50"),
                ("added-data-files", "1"),
                ("added-files-size", "100"),
                ("changed-partition-count", "1"),
            ]),
        ];
        let root = format!("{}/v2.metadata.json", METADATA_DIR);
        self.put(&root, metadata_json(Some(2), &snapshots)).await;
        self.put(&format!("{}/v1.metadata.json", METADATA_DIR), "{}").await;
        root
    }
}
