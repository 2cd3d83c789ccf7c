// Copyright (c) The interop-metrics Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Filesystem-backed backend implementations.
//!
//! These make the pipeline operational against a local directory tree: the
//! object store maps keys to file paths, the record store keeps metadata
//! records in a single JSON file, and the warehouse maps datasets to
//! directories and tables to JSON-lines files.

use super::{
    ObjectStore, RecordKey, RecordStore, TableSchema, Warehouse, WarehouseCreateError,
    WarehouseInsertError,
};
use crate::errors::StoreError;
use bytes::Bytes;
use camino::{Utf8Path, Utf8PathBuf};
use futures::{FutureExt, future::BoxFuture};
use interop_metadata::{MetricsMetadata, RecordKind};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io;
use tokio::io::AsyncWriteExt;

fn store_io_error(what: &str, path: &Utf8Path, error: io::Error) -> StoreError {
    StoreError::with_source(format!("{what} `{path}`"), error)
}

/// Object store rooted at a local directory; keys are relative file paths.
///
/// Content type and encoding are accepted for interface parity but are not
/// persisted: local files carry no object metadata.
#[derive(Clone, Debug)]
pub struct FsObjectStore {
    root: Utf8PathBuf,
}

impl FsObjectStore {
    /// Creates a store rooted at the given directory.
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ObjectStore for FsObjectStore {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<Bytes>, StoreError>> {
        async move {
            let path = self.root.join(key);
            match tokio::fs::read(&path).await {
                Ok(data) => Ok(Some(Bytes::from(data))),
                Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(None),
                Err(error) => Err(store_io_error("failed to read", &path, error)),
            }
        }
        .boxed()
    }

    fn put<'a>(
        &'a self,
        key: &'a str,
        data: Bytes,
        _content_type: &'a str,
        _content_encoding: Option<&'a str>,
    ) -> BoxFuture<'a, Result<(), StoreError>> {
        async move {
            let path = self.root.join(key);
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|error| store_io_error("failed to create", parent, error))?;
            }
            tokio::fs::write(&path, data)
                .await
                .map_err(|error| store_io_error("failed to write", &path, error))
        }
        .boxed()
    }

    fn list<'a>(&'a self, prefix: &'a str) -> BoxFuture<'a, Result<Vec<String>, StoreError>> {
        let root = self.root.clone();
        let prefix = prefix.to_owned();
        async move {
            tokio::task::spawn_blocking(move || list_keys(&root, &prefix))
                .await
                .map_err(|error| StoreError::with_source("list task panicked", error))?
        }
        .boxed()
    }
}

fn list_keys(root: &Utf8Path, prefix: &str) -> Result<Vec<String>, StoreError> {
    if !root.exists() {
        return Ok(Vec::new());
    }
    let mut keys = Vec::new();
    for entry in walkdir::WalkDir::new(root) {
        let entry =
            entry.map_err(|error| StoreError::with_source(format!("walk of `{root}`"), error))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(rel) = entry.path().strip_prefix(root.as_std_path()) else {
            continue;
        };
        let Some(rel) = Utf8Path::from_path(rel) else {
            continue;
        };
        let key = rel.as_str().replace('\\', "/");
        if key.starts_with(prefix) {
            keys.push(key);
        }
    }
    keys.sort_unstable();
    Ok(keys)
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredRecord {
    key: u64,
    kind: String,
    // Persisted explicitly: run ids are not part of the metadata's JSON
    // representation but are the basis of the superset query.
    run_ids: Vec<i64>,
    value: Value,
}

/// Record store keeping metadata records in a single JSON file under its
/// root directory.
#[derive(Clone, Debug)]
pub struct FsRecordStore {
    path: Utf8PathBuf,
}

impl FsRecordStore {
    /// Creates a store persisting to `records.json` under the given
    /// directory.
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self {
            path: root.into().join("records.json"),
        }
    }

    async fn load(&self) -> Result<Vec<StoredRecord>, StoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(data) => serde_json::from_slice(&data).map_err(|error| {
                StoreError::with_source(format!("failed to parse `{}`", self.path), error)
            }),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(error) => Err(store_io_error("failed to read", &self.path, error)),
        }
    }

    async fn save(&self, records: &[StoredRecord]) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|error| store_io_error("failed to create", parent, error))?;
        }
        let data = serde_json::to_vec_pretty(records).map_err(|error| {
            StoreError::with_source(format!("failed to serialize `{}`", self.path), error)
        })?;
        tokio::fs::write(&self.path, data)
            .await
            .map_err(|error| store_io_error("failed to write", &self.path, error))
    }
}

impl RecordStore for FsRecordStore {
    fn put<'a>(
        &'a self,
        metadata: &'a MetricsMetadata,
    ) -> BoxFuture<'a, Result<RecordKey, StoreError>> {
        async move {
            let mut records = self.load().await?;
            let key = records.iter().map(|r| r.key + 1).max().unwrap_or(0);
            let value = serde_json::to_value(metadata).map_err(|error| {
                StoreError::with_source("failed to serialize metadata record", error)
            })?;
            records.push(StoredRecord {
                key,
                kind: metadata.record_kind().name().to_owned(),
                run_ids: metadata.runs().run_ids.clone(),
                value,
            });
            self.save(&records).await?;
            Ok(RecordKey(key))
        }
        .boxed()
    }

    fn find_superset_keys<'a>(
        &'a self,
        kind: RecordKind,
        run_ids: &'a [i64],
        limit: usize,
    ) -> BoxFuture<'a, Result<Vec<RecordKey>, StoreError>> {
        async move {
            let records = self.load().await?;
            Ok(records
                .iter()
                .filter(|record| {
                    record.kind == kind.name()
                        && run_ids.iter().all(|id| record.run_ids.contains(id))
                })
                .map(|record| RecordKey(record.key))
                .take(limit)
                .collect())
        }
        .boxed()
    }
}

/// Warehouse mapping datasets to directories and tables to JSON-lines
/// files under its root.
#[derive(Clone, Debug)]
pub struct FsWarehouse {
    root: Utf8PathBuf,
}

impl FsWarehouse {
    /// Creates a warehouse rooted at the given directory.
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn table_path(&self, dataset: &str, table: &str) -> Utf8PathBuf {
        self.root.join(dataset).join(format!("{table}.jsonl"))
    }

    /// Reads all rows of a table back, one JSON value per line.
    pub async fn read_rows(&self, dataset: &str, table: &str) -> Result<Vec<Value>, StoreError> {
        let path = self.table_path(dataset, table);
        let data = tokio::fs::read_to_string(&path)
            .await
            .map_err(|error| store_io_error("failed to read", &path, error))?;
        data.lines()
            .filter(|line| !line.is_empty())
            .map(|line| {
                serde_json::from_str(line).map_err(|error| {
                    StoreError::with_source(format!("failed to parse row in `{path}`"), error)
                })
            })
            .collect()
    }
}

impl Warehouse for FsWarehouse {
    fn create_dataset<'a>(
        &'a self,
        dataset: &'a str,
    ) -> BoxFuture<'a, Result<(), WarehouseCreateError>> {
        async move {
            let path = self.root.join(dataset);
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|error| store_io_error("failed to create", parent, error))?;
            }
            match tokio::fs::create_dir(&path).await {
                Ok(()) => Ok(()),
                Err(error) if error.kind() == io::ErrorKind::AlreadyExists => {
                    Err(WarehouseCreateError::AlreadyExists)
                }
                Err(error) => Err(store_io_error("failed to create", &path, error).into()),
            }
        }
        .boxed()
    }

    fn create_table<'a>(
        &'a self,
        dataset: &'a str,
        table: &'a str,
        _schema: TableSchema,
    ) -> BoxFuture<'a, Result<(), WarehouseCreateError>> {
        async move {
            let path = self.table_path(dataset, table);
            match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(_) => Ok(()),
                Err(error) if error.kind() == io::ErrorKind::AlreadyExists => {
                    Err(WarehouseCreateError::AlreadyExists)
                }
                Err(error) => Err(store_io_error("failed to create", &path, error).into()),
            }
        }
        .boxed()
    }

    fn infer_schema(&self, sample: &Value) -> Result<TableSchema, StoreError> {
        match sample {
            Value::Object(map) => Ok(TableSchema {
                fields: map.keys().cloned().collect(),
            }),
            other => Err(StoreError::new(format!(
                "cannot infer schema from non-object sample: {other}"
            ))),
        }
    }

    fn insert_rows<'a>(
        &'a self,
        dataset: &'a str,
        table: &'a str,
        rows: Vec<Value>,
    ) -> BoxFuture<'a, Result<(), WarehouseInsertError>> {
        async move {
            let path = self.table_path(dataset, table);
            let mut file = tokio::fs::OpenOptions::new()
                .append(true)
                .create(true)
                .open(&path)
                .await
                .map_err(|error| {
                    WarehouseInsertError::Fatal(store_io_error("failed to open", &path, error))
                })?;
            let mut buf = Vec::new();
            for row in &rows {
                serde_json::to_writer(&mut buf, row).map_err(|error| {
                    WarehouseInsertError::Fatal(StoreError::with_source(
                        "failed to serialize row",
                        error,
                    ))
                })?;
                buf.push(b'\n');
            }
            file.write_all(&buf).await.map_err(|error| {
                WarehouseInsertError::Fatal(store_io_error("failed to write", &path, error))
            })?;
            Ok(())
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino_tempfile::tempdir;

    #[tokio::test]
    async fn object_store_round_trips_and_lists() {
        let dir = tempdir().unwrap();
        let store = FsObjectStore::new(dir.path());
        store
            .put(
                "abc/chrome/a.json",
                Bytes::from_static(b"{}"),
                "application/json",
                None,
            )
            .await
            .unwrap();
        store
            .put(
                "abc/firefox/a.json",
                Bytes::from_static(b"{}"),
                "application/json",
                None,
            )
            .await
            .unwrap();

        let data = store.get("abc/chrome/a.json").await.unwrap().unwrap();
        assert_eq!(data, Bytes::from_static(b"{}"));
        assert!(store.get("abc/chrome/missing.json").await.unwrap().is_none());

        let keys = store.list("abc/chrome/").await.unwrap();
        assert_eq!(keys, vec!["abc/chrome/a.json"]);
    }

    #[tokio::test]
    async fn warehouse_create_twice_reports_already_exists() {
        let dir = tempdir().unwrap();
        let warehouse = FsWarehouse::new(dir.path());
        warehouse.create_dataset("ds").await.unwrap();
        match warehouse.create_dataset("ds").await {
            Err(WarehouseCreateError::AlreadyExists) => {}
            other => panic!("expected AlreadyExists, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn warehouse_rows_round_trip() {
        let dir = tempdir().unwrap();
        let warehouse = FsWarehouse::new(dir.path());
        warehouse.create_dataset("ds").await.unwrap();
        let rows = vec![
            serde_json::json!({"dir": "/a", "total": 1}),
            serde_json::json!({"dir": "/b", "total": 2}),
        ];
        warehouse
            .insert_rows("ds", "t", rows.clone())
            .await
            .unwrap();
        assert_eq!(warehouse.read_rows("ds", "t").await.unwrap(), rows);
    }
}
