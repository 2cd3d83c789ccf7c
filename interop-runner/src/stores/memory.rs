// Copyright (c) The interop-metrics Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory backend implementations: reference semantics and test doubles.

use super::{
    ObjectStore, RecordKey, RecordStore, TableSchema, Warehouse, WarehouseCreateError,
    WarehouseInsertError,
};
use crate::errors::StoreError;
use bytes::Bytes;
use futures::{FutureExt, future::BoxFuture};
use interop_metadata::{MetricsMetadata, RecordKind};
use serde_json::Value;
use std::{
    collections::{BTreeMap, BTreeSet, VecDeque},
    sync::{Arc, Mutex},
};

/// An object as stored by [`MemoryObjectStore`].
#[derive(Clone, Debug)]
pub struct StoredObject {
    /// Object payload.
    pub data: Bytes,
    /// Declared content type.
    pub content_type: String,
    /// Declared content encoding, if any.
    pub content_encoding: Option<String>,
}

#[derive(Debug, Default)]
struct MemoryObjectStoreInner {
    objects: BTreeMap<String, StoredObject>,
    get_count: u64,
    scripted_put_failure: Option<String>,
}

/// In-memory object store. Clones share state.
#[derive(Clone, Debug, Default)]
pub struct MemoryObjectStore {
    inner: Arc<Mutex<MemoryObjectStoreInner>>,
}

impl MemoryObjectStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds an object with default content metadata.
    pub fn insert(&self, key: impl Into<String>, data: impl Into<Bytes>) {
        let mut inner = self.inner.lock().expect("object store lock poisoned");
        inner.objects.insert(
            key.into(),
            StoredObject {
                data: data.into(),
                content_type: "application/octet-stream".to_owned(),
                content_encoding: None,
            },
        );
    }

    /// Returns a stored object, including its content metadata.
    pub fn object(&self, key: &str) -> Option<StoredObject> {
        let inner = self.inner.lock().expect("object store lock poisoned");
        inner.objects.get(key).cloned()
    }

    /// All keys currently stored, in sorted order.
    pub fn keys(&self) -> Vec<String> {
        let inner = self.inner.lock().expect("object store lock poisoned");
        inner.objects.keys().cloned().collect()
    }

    /// Number of `get` calls served so far. The idempotency-gate tests use
    /// this to assert that a skipped run set triggers no fetches at all.
    pub fn get_count(&self) -> u64 {
        let inner = self.inner.lock().expect("object store lock poisoned");
        inner.get_count
    }

    /// Makes the next `put` call fail.
    pub fn fail_next_put(&self, message: impl Into<String>) {
        let mut inner = self.inner.lock().expect("object store lock poisoned");
        inner.scripted_put_failure = Some(message.into());
    }
}

impl ObjectStore for MemoryObjectStore {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<Bytes>, StoreError>> {
        async move {
            let mut inner = self.inner.lock().expect("object store lock poisoned");
            inner.get_count += 1;
            Ok(inner.objects.get(key).map(|obj| obj.data.clone()))
        }
        .boxed()
    }

    fn put<'a>(
        &'a self,
        key: &'a str,
        data: Bytes,
        content_type: &'a str,
        content_encoding: Option<&'a str>,
    ) -> BoxFuture<'a, Result<(), StoreError>> {
        async move {
            let mut inner = self.inner.lock().expect("object store lock poisoned");
            if let Some(message) = inner.scripted_put_failure.take() {
                return Err(StoreError::new(message));
            }
            inner.objects.insert(
                key.to_owned(),
                StoredObject {
                    data,
                    content_type: content_type.to_owned(),
                    content_encoding: content_encoding.map(str::to_owned),
                },
            );
            Ok(())
        }
        .boxed()
    }

    fn list<'a>(&'a self, prefix: &'a str) -> BoxFuture<'a, Result<Vec<String>, StoreError>> {
        async move {
            let inner = self.inner.lock().expect("object store lock poisoned");
            Ok(inner
                .objects
                .keys()
                .filter(|key| key.starts_with(prefix))
                .cloned()
                .collect())
        }
        .boxed()
    }
}

#[derive(Debug, Default)]
struct MemoryRecordStoreInner {
    records: Vec<(RecordKey, MetricsMetadata)>,
    next_key: u64,
}

/// In-memory structured-record store. Clones share state.
#[derive(Clone, Debug, Default)]
pub struct MemoryRecordStore {
    inner: Arc<Mutex<MemoryRecordStoreInner>>,
}

impl MemoryRecordStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// All stored records, in insertion order.
    pub fn records(&self) -> Vec<(RecordKey, MetricsMetadata)> {
        let inner = self.inner.lock().expect("record store lock poisoned");
        inner.records.clone()
    }
}

impl RecordStore for MemoryRecordStore {
    fn put<'a>(
        &'a self,
        metadata: &'a MetricsMetadata,
    ) -> BoxFuture<'a, Result<RecordKey, StoreError>> {
        async move {
            let mut inner = self.inner.lock().expect("record store lock poisoned");
            let key = RecordKey(inner.next_key);
            inner.next_key += 1;
            inner.records.push((key, metadata.clone()));
            Ok(key)
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
            let inner = self.inner.lock().expect("record store lock poisoned");
            Ok(inner
                .records
                .iter()
                .filter(|(_, metadata)| {
                    metadata.record_kind() == kind
                        && run_ids
                            .iter()
                            .all(|id| metadata.runs().run_ids.contains(id))
                })
                .map(|(key, _)| *key)
                .take(limit)
                .collect())
        }
        .boxed()
    }
}

#[derive(Debug, Default)]
struct MemoryWarehouseInner {
    datasets: BTreeSet<String>,
    tables: BTreeMap<(String, String), TableSchema>,
    rows: BTreeMap<(String, String), Vec<Value>>,
    scripted_partial_failures: VecDeque<Vec<usize>>,
    scripted_fatal: Option<String>,
}

/// In-memory analytical warehouse. Clones share state.
///
/// Partial-insert failures can be scripted to exercise the sinks' bounded
/// row retry: each queued failure applies to one `insert_rows` call,
/// inserting all but the named rows and reporting those as failed.
#[derive(Clone, Debug, Default)]
pub struct MemoryWarehouse {
    inner: Arc<Mutex<MemoryWarehouseInner>>,
}

impl MemoryWarehouse {
    /// Creates an empty warehouse.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a partial failure for the next `insert_rows` call.
    pub fn script_partial_failure(&self, failed_rows: Vec<usize>) {
        let mut inner = self.inner.lock().expect("warehouse lock poisoned");
        inner.scripted_partial_failures.push_back(failed_rows);
    }

    /// Makes the next `insert_rows` call fail as a whole.
    pub fn script_fatal_failure(&self, message: impl Into<String>) {
        let mut inner = self.inner.lock().expect("warehouse lock poisoned");
        inner.scripted_fatal = Some(message.into());
    }

    /// Rows inserted into a table so far, in insertion order.
    pub fn rows(&self, dataset: &str, table: &str) -> Vec<Value> {
        let inner = self.inner.lock().expect("warehouse lock poisoned");
        inner
            .rows
            .get(&(dataset.to_owned(), table.to_owned()))
            .cloned()
            .unwrap_or_default()
    }

    /// Schema a table was created with, if it exists.
    pub fn table_schema(&self, dataset: &str, table: &str) -> Option<TableSchema> {
        let inner = self.inner.lock().expect("warehouse lock poisoned");
        inner
            .tables
            .get(&(dataset.to_owned(), table.to_owned()))
            .cloned()
    }
}

impl Warehouse for MemoryWarehouse {
    fn create_dataset<'a>(
        &'a self,
        dataset: &'a str,
    ) -> BoxFuture<'a, Result<(), WarehouseCreateError>> {
        async move {
            let mut inner = self.inner.lock().expect("warehouse lock poisoned");
            if !inner.datasets.insert(dataset.to_owned()) {
                return Err(WarehouseCreateError::AlreadyExists);
            }
            Ok(())
        }
        .boxed()
    }

    fn create_table<'a>(
        &'a self,
        dataset: &'a str,
        table: &'a str,
        schema: TableSchema,
    ) -> BoxFuture<'a, Result<(), WarehouseCreateError>> {
        async move {
            let mut inner = self.inner.lock().expect("warehouse lock poisoned");
            let key = (dataset.to_owned(), table.to_owned());
            if inner.tables.contains_key(&key) {
                return Err(WarehouseCreateError::AlreadyExists);
            }
            inner.tables.insert(key, schema);
            Ok(())
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
            let mut inner = self.inner.lock().expect("warehouse lock poisoned");
            if let Some(message) = inner.scripted_fatal.take() {
                return Err(WarehouseInsertError::Fatal(StoreError::new(message)));
            }
            let failed_rows = inner.scripted_partial_failures.pop_front();
            let key = (dataset.to_owned(), table.to_owned());
            let stored = inner.rows.entry(key).or_default();
            match failed_rows {
                None => {
                    stored.extend(rows);
                    Ok(())
                }
                Some(failed_rows) => {
                    for (idx, row) in rows.into_iter().enumerate() {
                        if !failed_rows.contains(&idx) {
                            stored.push(row);
                        }
                    }
                    Err(WarehouseInsertError::Partial { failed_rows })
                }
            }
        }
        .boxed()
    }
}
