// Copyright (c) The interop-metrics Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Boundary traits for the storage backends the pipeline writes to.
//!
//! The real object store, structured-record store and analytical warehouse
//! are external collaborators; the pipeline only sees these traits. The
//! in-memory implementations back the test suite and serve as reference
//! semantics; the filesystem implementations make the pipeline operational
//! against a local directory tree.

mod fs;
mod memory;

pub use fs::{FsObjectStore, FsRecordStore, FsWarehouse};
pub use memory::{MemoryObjectStore, MemoryRecordStore, MemoryWarehouse, StoredObject};

use crate::errors::StoreError;
use bytes::Bytes;
use futures::future::BoxFuture;
use interop_metadata::{MetricsMetadata, RecordKind};
use serde_json::Value;
use thiserror::Error;

/// A blob store addressed by string keys.
pub trait ObjectStore: Send + Sync {
    /// Fetches an object. A missing object is `None`, not an error.
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<Bytes>, StoreError>>;

    /// Writes an object with explicit content type and encoding.
    fn put<'a>(
        &'a self,
        key: &'a str,
        data: Bytes,
        content_type: &'a str,
        content_encoding: Option<&'a str>,
    ) -> BoxFuture<'a, Result<(), StoreError>>;

    /// Lists the keys of all objects under a prefix.
    fn list<'a>(&'a self, prefix: &'a str) -> BoxFuture<'a, Result<Vec<String>, StoreError>>;
}

/// Key of a stored metadata record, assigned by the store.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct RecordKey(pub u64);

/// A keyed store of metadata records, queryable by run-identifier set
/// containment.
pub trait RecordStore: Send + Sync {
    /// Stores a metadata value under its record kind with an auto-assigned
    /// key.
    fn put<'a>(
        &'a self,
        metadata: &'a MetricsMetadata,
    ) -> BoxFuture<'a, Result<RecordKey, StoreError>>;

    /// Returns the keys (at most `limit`) of records of `kind` whose run-id
    /// set contains every id in `run_ids`.
    fn find_superset_keys<'a>(
        &'a self,
        kind: RecordKind,
        run_ids: &'a [i64],
        limit: usize,
    ) -> BoxFuture<'a, Result<Vec<RecordKey>, StoreError>>;
}

/// Schema of a warehouse table, inferred from a sample value.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TableSchema {
    /// Field names, in canonical order.
    pub fields: Vec<String>,
}

/// A failed attempt to create a warehouse dataset or table.
#[derive(Debug, Error)]
pub enum WarehouseCreateError {
    /// The dataset or table already exists. Callers treat this as success.
    #[error("already exists")]
    AlreadyExists,
    /// Any other backend failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A failed bulk row insert.
#[derive(Debug, Error)]
pub enum WarehouseInsertError {
    /// Some rows failed; the rest were inserted. Indices are relative to the
    /// batch passed to [`Warehouse::insert_rows`].
    #[error("{} row(s) failed to insert", failed_rows.len())]
    Partial {
        /// Indices of the failed rows within the batch.
        failed_rows: Vec<usize>,
    },
    /// The insert failed as a whole.
    #[error(transparent)]
    Fatal(#[from] StoreError),
}

/// An analytical warehouse of datasets and schematized tables.
pub trait Warehouse: Send + Sync {
    /// Creates a dataset.
    fn create_dataset<'a>(
        &'a self,
        dataset: &'a str,
    ) -> BoxFuture<'a, Result<(), WarehouseCreateError>>;

    /// Creates a table with the given schema.
    fn create_table<'a>(
        &'a self,
        dataset: &'a str,
        table: &'a str,
        schema: TableSchema,
    ) -> BoxFuture<'a, Result<(), WarehouseCreateError>>;

    /// Infers a table schema from a sample row or metadata value.
    fn infer_schema(&self, sample: &Value) -> Result<TableSchema, StoreError>;

    /// Bulk-inserts rows, reporting partial failures by row index.
    fn insert_rows<'a>(
        &'a self,
        dataset: &'a str,
        table: &'a str,
        rows: Vec<Value>,
    ) -> BoxFuture<'a, Result<(), WarehouseInsertError>>;
}
