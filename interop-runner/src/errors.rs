// Copyright (c) The interop-metrics Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by the metrics pipeline.

use camino::Utf8PathBuf;
use itertools::Itertools;
use std::io;
use thiserror::Error;

/// An error reported by a storage backend.
///
/// Backends are opaque to the pipeline, so this carries a message and an
/// optional underlying cause rather than a backend-specific type.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct StoreError {
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl StoreError {
    /// Creates a new error from a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new error from a message and an underlying cause.
    pub fn with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// An error that occurred while fetching a single object.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The backing store reported a failure for this key.
    #[error("failed to fetch object `{key}`")]
    Store {
        /// Key of the object being fetched.
        key: String,
        /// Underlying store error.
        #[source]
        error: StoreError,
    },

    /// Reading or writing the local cache entry for this key failed. Fatal
    /// to this fetch only.
    #[error("cache I/O for object `{key}` at `{path}` failed")]
    Cache {
        /// Key of the object being fetched.
        key: String,
        /// Cache file path involved.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        error: io::Error,
    },
}

/// A payload that could not be decoded as either plain or gzipped JSON.
#[derive(Debug, Error)]
#[error("object `{key}` is neither plain nor gzipped JSON (gzip attempt: {gzip_cause})")]
pub struct DecodeError {
    /// Key of the object that failed to decode.
    pub key: String,
    /// Error from the direct JSON decode attempt.
    #[source]
    pub plain_cause: serde_json::Error,
    /// Description of why the gzip attempt failed.
    pub gzip_cause: String,
}

/// A per-object or per-run error collected during the load phase.
///
/// These are aggregated alongside partial results, never fatal individually;
/// the caller decides whether partial results are usable.
#[derive(Debug, Error)]
pub enum LoadError {
    /// Listing the objects under a run's result prefix failed.
    #[error("failed to list objects under `{prefix}` for run {run_id}")]
    List {
        /// Run whose objects were being listed.
        run_id: i64,
        /// Object key prefix.
        prefix: String,
        /// Underlying store error.
        #[source]
        error: StoreError,
    },

    /// A single object fetch failed.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// A single object failed to decode.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// A run's results URL did not contain the configured bucket name.
    #[error("run {run_id}: results URL `{url}` does not reference bucket `{bucket}`")]
    MalformedResultsUrl {
        /// Run with the malformed URL.
        run_id: i64,
        /// The URL in question.
        url: String,
        /// Bucket name that was expected to appear in it.
        bucket: String,
    },

    /// A run selected for consolidated loading has no raw-results URL.
    #[error("run {run_id} ({browser}) has no raw results URL")]
    MissingRawResultsUrl {
        /// Run lacking the URL.
        run_id: i64,
        /// Browser of that run, for diagnostics.
        browser: String,
    },

    /// The consolidated raw-results document for a run does not exist.
    /// Unlike the sharded strategy, a missing document here is an error.
    #[error("raw results document `{key}` for run {run_id} not found")]
    RawReportMissing {
        /// Run whose document is missing.
        run_id: i64,
        /// Derived object key of the document.
        key: String,
    },

    /// The load phase was cancelled before completing.
    #[error("load cancelled")]
    Cancelled,
}

/// The idempotency pre-check failed. This aborts the pipeline before any
/// work is done: there is nothing to roll back.
#[derive(Debug, Error)]
#[error("idempotency query against the record store failed")]
pub struct GateError {
    /// Underlying store error.
    #[source]
    pub error: StoreError,
}

/// An error from one publication sink for one metric set. Sinks fail
/// independently: an error here never aborts other sinks or metric sets.
#[derive(Debug, Error)]
pub enum PublishError {
    /// Serializing the metrics document failed.
    #[error("failed to serialize metrics document for `{path}`")]
    Serialize {
        /// Object path of the artifact.
        path: String,
        /// Underlying serde error.
        #[source]
        error: serde_json::Error,
    },

    /// Writing the artifact to the object store failed.
    #[error("failed to write object `{path}`")]
    ObjectWrite {
        /// Object path of the artifact.
        path: String,
        /// Underlying store error.
        #[source]
        error: StoreError,
    },

    /// Writing the metadata record failed.
    #[error("failed to write `{kind}` metadata record")]
    RecordWrite {
        /// Record kind name.
        kind: &'static str,
        /// Underlying store error.
        #[source]
        error: StoreError,
    },

    /// Creating a warehouse dataset or table failed for a reason other than
    /// it already existing.
    #[error("failed to create `{dataset}.{table}`")]
    TableCreate {
        /// Warehouse dataset.
        dataset: String,
        /// Warehouse table.
        table: String,
        /// Underlying store error.
        #[source]
        error: StoreError,
    },

    /// Inferring a warehouse table schema failed.
    #[error("failed to infer schema for `{dataset}.{table}`")]
    SchemaInfer {
        /// Warehouse dataset.
        dataset: String,
        /// Warehouse table.
        table: String,
        /// Underlying store error.
        #[source]
        error: StoreError,
    },

    /// A warehouse row insert failed with a non-partial error.
    #[error("failed to insert rows {first_row}..{last_row} into `{dataset}.{table}`")]
    RowInsert {
        /// Warehouse dataset.
        dataset: String,
        /// Warehouse table.
        table: String,
        /// Index of the first row in the failed chunk.
        first_row: usize,
        /// Index one past the last row in the failed chunk.
        last_row: usize,
        /// Underlying store error.
        #[source]
        error: StoreError,
    },

    /// Inserting the warehouse metadata row failed.
    #[error("failed to insert metadata row into `{dataset}.{table}`")]
    MetadataInsert {
        /// Warehouse dataset.
        dataset: String,
        /// Warehouse table.
        table: String,
        /// Underlying store error.
        #[source]
        error: StoreError,
    },
}

/// A publish failure, tagged with which sink and metric set it came from.
#[derive(Debug)]
pub struct PublishFailure {
    /// Name of the sink that failed.
    pub sink: &'static str,
    /// Label of the metric set being published, e.g. `pass-rates`.
    pub metric_set: String,
    /// The underlying error.
    pub error: PublishError,
}

/// A fatal pipeline error.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Creating the tokio runtime failed.
    #[error("failed to create tokio runtime")]
    RuntimeCreate(#[source] io::Error),

    /// The idempotency pre-check failed.
    #[error(transparent)]
    Gate(#[from] GateError),

    /// The pipeline was cancelled.
    #[error("pipeline cancelled")]
    Cancelled,

    /// A computed row failed to serialize.
    #[error("failed to serialize metric rows")]
    RowSerialize(#[source] serde_json::Error),

    /// One or more (sink, metric set) publications failed.
    #[error(
        "{} publish failure(s): {}",
        failures.len(),
        failures.iter().map(|f| format!("{} {}", f.sink, f.metric_set)).join(", ")
    )]
    Publish {
        /// The individual failures, one per (sink, metric set).
        failures: Vec<PublishFailure>,
    },
}
