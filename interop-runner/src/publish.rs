// Copyright (c) The interop-metrics Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Publication of computed metric sets.
//!
//! Two sinks exist behind [`PublicationSink`]: the gzipped object-store
//! artifact with its structured metadata record, and the analytical
//! warehouse. Both are always invoked for every metric set; one failing
//! never suppresses the other.

mod object_store;
mod warehouse;

pub use object_store::ObjectStoreSink;
pub use warehouse::WarehouseSink;

use crate::errors::PublishError;
use futures::future::BoxFuture;
use interop_metadata::{MetricSetDestination, MetricsMetadata};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The published artifact shape: metadata followed by the row array.
#[derive(Debug, Serialize, Deserialize)]
pub struct MetricsDocument {
    /// Metadata of the metric set.
    pub metadata: MetricsMetadata,
    /// Serialized rows, in publication order.
    pub data: Vec<Value>,
}

/// What one sink did with one metric set.
#[derive(Debug, Default)]
pub struct PublishOutcome {
    /// Whether the sink's metadata write succeeded.
    pub metadata_written: bool,
    /// Rows the sink attempted to write.
    pub rows_attempted: usize,
    /// Errors encountered; empty means full success.
    pub errors: Vec<PublishError>,
}

impl PublishOutcome {
    /// True if the sink wrote everything it was given.
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// One destination for published metric sets.
///
/// Rows arrive pre-serialized so every sink publishes exactly the same
/// values; serialization failures are handled upstream, once.
pub trait PublicationSink: Send + Sync {
    /// Short sink name for error reporting.
    fn name(&self) -> &'static str;

    /// Publishes one metric set. Failures are reported in the outcome, never
    /// panicked or silently dropped.
    fn publish<'a>(
        &'a self,
        dest: &'a MetricSetDestination,
        metadata: &'a MetricsMetadata,
        rows: &'a [Value],
    ) -> BoxFuture<'a, PublishOutcome>;
}
