// Copyright (c) The interop-metrics Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Object-store sink: gzipped JSON artifact plus structured metadata record.

use super::{MetricsDocument, PublicationSink, PublishOutcome};
use crate::{
    errors::PublishError,
    stores::{ObjectStore, RecordStore},
};
use bytes::Bytes;
use flate2::{Compression, write::GzEncoder};
use futures::{FutureExt, future::BoxFuture};
use interop_metadata::{MetricSetDestination, MetricsMetadata};
use serde_json::Value;
use std::io::Write;
use std::sync::Arc;
use tracing::debug;

/// Publishes the full `{metadata, data}` document as a gzipped object, then
/// records the metadata in the structured-record store.
///
/// The record write only happens after a successful object write: the record
/// is what the idempotency gate trusts, so it must never exist without its
/// artifact.
pub struct ObjectStoreSink {
    objects: Arc<dyn ObjectStore>,
    records: Arc<dyn RecordStore>,
}

impl ObjectStoreSink {
    /// Creates a sink writing to the given stores.
    pub fn new(objects: Arc<dyn ObjectStore>, records: Arc<dyn RecordStore>) -> Self {
        Self { objects, records }
    }
}

impl PublicationSink for ObjectStoreSink {
    fn name(&self) -> &'static str {
        "object-store"
    }

    fn publish<'a>(
        &'a self,
        dest: &'a MetricSetDestination,
        metadata: &'a MetricsMetadata,
        rows: &'a [Value],
    ) -> BoxFuture<'a, PublishOutcome> {
        async move {
            let mut outcome = PublishOutcome::default();
            let path = &dest.data.object_path;

            let payload = match encode_document(metadata, rows) {
                Ok(payload) => payload,
                Err(error) => {
                    outcome.errors.push(PublishError::Serialize {
                        path: path.clone(),
                        error,
                    });
                    return outcome;
                }
            };

            let write = self
                .objects
                .put(path, payload, "application/json", Some("gzip"))
                .await;
            if let Err(error) = write {
                outcome.errors.push(PublishError::ObjectWrite {
                    path: path.clone(),
                    error,
                });
                return outcome;
            }
            outcome.rows_attempted = rows.len();
            debug!(path, rows = rows.len(), "metrics artifact written");

            match self.records.put(metadata).await {
                Ok(_) => outcome.metadata_written = true,
                Err(error) => outcome.errors.push(PublishError::RecordWrite {
                    kind: metadata.record_kind().name(),
                    error,
                }),
            }
            outcome
        }
        .boxed()
    }
}

fn encode_document(
    metadata: &MetricsMetadata,
    rows: &[Value],
) -> Result<Bytes, serde_json::Error> {
    let document = MetricsDocument {
        metadata: metadata.clone(),
        data: rows.to_vec(),
    };
    let json = serde_json::to_vec(&document)?;
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(&json)
        .expect("writing to a Vec cannot fail");
    Ok(Bytes::from(
        encoder.finish().expect("writing to a Vec cannot fail"),
    ))
}
