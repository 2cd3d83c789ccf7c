// Copyright (c) The interop-metrics Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Warehouse sink: schematized tables with chunked bulk inserts.

use super::{PublicationSink, PublishOutcome};
use crate::{
    errors::PublishError,
    stores::{Warehouse, WarehouseCreateError, WarehouseInsertError},
};
use futures::{FutureExt, future::BoxFuture};
use interop_metadata::{MetricSetDestination, MetricsMetadata, OutputDestination};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

/// Rows per bulk insert.
const INSERT_CHUNK_ROWS: usize = 10_000;

/// Publishes metric rows into an analytical warehouse, with the metadata row
/// inserted last so a metadata row never describes half-inserted data.
pub struct WarehouseSink {
    warehouse: Arc<dyn Warehouse>,
}

impl WarehouseSink {
    /// Creates a sink writing to the given warehouse.
    pub fn new(warehouse: Arc<dyn Warehouse>) -> Self {
        Self { warehouse }
    }

    /// Creates a dataset and table if absent; an existing one is logged and
    /// treated as success.
    async fn ensure_table(
        &self,
        dest: &OutputDestination,
        sample: &Value,
    ) -> Result<(), PublishError> {
        let schema = self
            .warehouse
            .infer_schema(sample)
            .map_err(|error| PublishError::SchemaInfer {
                dataset: dest.dataset.clone(),
                table: dest.table.clone(),
                error,
            })?;

        match self.warehouse.create_dataset(&dest.dataset).await {
            Ok(()) => {}
            Err(WarehouseCreateError::AlreadyExists) => {
                info!(dataset = %dest.dataset, "dataset already exists");
            }
            Err(WarehouseCreateError::Store(error)) => {
                return Err(PublishError::TableCreate {
                    dataset: dest.dataset.clone(),
                    table: dest.table.clone(),
                    error,
                });
            }
        }
        match self
            .warehouse
            .create_table(&dest.dataset, &dest.table, schema)
            .await
        {
            Ok(()) => Ok(()),
            Err(WarehouseCreateError::AlreadyExists) => {
                info!(dataset = %dest.dataset, table = %dest.table, "table already exists");
                Ok(())
            }
            Err(WarehouseCreateError::Store(error)) => Err(PublishError::TableCreate {
                dataset: dest.dataset.clone(),
                table: dest.table.clone(),
                error,
            }),
        }
    }

    /// Inserts one chunk, retrying only the rows a partial failure names
    /// until nothing is left or a fatal error aborts the chunk.
    async fn insert_chunk(
        &self,
        dest: &OutputDestination,
        first_row: usize,
        chunk: &[Value],
    ) -> Result<(), PublishError> {
        let mut pending: Vec<Value> = chunk.to_vec();
        while !pending.is_empty() {
            let attempt = std::mem::take(&mut pending);
            let attempted = attempt.len();
            match self
                .warehouse
                .insert_rows(&dest.dataset, &dest.table, attempt.clone())
                .await
            {
                Ok(()) => {}
                Err(WarehouseInsertError::Partial { failed_rows }) => {
                    debug!(
                        dataset = %dest.dataset,
                        table = %dest.table,
                        failed = failed_rows.len(),
                        attempted,
                        "retrying failed rows of partial insert"
                    );
                    pending = failed_rows
                        .into_iter()
                        .filter_map(|idx| attempt.get(idx).cloned())
                        .collect();
                }
                Err(WarehouseInsertError::Fatal(error)) => {
                    return Err(PublishError::RowInsert {
                        dataset: dest.dataset.clone(),
                        table: dest.table.clone(),
                        first_row,
                        last_row: first_row + chunk.len(),
                        error,
                    });
                }
            }
        }
        Ok(())
    }
}

impl PublicationSink for WarehouseSink {
    fn name(&self) -> &'static str {
        "warehouse"
    }

    fn publish<'a>(
        &'a self,
        dest: &'a MetricSetDestination,
        metadata: &'a MetricsMetadata,
        rows: &'a [Value],
    ) -> BoxFuture<'a, PublishOutcome> {
        async move {
            let mut outcome = PublishOutcome::default();

            let metadata_value = match serde_json::to_value(metadata) {
                Ok(value) => value,
                Err(error) => {
                    outcome.errors.push(PublishError::Serialize {
                        path: format!("{}.{}", dest.metadata.dataset, dest.metadata.table),
                        error,
                    });
                    return outcome;
                }
            };

            if let Err(error) = self.ensure_table(&dest.metadata, &metadata_value).await {
                outcome.errors.push(error);
                return outcome;
            }
            if let Some(first) = rows.first() {
                if let Err(error) = self.ensure_table(&dest.data, first).await {
                    outcome.errors.push(error);
                    return outcome;
                }
            }

            outcome.rows_attempted = rows.len();
            let mut data_ok = true;
            for (chunk_index, chunk) in rows.chunks(INSERT_CHUNK_ROWS).enumerate() {
                let first_row = chunk_index * INSERT_CHUNK_ROWS;
                if let Err(error) = self.insert_chunk(&dest.data, first_row, chunk).await {
                    outcome.errors.push(error);
                    data_ok = false;
                }
            }

            // The metadata row marks the data complete; skip it if any chunk
            // failed.
            if data_ok {
                match self
                    .warehouse
                    .insert_rows(
                        &dest.metadata.dataset,
                        &dest.metadata.table,
                        vec![metadata_value],
                    )
                    .await
                {
                    Ok(()) => outcome.metadata_written = true,
                    Err(error) => outcome.errors.push(PublishError::MetadataInsert {
                        dataset: dest.metadata.dataset.clone(),
                        table: dest.metadata.table.clone(),
                        error: match error {
                            WarehouseInsertError::Fatal(error) => error,
                            WarehouseInsertError::Partial { .. } => {
                                crate::errors::StoreError::new("partial failure on a single row")
                            }
                        },
                    }),
                }
            }
            outcome
        }
        .boxed()
    }
}
