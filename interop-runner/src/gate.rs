// Copyright (c) The interop-metrics Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Idempotency gate: skip run sets whose metrics already exist.

use crate::{errors::GateError, stores::RecordStore};
use interop_metadata::RecordKind;
use tracing::warn;

/// Whether the pipeline should run for a candidate run set.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum GateDecision {
    /// No prior record covers this run set.
    Proceed,
    /// A prior record's run-id set contains every candidate id; the whole
    /// cycle is skipped.
    Skip,
}

/// Queries the record store for an existing pass-rate metadata record
/// covering every candidate run id.
///
/// This is a conservative at-least-once-skip: containment of the run-id set
/// is the only check, with no semantic comparison beyond it. A store failure
/// aborts the pipeline before any fetch happens.
pub async fn check_existing(
    records: &dyn RecordStore,
    run_ids: &[i64],
) -> Result<GateDecision, GateError> {
    let keys = records
        .find_superset_keys(RecordKind::PassRateMetadata, run_ids, 1)
        .await
        .map_err(|error| GateError { error })?;

    if keys.is_empty() {
        Ok(GateDecision::Proceed)
    } else {
        warn!(?run_ids, "metrics already computed for this run set, skipping");
        Ok(GateDecision::Skip)
    }
}
