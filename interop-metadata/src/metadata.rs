// Copyright (c) The interop-metrics Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metadata and row shapes for published metrics.

use crate::TestIdentity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata common to every metric set computed from a group of runs: when
/// the results were loaded, which runs went in, and where the computed data
/// lives.
///
/// `run_ids` is the authoritative record used by the idempotency gate; it is
/// carried by the structured-record store, not the published JSON artifact.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TestRunsMetadata {
    /// Start of the load phase.
    pub start_time: DateTime<Utc>,
    /// End of the load phase.
    pub end_time: DateTime<Utc>,
    /// Identifiers of the runs the metrics were computed from.
    #[serde(skip)]
    pub run_ids: Vec<i64>,
    /// URL of the published data artifact.
    #[serde(rename = "url")]
    pub data_url: String,
}

/// Metadata for a pass-rate metric set.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PassRateMetadata {
    /// Shared run metadata.
    #[serde(flatten)]
    pub runs: TestRunsMetadata,
}

/// Metadata for a per-browser failure-list metric set.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FailureListMetadata {
    /// Shared run metadata.
    #[serde(flatten)]
    pub runs: TestRunsMetadata,
    /// Browser the failure list describes.
    pub browser_name: String,
}

/// The metadata attached to one published metric set.
///
/// The variant is an explicit tag: it determines the record kind under which
/// the metadata is stored, with no runtime type-name derivation involved.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricsMetadata {
    /// Failure-list metadata (tried first when deserializing: it is the
    /// variant with the extra required field).
    FailureList(FailureListMetadata),
    /// Pass-rate metadata.
    PassRate(PassRateMetadata),
}

impl MetricsMetadata {
    /// Record kind this metadata is stored under.
    pub fn record_kind(&self) -> RecordKind {
        match self {
            Self::PassRate(_) => RecordKind::PassRateMetadata,
            Self::FailureList(_) => RecordKind::FailuresMetadata,
        }
    }

    /// Shared run metadata.
    pub fn runs(&self) -> &TestRunsMetadata {
        match self {
            Self::PassRate(m) => &m.runs,
            Self::FailureList(m) => &m.runs,
        }
    }

    /// Browser name, for failure-list metadata.
    pub fn browser_name(&self) -> Option<&str> {
        match self {
            Self::PassRate(_) => None,
            Self::FailureList(m) => Some(&m.browser_name),
        }
    }
}

/// Enumerated record kinds for metadata storage, mapped to fixed destination
/// names.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum RecordKind {
    /// Pass-rate metric metadata.
    PassRateMetadata,
    /// Per-browser failure-list metadata.
    FailuresMetadata,
}

impl RecordKind {
    /// Fixed name of this record kind.
    pub fn name(self) -> &'static str {
        match self {
            Self::PassRateMetadata => "PassRateMetadata",
            Self::FailuresMetadata => "FailuresMetadata",
        }
    }
}

/// One row of the pass-rate metric: for a path prefix, how many tests under
/// it were passed by exactly 0, 1, ..., n browsers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PassRateRow {
    /// '/'-delimited path prefix.
    pub dir: String,
    /// `pass_rates[k]` counts identities passed by exactly `k` browsers;
    /// length is number of runs + 1.
    pub pass_rates: Vec<u32>,
    /// Total identities rooted at this prefix.
    pub total: u32,
}

/// One row of a per-browser failure list: a test failing in the target
/// browser together with `num_other_failures` other browsers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FailureListRow {
    /// Browser the list was computed for.
    pub browser_name: String,
    /// Number of *other* browsers also failing this test.
    pub num_other_failures: u32,
    /// Identity of the failing test.
    pub test: TestIdentity,
}

/// Addressing for one output: where the artifact lives in the object store
/// and which warehouse dataset/table receives the rows.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OutputDestination {
    /// Object-store path of the artifact.
    pub object_path: String,
    /// Warehouse dataset name.
    pub dataset: String,
    /// Warehouse table name.
    pub table: String,
}

/// The pair of destinations for one metric set: metadata and data are
/// addressed independently.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MetricSetDestination {
    /// Where the metadata goes.
    pub metadata: OutputDestination,
    /// Where the data rows go.
    pub data: OutputDestination,
}
