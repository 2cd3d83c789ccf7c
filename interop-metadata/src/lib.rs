// Copyright (c) The interop-metrics Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Shared data model for interop metrics collection.
//!
//! These types describe per-browser test run results, the identities used to
//! consolidate them, and the metadata and row shapes that the collection
//! pipeline publishes. They are deliberately free of any backend or pipeline
//! logic so that producers and consumers of published metrics can share them.

mod exit_codes;
mod identity;
mod metadata;
mod report;
mod runs;
mod status;

pub use exit_codes::MetricsExitCode;
pub use identity::TestIdentity;
pub use metadata::{
    FailureListMetadata, FailureListRow, MetricSetDestination, MetricsMetadata,
    OutputDestination, PassRateMetadata, PassRateRow, RecordKind, TestRunsMetadata,
};
pub use report::{RawReport, SubtestResult, TestFileResults};
pub use runs::RunDescriptor;
pub use status::{CompleteStatus, SubtestOutcome, TestOutcome};
