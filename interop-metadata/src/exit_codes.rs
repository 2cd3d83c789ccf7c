// Copyright (c) The interop-metrics Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

/// Documented exit codes for `interop-metrics` failures.
///
/// Unknown/unexpected failures will always result in exit code 1.
pub enum MetricsExitCode {}

impl MetricsExitCode {
    /// No errors occurred: metrics were published, or the run set was
    /// already published and the pipeline skipped it.
    pub const OK: i32 = 0;

    /// Reading or parsing the run-discovery response failed.
    pub const RUNS_PARSE_FAILED: i32 = 102;

    /// The idempotency pre-check against the record store failed.
    pub const GATE_FAILED: i32 = 103;

    /// One or more publication sinks reported errors.
    pub const PUBLISH_FAILED: i32 = 100;

    /// The pipeline was cancelled before completing.
    pub const CANCELLED: i32 = 130;
}
