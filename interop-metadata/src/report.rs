// Copyright (c) The interop-metrics Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wire shapes of per-run results, as produced by the test harness.

use serde::{Deserialize, Serialize};

/// The result of a single subtest within a test file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SubtestResult {
    /// Name of the subtest.
    pub name: String,
    /// Raw status string; see [`crate::SubtestOutcome::from_report_str`].
    pub status: String,
    /// Optional failure message.
    #[serde(default)]
    pub message: Option<String>,
}

/// The results of running all tests in one test file.
///
/// This is both the shape of a single sharded result object and of one entry
/// in a consolidated raw report.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TestFileResults {
    /// Path of the test file.
    pub test: String,
    /// Raw status string; see [`crate::TestOutcome::from_report_str`].
    pub status: String,
    /// Optional harness message.
    #[serde(default)]
    pub message: Option<String>,
    /// Per-subtest results, empty for single-page tests.
    #[serde(default)]
    pub subtests: Vec<SubtestResult>,
}

/// A consolidated raw-results report: the single-document form of a full
/// run's results.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawReport {
    /// Per-test-file results, in document order.
    pub results: Vec<TestFileResults>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_results_decode_with_missing_optionals() {
        let json = r#"{"test": "/a/b.html", "status": "OK"}"#;
        let results: TestFileResults = serde_json::from_str(json).unwrap();
        assert_eq!(results.test, "/a/b.html");
        assert!(results.message.is_none());
        assert!(results.subtests.is_empty());
    }

    #[test]
    fn raw_report_preserves_result_order() {
        let json = r#"{"results": [
            {"test": "/z.html", "status": "OK"},
            {"test": "/a.html", "status": "ERROR"}
        ]}"#;
        let report: RawReport = serde_json::from_str(json).unwrap();
        assert_eq!(report.results[0].test, "/z.html");
        assert_eq!(report.results[1].test, "/a.html");
    }
}
