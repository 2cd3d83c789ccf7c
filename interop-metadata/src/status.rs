// Copyright (c) The interop-metrics Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use serde::{Deserialize, Serialize};

/// Top-level outcome of running the tests in a test file, as reported by the
/// harness.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum TestOutcome {
    /// The harness reported a status outside the known vocabulary.
    #[default]
    Unknown,
    /// All tests in the file completed.
    Ok,
    /// Some tests did not complete successfully.
    Error,
    /// Some tests timed out.
    Timeout,
    /// All tests completed and passed.
    Pass,
}

impl TestOutcome {
    /// Maps a report status string onto an outcome.
    ///
    /// The mapping is exact-match against the harness vocabulary; anything
    /// else is `Unknown`, never an error.
    pub fn from_report_str(s: &str) -> Self {
        match s {
            "OK" => Self::Ok,
            "ERROR" => Self::Error,
            "TIMEOUT" => Self::Timeout,
            "PASS" => Self::Pass,
            _ => Self::Unknown,
        }
    }

    /// Canonical name of this outcome.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "UNKNOWN",
            Self::Ok => "OK",
            Self::Error => "ERROR",
            Self::Timeout => "TIMEOUT",
            Self::Pass => "PASS",
        }
    }
}

/// Outcome of a single subtest within a test file.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum SubtestOutcome {
    /// The harness reported a status outside the known vocabulary, or the
    /// identity is a top-level test with no subtest of its own.
    #[default]
    Unknown,
    /// The subtest passed.
    Pass,
    /// The subtest failed.
    Fail,
    /// The subtest timed out.
    Timeout,
    /// The subtest was not run.
    NotRun,
}

impl SubtestOutcome {
    /// Maps a report status string onto an outcome; unrecognized strings are
    /// `Unknown`, never an error.
    pub fn from_report_str(s: &str) -> Self {
        match s {
            "PASS" => Self::Pass,
            "FAIL" => Self::Fail,
            "TIMEOUT" => Self::Timeout,
            "NOT_RUN" => Self::NotRun,
            _ => Self::Unknown,
        }
    }

    /// Canonical name of this outcome.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "UNKNOWN",
            Self::Pass => "PASS",
            Self::Fail => "FAIL",
            Self::Timeout => "TIMEOUT",
            Self::NotRun => "NOT_RUN",
        }
    }
}

/// The full status of one test identity in one browser's run.
///
/// For a top-level test, `sub_status` is always [`SubtestOutcome::Unknown`].
/// For a subtest, `status` carries the *parent* file's outcome and
/// `sub_status` the subtest's own: a passes predicate may need either or both
/// signals.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct CompleteStatus {
    /// Outcome of the enclosing test file.
    pub status: TestOutcome,
    /// Outcome of the subtest itself, if any.
    pub sub_status: SubtestOutcome,
}

impl CompleteStatus {
    /// Status of a top-level test.
    pub fn of_test(status: TestOutcome) -> Self {
        Self {
            status,
            sub_status: SubtestOutcome::Unknown,
        }
    }

    /// Status of a subtest, carrying the parent file's outcome.
    pub fn of_subtest(status: TestOutcome, sub_status: SubtestOutcome) -> Self {
        Self { status, sub_status }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("OK", TestOutcome::Ok)]
    #[test_case("ERROR", TestOutcome::Error)]
    #[test_case("TIMEOUT", TestOutcome::Timeout)]
    #[test_case("PASS", TestOutcome::Pass)]
    #[test_case("CRASH", TestOutcome::Unknown; "out of vocabulary")]
    #[test_case("ok", TestOutcome::Unknown; "case sensitive")]
    #[test_case("", TestOutcome::Unknown; "empty")]
    fn test_outcome_from_report(input: &str, expected: TestOutcome) {
        assert_eq!(TestOutcome::from_report_str(input), expected);
    }

    #[test_case("PASS", SubtestOutcome::Pass)]
    #[test_case("FAIL", SubtestOutcome::Fail)]
    #[test_case("TIMEOUT", SubtestOutcome::Timeout)]
    #[test_case("NOT_RUN", SubtestOutcome::NotRun)]
    #[test_case("PRECONDITION_FAILED", SubtestOutcome::Unknown; "out of vocabulary")]
    fn subtest_outcome_from_report(input: &str, expected: SubtestOutcome) {
        assert_eq!(SubtestOutcome::from_report_str(input), expected);
    }

    #[test]
    fn top_level_status_has_unknown_sub_status() {
        let status = CompleteStatus::of_test(TestOutcome::Ok);
        assert_eq!(status.sub_status, SubtestOutcome::Unknown);
    }
}
