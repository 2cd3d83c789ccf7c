// Copyright (c) The interop-metrics Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Consolidation of loaded results into a per-test status index.
//!
//! Producers are many and unordered; consolidation is the single merge point
//! that serializes all writes into the index. It runs on one thread over the
//! already-collected results, after the load phase has joined.

use crate::loader::RunResults;
use interop_metadata::{CompleteStatus, SubtestOutcome, TestIdentity, TestOutcome};
use std::collections::{HashMap, hash_map::Entry};
use tracing::warn;

/// Status of every test identity across all loaded runs, keyed by identity
/// and then by browser name.
///
/// A test file and each of its subtests are distinct identities: both appear
/// as separate keys, and metric computations count them separately.
#[derive(Debug, Default)]
pub struct ConsolidatedIndex {
    statuses: HashMap<TestIdentity, HashMap<String, CompleteStatus>>,
}

impl ConsolidatedIndex {
    /// Builds the index from loaded results.
    ///
    /// A duplicate (identity, browser) pair is overwritten, never merged: the
    /// last write wins and the collision is logged. Duplicates are expected
    /// when a browser appears in more than one run of the input set.
    pub fn consolidate(results: &[RunResults]) -> Self {
        let mut index = Self::default();
        for entry in results {
            let browser = &entry.run.browser_name;
            let result = &entry.result;
            let status = TestOutcome::from_report_str(&result.status);

            index.record(
                TestIdentity::test(&result.test),
                browser,
                CompleteStatus::of_test(status),
            );
            for subtest in &result.subtests {
                let sub_status = SubtestOutcome::from_report_str(&subtest.status);
                index.record(
                    TestIdentity::subtest(&result.test, &subtest.name),
                    browser,
                    CompleteStatus::of_subtest(status, sub_status),
                );
            }
        }
        index
    }

    fn record(&mut self, identity: TestIdentity, browser: &str, status: CompleteStatus) {
        match self.statuses.entry(identity) {
            Entry::Occupied(mut occupied) => {
                let previous = occupied.get_mut().insert(browser.to_owned(), status);
                if let Some(previous) = previous {
                    warn!(
                        test = %occupied.key(),
                        browser,
                        previous = ?previous,
                        replacement = ?status,
                        "duplicate result overwritten"
                    );
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(HashMap::from([(browser.to_owned(), status)]));
            }
        }
    }

    /// Number of distinct test identities in the index.
    pub fn len(&self) -> usize {
        self.statuses.len()
    }

    /// True if no results were consolidated.
    pub fn is_empty(&self) -> bool {
        self.statuses.is_empty()
    }

    /// Per-browser statuses of one identity.
    pub fn get(&self, identity: &TestIdentity) -> Option<&HashMap<String, CompleteStatus>> {
        self.statuses.get(identity)
    }

    /// Iterates all identities with their per-browser statuses.
    pub fn iter(
        &self,
    ) -> impl Iterator<Item = (&TestIdentity, &HashMap<String, CompleteStatus>)> {
        self.statuses.iter()
    }
}
