// Copyright (c) The interop-metrics Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metric computations over the consolidated index.
//!
//! All functions here are pure and single-pass over the index, safe to run
//! concurrently against each other. Each takes a caller-supplied [`Passes`]
//! predicate: what counts as "passing" is policy, not hardcoded.

use crate::consolidate::ConsolidatedIndex;
use interop_metadata::{
    CompleteStatus, FailureListRow, PassRateRow, SubtestOutcome, TestIdentity, TestOutcome,
};
use std::collections::HashMap;

/// Policy deciding whether a status counts as passing.
pub type Passes = fn(&CompleteStatus) -> bool;

/// Passing means the enclosing file reported `OK` and the subtest, if any,
/// passed.
pub fn ok_and_unknown_or_passes(status: &CompleteStatus) -> bool {
    status.status == TestOutcome::Ok
        && (status.sub_status == SubtestOutcome::Unknown
            || status.sub_status == SubtestOutcome::Pass)
}

/// Like [`ok_and_unknown_or_passes`], but a file-level `PASS` also counts,
/// for harnesses that report single-page tests that way.
pub fn ok_or_passes_and_unknown_or_passes(status: &CompleteStatus) -> bool {
    (status.status == TestOutcome::Ok || status.status == TestOutcome::Pass)
        && (status.sub_status == SubtestOutcome::Unknown
            || status.sub_status == SubtestOutcome::Pass)
}

/// All '/'-delimited prefixes of a test path: `/a/b/c` yields `/a`, `/a/b`
/// and `/a/b/c`.
fn path_prefixes(test_path: &str) -> impl Iterator<Item = &str> {
    test_path
        .match_indices('/')
        .skip(1)
        .map(|(idx, _)| &test_path[..idx])
        .chain(std::iter::once(test_path))
}

/// Counts test identities under every path prefix.
///
/// A test file and its subtests are distinct identities, so a file with two
/// subtests contributes three to each of its prefixes.
pub fn compute_totals(index: &ConsolidatedIndex) -> HashMap<String, u32> {
    let mut totals: HashMap<String, u32> = HashMap::new();
    for (identity, _) in index.iter() {
        for prefix in path_prefixes(&identity.test) {
            *totals.entry(prefix.to_owned()).or_default() += 1;
        }
    }
    totals
}

/// Pass-rate histogram per path prefix.
///
/// Each identity passes in some number `k` of browsers; for every prefix of
/// its path, slot `k` of that prefix's array is incremented. Arrays have
/// length `num_runs + 1` so an identity passing everywhere lands in the last
/// slot.
pub fn compute_pass_rate(
    num_runs: usize,
    index: &ConsolidatedIndex,
    passes: Passes,
) -> HashMap<String, Vec<u32>> {
    let mut histograms: HashMap<String, Vec<u32>> = HashMap::new();
    for (identity, statuses) in index.iter() {
        let pass_count = statuses.values().filter(|status| passes(status)).count();
        for prefix in path_prefixes(&identity.test) {
            histograms
                .entry(prefix.to_owned())
                .or_insert_with(|| vec![0; num_runs + 1])[pass_count] += 1;
        }
    }
    histograms
}

/// Bins every identity the target browser fails by how many other browsers
/// fail it too.
///
/// Bins are sized to `num_runs` even though at most `num_runs - 1` other
/// browsers exist, so the last bin is always empty.
pub fn compute_browser_failures(
    num_runs: usize,
    browser: &str,
    index: &ConsolidatedIndex,
    passes: Passes,
) -> Vec<Vec<TestIdentity>> {
    let mut bins: Vec<Vec<TestIdentity>> = vec![Vec::new(); num_runs];
    for (identity, statuses) in index.iter() {
        let Some(own) = statuses.get(browser) else {
            continue;
        };
        if passes(own) {
            continue;
        }
        let other_failures = statuses
            .iter()
            .filter(|(name, status)| name.as_str() != browser && !passes(status))
            .count();
        bins[other_failures].push(identity.clone());
    }
    bins
}

/// Flattens totals and pass-rate histograms into publishable rows, sorted by
/// directory.
pub fn pass_rate_rows(
    totals: &HashMap<String, u32>,
    pass_rates: HashMap<String, Vec<u32>>,
) -> Vec<PassRateRow> {
    let mut rows: Vec<PassRateRow> = pass_rates
        .into_iter()
        .map(|(dir, rates)| {
            let total = totals.get(&dir).copied().unwrap_or_default();
            PassRateRow {
                dir,
                pass_rates: rates,
                total,
            }
        })
        .collect();
    rows.sort_by(|a, b| a.dir.cmp(&b.dir));
    rows
}

/// Flattens failure bins into publishable rows, sorted by test identity.
pub fn failure_list_rows(browser: &str, bins: Vec<Vec<TestIdentity>>) -> Vec<FailureListRow> {
    let mut rows: Vec<FailureListRow> = bins
        .into_iter()
        .enumerate()
        .flat_map(|(num_other_failures, tests)| {
            tests.into_iter().map(move |test| FailureListRow {
                browser_name: browser.to_owned(),
                num_other_failures: num_other_failures as u32,
                test,
            })
        })
        .collect();
    rows.sort_by(|a, b| a.test.cmp(&b.test));
    rows
}
