// Copyright (c) The interop-metrics Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Describes one browser's execution of the test suite: the unit of input to
/// the metrics pipeline.
///
/// Descriptors are fetched once from the run-discovery collaborator at
/// pipeline start and are immutable thereafter; the browser name is the join
/// key for consolidation and the id set is what the idempotency gate records.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunDescriptor {
    /// Identifier assigned by the run-discovery service.
    pub id: i64,

    /// Browser under test, e.g. `chrome`.
    pub browser_name: String,
    /// Browser version.
    pub browser_version: String,
    /// Operating system name.
    pub os_name: String,
    /// Operating system version.
    pub os_version: String,

    /// Revision of the test suite (short SHA).
    pub revision: String,

    /// URL of the summary of results; sharded result objects live under the
    /// path this summary is derived from.
    pub results_url: String,

    /// URL of the consolidated raw-results document, if one exists.
    #[serde(default)]
    pub raw_results_url: Option<String>,

    /// Time the run metadata was first created.
    pub created_at: DateTime<Utc>,
}

impl RunDescriptor {
    /// Ordering for display and deterministic pipeline output: by revision,
    /// then creation time descending, then browser and OS fields ascending.
    pub fn compare_by_created(&self, other: &Self) -> Ordering {
        if self.revision != other.revision {
            // Most recent runs first.
            return other.created_at.cmp(&self.created_at);
        }
        (
            &self.browser_name,
            &self.browser_version,
            &self.os_name,
            &self.os_version,
        )
            .cmp(&(
                &other.browser_name,
                &other.browser_version,
                &other.os_name,
                &other.os_version,
            ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(browser: &str, revision: &str, created_secs: i64) -> RunDescriptor {
        RunDescriptor {
            id: 1,
            browser_name: browser.to_owned(),
            browser_version: "1.0".to_owned(),
            os_name: "linux".to_owned(),
            os_version: "*".to_owned(),
            revision: revision.to_owned(),
            results_url: String::new(),
            raw_results_url: None,
            created_at: DateTime::from_timestamp(created_secs, 0).unwrap(),
        }
    }

    #[test]
    fn newer_revisions_sort_first() {
        let older = descriptor("chrome", "aaaa", 100);
        let newer = descriptor("firefox", "bbbb", 200);
        assert_eq!(newer.compare_by_created(&older), Ordering::Less);
    }

    #[test]
    fn same_revision_sorts_by_browser() {
        let chrome = descriptor("chrome", "aaaa", 100);
        let firefox = descriptor("firefox", "aaaa", 100);
        assert_eq!(chrome.compare_by_created(&firefox), Ordering::Less);
    }
}
