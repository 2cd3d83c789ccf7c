// Copyright (c) The interop-metrics Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use serde::{Deserialize, Serialize};
use std::fmt;

/// Uniquely identifies a test or subtest within one revision of the test
/// suite.
///
/// A top-level test is identified by its path alone, with an empty `name`. A
/// subtest carries the name of the subtest within that file. Both forms exist
/// as distinct keys during consolidation, so a test file and its subtests are
/// counted separately.
///
/// The derived ordering (path first, then subtest name) is what makes
/// published row output deterministic.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct TestIdentity {
    /// Path of the test file, e.g. `/dom/nodes/Node-cloneNode.html`.
    pub test: String,

    /// Subtest name; empty for a top-level test identity.
    #[serde(default)]
    pub name: String,
}

impl TestIdentity {
    /// Creates the identity of a top-level test.
    pub fn test(test: impl Into<String>) -> Self {
        Self {
            test: test.into(),
            name: String::new(),
        }
    }

    /// Creates the identity of a subtest within a test file.
    pub fn subtest(test: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            test: test.into(),
            name: name.into(),
        }
    }

    /// Returns true if this identity refers to a subtest.
    pub fn is_subtest(&self) -> bool {
        !self.name.is_empty()
    }
}

impl fmt::Display for TestIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.name.is_empty() {
            write!(f, "{}", self.test)
        } else {
            write!(f, "{} [{}]", self.test, self.name)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_is_path_then_name() {
        let mut ids = vec![
            TestIdentity::subtest("/a/b.html", "z"),
            TestIdentity::test("/a/c.html"),
            TestIdentity::test("/a/b.html"),
            TestIdentity::subtest("/a/b.html", "a"),
        ];
        ids.sort();
        assert_eq!(
            ids,
            vec![
                TestIdentity::test("/a/b.html"),
                TestIdentity::subtest("/a/b.html", "a"),
                TestIdentity::subtest("/a/b.html", "z"),
                TestIdentity::test("/a/c.html"),
            ]
        );
    }

    #[test]
    fn serializes_with_empty_name() {
        let id = TestIdentity::test("/a/b.html");
        let json = serde_json::to_value(&id).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"test": "/a/b.html", "name": ""})
        );
    }
}
