// Copyright (c) The interop-metrics Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Content-addressed local disk cache for fetched objects.

use crate::errors::FetchError;
use bytes::Bytes;
use camino::{Utf8Path, Utf8PathBuf};
use std::io;

/// A local filesystem cache mirroring object key paths.
///
/// Entries are keyed by object path, so concurrent fetches of different
/// objects never contend; a concurrent double-fetch of the same object is an
/// idempotent overwrite, not an error. An absent entry is not an error
/// either. Cache I/O failures are fatal to the fetch that hit them only.
#[derive(Clone, Debug)]
pub struct DiskCache {
    root: Utf8PathBuf,
}

impl DiskCache {
    /// Creates a cache rooted at the given directory.
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory of this cache.
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    fn entry_path(&self, key: &str) -> Utf8PathBuf {
        self.root.join(key)
    }

    /// Returns the cached bytes for `key`, or `None` on a miss.
    pub async fn get(&self, key: &str) -> Result<Option<Bytes>, FetchError> {
        let path = self.entry_path(key);
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(error) => Err(FetchError::Cache {
                key: key.to_owned(),
                path,
                error,
            }),
        }
    }

    /// Writes `data` through to the cache, creating parent directories on
    /// demand.
    pub async fn put(&self, key: &str, data: &Bytes) -> Result<(), FetchError> {
        let path = self.entry_path(key);
        let io_err = |error: io::Error| FetchError::Cache {
            key: key.to_owned(),
            path: path.clone(),
            error,
        };
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        tokio::fs::write(&path, data).await.map_err(io_err)
    }
}
