// Copyright (c) The interop-metrics Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Sharded retrieval: one object per test file under a per-run prefix.

use super::{LoadCtx, LoadStrategy, RunResults, bucket_relative_path, decode, fetch_bytes};
use crate::errors::LoadError;
use futures::{StreamExt, future::BoxFuture, stream::FuturesUnordered};
use interop_metadata::{RunDescriptor, TestFileResults};
use std::sync::Arc;

/// Enumerates each run's per-test-file objects under a prefix derived from
/// its summary URL, then fetches and decodes them concurrently.
#[derive(Debug, Default)]
pub struct ShardedLoader;

impl LoadStrategy for ShardedLoader {
    fn load_run<'a>(
        &'a self,
        ctx: &'a LoadCtx<'a>,
        run: &'a Arc<RunDescriptor>,
    ) -> BoxFuture<'a, ()> {
        Box::pin(super::until_stopped(&ctx.stop, load_run_inner(ctx, run)))
    }
}

async fn load_run_inner(ctx: &LoadCtx<'_>, run: &Arc<RunDescriptor>) {
    let Some(prefix) = summary_url_to_prefix(&run.results_url, ctx.bucket) else {
        ctx.send_error(LoadError::MalformedResultsUrl {
            run_id: run.id,
            url: run.results_url.clone(),
            bucket: ctx.bucket.to_owned(),
        });
        return;
    };

    let keys = match ctx.store.list(&prefix).await {
        Ok(keys) => keys,
        Err(error) => {
            ctx.send_error(LoadError::List {
                run_id: run.id,
                prefix,
                error,
            });
            return;
        }
    };

    let mut fetches = FuturesUnordered::new();
    for key in keys {
        // Directory placeholders list with an empty name.
        if key.is_empty() {
            continue;
        }
        fetches.push(fetch_one(ctx, run, key));
    }
    while fetches.next().await.is_some() {}
}

async fn fetch_one(ctx: &LoadCtx<'_>, run: &Arc<RunDescriptor>, key: String) {
    match fetch_bytes(ctx, &key).await {
        // An object deleted between listing and fetch is not an error.
        Ok(None) => {}
        Ok(Some(data)) => match decode::decode_json::<TestFileResults>(&key, &data) {
            Ok(result) => ctx.send_result(RunResults {
                run: Arc::clone(run),
                result,
            }),
            Err(error) => ctx.send_error(error.into()),
        },
        Err(error) => ctx.send_error(error),
    }
}

/// Derives the object prefix for one run from its summary URL.
///
/// The summary object lives at `{prefix}-summary.json.gz` while the per-file
/// shards live under `{prefix}/`, so the bucket-relative path is cut at its
/// last `-` and re-terminated with `/`.
fn summary_url_to_prefix(results_url: &str, bucket: &str) -> Option<String> {
    let relative = bucket_relative_path(results_url, bucket)?;
    let cut = relative.rfind('-')?;
    Some(format!("{}/", &relative[..cut]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::StoreError;
    use crate::limiter::FetchLimiter;
    use crate::loader::{ResultsLoader, testutil::run_descriptor};
    use crate::stores::{MemoryObjectStore, ObjectStore};
    use bytes::Bytes;
    use futures::FutureExt;
    use tokio::sync::watch;

    /// Prepends a directory-placeholder entry (empty name) to every listing.
    struct PlaceholderListing(MemoryObjectStore);

    impl ObjectStore for PlaceholderListing {
        fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<Bytes>, StoreError>> {
            self.0.get(key)
        }

        fn put<'a>(
            &'a self,
            key: &'a str,
            data: Bytes,
            content_type: &'a str,
            content_encoding: Option<&'a str>,
        ) -> BoxFuture<'a, Result<(), StoreError>> {
            self.0.put(key, data, content_type, content_encoding)
        }

        fn list<'a>(&'a self, prefix: &'a str) -> BoxFuture<'a, Result<Vec<String>, StoreError>> {
            async move {
                let mut keys = vec![String::new()];
                keys.extend(self.0.list(prefix).await?);
                Ok(keys)
            }
            .boxed()
        }
    }

    #[test]
    fn placeholder_listing_entries_are_skipped() {
        let store = PlaceholderListing(MemoryObjectStore::new());
        store.0.insert(
            "0123/chrome-63.0-linux/a/b.html",
            r#"{"test": "/a/b.html", "status": "OK"}"#,
        );

        let runs = vec![Arc::new(run_descriptor(
            1,
            "chrome",
            "https://storage.googleapis.com/wptd/0123/chrome-63.0-linux-summary.json.gz",
        ))];

        let runtime = tokio::runtime::Runtime::new().unwrap();
        let _guard = runtime.enter();

        let limiter = FetchLimiter::disabled();
        let (_stop_tx, stop_rx) = watch::channel(false);
        let loader = ResultsLoader {
            store: &store,
            limiter: &limiter,
            cache: None,
            bucket: "wptd",
            strategy: &ShardedLoader,
            stop: stop_rx,
        };
        let output = loader.load(&runs);

        assert!(output.errors.is_empty(), "errors: {:?}", output.errors);
        assert_eq!(output.results.len(), 1);
    }

    #[test]
    fn prefix_cuts_at_last_dash() {
        assert_eq!(
            summary_url_to_prefix(
                "https://storage.googleapis.com/wptd/0123abc/chrome-63.0-linux-summary.json.gz",
                "wptd"
            )
            .as_deref(),
            Some("0123abc/chrome-63.0-linux/")
        );
    }

    #[test]
    fn prefix_requires_bucket_and_dash() {
        assert_eq!(
            summary_url_to_prefix("https://example.com/elsewhere/run.json", "wptd"),
            None
        );
        assert_eq!(
            summary_url_to_prefix("https://example.com/wptd/nodash", "wptd"),
            None
        );
    }
}
