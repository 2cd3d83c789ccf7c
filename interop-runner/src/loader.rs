// Copyright (c) The interop-metrics Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Concurrent retrieval of per-run result payloads.
//!
//! Two interchangeable strategies exist behind [`LoadStrategy`]: sharded
//! per-object enumeration and consolidated single-document fetch. The loader
//! spawns one task per run; the sharded strategy fans out further into one
//! task per discovered object, a set whose size is unknown until listing
//! completes. All tasks feed a single fan-in channel, and the scoped-task
//! join guarantees the load phase only completes once every spawned task
//! has.

mod consolidated;
mod decode;
mod sharded;

pub use consolidated::ConsolidatedLoader;
pub use sharded::ShardedLoader;

#[cfg(test)]
pub(crate) use decode::decode_json;

use crate::{
    cache::DiskCache,
    errors::{FetchError, LoadError},
    limiter::FetchLimiter,
    stores::ObjectStore,
};
use async_scoped::TokioScope;
use bytes::Bytes;
use futures::future::BoxFuture;
use indexmap::IndexMap;
use interop_metadata::{RunDescriptor, TestFileResults};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::debug;

/// Emit a progress event after this many parsed results per run.
const PROGRESS_LOG_EVERY: usize = 500;

/// Which retrieval strategy to use for a load.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum LoadStrategyKind {
    /// One object per test file, enumerated under a per-run prefix.
    Sharded,
    /// One raw-results document per run.
    #[default]
    Consolidated,
}

/// One parsed result, paired with the run it came from.
#[derive(Clone, Debug)]
pub struct RunResults {
    /// The run this result belongs to.
    pub run: Arc<RunDescriptor>,
    /// Results of one test file.
    pub result: TestFileResults,
}

/// Monotonically increasing count of successfully parsed items for one run.
#[derive(Clone, Debug)]
pub struct RunProgress {
    /// Browser of the run, for display.
    pub browser_name: String,
    /// Number of results parsed so far.
    pub parsed: usize,
}

/// Everything a load produced: partial results, the errors collected along
/// the way, and final per-run progress counts. Per-object and per-run errors
/// are never individually fatal; the caller decides whether partial results
/// are usable.
#[derive(Debug)]
pub struct LoadOutput {
    /// Successfully parsed results, in fan-in arrival order.
    pub results: Vec<RunResults>,
    /// All errors collected during the load.
    pub errors: Vec<LoadError>,
    /// Per-run progress, keyed by run id, in load order.
    pub progress: IndexMap<i64, RunProgress>,
}

pub(crate) enum LoadEvent {
    Result(RunResults),
    Error(LoadError),
}

/// Shared context handed to a strategy for one run's sub-fetches.
pub struct LoadCtx<'a> {
    pub(crate) store: &'a dyn ObjectStore,
    pub(crate) limiter: &'a FetchLimiter,
    pub(crate) cache: Option<&'a DiskCache>,
    pub(crate) bucket: &'a str,
    pub(crate) tx: mpsc::UnboundedSender<LoadEvent>,
    pub(crate) stop: watch::Receiver<bool>,
}

impl LoadCtx<'_> {
    pub(crate) fn send_result(&self, result: RunResults) {
        // Failure means the collector is gone, i.e. the load is tearing
        // down; the result is moot.
        let _ = self.tx.send(LoadEvent::Result(result));
    }

    pub(crate) fn send_error(&self, error: LoadError) {
        let _ = self.tx.send(LoadEvent::Error(error));
    }
}

/// A retrieval strategy: drives all sub-fetches for one run, writing results
/// and errors into the fan-in.
pub trait LoadStrategy: Send + Sync {
    /// Loads one run's results.
    fn load_run<'a>(&'a self, ctx: &'a LoadCtx<'a>, run: &'a Arc<RunDescriptor>)
    -> BoxFuture<'a, ()>;
}

/// Loads results for a set of runs using a [`LoadStrategy`].
pub struct ResultsLoader<'env> {
    /// Store the result objects live in.
    pub store: &'env dyn ObjectStore,
    /// Shared admission control for all object fetches.
    pub limiter: &'env FetchLimiter,
    /// Optional write-through disk cache.
    pub cache: Option<&'env DiskCache>,
    /// Bucket name as it appears in result URLs.
    pub bucket: &'env str,
    /// The retrieval strategy.
    pub strategy: &'env dyn LoadStrategy,
    /// Stop flag; flipping it aborts in-flight work promptly.
    pub stop: watch::Receiver<bool>,
}

impl ResultsLoader<'_> {
    /// Loads all runs, returning partial results together with the errors
    /// collected along the way.
    ///
    /// Must be called with a tokio runtime context entered; the caller's
    /// thread is blocked until every spawned task (including dynamically
    /// spawned per-object tasks) has completed.
    pub fn load(&self, runs: &[Arc<RunDescriptor>]) -> LoadOutput {
        let (tx, mut rx) = mpsc::unbounded_channel::<LoadEvent>();

        let mut results = Vec::new();
        let mut errors = Vec::new();
        let mut progress: IndexMap<i64, RunProgress> = runs
            .iter()
            .map(|run| {
                (
                    run.id,
                    RunProgress {
                        browser_name: run.browser_name.clone(),
                        parsed: 0,
                    },
                )
            })
            .collect();

        let results_mut = &mut results;
        let errors_mut = &mut errors;
        let progress_mut = &mut progress;

        TokioScope::scope_and_block(move |scope| {
            for run in runs {
                let ctx = LoadCtx {
                    store: self.store,
                    limiter: self.limiter,
                    cache: self.cache,
                    bucket: self.bucket,
                    tx: tx.clone(),
                    stop: self.stop.clone(),
                };
                let run = Arc::clone(run);
                let strategy = self.strategy;
                scope.spawn(async move {
                    strategy.load_run(&ctx, &run).await;
                });
            }
            // The collector below owns the only receiver; dropping the
            // original sender leaves the per-run clones as the last senders,
            // so the channel closes exactly when all tasks are done.
            drop(tx);

            scope.spawn(async move {
                while let Some(event) = rx.recv().await {
                    match event {
                        LoadEvent::Result(run_results) => {
                            if let Some(entry) = progress_mut.get_mut(&run_results.run.id) {
                                entry.parsed += 1;
                                if entry.parsed % PROGRESS_LOG_EVERY == 0 {
                                    debug!(
                                        run_id = run_results.run.id,
                                        browser = %entry.browser_name,
                                        parsed = entry.parsed,
                                        "load progress"
                                    );
                                }
                            }
                            results_mut.push(run_results);
                        }
                        LoadEvent::Error(error) => errors_mut.push(error),
                    }
                }
            });
        });

        if *self.stop.borrow() {
            errors.push(LoadError::Cancelled);
        }

        LoadOutput {
            results,
            errors,
            progress,
        }
    }
}

/// Runs `fut` until completion or until the stop flag flips, whichever comes
/// first. A dropped stop sender counts as "never stopped".
pub(crate) async fn until_stopped<F>(stop: &watch::Receiver<bool>, fut: F)
where
    F: Future<Output = ()>,
{
    let mut stop = stop.clone();
    tokio::select! {
        _ = async {
            if stop.wait_for(|stopped| *stopped).await.is_err() {
                std::future::pending::<()>().await
            }
        } => {}
        () = fut => {}
    }
}

/// Strips a results URL down to its bucket-relative object path.
///
/// `https://host/{bucket}/a/b/c` becomes `a/b/c`; returns `None` when the
/// bucket does not appear in the URL.
pub(crate) fn bucket_relative_path<'u>(url: &'u str, bucket: &str) -> Option<&'u str> {
    let marker = format!("/{bucket}/");
    let idx = url.find(&marker)?;
    Some(&url[idx + marker.len()..])
}

/// Fetches one object's bytes: cache first, then rate-limited store get with
/// write-through. `Ok(None)` means the object does not exist; the caller
/// decides whether that is an error.
pub(crate) async fn fetch_bytes(
    ctx: &LoadCtx<'_>,
    key: &str,
) -> Result<Option<Bytes>, LoadError> {
    if let Some(cache) = ctx.cache {
        if let Some(data) = cache.get(key).await? {
            return Ok(Some(data));
        }
    }

    ctx.limiter.admit().await;
    let fetched = ctx
        .store
        .get(key)
        .await
        .map_err(|error| FetchError::Store {
            key: key.to_owned(),
            error,
        })?;
    let Some(data) = fetched else {
        return Ok(None);
    };

    if let Some(cache) = ctx.cache {
        cache.put(key, &data).await?;
    }
    Ok(Some(data))
}

#[cfg(test)]
pub(crate) mod testutil {
    use chrono::DateTime;
    use interop_metadata::RunDescriptor;

    pub(crate) fn run_descriptor(id: i64, browser: &str, results_url: &str) -> RunDescriptor {
        RunDescriptor {
            id,
            browser_name: browser.to_owned(),
            browser_version: "1.0".to_owned(),
            os_name: "linux".to_owned(),
            os_version: "*".to_owned(),
            revision: "0123456789".to_owned(),
            results_url: results_url.to_owned(),
            raw_results_url: None,
            created_at: DateTime::from_timestamp(0, 0).unwrap(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::testutil::run_descriptor;
    use crate::stores::MemoryObjectStore;

    #[test]
    fn bucket_relative_path_strips_host_and_bucket() {
        assert_eq!(
            bucket_relative_path(
                "https://storage.googleapis.com/wptd/0123/chrome-63.0-linux-summary.json.gz",
                "wptd"
            ),
            Some("0123/chrome-63.0-linux-summary.json.gz")
        );
        assert_eq!(
            bucket_relative_path("https://storage.googleapis.com/other/0123/x", "wptd"),
            None
        );
    }

    #[test]
    fn sharded_load_collects_results_and_errors() {
        let store = MemoryObjectStore::new();
        store.insert(
            "0123/chrome-63.0-linux/a/b.html",
            r#"{"test": "/a/b.html", "status": "OK"}"#,
        );
        store.insert(
            "0123/chrome-63.0-linux/a/c.html",
            r#"{"test": "/a/c.html", "status": "ERROR"}"#,
        );
        store.insert("0123/chrome-63.0-linux/bad.html", "not json at all");

        let runs = vec![Arc::new(run_descriptor(
            1,
            "chrome",
            "https://storage.googleapis.com/wptd/0123/chrome-63.0-linux-summary.json.gz",
        ))];

        let runtime = tokio::runtime::Runtime::new().unwrap();
        let _guard = runtime.enter();

        let limiter = FetchLimiter::disabled();
        let strategy = ShardedLoader;
        let (_stop_tx, stop_rx) = watch::channel(false);
        let loader = ResultsLoader {
            store: &store,
            limiter: &limiter,
            cache: None,
            bucket: "wptd",
            strategy: &strategy,
            stop: stop_rx,
        };
        let output = loader.load(&runs);

        assert_eq!(output.results.len(), 2);
        assert_eq!(output.errors.len(), 1, "the undecodable object is an error");
        assert_eq!(output.progress[&1].parsed, 2);
    }

    #[test]
    fn stopped_load_reports_cancellation() {
        let store = MemoryObjectStore::new();
        store.insert(
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
        let strategy = ShardedLoader;
        let (stop_tx, stop_rx) = watch::channel(false);
        stop_tx.send(true).unwrap();

        let loader = ResultsLoader {
            store: &store,
            limiter: &limiter,
            cache: None,
            bucket: "wptd",
            strategy: &strategy,
            stop: stop_rx,
        };
        let output = loader.load(&runs);

        assert!(output.results.is_empty());
        assert!(
            output
                .errors
                .iter()
                .any(|error| matches!(error, LoadError::Cancelled))
        );
    }
}
