// Copyright (c) The interop-metrics Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Consolidated retrieval: one raw-results document per run.

use super::{LoadCtx, LoadStrategy, RunResults, bucket_relative_path, decode, fetch_bytes};
use crate::errors::LoadError;
use futures::future::BoxFuture;
use interop_metadata::{RawReport, RunDescriptor};
use std::sync::Arc;

/// Fetches each run's single raw-results document and fans its entries out
/// as individual results.
#[derive(Debug, Default)]
pub struct ConsolidatedLoader;

impl LoadStrategy for ConsolidatedLoader {
    fn load_run<'a>(
        &'a self,
        ctx: &'a LoadCtx<'a>,
        run: &'a Arc<RunDescriptor>,
    ) -> BoxFuture<'a, ()> {
        Box::pin(super::until_stopped(&ctx.stop, load_run_inner(ctx, run)))
    }
}

async fn load_run_inner(ctx: &LoadCtx<'_>, run: &Arc<RunDescriptor>) {
    let Some(url) = run.raw_results_url.as_deref().filter(|url| !url.is_empty()) else {
        ctx.send_error(LoadError::MissingRawResultsUrl {
            run_id: run.id,
            browser: run.browser_name.clone(),
        });
        return;
    };

    let Some(key) = bucket_relative_path(url, ctx.bucket).map(str::to_owned) else {
        ctx.send_error(LoadError::MalformedResultsUrl {
            run_id: run.id,
            url: url.to_owned(),
            bucket: ctx.bucket.to_owned(),
        });
        return;
    };

    match fetch_bytes(ctx, &key).await {
        Ok(Some(data)) => match decode::decode_json::<RawReport>(&key, &data) {
            Ok(report) => {
                for result in report.results {
                    ctx.send_result(RunResults {
                        run: Arc::clone(run),
                        result,
                    });
                }
            }
            Err(error) => ctx.send_error(error.into()),
        },
        // Unlike a sharded object, the consolidated document is the run's
        // only payload; its absence makes the run unusable.
        Ok(None) => ctx.send_error(LoadError::RawReportMissing {
            run_id: run.id,
            key,
        }),
        Err(error) => ctx.send_error(error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        limiter::FetchLimiter,
        loader::{ResultsLoader, testutil::run_descriptor},
        stores::MemoryObjectStore,
    };
    use tokio::sync::watch;

    fn raw_run(id: i64, browser: &str, raw_url: Option<&str>) -> Arc<RunDescriptor> {
        let mut run = run_descriptor(
            id,
            browser,
            "https://storage.googleapis.com/wptd/0123/run-summary.json.gz",
        );
        run.raw_results_url = raw_url.map(str::to_owned);
        Arc::new(run)
    }

    #[test]
    fn consolidated_load_fans_out_report_entries() {
        let store = MemoryObjectStore::new();
        store.insert(
            "0123/chrome-63.0-linux/report.json",
            r#"{"results": [
                {"test": "/a/b.html", "status": "OK",
                 "subtests": [{"name": "first", "status": "PASS"}]},
                {"test": "/a/c.html", "status": "TIMEOUT"}
            ]}"#,
        );

        let runs = vec![
            raw_run(
                7,
                "chrome",
                Some("https://storage.googleapis.com/wptd-results/0123/chrome-63.0-linux/report.json"),
            ),
            raw_run(8, "firefox", None),
        ];

        let runtime = tokio::runtime::Runtime::new().unwrap();
        let _guard = runtime.enter();

        let limiter = FetchLimiter::disabled();
        let strategy = ConsolidatedLoader;
        let (_stop_tx, stop_rx) = watch::channel(false);
        let loader = ResultsLoader {
            store: &store,
            limiter: &limiter,
            cache: None,
            bucket: "wptd-results",
            strategy: &strategy,
            stop: stop_rx,
        };
        let output = loader.load(&runs);

        assert_eq!(output.results.len(), 2);
        assert!(output.results.iter().all(|entry| entry.run.id == 7));
        assert_eq!(output.progress[&7].parsed, 2);
        assert!(
            output
                .errors
                .iter()
                .any(|error| matches!(error, LoadError::MissingRawResultsUrl { run_id: 8, .. }))
        );
    }

    #[test]
    fn missing_consolidated_document_is_an_error() {
        let store = MemoryObjectStore::new();

        let runs = vec![raw_run(
            7,
            "chrome",
            Some("https://storage.googleapis.com/wptd-results/0123/chrome-63.0-linux/report.json"),
        )];

        let runtime = tokio::runtime::Runtime::new().unwrap();
        let _guard = runtime.enter();

        let limiter = FetchLimiter::disabled();
        let strategy = ConsolidatedLoader;
        let (_stop_tx, stop_rx) = watch::channel(false);
        let loader = ResultsLoader {
            store: &store,
            limiter: &limiter,
            cache: None,
            bucket: "wptd-results",
            strategy: &strategy,
            stop: stop_rx,
        };
        let output = loader.load(&runs);

        assert!(output.results.is_empty());
        assert!(
            output
                .errors
                .iter()
                .any(|error| matches!(error, LoadError::RawReportMissing { run_id: 7, .. }))
        );
    }
}
