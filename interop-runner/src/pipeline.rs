// Copyright (c) The interop-metrics Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The metrics pipeline: gate, load, consolidate, compute, publish.

use crate::{
    cache::DiskCache,
    compute::{
        self, Passes, compute_browser_failures, compute_pass_rate, compute_totals,
        failure_list_rows, pass_rate_rows,
    },
    consolidate::ConsolidatedIndex,
    errors::{LoadError, PipelineError, PublishFailure},
    gate::{self, GateDecision},
    limiter::FetchLimiter,
    loader::{
        ConsolidatedLoader, LoadStrategy, LoadStrategyKind, ResultsLoader, RunProgress,
        ShardedLoader,
    },
    publish::{ObjectStoreSink, PublicationSink, PublishOutcome, WarehouseSink},
    stores::{ObjectStore, RecordStore, Warehouse},
};
use camino::Utf8PathBuf;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use interop_metadata::{
    FailureListMetadata, MetricSetDestination, MetricsMetadata, OutputDestination,
    PassRateMetadata, RunDescriptor, TestIdentity, TestRunsMetadata,
};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

/// Warehouse dataset and table names for one pipeline cycle.
#[derive(Clone, Debug)]
pub struct WarehouseNames {
    /// Dataset receiving metadata rows.
    pub metadata_dataset: String,
    /// Dataset receiving data rows.
    pub data_dataset: String,
    /// Pass-rate data table.
    pub pass_rates_table: String,
    /// Pass-rate metadata table.
    pub pass_rate_metadata_table: String,
    /// Failure-list data table.
    pub failures_table: String,
    /// Failure-list metadata table.
    pub failures_metadata_table: String,
}

impl WarehouseNames {
    /// Default names, suffixed with a unix timestamp so repeated cycles
    /// never collide.
    pub fn with_timestamp(unix_ts: i64) -> Self {
        Self {
            metadata_dataset: format!("wptd_metrics_{unix_ts}"),
            data_dataset: format!("wptd_metrics_{unix_ts}"),
            pass_rates_table: format!("PassRates_{unix_ts}"),
            pass_rate_metadata_table: format!("PassRateMetadata_{unix_ts}"),
            failures_table: format!("Failures_{unix_ts}"),
            failures_metadata_table: format!("FailuresMetadata_{unix_ts}"),
        }
    }
}

/// Rate-limit settings for the load phase.
#[derive(Clone, Copy, Debug)]
pub struct RateLimitConfig {
    /// Admissions per second.
    pub per_sec: u32,
    /// Bucket capacity.
    pub burst: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            per_sec: FetchLimiter::DEFAULT_RATE,
            burst: FetchLimiter::DEFAULT_BURST,
        }
    }
}

/// Static configuration of one pipeline instance.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// How result payloads are retrieved.
    pub strategy: LoadStrategyKind,
    /// Bucket name as it appears in run result URLs.
    pub input_bucket: String,
    /// Base URL under which published artifacts are reachable.
    pub output_base_url: String,
    /// Warehouse naming for this cycle.
    pub names: WarehouseNames,
    /// Local cache directory for fetched objects, if any.
    pub cache_path: Option<Utf8PathBuf>,
    /// Fetch rate limit; `None` disables admission control.
    pub rate_limit: Option<RateLimitConfig>,
    /// Whether to compute and publish per-browser failure lists.
    pub compute_failures: bool,
}

/// The storage backends one pipeline instance talks to.
#[derive(Clone)]
pub struct PipelineBackends {
    /// Store holding the per-run result objects.
    pub input_objects: Arc<dyn ObjectStore>,
    /// Store receiving published artifacts.
    pub output_objects: Arc<dyn ObjectStore>,
    /// Structured-record store backing the idempotency gate.
    pub records: Arc<dyn RecordStore>,
    /// Analytical warehouse receiving metric rows.
    pub warehouse: Arc<dyn Warehouse>,
}

/// Cancels a running pipeline from another thread.
#[derive(Clone)]
pub struct CancelHandle {
    stop: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    /// Signals the pipeline to abort in-flight work promptly.
    pub fn cancel(&self) {
        let _ = self.stop.send(true);
    }
}

/// What an executed cycle did.
#[derive(Debug)]
pub struct PipelineReport {
    /// Identifiers of the candidate runs.
    pub run_ids: Vec<i64>,
    /// True if the gate found an existing record and nothing was done.
    pub skipped: bool,
    /// Number of results loaded and consolidated.
    pub results_loaded: usize,
    /// Non-fatal errors collected during the load phase.
    pub load_errors: Vec<LoadError>,
    /// Final per-run progress counts.
    pub progress: IndexMap<i64, RunProgress>,
    /// Start of the load phase.
    pub start_time: DateTime<Utc>,
    /// End of the load phase.
    pub end_time: DateTime<Utc>,
}

impl PipelineReport {
    fn skipped(run_ids: Vec<i64>) -> Self {
        let now = Utc::now();
        Self {
            run_ids,
            skipped: true,
            results_loaded: 0,
            load_errors: Vec::new(),
            progress: IndexMap::new(),
            start_time: now,
            end_time: now,
        }
    }
}

/// One metric set headed for publication: label, addressing, metadata and
/// pre-serialized rows.
struct MetricSet {
    label: String,
    dest: MetricSetDestination,
    metadata: MetricsMetadata,
    rows: Vec<Value>,
}

/// Drives complete metrics cycles: gate, load, consolidate, compute and
/// publish. Owns the tokio runtime all async work runs on.
pub struct MetricsPipeline {
    config: PipelineConfig,
    backends: PipelineBackends,
    runtime: tokio::runtime::Runtime,
    stop: Arc<watch::Sender<bool>>,
}

impl MetricsPipeline {
    /// Creates a pipeline with its own multi-threaded runtime.
    pub fn new(
        config: PipelineConfig,
        backends: PipelineBackends,
    ) -> Result<Self, PipelineError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("interop-metrics-worker")
            .build()
            .map_err(PipelineError::RuntimeCreate)?;
        let (stop, _) = watch::channel(false);
        Ok(Self {
            config,
            backends,
            runtime,
            stop: Arc::new(stop),
        })
    }

    /// Returns a handle that cancels `execute` from another thread.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            stop: Arc::clone(&self.stop),
        }
    }

    fn cancelled(&self) -> bool {
        *self.stop.subscribe().borrow()
    }

    /// Runs one full cycle over the given runs.
    ///
    /// Blocks the calling thread until the cycle completes, is skipped by
    /// the gate, or fails.
    pub fn execute(&self, mut runs: Vec<RunDescriptor>) -> Result<PipelineReport, PipelineError> {
        let run_ids: Vec<i64> = runs.iter().map(|run| run.id).collect();

        // Gate first: a covered run set must trigger no fetches at all.
        let decision = self
            .runtime
            .block_on(gate::check_existing(&*self.backends.records, &run_ids))?;
        if decision == GateDecision::Skip {
            return Ok(PipelineReport::skipped(run_ids));
        }

        runs.sort_by(|a, b| a.compare_by_created(b));
        let runs: Vec<Arc<RunDescriptor>> = runs.into_iter().map(Arc::new).collect();
        let num_runs = runs.len();

        let limiter = match self.config.rate_limit {
            Some(limit) => FetchLimiter::new(limit.per_sec, limit.burst),
            None => FetchLimiter::disabled(),
        };
        let cache = self.config.cache_path.clone().map(DiskCache::new);
        let strategy: &dyn LoadStrategy = match self.config.strategy {
            LoadStrategyKind::Sharded => &ShardedLoader,
            LoadStrategyKind::Consolidated => &ConsolidatedLoader,
        };

        let _guard = self.runtime.enter();

        info!(runs = num_runs, strategy = ?self.config.strategy, "loading results");
        let start_time = Utc::now();
        let loader = ResultsLoader {
            store: &*self.backends.input_objects,
            limiter: &limiter,
            cache: cache.as_ref(),
            bucket: &self.config.input_bucket,
            strategy,
            stop: self.stop.subscribe(),
        };
        let load = loader.load(&runs);
        let end_time = Utc::now();
        if self.cancelled() {
            return Err(PipelineError::Cancelled);
        }
        for error in &load.errors {
            warn!(%error, "load error");
        }
        info!(
            results = load.results.len(),
            errors = load.errors.len(),
            "load phase complete"
        );

        let index = ConsolidatedIndex::consolidate(&load.results);
        info!(identities = index.len(), "results consolidated");

        let sets = self.compute_metric_sets(&index, &runs, &run_ids, start_time, end_time)?;
        if self.cancelled() {
            return Err(PipelineError::Cancelled);
        }

        self.publish_metric_sets(&sets)?;

        Ok(PipelineReport {
            run_ids,
            skipped: false,
            results_loaded: load.results.len(),
            load_errors: load.errors,
            progress: load.progress,
            start_time,
            end_time,
        })
    }

    /// Runs the three metric computations concurrently and flattens their
    /// output into publishable metric sets.
    fn compute_metric_sets(
        &self,
        index: &ConsolidatedIndex,
        runs: &[Arc<RunDescriptor>],
        run_ids: &[i64],
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Result<Vec<MetricSet>, PipelineError> {
        let num_runs = runs.len();
        let passes: Passes = compute::ok_or_passes_and_unknown_or_passes;

        // One failure list per distinct browser name, in first-seen run
        // order.
        let mut browsers: Vec<&str> = Vec::new();
        if self.config.compute_failures {
            for run in runs {
                if !browsers.contains(&run.browser_name.as_str()) {
                    browsers.push(&run.browser_name);
                }
            }
        }

        let mut totals = None;
        let mut pass_rates = None;
        let mut failure_bins: Vec<Option<Vec<Vec<TestIdentity>>>> = vec![None; browsers.len()];

        let totals_mut = &mut totals;
        let pass_rates_mut = &mut pass_rates;
        async_scoped::TokioScope::scope_and_block(|scope| {
            scope.spawn(async move {
                *totals_mut = Some(compute_totals(index));
            });
            scope.spawn(async move {
                *pass_rates_mut = Some(compute_pass_rate(num_runs, index, passes));
            });
            for (browser, slot) in browsers.iter().zip(failure_bins.iter_mut()) {
                scope.spawn(async move {
                    *slot = Some(compute_browser_failures(num_runs, browser, index, passes));
                });
            }
        });

        let totals = totals.expect("totals task ran to completion");
        let pass_rates = pass_rates.expect("pass-rate task ran to completion");

        let names = &self.config.names;
        let artifact_dir = format!("{}-{}", start_time.timestamp(), end_time.timestamp());
        let runs_metadata = |data_url: String| TestRunsMetadata {
            start_time,
            end_time,
            run_ids: run_ids.to_vec(),
            data_url,
        };

        let mut sets = Vec::with_capacity(1 + browsers.len());

        let object_path = format!("{artifact_dir}/pass-rates.json.gz");
        sets.push(MetricSet {
            label: "pass-rates".to_owned(),
            metadata: MetricsMetadata::PassRate(PassRateMetadata {
                runs: runs_metadata(self.data_url(&object_path)),
            }),
            dest: MetricSetDestination {
                metadata: OutputDestination {
                    object_path: String::new(),
                    dataset: names.metadata_dataset.clone(),
                    table: names.pass_rate_metadata_table.clone(),
                },
                data: OutputDestination {
                    object_path,
                    dataset: names.data_dataset.clone(),
                    table: names.pass_rates_table.clone(),
                },
            },
            rows: serialize_rows(&pass_rate_rows(&totals, pass_rates))?,
        });

        for (browser, bins) in browsers.iter().zip(failure_bins) {
            let bins = bins.expect("failure task ran to completion");
            let object_path = format!("{artifact_dir}/{browser}-failures.json.gz");
            sets.push(MetricSet {
                label: format!("{browser}-failures"),
                metadata: MetricsMetadata::FailureList(FailureListMetadata {
                    runs: runs_metadata(self.data_url(&object_path)),
                    browser_name: (*browser).to_owned(),
                }),
                dest: MetricSetDestination {
                    metadata: OutputDestination {
                        object_path: String::new(),
                        dataset: names.metadata_dataset.clone(),
                        table: names.failures_metadata_table.clone(),
                    },
                    data: OutputDestination {
                        object_path,
                        dataset: names.data_dataset.clone(),
                        table: names.failures_table.clone(),
                    },
                },
                rows: serialize_rows(&failure_list_rows(browser, bins))?,
            });
        }
        Ok(sets)
    }

    /// Publishes every metric set through every sink in parallel, then
    /// aggregates failures.
    fn publish_metric_sets(&self, sets: &[MetricSet]) -> Result<(), PipelineError> {
        let sinks: Vec<Box<dyn PublicationSink>> = vec![
            Box::new(ObjectStoreSink::new(
                Arc::clone(&self.backends.output_objects),
                Arc::clone(&self.backends.records),
            )),
            Box::new(WarehouseSink::new(Arc::clone(&self.backends.warehouse))),
        ];

        let mut outcomes: Vec<Option<(&'static str, &str, PublishOutcome)>> =
            (0..sinks.len() * sets.len()).map(|_| None).collect();

        async_scoped::TokioScope::scope_and_block(|scope| {
            let mut slots = outcomes.iter_mut();
            for sink in &sinks {
                for set in sets {
                    let slot = slots.next().expect("one slot per (sink, set)");
                    scope.spawn(async move {
                        let outcome = sink.publish(&set.dest, &set.metadata, &set.rows).await;
                        *slot = Some((sink.name(), set.label.as_str(), outcome));
                    });
                }
            }
        });

        let mut failures = Vec::new();
        for (sink, label, outcome) in outcomes.into_iter().flatten() {
            info!(
                sink,
                set = label,
                rows = outcome.rows_attempted,
                metadata_written = outcome.metadata_written,
                errors = outcome.errors.len(),
                "publish outcome"
            );
            failures.extend(outcome.errors.into_iter().map(|error| PublishFailure {
                sink,
                metric_set: label.to_owned(),
                error,
            }));
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(PipelineError::Publish { failures })
        }
    }

    fn data_url(&self, object_path: &str) -> String {
        format!(
            "{}/{object_path}",
            self.config.output_base_url.trim_end_matches('/')
        )
    }
}

fn serialize_rows<T: Serialize>(rows: &[T]) -> Result<Vec<Value>, PipelineError> {
    rows.iter()
        .map(|row| serde_json::to_value(row).map_err(PipelineError::RowSerialize))
        .collect()
}
