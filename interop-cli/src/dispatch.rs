// Copyright (c) The interop-metrics Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::ExpectedError;
use camino::Utf8PathBuf;
use chrono::Utc;
use clap::{Parser, ValueEnum};
use interop_metadata::RunDescriptor;
use interop_runner::{
    loader::LoadStrategyKind,
    pipeline::{
        MetricsPipeline, PipelineBackends, PipelineConfig, RateLimitConfig, WarehouseNames,
    },
    stores::{FsObjectStore, FsRecordStore, FsWarehouse},
};
use std::sync::Arc;
use tracing::info;

/// Computes cross-browser interop metrics from web-platform-test run
/// results and publishes them.
#[derive(Debug, Parser)]
#[command(version, bin_name = "interop-metrics")]
pub struct InteropMetricsApp {
    /// JSON file holding the run descriptors to compute metrics for.
    #[arg(long, value_name = "PATH")]
    runs_file: Utf8PathBuf,

    /// Directory holding the per-run result objects.
    #[arg(long, value_name = "PATH")]
    input_root: Utf8PathBuf,

    /// Bucket name as it appears in run result URLs.
    #[arg(long, value_name = "NAME", default_value = "wptd")]
    input_bucket: String,

    /// Directory receiving published artifacts, records and warehouse
    /// tables.
    #[arg(long, value_name = "PATH")]
    output_root: Utf8PathBuf,

    /// Base URL under which published artifacts will be reachable.
    #[arg(long, value_name = "URL")]
    output_base_url: String,

    /// How result payloads are retrieved.
    #[arg(long, value_enum, default_value_t = StrategyArg::Consolidated)]
    strategy: StrategyArg,

    /// Cache fetched objects under this directory.
    #[arg(long, value_name = "PATH")]
    cache_path: Option<Utf8PathBuf>,

    /// Disable fetch rate limiting.
    #[arg(long)]
    no_rate_limit: bool,

    /// Fetch admissions per second.
    #[arg(long, value_name = "N", default_value_t = RateLimitConfig::default().per_sec)]
    fetch_rate: u32,

    /// Fetch burst capacity.
    #[arg(long, value_name = "N", default_value_t = RateLimitConfig::default().burst)]
    fetch_burst: u32,

    /// Skip the per-browser failure-list metric.
    #[arg(long)]
    no_failure_lists: bool,

    /// Warehouse dataset for metadata rows [default: wptd_metrics_<now>].
    #[arg(long, value_name = "NAME")]
    metadata_dataset: Option<String>,

    /// Warehouse dataset for data rows [default: wptd_metrics_<now>].
    #[arg(long, value_name = "NAME")]
    data_dataset: Option<String>,

    /// Pass-rate data table [default: PassRates_<now>].
    #[arg(long, value_name = "NAME")]
    pass_rates_table: Option<String>,

    /// Pass-rate metadata table [default: PassRateMetadata_<now>].
    #[arg(long, value_name = "NAME")]
    pass_rate_metadata_table: Option<String>,

    /// Failure-list data table [default: Failures_<now>].
    #[arg(long, value_name = "NAME")]
    failures_table: Option<String>,

    /// Failure-list metadata table [default: FailuresMetadata_<now>].
    #[arg(long, value_name = "NAME")]
    failures_metadata_table: Option<String>,

    /// Increase log verbosity.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum StrategyArg {
    /// One object per test file, listed under a per-run prefix.
    Sharded,
    /// One raw-results document per run.
    Consolidated,
}

impl From<StrategyArg> for LoadStrategyKind {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Sharded => Self::Sharded,
            StrategyArg::Consolidated => Self::Consolidated,
        }
    }
}

impl InteropMetricsApp {
    /// Initializes logging for the chosen verbosity.
    pub fn init_logging(&self) {
        let level = match self.verbose {
            0 => tracing::Level::INFO,
            1 => tracing::Level::DEBUG,
            _ => tracing::Level::TRACE,
        };
        tracing_subscriber::fmt()
            .with_max_level(level)
            .with_writer(std::io::stderr)
            .init();
    }

    /// Runs one metrics cycle.
    pub fn exec(self) -> Result<(), ExpectedError> {
        let runs = self.read_runs()?;
        info!(runs = runs.len(), runs_file = %self.runs_file, "runs loaded");

        let names = self.warehouse_names();
        let config = PipelineConfig {
            strategy: self.strategy.into(),
            input_bucket: self.input_bucket,
            output_base_url: self.output_base_url,
            names,
            cache_path: self.cache_path,
            rate_limit: (!self.no_rate_limit).then_some(RateLimitConfig {
                per_sec: self.fetch_rate,
                burst: self.fetch_burst,
            }),
            compute_failures: !self.no_failure_lists,
        };
        let backends = PipelineBackends {
            input_objects: Arc::new(FsObjectStore::new(self.input_root)),
            output_objects: Arc::new(FsObjectStore::new(self.output_root.join("objects"))),
            records: Arc::new(FsRecordStore::new(self.output_root.join("records"))),
            warehouse: Arc::new(FsWarehouse::new(self.output_root.join("warehouse"))),
        };

        let pipeline = MetricsPipeline::new(config, backends)?;
        let report = pipeline.execute(runs)?;

        if report.skipped {
            info!(run_ids = ?report.run_ids, "metrics already published, nothing to do");
            return Ok(());
        }
        for (run_id, progress) in &report.progress {
            info!(
                run_id,
                browser = %progress.browser_name,
                parsed = progress.parsed,
                "run loaded"
            );
        }
        info!(
            results = report.results_loaded,
            load_errors = report.load_errors.len(),
            duration_secs = (report.end_time - report.start_time).num_seconds(),
            "metrics published"
        );
        Ok(())
    }

    fn read_runs(&self) -> Result<Vec<RunDescriptor>, ExpectedError> {
        let raw = std::fs::read(&self.runs_file).map_err(|error| ExpectedError::RunsRead {
            path: self.runs_file.clone(),
            error,
        })?;
        serde_json::from_slice(&raw).map_err(|error| ExpectedError::RunsParse {
            path: self.runs_file.clone(),
            error,
        })
    }

    fn warehouse_names(&self) -> WarehouseNames {
        let mut names = WarehouseNames::with_timestamp(Utc::now().timestamp());
        if let Some(dataset) = &self.metadata_dataset {
            names.metadata_dataset = dataset.clone();
        }
        if let Some(dataset) = &self.data_dataset {
            names.data_dataset = dataset.clone();
        }
        if let Some(table) = &self.pass_rates_table {
            names.pass_rates_table = table.clone();
        }
        if let Some(table) = &self.pass_rate_metadata_table {
            names.pass_rate_metadata_table = table.clone();
        }
        if let Some(table) = &self.failures_table {
            names.failures_table = table.clone();
        }
        if let Some(table) = &self.failures_metadata_table {
            names.failures_metadata_table = table.clone();
        }
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> InteropMetricsApp {
        InteropMetricsApp::try_parse_from(
            ["interop-metrics"].iter().chain(args).copied(),
        )
        .expect("arguments parse")
    }

    const REQUIRED: &[&str] = &[
        "--runs-file",
        "runs.json",
        "--input-root",
        "/data/in",
        "--output-root",
        "/data/out",
        "--output-base-url",
        "https://example.test/data",
    ];

    #[test]
    fn defaults_are_consolidated_and_rate_limited() {
        let app = parse(REQUIRED);
        assert!(matches!(app.strategy, StrategyArg::Consolidated));
        assert!(!app.no_rate_limit);
        assert_eq!(app.input_bucket, "wptd");
        assert_eq!(app.fetch_rate, 50);
    }

    #[test]
    fn table_overrides_replace_timestamped_defaults() {
        let mut args = REQUIRED.to_vec();
        args.extend(["--pass-rates-table", "PassRates_fixed"]);
        let app = parse(&args);
        let names = app.warehouse_names();
        assert_eq!(names.pass_rates_table, "PassRates_fixed");
        assert!(names.failures_table.starts_with("Failures_"));
    }

    #[test]
    fn strategy_flag_parses_both_variants() {
        let mut args = REQUIRED.to_vec();
        args.extend(["--strategy", "sharded"]);
        let app = parse(&args);
        assert!(matches!(app.strategy, StrategyArg::Sharded));
    }
}
