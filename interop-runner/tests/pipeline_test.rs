// Copyright (c) The interop-metrics Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end pipeline tests against the in-memory backends.

use chrono::DateTime;
use flate2::read::GzDecoder;
use interop_metadata::{RecordKind, RunDescriptor};
use interop_runner::{
    errors::PipelineError,
    loader::LoadStrategyKind,
    pipeline::{
        MetricsPipeline, PipelineBackends, PipelineConfig, RateLimitConfig, WarehouseNames,
    },
    publish::MetricsDocument,
    stores::{MemoryObjectStore, MemoryRecordStore, MemoryWarehouse, RecordStore},
};
use pretty_assertions::assert_eq;
use std::{io::Read, sync::Arc};

struct Harness {
    input_objects: Arc<MemoryObjectStore>,
    output_objects: Arc<MemoryObjectStore>,
    records: Arc<MemoryRecordStore>,
    warehouse: Arc<MemoryWarehouse>,
}

impl Harness {
    fn new() -> Self {
        Self {
            input_objects: Arc::new(MemoryObjectStore::new()),
            output_objects: Arc::new(MemoryObjectStore::new()),
            records: Arc::new(MemoryRecordStore::new()),
            warehouse: Arc::new(MemoryWarehouse::new()),
        }
    }

    fn pipeline(&self, strategy: LoadStrategyKind) -> MetricsPipeline {
        let config = PipelineConfig {
            strategy,
            input_bucket: "wptd".to_owned(),
            output_base_url: "https://metrics.example.test/data".to_owned(),
            names: WarehouseNames::with_timestamp(1234567890),
            cache_path: None,
            rate_limit: Some(RateLimitConfig::default()),
            compute_failures: true,
        };
        let backends = PipelineBackends {
            input_objects: self.input_objects.clone(),
            output_objects: self.output_objects.clone(),
            records: self.records.clone(),
            warehouse: self.warehouse.clone(),
        };
        MetricsPipeline::new(config, backends).expect("runtime creation")
    }

    fn read_document(&self, suffix: &str) -> MetricsDocument {
        let key = self
            .output_objects
            .keys()
            .into_iter()
            .find(|key| key.ends_with(suffix))
            .unwrap_or_else(|| panic!("no published object matching {suffix}"));
        let stored = self.output_objects.object(&key).unwrap();
        assert_eq!(stored.content_type, "application/json");
        assert_eq!(stored.content_encoding.as_deref(), Some("gzip"));

        let mut json = Vec::new();
        GzDecoder::new(&stored.data[..])
            .read_to_end(&mut json)
            .expect("published artifact is gzipped");
        serde_json::from_slice(&json).expect("published artifact is a metrics document")
    }
}

fn run(id: i64, browser: &str, revision: &str) -> RunDescriptor {
    RunDescriptor {
        id,
        browser_name: browser.to_owned(),
        browser_version: "1.0".to_owned(),
        os_name: "linux".to_owned(),
        os_version: "*".to_owned(),
        revision: revision.to_owned(),
        results_url: format!(
            "https://storage.googleapis.com/wptd/{revision}/{browser}-1.0-linux-summary.json.gz"
        ),
        raw_results_url: Some(format!(
            "https://storage.googleapis.com/wptd/{revision}/{browser}-1.0-linux/report.json"
        )),
        created_at: DateTime::from_timestamp(1_000 + id, 0).unwrap(),
    }
}

fn seed_sharded(store: &MemoryObjectStore, revision: &str, browser: &str, results: &[&str]) {
    for (idx, result) in results.iter().enumerate() {
        store.insert(
            format!("{revision}/{browser}-1.0-linux/result-{idx}.json"),
            (*result).to_owned(),
        );
    }
}

const CHROME_DOM: &str = r#"{"test": "/dom/a.html", "status": "OK",
    "subtests": [{"name": "one", "status": "PASS"}]}"#;
const CHROME_CSS: &str = r#"{"test": "/css/b.html", "status": "ERROR"}"#;
const FIREFOX_DOM: &str = r#"{"test": "/dom/a.html", "status": "OK",
    "subtests": [{"name": "one", "status": "FAIL"}]}"#;
const FIREFOX_CSS: &str = r#"{"test": "/css/b.html", "status": "OK"}"#;

#[test]
fn sharded_cycle_publishes_all_metric_sets() {
    let harness = Harness::new();
    seed_sharded(
        &harness.input_objects,
        "abcd",
        "chrome",
        &[CHROME_DOM, CHROME_CSS],
    );
    seed_sharded(
        &harness.input_objects,
        "abcd",
        "firefox",
        &[FIREFOX_DOM, FIREFOX_CSS],
    );

    let pipeline = harness.pipeline(LoadStrategyKind::Sharded);
    let report = pipeline
        .execute(vec![run(1, "chrome", "abcd"), run(2, "firefox", "abcd")])
        .expect("pipeline succeeds");

    assert!(!report.skipped);
    assert_eq!(report.results_loaded, 4);
    assert!(report.load_errors.is_empty());
    assert_eq!(report.progress[&1].parsed, 2);
    assert_eq!(report.progress[&2].parsed, 2);

    // One pass-rates artifact plus one failure list per browser.
    assert_eq!(harness.output_objects.keys().len(), 3);

    let pass_rates = harness.read_document("/pass-rates.json.gz");
    assert_eq!(pass_rates.metadata.record_kind(), RecordKind::PassRateMetadata);
    let dirs: Vec<&str> = pass_rates
        .data
        .iter()
        .map(|row| row["dir"].as_str().unwrap())
        .collect();
    assert_eq!(
        dirs,
        vec!["/css", "/css/b.html", "/dom", "/dom/a.html"],
        "rows are sorted by dir"
    );
    // /dom/a.html file entry passes in both browsers; its subtest only in
    // chrome; /css/b.html only in firefox.
    let dom_file = &pass_rates.data[3];
    assert_eq!(dom_file["pass_rates"], serde_json::json!([0, 1, 1]));
    assert_eq!(dom_file["total"], 2);

    // Chrome fails only /css/b.html, and firefox passes it there.
    let chrome_failures = harness.read_document("/chrome-failures.json.gz");
    assert_eq!(chrome_failures.metadata.browser_name(), Some("chrome"));
    let failing: Vec<&str> = chrome_failures
        .data
        .iter()
        .map(|row| row["test"]["test"].as_str().unwrap())
        .collect();
    assert_eq!(failing, vec!["/css/b.html"]);
    assert_eq!(chrome_failures.data[0]["num_other_failures"], 0);

    // Firefox alone fails the /dom/a.html subtest.
    let firefox_failures = harness.read_document("/firefox-failures.json.gz");
    assert_eq!(firefox_failures.data.len(), 1);
    assert_eq!(firefox_failures.data[0]["test"]["name"], "one");

    // Metadata records exist for the gate and for each failure list.
    let records = harness.records.records();
    assert_eq!(records.len(), 3);

    // Warehouse got the same rows plus one metadata row per set.
    let names = WarehouseNames::with_timestamp(1234567890);
    assert_eq!(
        harness
            .warehouse
            .rows(&names.data_dataset, &names.pass_rates_table)
            .len(),
        4
    );
    assert_eq!(
        harness
            .warehouse
            .rows(&names.metadata_dataset, &names.failures_metadata_table)
            .len(),
        2
    );
}

#[test]
fn consolidated_cycle_matches_sharded_semantics() {
    let harness = Harness::new();
    harness.input_objects.insert(
        "abcd/chrome-1.0-linux/report.json",
        format!(r#"{{"results": [{CHROME_DOM}, {CHROME_CSS}]}}"#),
    );
    harness.input_objects.insert(
        "abcd/firefox-1.0-linux/report.json",
        format!(r#"{{"results": [{FIREFOX_DOM}, {FIREFOX_CSS}]}}"#),
    );

    let pipeline = harness.pipeline(LoadStrategyKind::Consolidated);
    let report = pipeline
        .execute(vec![run(1, "chrome", "abcd"), run(2, "firefox", "abcd")])
        .expect("pipeline succeeds");

    assert_eq!(report.results_loaded, 4);
    let pass_rates = harness.read_document("/pass-rates.json.gz");
    assert_eq!(pass_rates.data.len(), 4);
    assert_eq!(
        pass_rates.metadata.runs().data_url,
        format!(
            "https://metrics.example.test/data/{}-{}/pass-rates.json.gz",
            report.start_time.timestamp(),
            report.end_time.timestamp()
        )
    );
}

#[test]
fn second_cycle_for_same_runs_is_gated_off() {
    let harness = Harness::new();
    seed_sharded(&harness.input_objects, "abcd", "chrome", &[CHROME_DOM]);

    let pipeline = harness.pipeline(LoadStrategyKind::Sharded);
    let first = pipeline.execute(vec![run(1, "chrome", "abcd")]).unwrap();
    assert!(!first.skipped);

    let fetches_after_first = harness.input_objects.get_count();
    let second = pipeline.execute(vec![run(1, "chrome", "abcd")]).unwrap();
    assert!(second.skipped);
    assert_eq!(
        harness.input_objects.get_count(),
        fetches_after_first,
        "a gated cycle must not fetch anything"
    );
}

#[test]
fn missing_consolidated_documents_still_publish_partial_results() {
    let harness = Harness::new();
    harness.input_objects.insert(
        "abcd/chrome-1.0-linux/report.json",
        format!(r#"{{"results": [{CHROME_DOM}]}}"#),
    );
    // No firefox report seeded.

    let pipeline = harness.pipeline(LoadStrategyKind::Consolidated);
    let report = pipeline
        .execute(vec![run(1, "chrome", "abcd"), run(2, "firefox", "abcd")])
        .expect("partial loads still publish");

    assert_eq!(report.results_loaded, 1);
    assert_eq!(report.load_errors.len(), 1);
    let pass_rates = harness.read_document("/pass-rates.json.gz");
    assert!(!pass_rates.data.is_empty());
}

#[test]
fn cancelled_pipeline_reports_cancellation() {
    let harness = Harness::new();
    seed_sharded(&harness.input_objects, "abcd", "chrome", &[CHROME_DOM]);

    let pipeline = harness.pipeline(LoadStrategyKind::Sharded);
    pipeline.cancel_handle().cancel();

    let error = pipeline
        .execute(vec![run(1, "chrome", "abcd")])
        .expect_err("cancelled before any work");
    assert!(matches!(error, PipelineError::Cancelled));
    assert!(harness.output_objects.keys().is_empty());
}

#[test]
fn gate_query_uses_superset_containment() {
    let harness = Harness::new();
    seed_sharded(&harness.input_objects, "abcd", "chrome", &[CHROME_DOM]);

    let pipeline = harness.pipeline(LoadStrategyKind::Sharded);
    pipeline
        .execute(vec![run(1, "chrome", "abcd"), run(2, "chrome", "abcd")])
        .unwrap();

    // A strict subset of an already-covered run set is also skipped.
    let report = pipeline.execute(vec![run(1, "chrome", "abcd")]).unwrap();
    assert!(report.skipped);

    // But a set containing a new run id proceeds.
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let keys = runtime
        .block_on(harness.records.find_superset_keys(
            RecordKind::PassRateMetadata,
            &[1, 2, 3],
            1,
        ))
        .unwrap();
    assert!(keys.is_empty());
}
