//! End-to-end tests for the update pipeline.
//!
//! A fixture source stands in for Yahoo; everything else (canonicalization,
//! derivation, merge, atomic store) runs for real against a temp directory.

use chrono::NaiveDate;
use returnbook_core::source::{FetchWindow, PriceSource, SourceError};
use returnbook_core::{
    run_update, Baseline, Config, MalformedPolicy, Month, PipelineError, PriceSample,
    ReturnsTable, Stage, TableStore,
};
use std::cell::Cell;
use std::fs;
use std::path::Path;

/// Returns a fixed series, filtered to the requested window.
struct FixtureSource {
    samples: Vec<PriceSample>,
    calls: Cell<usize>,
}

impl FixtureSource {
    fn new(samples: Vec<PriceSample>) -> Self {
        Self {
            samples,
            calls: Cell::new(0),
        }
    }
}

impl PriceSource for FixtureSource {
    fn name(&self) -> &str {
        "fixture"
    }

    fn fetch(
        &self,
        _symbol: &str,
        window: FetchWindow,
        as_of: NaiveDate,
    ) -> Result<Vec<PriceSample>, SourceError> {
        self.calls.set(self.calls.get() + 1);
        let (start, end) = window.resolve(as_of);
        Ok(self
            .samples
            .iter()
            .copied()
            .filter(|s| s.date >= start && s.date <= end)
            .collect())
    }
}

struct FailingSource;

impl PriceSource for FailingSource {
    fn name(&self) -> &str {
        "failing"
    }

    fn fetch(&self, _: &str, _: FetchWindow, _: NaiveDate) -> Result<Vec<PriceSample>, SourceError> {
        Err(SourceError::NetworkUnreachable("connection refused".into()))
    }
}

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

/// Month-end closes for Dec 2023 .. Jun 2024 with a few mid-month samples.
fn nifty_fixture() -> Vec<PriceSample> {
    vec![
        PriceSample::new(d(2023, 12, 15), 21_456.7),
        PriceSample::new(d(2023, 12, 29), 21_731.4),
        PriceSample::new(d(2024, 1, 10), 21_618.7),
        PriceSample::new(d(2024, 1, 31), 21_725.7),
        PriceSample::new(d(2024, 2, 29), 21_982.8),
        PriceSample::new(d(2024, 3, 28), 22_326.9),
        PriceSample::new(d(2024, 4, 30), 22_604.9),
        PriceSample::new(d(2024, 5, 31), 22_530.7),
        PriceSample::new(d(2024, 6, 14), 23_465.6),
        PriceSample::new(d(2024, 6, 28), 24_010.6),
    ]
}

fn config_for(store: &Path, window: FetchWindow) -> Config {
    Config {
        store_path: store.to_path_buf(),
        window,
        ..Config::default()
    }
}

#[test]
fn first_run_creates_store_and_parent_dirs() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data/nifty_returns.json");
    let cfg = config_for(&path, FetchWindow::Full);
    let source = FixtureSource::new(nifty_fixture());

    let summary = run_update(&cfg, &source, d(2024, 6, 30)).unwrap();

    assert_eq!(summary.baseline, Baseline::Missing);
    // Dec 2023 .. Jun 2024 is 7 months → 6 returns
    assert_eq!(summary.records_derived, 6);
    assert_eq!(summary.merge.inserted, 6);
    assert!(summary.changed);
    assert_eq!(
        summary.derived_span,
        Some(((2024, Month::Jan), (2024, Month::Jun)))
    );

    let table = TableStore::new(&path).load().unwrap().unwrap();
    assert_eq!(table.len(), 6);
    assert_eq!(table.get(2024, Month::Jan), Some(-0.03));
    assert_eq!(table.get(2024, Month::Jun), Some(6.57));
    assert_eq!(table.year(2023), None);
}

#[test]
fn second_identical_run_is_byte_for_byte_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nifty_returns.json");
    let cfg = config_for(&path, FetchWindow::Full);
    let source = FixtureSource::new(nifty_fixture());

    let first = run_update(&cfg, &source, d(2024, 6, 30)).unwrap();
    let bytes_after_first = fs::read(&path).unwrap();

    let second = run_update(&cfg, &source, d(2024, 6, 30)).unwrap();
    let bytes_after_second = fs::read(&path).unwrap();

    assert_eq!(bytes_after_first, bytes_after_second);
    assert_eq!(first.digest, second.digest);
    assert!(!second.changed);
    assert_eq!(second.merge.unchanged, 6);
    assert_eq!(second.merge.inserted + second.merge.overwritten, 0);
    assert_eq!(second.baseline, Baseline::Loaded { cells: 6 });
}

#[test]
fn recent_window_keeps_older_history_and_overwrites_overlap() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nifty_returns.json");

    // Pre-existing history: an old year plus a stale value for Apr 2024.
    let mut seeded = ReturnsTable::new();
    seeded.upsert(2019, Month::Mar, 7.7);
    seeded.upsert(2024, Month::Apr, 99.99);
    TableStore::new(&path).write(&seeded).unwrap();

    let cfg = config_for(&path, FetchWindow::Recent { months: 3 });
    let source = FixtureSource::new(nifty_fixture());
    // window: 2024-03-01 ..= 2024-06-30 → Mar is baseline, Apr..Jun derived
    let summary = run_update(&cfg, &source, d(2024, 6, 30)).unwrap();
    assert_eq!(summary.records_derived, 3);
    assert_eq!(summary.merge.overwritten, 1);
    assert_eq!(summary.merge.inserted, 2);

    let table = TableStore::new(&path).load().unwrap().unwrap();
    assert_eq!(table.get(2019, Month::Mar), Some(7.7));
    assert_eq!(table.get(2024, Month::Apr), Some(1.25));
    assert_eq!(table.get(2024, Month::Mar), None);
    assert_eq!(table.len(), 4);
}

#[test]
fn full_and_recent_windows_converge_on_overlap() {
    let dir = tempfile::tempdir().unwrap();
    let full_path = dir.path().join("full.json");
    let recent_path = dir.path().join("recent.json");
    let source = FixtureSource::new(nifty_fixture());

    run_update(&config_for(&full_path, FetchWindow::Full), &source, d(2024, 6, 30)).unwrap();
    run_update(
        &config_for(&recent_path, FetchWindow::Recent { months: 2 }),
        &source,
        d(2024, 6, 30),
    )
    .unwrap();

    let full = TableStore::new(&full_path).load().unwrap().unwrap();
    let recent = TableStore::new(&recent_path).load().unwrap().unwrap();
    for cell in recent.iter() {
        assert_eq!(full.get(cell.year, cell.month), Some(cell.return_pct));
    }
}

#[test]
fn zero_samples_is_fatal_and_store_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nifty_returns.json");
    let mut seeded = ReturnsTable::new();
    seeded.upsert(2024, Month::Jan, 3.0);
    TableStore::new(&path).write(&seeded).unwrap();
    let before = fs::read(&path).unwrap();

    let cfg = config_for(&path, FetchWindow::Full);
    let err = run_update(&cfg, &FixtureSource::new(Vec::new()), d(2024, 6, 30)).unwrap_err();

    assert!(matches!(err, PipelineError::SourceUnavailable { .. }));
    assert_eq!(err.stage(), Stage::Fetch);
    assert_eq!(fs::read(&path).unwrap(), before);
}

#[test]
fn zero_samples_on_first_run_creates_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data/nifty_returns.json");
    let cfg = config_for(&path, FetchWindow::Full);
    let only_nulls = FixtureSource::new(vec![PriceSample::new(d(2024, 1, 2), f64::NAN)]);

    let err = run_update(&cfg, &only_nulls, d(2024, 6, 30)).unwrap_err();
    assert!(matches!(err, PipelineError::SourceUnavailable { .. }));
    assert!(!path.exists());
    assert!(!path.parent().unwrap().exists());
}

#[test]
fn source_error_is_reported_as_fetch_stage() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nifty_returns.json");
    let err = run_update(&config_for(&path, FetchWindow::Full), &FailingSource, d(2024, 6, 30))
        .unwrap_err();
    assert!(matches!(err, PipelineError::Fetch(_)));
    assert_eq!(err.stage(), Stage::Fetch);
    assert!(!path.exists());
}

#[test]
fn single_month_still_writes_unchanged_table() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nifty_returns.json");
    let mut seeded = ReturnsTable::new();
    seeded.upsert(2024, Month::Jan, 3.0);
    TableStore::new(&path).write(&seeded).unwrap();

    let source = FixtureSource::new(vec![PriceSample::new(d(2024, 6, 28), 24_010.6)]);
    let summary = run_update(&config_for(&path, FetchWindow::Full), &source, d(2024, 6, 30)).unwrap();

    assert_eq!(summary.records_derived, 0);
    assert!(!summary.changed);
    assert_eq!(TableStore::new(&path).load().unwrap(), Some(seeded));
}

// ── Malformed store policy ──────────────────────────────────────────

#[test]
fn malformed_store_is_quarantined_by_default() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nifty_returns.json");
    fs::write(&path, "{\"2024\": {\"Jan\": 3.0,").unwrap();

    let cfg = config_for(&path, FetchWindow::Full);
    assert_eq!(cfg.on_malformed, MalformedPolicy::Quarantine);
    let summary = run_update(&cfg, &FixtureSource::new(nifty_fixture()), d(2024, 6, 30)).unwrap();

    let store = TableStore::new(&path);
    assert_eq!(
        summary.baseline,
        Baseline::Quarantined {
            path: store.quarantine_path()
        }
    );
    // Old bytes preserved beside the fresh table.
    assert_eq!(
        fs::read_to_string(store.quarantine_path()).unwrap(),
        "{\"2024\": {\"Jan\": 3.0,"
    );
    assert_eq!(store.load().unwrap().unwrap().len(), 6);
}

#[test]
fn malformed_store_aborts_when_configured() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nifty_returns.json");
    fs::write(&path, "garbage").unwrap();

    let cfg = Config {
        on_malformed: MalformedPolicy::Abort,
        ..config_for(&path, FetchWindow::Full)
    };
    let err = run_update(&cfg, &FixtureSource::new(nifty_fixture()), d(2024, 6, 30)).unwrap_err();

    assert!(matches!(err, PipelineError::Malformed(_)));
    assert_eq!(err.stage(), Stage::Parse);
    assert_eq!(fs::read_to_string(&path).unwrap(), "garbage");
    assert!(!TableStore::new(&path).quarantine_path().exists());
}

#[test]
fn empty_store_file_counts_as_missing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nifty_returns.json");
    fs::write(&path, "").unwrap();

    let summary = run_update(
        &config_for(&path, FetchWindow::Full),
        &FixtureSource::new(nifty_fixture()),
        d(2024, 6, 30),
    )
    .unwrap();
    assert_eq!(summary.baseline, Baseline::Missing);
}

#[test]
fn failed_write_keeps_previous_table() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nifty_returns.json");
    let store = TableStore::new(&path);
    let mut seeded = ReturnsTable::new();
    seeded.upsert(2019, Month::Mar, 7.7);
    store.write(&seeded).unwrap();
    let before = fs::read(&path).unwrap();

    // A directory squatting on the staging path makes the write fail.
    fs::create_dir_all(store.temp_path()).unwrap();

    let source = FixtureSource::new(nifty_fixture());
    let err = run_update(&config_for(&path, FetchWindow::Full), &source, d(2024, 6, 30))
        .unwrap_err();
    assert!(matches!(err, PipelineError::Write(_)), "{err}");
    assert_eq!(err.stage(), Stage::Write);
    assert_eq!(fs::read(&path).unwrap(), before);
}

#[test]
fn failed_quarantine_reports_write_stage_and_keeps_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nifty_returns.json");
    fs::write(&path, "garbage").unwrap();
    let store = TableStore::new(&path);
    // A non-empty directory at the quarantine path cannot be replaced.
    fs::create_dir_all(store.quarantine_path().join("occupied")).unwrap();

    let err = run_update(
        &config_for(&path, FetchWindow::Full),
        &FixtureSource::new(nifty_fixture()),
        d(2024, 6, 30),
    )
    .unwrap_err();
    assert!(matches!(err, PipelineError::Quarantine(_)), "{err}");
    assert_eq!(err.stage(), Stage::Write);
    assert_eq!(fs::read_to_string(&path).unwrap(), "garbage");
}

#[test]
fn invalid_utf8_store_is_quarantined() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nifty_returns.json");
    fs::write(&path, [0xff, 0xfe, b'{', b'}']).unwrap();

    let summary = run_update(
        &config_for(&path, FetchWindow::Full),
        &FixtureSource::new(nifty_fixture()),
        d(2024, 6, 30),
    )
    .unwrap();

    let store = TableStore::new(&path);
    assert_eq!(
        summary.baseline,
        Baseline::Quarantined {
            path: store.quarantine_path()
        }
    );
    assert_eq!(
        fs::read(store.quarantine_path()).unwrap(),
        vec![0xff, 0xfe, b'{', b'}']
    );
    assert_eq!(store.load().unwrap().unwrap().len(), 6);
}

#[test]
fn overflowing_return_never_costs_history() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nifty_returns.json");
    let mut seeded = ReturnsTable::new();
    seeded.upsert(2019, Month::Mar, 7.7);
    TableStore::new(&path).write(&seeded).unwrap();

    let cfg = config_for(&path, FetchWindow::Full);
    let source = FixtureSource::new(vec![
        PriceSample::new(d(2024, 1, 31), 1e-300),
        PriceSample::new(d(2024, 2, 29), 1e10),
    ]);

    let first = run_update(&cfg, &source, d(2024, 6, 30)).unwrap();
    assert_eq!(first.records_derived, 0);

    let second = run_update(&cfg, &source, d(2024, 6, 30)).unwrap();
    assert_eq!(second.baseline, Baseline::Loaded { cells: 1 });
    let table = TableStore::new(&path).load().unwrap().unwrap();
    assert_eq!(table.get(2019, Month::Mar), Some(7.7));
    assert_eq!(table.get(2024, Month::Feb), None);
}
