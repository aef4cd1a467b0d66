//! Update pipeline: fetch → canonicalize → derive → load → merge → write.
//!
//! One linear pass per run. Nothing touches the store until the source has
//! produced at least one usable sample, so a failed fetch never rewrites the
//! table. The store is read-modify-write with no locking; concurrent runs
//! against the same file race and the last rename wins.

use crate::config::{Config, MalformedPolicy};
use crate::derive::derive_monthly_returns;
use crate::domain::Month;
use crate::ingest::canonicalize;
use crate::source::{FetchWindow, PriceSource, SourceError};
use crate::store::{StoreError, TableStore};
use crate::table::{MergeReport, ReturnsTable};
use chrono::NaiveDate;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Coarse stage a failure belongs to, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fetch,
    Parse,
    Write,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Fetch => "fetch",
            Stage::Parse => "parse",
            Stage::Write => "write",
        })
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] SourceError),

    #[error("source returned no usable samples for {symbol} ({window})")]
    SourceUnavailable { symbol: String, window: FetchWindow },

    #[error("could not read returns table: {0}")]
    Load(#[source] StoreError),

    #[error("returns table is malformed and on_malformed = abort: {0}")]
    Malformed(#[source] StoreError),

    #[error("could not move malformed returns table aside: {0}")]
    Quarantine(#[source] StoreError),

    #[error("could not write returns table: {0}")]
    Write(#[source] StoreError),
}

impl PipelineError {
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::Fetch(_) | PipelineError::SourceUnavailable { .. } => Stage::Fetch,
            PipelineError::Load(_) | PipelineError::Malformed(_) => Stage::Parse,
            PipelineError::Quarantine(_) | PipelineError::Write(_) => Stage::Write,
        }
    }
}

/// What the merge started from.
#[derive(Debug, Clone, PartialEq)]
pub enum Baseline {
    /// No store file, or an empty one.
    Missing,
    Loaded { cells: usize },
    /// The store was malformed and moved to `path`.
    Quarantined { path: PathBuf },
}

/// Everything worth reporting about a successful run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub symbol: String,
    pub source: String,
    pub window: FetchWindow,
    pub store_path: PathBuf,
    pub samples_fetched: usize,
    pub samples_used: usize,
    pub invalid_samples: usize,
    pub duplicate_samples: usize,
    pub records_derived: usize,
    /// Earliest and latest derived months.
    pub derived_span: Option<((i32, Month), (i32, Month))>,
    pub baseline: Baseline,
    pub merge: MergeReport,
    pub table_years: usize,
    pub table_cells: usize,
    /// blake3 digest of the bytes now on disk.
    pub digest: String,
    /// False when the rewrite produced exactly the bytes that were there.
    pub changed: bool,
}

/// Run one update against the configured store.
pub fn run_update(
    config: &Config,
    source: &dyn PriceSource,
    as_of: NaiveDate,
) -> Result<RunSummary, PipelineError> {
    let raw = source.fetch(&config.symbol, config.window, as_of)?;
    let samples_fetched = raw.len();

    let ingested = canonicalize(raw);
    if ingested.samples.is_empty() {
        return Err(PipelineError::SourceUnavailable {
            symbol: config.symbol.clone(),
            window: config.window,
        });
    }
    if ingested.invalid > 0 || ingested.duplicates > 0 {
        tracing::info!(
            invalid = ingested.invalid,
            duplicates = ingested.duplicates,
            "dropped unusable samples"
        );
    }

    let records = derive_monthly_returns(&ingested.samples);
    let derived_span = records
        .first()
        .zip(records.last())
        .map(|(a, b)| (a.key(), b.key()));
    tracing::info!(
        samples = ingested.samples.len(),
        records = records.len(),
        "derived monthly returns"
    );

    let store = TableStore::new(&config.store_path);
    let (mut table, baseline, previous_digest) = load_baseline(&store, config.on_malformed)?;

    let merge = table.merge(&records);
    tracing::info!(
        inserted = merge.inserted,
        overwritten = merge.overwritten,
        unchanged = merge.unchanged,
        "merged into returns table"
    );

    let digest = store.write(&table).map_err(PipelineError::Write)?;
    let changed = previous_digest.as_deref() != Some(digest.as_str());
    tracing::info!(path = %store.path().display(), changed, "wrote returns table");

    Ok(RunSummary {
        symbol: config.symbol.clone(),
        source: source.name().to_string(),
        window: config.window,
        store_path: config.store_path.clone(),
        samples_fetched,
        samples_used: ingested.samples.len(),
        invalid_samples: ingested.invalid,
        duplicate_samples: ingested.duplicates,
        records_derived: records.len(),
        derived_span,
        baseline,
        merge,
        table_years: table.years().count(),
        table_cells: table.len(),
        digest,
        changed,
    })
}

fn load_baseline(
    store: &TableStore,
    policy: MalformedPolicy,
) -> Result<(ReturnsTable, Baseline, Option<String>), PipelineError> {
    match store.load_stored() {
        Ok(Some(stored)) => {
            let cells = stored.table.len();
            Ok((stored.table, Baseline::Loaded { cells }, Some(stored.digest)))
        }
        Ok(None) => Ok((ReturnsTable::new(), Baseline::Missing, None)),
        Err(err @ StoreError::Malformed { .. }) => match policy {
            MalformedPolicy::Abort => Err(PipelineError::Malformed(err)),
            MalformedPolicy::Quarantine => {
                tracing::warn!(error = %err, "starting from an empty table");
                let path = store.quarantine().map_err(PipelineError::Quarantine)?;
                Ok((ReturnsTable::new(), Baseline::Quarantined { path }, None))
            }
        },
        Err(err) => Err(PipelineError::Load(err)),
    }
}
