//! Returnbook Core: cumulative monthly return history for a market index.
//!
//! This crate contains:
//! - Domain types (months, daily price samples, monthly return records)
//! - The return deriver: daily closes to rounded month-over-month returns
//! - The returns table and its last-write-wins merge
//! - The atomic JSON store that persists the table between runs
//! - Price sources (Yahoo Finance, CSV import)
//! - The update pipeline wiring them together

pub mod config;
pub mod derive;
pub mod domain;
pub mod ingest;
pub mod pipeline;
pub mod source;
pub mod stats;
pub mod store;
pub mod table;

pub use config::{Config, ConfigError, MalformedPolicy, YahooConfig};
pub use derive::{derive_monthly_returns, representative_closes, round_pct};
pub use domain::{Month, MonthlyReturn, PriceSample};
pub use pipeline::{run_update, Baseline, PipelineError, RunSummary, Stage};
pub use source::{CsvSource, FetchWindow, PriceSource, SourceError, YahooSource};
pub use stats::{yearly_returns, TableStats};
pub use store::{StoreError, TableStore};
pub use table::{MergeReport, ReturnsTable, Upsert};
