//! PriceSource trait, fetch windows, and source error types.
//!
//! The trait abstracts over where daily closes come from (Yahoo Finance, a CSV
//! export) so the pipeline can be driven by a fixture in tests.

use crate::domain::PriceSample;
use chrono::{Datelike, Months, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// How much history to request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FetchWindow {
    /// The `months` whole months before the as-of month, plus month-to-date.
    ///
    /// The oldest month only serves as the baseline for the next one, so a
    /// window of `n` yields up to `n` returns.
    Recent { months: u32 },
    /// Everything the source has.
    Full,
}

impl Default for FetchWindow {
    fn default() -> Self {
        FetchWindow::Recent { months: 6 }
    }
}

impl FetchWindow {
    /// Start of the full-history range.
    pub fn epoch() -> NaiveDate {
        NaiveDate::from_ymd_opt(1970, 1, 1).expect("1970-01-01 is a valid date")
    }

    /// Inclusive `(start, end)` dates for a fetch made on `as_of`.
    pub fn resolve(&self, as_of: NaiveDate) -> (NaiveDate, NaiveDate) {
        match *self {
            FetchWindow::Full => (Self::epoch(), as_of),
            FetchWindow::Recent { months } => {
                let month_start = as_of.with_day(1).unwrap_or(as_of);
                let start = month_start
                    .checked_sub_months(Months::new(months))
                    .unwrap_or_else(Self::epoch)
                    .max(Self::epoch());
                (start, as_of)
            }
        }
    }
}

impl fmt::Display for FetchWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchWindow::Recent { months } => write!(f, "last {months} months"),
            FetchWindow::Full => f.write_str("full history"),
        }
    }
}

/// Structured error types for source operations.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("rate limited by provider (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("HTTP {status} fetching {symbol}")]
    HttpStatus { status: u16, symbol: String },

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("symbol not found: {symbol}")]
    SymbolNotFound { symbol: String },

    #[error("CSV import error: {0}")]
    Csv(String),
}

/// Something that returns daily closes for one instrument.
///
/// An empty vector is a legal answer. Deciding that "no samples" is fatal is
/// the pipeline's job, not the provider's.
pub trait PriceSource {
    /// Human-readable name of this source.
    fn name(&self) -> &str;

    /// Fetch daily closes for `symbol` within `window`, relative to `as_of`.
    fn fetch(
        &self,
        symbol: &str,
        window: FetchWindow,
        as_of: NaiveDate,
    ) -> Result<Vec<PriceSample>, SourceError>;
}
