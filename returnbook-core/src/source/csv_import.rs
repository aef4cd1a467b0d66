//! Offline price source: a CSV export with `Date` and `Close` columns.
//!
//! Accepts Yahoo's download layout (`Date,Open,High,Low,Close,Adj Close,Volume`)
//! or any file carrying those two headers. `null` or empty closes are skipped.

use super::provider::{FetchWindow, PriceSource, SourceError};
use crate::domain::PriceSample;
use chrono::NaiveDate;
use std::path::{Path, PathBuf};

pub struct CsvSource {
    path: PathBuf,
}

impl CsvSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every usable row in the file, in file order.
    pub fn read_all(&self) -> Result<Vec<PriceSample>, SourceError> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(&self.path)
            .map_err(|e| SourceError::Csv(format!("{}: {e}", self.path.display())))?;

        let headers = reader
            .headers()
            .map_err(|e| SourceError::Csv(format!("header row: {e}")))?
            .clone();
        let column = |name: &str| {
            headers
                .iter()
                .position(|h| h.eq_ignore_ascii_case(name))
                .ok_or_else(|| SourceError::Csv(format!("missing '{name}' column")))
        };
        let date_col = column("Date")?;
        let close_col = column("Close")?;

        let mut samples = Vec::new();
        for (i, row) in reader.records().enumerate() {
            // header is line 1
            let line = i + 2;
            let row = row.map_err(|e| SourceError::Csv(format!("line {line}: {e}")))?;

            let raw_date = row.get(date_col).unwrap_or_default();
            let date = NaiveDate::parse_from_str(raw_date, "%Y-%m-%d").map_err(|e| {
                SourceError::Csv(format!("line {line}: bad date '{raw_date}': {e}"))
            })?;

            let raw_close = row.get(close_col).unwrap_or_default();
            if raw_close.is_empty() || raw_close.eq_ignore_ascii_case("null") {
                continue;
            }
            let close: f64 = raw_close.parse().map_err(|e| {
                SourceError::Csv(format!("line {line}: bad close '{raw_close}': {e}"))
            })?;

            samples.push(PriceSample::new(date, close));
        }

        Ok(samples)
    }
}

impl PriceSource for CsvSource {
    fn name(&self) -> &str {
        "csv_import"
    }

    fn fetch(
        &self,
        symbol: &str,
        window: FetchWindow,
        as_of: NaiveDate,
    ) -> Result<Vec<PriceSample>, SourceError> {
        let (start, end) = window.resolve(as_of);
        tracing::info!(
            symbol,
            path = %self.path.display(),
            %start,
            %end,
            "importing daily closes from CSV"
        );
        Ok(self
            .read_all()?
            .into_iter()
            .filter(|s| s.date >= start && s.date <= end)
            .collect())
    }
}
