//! PriceSample: one daily close from the data source.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Closing price for a single trading day.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceSample {
    pub date: NaiveDate,
    pub close: f64,
}

impl PriceSample {
    pub fn new(date: NaiveDate, close: f64) -> Self {
        Self { date, close }
    }

    /// A usable close is finite and strictly positive.
    pub fn is_valid(&self) -> bool {
        self.close.is_finite() && self.close > 0.0
    }
}
