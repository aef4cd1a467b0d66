//! MonthlyReturn: one derived (year, month, return) cell.

use super::Month;
use serde::{Deserialize, Serialize};

/// Percentage return for one calendar month, already rounded to 2 decimals.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MonthlyReturn {
    pub year: i32,
    pub month: Month,
    pub return_pct: f64,
}

impl MonthlyReturn {
    pub fn new(year: i32, month: Month, return_pct: f64) -> Self {
        Self {
            year,
            month,
            return_pct,
        }
    }

    /// `(year, month)` key, ordered chronologically.
    pub fn key(&self) -> (i32, Month) {
        (self.year, self.month)
    }
}
