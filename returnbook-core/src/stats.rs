//! Table statistics: compounded yearly returns and best/worst/average months.

use crate::derive::round_pct;
use crate::domain::MonthlyReturn;
use crate::table::ReturnsTable;
use std::collections::BTreeMap;

/// Compounded return per year: `(Π(1 + r/100) − 1) × 100`, rounded.
///
/// Partial years compound only the months present.
pub fn yearly_returns(table: &ReturnsTable) -> BTreeMap<i32, f64> {
    table
        .years()
        .filter_map(|year| {
            let months = table.year(year)?;
            let growth = months.values().fold(1.0, |acc, r| acc * (1.0 + r / 100.0));
            Some((year, round_pct((growth - 1.0) * 100.0)))
        })
        .collect()
}

/// Summary over every stored month.
#[derive(Debug, Clone, PartialEq)]
pub struct TableStats {
    pub best: MonthlyReturn,
    pub worst: MonthlyReturn,
    /// Mean monthly return, rounded to 2 decimals.
    pub average: f64,
    pub count: usize,
}

impl TableStats {
    /// `None` for an empty table. Ties go to the earliest month.
    pub fn compute(table: &ReturnsTable) -> Option<Self> {
        let mut cells = table.iter();
        let first = cells.next()?;
        let (mut best, mut worst, mut sum, mut count) = (first, first, first.return_pct, 1usize);

        for cell in cells {
            if cell.return_pct > best.return_pct {
                best = cell;
            }
            if cell.return_pct < worst.return_pct {
                worst = cell;
            }
            sum += cell.return_pct;
            count += 1;
        }

        Some(Self {
            best,
            worst,
            average: round_pct(sum / count as f64),
            count,
        })
    }
}
