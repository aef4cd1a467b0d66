//! Returns Table and the Table Merger.
//!
//! The table maps year → month → percentage return. Merging is a union keyed
//! by `(year, month)` where the incoming value always wins. Cells the incoming
//! records do not mention are never touched, so re-running over an
//! overlapping window converges instead of accumulating.

use crate::domain::{Month, MonthlyReturn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Persisted year → month → return mapping.
///
/// Serializes transparently as `{"2024": {"Jan": -0.03, ...}, ...}` with years
/// ascending and months in calendar order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReturnsTable {
    years: BTreeMap<i32, BTreeMap<Month, f64>>,
}

/// Outcome of a single upsert.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Upsert {
    Inserted,
    Overwritten { previous: f64 },
    Unchanged,
}

/// Counts from merging a batch of records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub inserted: usize,
    pub overwritten: usize,
    pub unchanged: usize,
}

impl MergeReport {
    pub fn total(&self) -> usize {
        self.inserted + self.overwritten + self.unchanged
    }

    /// True if the merge altered at least one cell.
    pub fn changed(&self) -> bool {
        self.inserted + self.overwritten > 0
    }
}

impl ReturnsTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite one cell. The last write for a key wins.
    pub fn upsert(&mut self, year: i32, month: Month, value: f64) -> Upsert {
        match self.years.entry(year).or_default().insert(month, value) {
            None => Upsert::Inserted,
            Some(previous) if previous == value => Upsert::Unchanged,
            Some(previous) => Upsert::Overwritten { previous },
        }
    }

    /// Upsert every record in order. An empty batch is a no-op.
    pub fn merge<'a, I>(&mut self, records: I) -> MergeReport
    where
        I: IntoIterator<Item = &'a MonthlyReturn>,
    {
        let mut report = MergeReport::default();
        for rec in records {
            match self.upsert(rec.year, rec.month, rec.return_pct) {
                Upsert::Inserted => report.inserted += 1,
                Upsert::Overwritten { previous } => {
                    tracing::debug!(
                        year = rec.year,
                        month = %rec.month,
                        previous,
                        value = rec.return_pct,
                        "overwrote stored return"
                    );
                    report.overwritten += 1;
                }
                Upsert::Unchanged => report.unchanged += 1,
            }
        }
        report
    }

    pub fn get(&self, year: i32, month: Month) -> Option<f64> {
        self.years.get(&year)?.get(&month).copied()
    }

    /// Month map for one year.
    pub fn year(&self, year: i32) -> Option<&BTreeMap<Month, f64>> {
        self.years.get(&year)
    }

    /// Years present, ascending.
    pub fn years(&self) -> impl DoubleEndedIterator<Item = i32> + '_ {
        self.years.keys().copied()
    }

    /// Number of month cells across all years.
    pub fn len(&self) -> usize {
        self.years.values().map(|m| m.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All cells in chronological order.
    pub fn iter(&self) -> impl Iterator<Item = MonthlyReturn> + '_ {
        self.years.iter().flat_map(|(&year, months)| {
            months
                .iter()
                .map(move |(&month, &value)| MonthlyReturn::new(year, month, value))
        })
    }

    /// Earliest and latest cells, if any.
    pub fn span(&self) -> Option<((i32, Month), (i32, Month))> {
        let first = self.iter().next()?.key();
        let last = self.iter().last()?.key();
        Some((first, last))
    }
}

impl FromIterator<MonthlyReturn> for ReturnsTable {
    fn from_iter<T: IntoIterator<Item = MonthlyReturn>>(iter: T) -> Self {
        let records: Vec<_> = iter.into_iter().collect();
        let mut table = ReturnsTable::new();
        table.merge(&records);
        table
    }
}
