//! Return Deriver: daily closes to month-over-month percentage returns.
//!
//! Each calendar month is represented by its last available close. A month's
//! return is the change from the previous represented month's close. The
//! first represented month has no predecessor and yields nothing. Months with
//! no samples are absent, so a gap month's successor is measured against the
//! last month that did have data.

use crate::domain::{Month, MonthlyReturn, PriceSample};
use chrono::{Datelike, NaiveDate};
use std::collections::BTreeMap;

/// Last close of one calendar month.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RepresentativeClose {
    pub year: i32,
    pub month: Month,
    /// Date of the sample that was selected.
    pub date: NaiveDate,
    pub close: f64,
}

/// Round a percentage to 2 decimals, half away from zero.
///
/// This is the only place rounding happens. Values read back from the store
/// are never passed through here again.
pub fn round_pct(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Per-month representative closes in chronological order.
///
/// Input order does not matter: within a month the sample with the latest
/// date wins, and for equal dates the later one in the slice wins.
pub fn representative_closes(samples: &[PriceSample]) -> Vec<RepresentativeClose> {
    let mut by_month: BTreeMap<(i32, Month), PriceSample> = BTreeMap::new();

    for sample in samples {
        let key = (sample.date.year(), Month::from_date(sample.date));
        let keep_existing = by_month
            .get(&key)
            .is_some_and(|current| current.date > sample.date);
        if !keep_existing {
            by_month.insert(key, *sample);
        }
    }

    by_month
        .into_iter()
        .map(|((year, month), s)| RepresentativeClose {
            year,
            month,
            date: s.date,
            close: s.close,
        })
        .collect()
}

/// Derive one rounded return per month-to-month transition.
///
/// `N` distinct months in → `max(N - 1, 0)` records out. Empty and
/// single-month inputs yield an empty vector.
///
/// A transition whose return overflows to infinity (or is NaN) is skipped
/// with a warning. Such a value cannot be stored and read back.
pub fn derive_monthly_returns(samples: &[PriceSample]) -> Vec<MonthlyReturn> {
    representative_closes(samples)
        .windows(2)
        .filter_map(|pair| {
            let (prev, curr) = (&pair[0], &pair[1]);
            let pct = round_pct((curr.close - prev.close) / prev.close * 100.0);
            if !pct.is_finite() {
                tracing::warn!(
                    year = curr.year,
                    month = %curr.month,
                    prev_close = prev.close,
                    close = curr.close,
                    "skipping non-finite monthly return"
                );
                return None;
            }
            Some(MonthlyReturn::new(curr.year, curr.month, pct))
        })
        .collect()
}
