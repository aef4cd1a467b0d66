//! Sample canonicalization: sort, validate, dedupe.
//!
//! Providers hand back whatever the upstream gave them. Before derivation the
//! series is put into canonical form: ascending by date, one sample per date
//! (the last one seen wins), no null or non-positive closes.

use crate::domain::PriceSample;
use std::collections::BTreeMap;

/// Result of canonicalizing a raw sample series.
#[derive(Debug, Clone, Default)]
pub struct IngestResult {
    pub samples: Vec<PriceSample>,
    /// Samples dropped for a non-finite or non-positive close.
    pub invalid: usize,
    /// Samples that shared a date with a later sample and were replaced.
    pub duplicates: usize,
}

pub fn canonicalize(raw: Vec<PriceSample>) -> IngestResult {
    let mut invalid = 0;
    let mut duplicates = 0;
    let mut by_date: BTreeMap<_, PriceSample> = BTreeMap::new();

    for sample in raw {
        if !sample.is_valid() {
            invalid += 1;
            continue;
        }
        if by_date.insert(sample.date, sample).is_some() {
            duplicates += 1;
        }
    }

    IngestResult {
        samples: by_date.into_values().collect(),
        invalid,
        duplicates,
    }
}
