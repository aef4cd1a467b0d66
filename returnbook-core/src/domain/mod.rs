//! Domain types: calendar months, daily price samples, monthly return records.

pub mod month;
pub mod record;
pub mod sample;

pub use month::{Month, MonthParseError};
pub use record::MonthlyReturn;
pub use sample::PriceSample;
