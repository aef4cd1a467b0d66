//! Data-source collaborators: anything that can hand back daily closes.

pub mod csv_import;
pub mod provider;
pub mod yahoo;

pub use csv_import::CsvSource;
pub use provider::{FetchWindow, PriceSource, SourceError};
pub use yahoo::YahooSource;
