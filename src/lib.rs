//! Eurostat macro indicators: download, normalize, cache, tabulate and chart.
//!
//! The core path is [`fetch::EurostatClient`]: one GET per (indicator, geo), raw JSON-stat
//! bodies cached on disk, flattened into [`table::Observation`] rows with percent changes.

pub mod cache;
pub mod catalog;
pub mod changes;
pub mod chart;
pub mod fetch;
pub mod jsonstat;
pub mod period;
pub mod sheets;
pub mod stats;
pub mod table;

pub use cache::{CacheMode, ResponseCache};
pub use catalog::{Catalog, Frequency, Indicator};
pub use fetch::{EurostatClient, FetchStats};
pub use table::{IndicatorFrame, Observation, WideTable};
