#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rust_2018_idioms,
    missing_docs
)]

//! TAU collector – converts the engine's columnar parquet output into
//! per-run CSV tables and per-metric summary series.

/// Parquet discovery, unnesting, and CSV conversion.
#[path = "../convert.rs"]
pub mod convert;

/// Per-metric series accumulation across artifacts.
#[path = "../aggregate.rs"]
pub mod aggregate;

pub use aggregate::{SeriesAggregator, POSITIVITY_METRIC, TIME_SERIES_TABLE};
pub use convert::{
    convert_directory, discover_parquet, frame_to_csv, parquet_to_frame, parse_run_label,
    run_id_from_path, RunLabel,
};
