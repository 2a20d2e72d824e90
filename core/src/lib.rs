//! Data windowing and coordinate engine for a scrollable candlestick chart.

mod error;
mod fetch;
mod generator;
mod load;
mod resample;
mod ticks;
mod types;
mod viewport;
mod window;

pub use error::{FetchError, LoadError};
pub use fetch::{CandleFetcher, OfflineFetcher, candle_to_row, parse_records};
pub use generator::{MarketGenerator, MarkovState, TREND_BIAS_LIMIT, VolumeBounds};
pub use load::{ColumnMapping, LoadOptions, load_csv, load_parquet};
pub use resample::{native_spacing, resample};
pub use ticks::{calculate_nice_ticks, calculate_ticks, nice_number};
pub use types::*;
pub use viewport::{ChartRect, DEFAULT_CANDLE_WIDTH, ViewportTransform, ZoomBounds};
pub use window::{
    BackfillReport, BackfillSource, Collaborators, DEFAULT_BACKFILL_BATCH, DEFAULT_PREFETCH_SIZE,
    DEFAULT_WINDOW_WIDTH, RedrawNotifier, ShiftOutcome, WindowConfig, WindowedSeries,
    clamp_window,
};
