use polars::prelude::PolarsError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("column '{0}' not found")]
    MissingColumn(String),
    #[error("column lengths are inconsistent")]
    LengthMismatch,
    #[error("low > high at row {row} (low={low}, high={high})")]
    InvertedRange { row: usize, low: f64, high: f64 },
    #[error("unsupported timestamp at row {row}: {value}")]
    UnsupportedTimestamp { row: usize, value: String },
    #[error("invalid numeric value in column '{column}' at row {row}: {value}")]
    InvalidNumber {
        column: String,
        row: usize,
        value: String,
    },
    #[error("timestamp at row {row} does not advance past the previous row")]
    NonMonotonic { row: usize },
    #[error(transparent)]
    Polars(#[from] PolarsError),
}

/// Failure of the external fetch collaborator. The windowed series absorbs
/// every variant by falling back to synthetic generation.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("no data source available: {0}")]
    Unavailable(String),
    #[error("transport failed: {0}")]
    Transport(String),
    #[error("response could not be decoded: {0}")]
    Decode(String),
}

impl From<serde_json::Error> for FetchError {
    fn from(err: serde_json::Error) -> Self {
        FetchError::Decode(err.to_string())
    }
}
