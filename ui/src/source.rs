use std::path::Path;

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use kbar_core::{
    Candle, CandleFetcher, FetchError, Interval, LoadOptions, Timestamp, candle_to_row, load_csv,
    load_parquet, native_spacing, resample,
};
use serde_json::Value;
use tracing::{debug, info};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SourceFormat {
    Csv,
    Parquet,
}

pub fn detect_format(path: &Path) -> Option<SourceFormat> {
    let ext = path.extension()?.to_string_lossy().to_ascii_lowercase();
    match ext.as_str() {
        "csv" => Some(SourceFormat::Csv),
        "parquet" | "parq" => Some(SourceFormat::Parquet),
        _ => None,
    }
}

/// Historical candles read from a local file and resampled to one interval,
/// served as raw rows the same way a remote feed would hand them out.
#[derive(Debug, Clone)]
pub struct FileSource {
    label: String,
    interval: Interval,
    candles: Vec<Candle>,
}

impl FileSource {
    pub fn open(path: &Path, format: Option<SourceFormat>, interval: Interval) -> Result<Self> {
        let format = format
            .or_else(|| detect_format(path))
            .ok_or_else(|| anyhow!("cannot detect format for {}", path.display()))?;
        let candles = match format {
            SourceFormat::Csv => load_csv(path, LoadOptions::default()),
            SourceFormat::Parquet => load_parquet(path, LoadOptions::default()),
        }
        .with_context(|| format!("failed to load {}", path.display()))?;

        let label = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let source = Self::from_candles(label, candles, interval)?;
        info!(
            source = %source.label,
            ?format,
            interval = %interval.label(),
            candles = source.len(),
            "file source opened"
        );
        Ok(source)
    }

    /// Resamples chronological `candles` to `interval`. An interval finer
    /// than the rows' own spacing is rejected.
    pub fn from_candles(
        label: impl Into<String>,
        candles: Vec<Candle>,
        interval: Interval,
    ) -> Result<Self> {
        let label = label.into();
        if let Some(native) = native_spacing(&candles) {
            if interval.as_millis() < native {
                bail!(
                    "{label} is spaced {native}ms apart, finer interval {} is not available",
                    interval.label()
                );
            }
        }
        Ok(Self {
            candles: resample(&candles, interval),
            label,
            interval,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn interval(&self) -> Interval {
        self.interval
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }
}

#[async_trait]
impl CandleFetcher for FileSource {
    async fn fetch_older_candles(
        &self,
        symbol: &str,
        interval: Interval,
        count: usize,
        before: Timestamp,
    ) -> Result<Vec<Value>, FetchError> {
        if interval != self.interval {
            return Err(FetchError::Unavailable(format!(
                "{} holds {} candles, {} requested",
                self.label,
                self.interval.label(),
                interval.label()
            )));
        }
        let end = self.candles.partition_point(|c| c.timestamp < before);
        if end == 0 {
            return Err(FetchError::Unavailable(format!(
                "{} has no history for {symbol} before {before}",
                self.label
            )));
        }
        let start = end.saturating_sub(count);
        debug!(source = %self.label, start, end, "serving file rows");
        Ok(self.candles[start..end].iter().map(candle_to_row).collect())
    }
}
