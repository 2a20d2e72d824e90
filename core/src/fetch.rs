use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use crate::{Candle, FetchError, Interval, Timestamp};

/// External source of older candles.
///
/// Implementations return raw rows as they came off the wire; the windowed
/// series validates them with [`parse_records`].
#[async_trait]
pub trait CandleFetcher: Send + Sync {
    async fn fetch_older_candles(
        &self,
        symbol: &str,
        interval: Interval,
        count: usize,
        before: Timestamp,
    ) -> Result<Vec<Value>, FetchError>;
}

/// A fetcher for sessions without any live source: every request fails, so
/// the series is built from synthetic data only.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineFetcher;

#[async_trait]
impl CandleFetcher for OfflineFetcher {
    async fn fetch_older_candles(
        &self,
        symbol: &str,
        _interval: Interval,
        _count: usize,
        _before: Timestamp,
    ) -> Result<Vec<Value>, FetchError> {
        Err(FetchError::Unavailable(format!("offline session for {symbol}")))
    }
}

/// Encodes a candle in the array row shape accepted by [`parse_records`].
pub fn candle_to_row(candle: &Candle) -> Value {
    serde_json::json!([
        candle.timestamp,
        candle.open,
        candle.high,
        candle.low,
        candle.close,
        candle.volume,
    ])
}

/// Converts raw rows into candles strictly older than `before`, newest
/// first. Malformed rows are skipped one by one.
pub fn parse_records(rows: &[Value], before: Timestamp) -> Vec<Candle> {
    let mut candles: Vec<Candle> = rows
        .iter()
        .enumerate()
        .filter_map(|(idx, row)| match parse_row(row) {
            Some(candle) if candle.timestamp < before && candle.is_well_formed() => Some(candle),
            Some(candle) => {
                warn!(
                    row = idx,
                    timestamp = candle.timestamp,
                    "skipping out-of-range or inconsistent candle"
                );
                None
            }
            None => {
                warn!(row = idx, "skipping malformed candle record");
                None
            }
        })
        .collect();

    candles.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    candles.dedup_by_key(|c| c.timestamp);
    candles
}

fn parse_row(row: &Value) -> Option<Candle> {
    match row {
        Value::Array(fields) if fields.len() >= 6 => Some(Candle {
            timestamp: as_timestamp(&fields[0])?,
            open: as_number(&fields[1])?,
            high: as_number(&fields[2])?,
            low: as_number(&fields[3])?,
            close: as_number(&fields[4])?,
            volume: as_number(&fields[5])?,
        }),
        Value::Object(map) => Some(Candle {
            timestamp: as_timestamp(map.get("timestamp")?)?,
            open: as_number(map.get("open")?)?,
            high: as_number(map.get("high")?)?,
            low: as_number(map.get("low")?)?,
            close: as_number(map.get("close")?)?,
            volume: as_number(map.get("volume")?)?,
        }),
        _ => None,
    }
}

fn as_timestamp(value: &Value) -> Option<Timestamp> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}
