use crate::{Candle, LoadError, Timestamp, datetime_to_ms};
use polars::datatypes::TimeUnit;
use polars::prelude::PlPathRef;
use polars::prelude::*;
use std::path::Path;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

#[derive(Debug, Clone)]
pub struct ColumnMapping {
    pub timestamp: String,
    pub open: String,
    pub high: String,
    pub low: String,
    pub close: String,
    pub volume: String,
}

impl Default for ColumnMapping {
    fn default() -> Self {
        Self {
            timestamp: "timestamp".into(),
            open: "open".into(),
            high: "high".into(),
            low: "low".into(),
            close: "close".into(),
            volume: "volume".into(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub columns: ColumnMapping,
}

/// Loads a chronological OHLCV series from a CSV file with a header row.
pub fn load_csv(path: impl AsRef<Path>, options: LoadOptions) -> Result<Vec<Candle>, LoadError> {
    let pl_path = PlPathRef::from_local_path(path.as_ref()).into_owned();
    let lf = LazyCsvReader::new(pl_path).with_has_header(true);
    let df = lf.finish()?.collect()?;
    parse_frame(df, &options.columns)
}

pub fn load_parquet(
    path: impl AsRef<Path>,
    options: LoadOptions,
) -> Result<Vec<Candle>, LoadError> {
    let pl_path = PlPathRef::from_local_path(path.as_ref()).into_owned();
    let lf = LazyFrame::scan_parquet(pl_path, ScanArgsParquet::default())?;
    let df = lf.collect()?;
    parse_frame(df, &options.columns)
}

fn parse_frame(df: DataFrame, columns: &ColumnMapping) -> Result<Vec<Candle>, LoadError> {
    let column = |name: &String| {
        df.column(name)
            .map_err(|_| LoadError::MissingColumn(name.clone()))
    };
    let ts = column(&columns.timestamp)?;
    let values = [
        (column(&columns.open)?, &columns.open),
        (column(&columns.high)?, &columns.high),
        (column(&columns.low)?, &columns.low),
        (column(&columns.close)?, &columns.close),
        (column(&columns.volume)?, &columns.volume),
    ];

    let len = ts.len();
    if values.iter().any(|(col, _)| col.len() != len) {
        return Err(LoadError::LengthMismatch);
    }

    let mut candles: Vec<Candle> = Vec::with_capacity(len);
    for row in 0..len {
        let timestamp = to_timestamp_ms(ts.get(row)?, row)?;
        let mut ohlcv = [0.0_f64; 5];
        for (slot, (col, name)) in ohlcv.iter_mut().zip(values.iter()) {
            *slot = to_f64(col.get(row)?, name, row)?;
        }
        let [open, high, low, close, volume] = ohlcv;

        if low > high {
            return Err(LoadError::InvertedRange { row, low, high });
        }
        if candles.last().is_some_and(|prev| prev.timestamp >= timestamp) {
            return Err(LoadError::NonMonotonic { row });
        }

        candles.push(Candle {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        });
    }

    Ok(candles)
}

fn to_timestamp_ms(value: AnyValue, row: usize) -> Result<Timestamp, LoadError> {
    match value {
        AnyValue::Datetime(ts, unit, _) => Ok(match unit {
            TimeUnit::Nanoseconds => ts / 1_000_000,
            TimeUnit::Microseconds => ts / 1_000,
            TimeUnit::Milliseconds => ts,
        }),
        AnyValue::Date(days) => Ok(days as i64 * crate::DAY_MS),
        // Bare integers are epoch milliseconds, matching the fetch wire shape.
        AnyValue::Int64(ms) => Ok(ms),
        AnyValue::UInt64(ms) => i64::try_from(ms).map_err(|_| LoadError::UnsupportedTimestamp {
            row,
            value: ms.to_string(),
        }),
        AnyValue::String(s) => OffsetDateTime::parse(s, &Rfc3339)
            .map(datetime_to_ms)
            .map_err(|err| LoadError::UnsupportedTimestamp {
                row,
                value: format!("{s} ({err})"),
            }),
        AnyValue::StringOwned(s) => to_timestamp_ms(AnyValue::String(&s), row),
        other => Err(LoadError::UnsupportedTimestamp {
            row,
            value: format!("{other:?}"),
        }),
    }
}

fn to_f64(value: AnyValue, column: &str, row: usize) -> Result<f64, LoadError> {
    let invalid = |value: String| LoadError::InvalidNumber {
        column: column.to_string(),
        row,
        value,
    };
    match value {
        AnyValue::Float64(v) => Ok(v),
        AnyValue::Float32(v) => Ok(v as f64),
        AnyValue::Int64(v) => Ok(v as f64),
        AnyValue::Int32(v) => Ok(v as f64),
        AnyValue::UInt64(v) => Ok(v as f64),
        AnyValue::UInt32(v) => Ok(v as f64),
        AnyValue::String(s) => s.parse::<f64>().map_err(|_| invalid(s.to_string())),
        AnyValue::StringOwned(s) => to_f64(AnyValue::String(&s), column, row),
        other => Err(invalid(format!("{other:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::{DataFrame, DataType, Int64Chunked, ParquetWriter, Series};
    use std::fs;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_path(ext: &str) -> std::path::PathBuf {
        let nonce = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!("kbar-load-{nonce}.{ext}"))
    }

    #[test]
    fn load_csv_with_rfc3339_timestamps() {
        let path = temp_path("csv");
        let body = [
            "timestamp,open,high,low,close,volume",
            "2024-01-01T00:00:00Z,1.0,2.0,0.5,1.5,100",
            "2024-01-01T00:01:00Z,1.5,2.5,1.0,2.0,150",
            "2024-01-01T00:02:00Z,2.0,3.0,1.5,2.5,200",
        ]
        .join("\n");
        fs::write(&path, body).unwrap();

        let candles = load_csv(&path, LoadOptions::default()).unwrap();
        fs::remove_file(&path).ok();

        assert_eq!(candles.len(), 3);
        assert_eq!(candles[0].timestamp, 1_704_067_200_000);
        assert_eq!(candles[2].timestamp - candles[1].timestamp, 60_000);
        assert_eq!(candles[1].close, 2.0);
    }

    #[test]
    fn rejects_out_of_order_rows() {
        let path = temp_path("csv");
        fs::write(
            &path,
            "timestamp,open,high,low,close,volume\n2000,1,2,0.5,1.5,1\n1000,1,2,0.5,1.5,1\n",
        )
        .unwrap();

        let err = load_csv(&path, LoadOptions::default()).unwrap_err();
        fs::remove_file(&path).ok();

        assert!(matches!(err, LoadError::NonMonotonic { row: 1 }));
    }

    #[test]
    fn errors_on_missing_column() {
        let path = temp_path("csv");
        fs::write(
            &path,
            "timestamp,open,high,low,close\n2024-01-01T00:00:00Z,1,2,0.5,1.5\n",
        )
        .unwrap();

        let err = load_csv(&path, LoadOptions::default()).unwrap_err();
        fs::remove_file(&path).ok();

        match err {
            LoadError::MissingColumn(name) => assert_eq!(name, "volume"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn load_parquet_datetime_series() {
        let path = temp_path("parquet");
        let ts_ms: Series = Int64Chunked::new(
            "timestamp".into(),
            &[1_704_300_000_000i64, 1_704_300_060_000, 1_704_300_120_000],
        )
        .into_series()
        .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))
        .unwrap();
        let mut df = DataFrame::new(vec![
            ts_ms.into(),
            Series::new("open".into(), &[1.0_f64, 1.5, 2.0]).into(),
            Series::new("high".into(), &[2.0_f64, 2.5, 3.0]).into(),
            Series::new("low".into(), &[0.5_f64, 1.0, 1.5]).into(),
            Series::new("close".into(), &[1.5_f64, 2.0, 2.5]).into(),
            Series::new("volume".into(), &[100.0_f64, 150.0, 200.0]).into(),
        ])
        .unwrap();
        let mut file = fs::File::create(&path).unwrap();
        ParquetWriter::new(&mut file).finish(&mut df).unwrap();

        let candles = load_parquet(&path, LoadOptions::default()).unwrap();
        fs::remove_file(&path).ok();

        assert_eq!(candles.len(), 3);
        assert_eq!(candles[0].timestamp, 1_704_300_000_000);
        assert_eq!(candles[2].volume, 200.0);
    }
}
