use time::{Duration, OffsetDateTime};

/// Milliseconds since the Unix epoch.
pub type Timestamp = i64;

pub const MINUTE_MS: i64 = 60_000;
pub const HOUR_MS: i64 = 60 * MINUTE_MS;
pub const DAY_MS: i64 = 24 * HOUR_MS;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candle {
    pub timestamp: Timestamp,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    /// `high`/`low` bracket the body, volume is positive and every field is finite.
    pub fn is_well_formed(&self) -> bool {
        let finite = [self.open, self.high, self.low, self.close, self.volume]
            .iter()
            .all(|v| v.is_finite());
        finite
            && self.high >= self.open.max(self.close)
            && self.low <= self.open.min(self.close)
            && self.volume > 0.0
    }

    pub fn is_bullish(&self) -> bool {
        self.close >= self.open
    }

    pub fn datetime(&self) -> Option<OffsetDateTime> {
        ms_to_datetime(self.timestamp)
    }
}

pub fn ms_to_datetime(ms: Timestamp) -> Option<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp_nanos(ms as i128 * 1_000_000).ok()
}

pub fn datetime_to_ms(dt: OffsetDateTime) -> Timestamp {
    (dt.unix_timestamp_nanos() / 1_000_000) as Timestamp
}

pub fn now_ms() -> Timestamp {
    datetime_to_ms(OffsetDateTime::now_utc())
}

/// Closed numeric interval used for both the price and the time axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NumericRange {
    pub min: f64,
    pub max: f64,
}

impl NumericRange {
    pub const UNIT: NumericRange = NumericRange { min: 0.0, max: 1.0 };

    /// Builds a range, swapping the bounds if they arrive reversed.
    pub fn new(a: f64, b: f64) -> Self {
        if a <= b {
            Self { min: a, max: b }
        } else {
            Self { min: b, max: a }
        }
    }

    pub fn span(&self) -> f64 {
        self.max - self.min
    }

    pub fn is_degenerate(&self) -> bool {
        let span = self.span();
        !(span.is_finite() && span > 0.0)
    }

    /// Zero-width ranges become a unit span centred on the single value.
    pub fn non_degenerate(&self) -> Self {
        if !self.min.is_finite() || !self.max.is_finite() {
            return Self::UNIT;
        }
        if self.is_degenerate() {
            let mid = (self.min + self.max) * 0.5;
            Self {
                min: mid - 0.5,
                max: mid + 0.5,
            }
        } else {
            *self
        }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    pub fn shifted(&self, offset: f64) -> Self {
        Self {
            min: self.min + offset,
            max: self.max + offset,
        }
    }

    /// Widens both ends by `ratio` of the span.
    pub fn padded(&self, ratio: f64) -> Self {
        let base = self.non_degenerate();
        let pad = (base.span() * ratio).max(0.0);
        Self {
            min: base.min - pad,
            max: base.max + pad,
        }
    }
}

/// Lowest low to highest high, or `[0,1]` for an empty slice.
pub fn price_range(candles: &[Candle]) -> NumericRange {
    if candles.is_empty() {
        return NumericRange::UNIT;
    }
    let mut min = f64::MAX;
    let mut max = f64::MIN;
    for c in candles {
        min = min.min(c.low);
        max = max.max(c.high);
    }
    NumericRange::new(min, max)
}

pub fn time_range(candles: &[Candle]) -> NumericRange {
    let mut stamps = candles.iter().map(|c| c.timestamp);
    let Some(first) = stamps.next() else {
        return NumericRange::UNIT;
    };
    let (min, max) = stamps.fold((first, first), |(lo, hi), ts| (lo.min(ts), hi.max(ts)));
    NumericRange::new(min as f64, max as f64)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interval {
    Minute(u32),
    Hour(u32),
    Day(u32),
}

impl Default for Interval {
    fn default() -> Self {
        Interval::Hour(1)
    }
}

impl Interval {
    pub const SUPPORTED: [Interval; 7] = [
        Interval::Minute(1),
        Interval::Minute(5),
        Interval::Minute(15),
        Interval::Minute(30),
        Interval::Hour(1),
        Interval::Hour(4),
        Interval::Day(1),
    ];

    pub fn as_millis(&self) -> i64 {
        match *self {
            Interval::Minute(n) => n as i64 * MINUTE_MS,
            Interval::Hour(n) => n as i64 * HOUR_MS,
            Interval::Day(n) => n as i64 * DAY_MS,
        }
    }

    pub fn as_duration(&self) -> Duration {
        Duration::milliseconds(self.as_millis())
    }

    pub fn label(&self) -> String {
        match *self {
            Interval::Minute(n) => format!("{n}m"),
            Interval::Hour(n) => format!("{n}h"),
            Interval::Day(n) => format!("{n}d"),
        }
    }

    /// Strict lookup against the supported label table.
    pub fn parse_label(label: &str) -> Option<Self> {
        let label = label.trim();
        Self::SUPPORTED.into_iter().find(|i| i.label() == label)
    }

    /// Like [`Interval::parse_label`] but unknown labels fall back to `1h`.
    pub fn from_label(label: &str) -> Self {
        Self::parse_label(label).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(ts: i64, low: f64, high: f64) -> Candle {
        Candle {
            timestamp: ts,
            open: low,
            high,
            low,
            close: high,
            volume: 1.0,
        }
    }

    #[test]
    fn interval_table_matches_labels() {
        assert_eq!(Interval::from_label("1m").as_millis(), 60_000);
        assert_eq!(Interval::from_label("5m").as_millis(), 300_000);
        assert_eq!(Interval::from_label("15m").as_millis(), 900_000);
        assert_eq!(Interval::from_label("30m").as_millis(), 1_800_000);
        assert_eq!(Interval::from_label("1h").as_millis(), 3_600_000);
        assert_eq!(Interval::from_label("4h").as_millis(), 14_400_000);
        assert_eq!(Interval::from_label("1d").as_millis(), 86_400_000);
    }

    #[test]
    fn unknown_interval_defaults_to_one_hour() {
        assert_eq!(Interval::from_label("7x"), Interval::Hour(1));
        assert_eq!(Interval::parse_label("2h"), None);
    }

    #[test]
    fn empty_series_ranges_default_to_unit() {
        assert_eq!(price_range(&[]), NumericRange::UNIT);
        assert_eq!(time_range(&[]), NumericRange::UNIT);
    }

    #[test]
    fn price_range_spans_lows_and_highs() {
        let candles = [candle(1, 2.0, 5.0), candle(2, 1.0, 3.0)];
        assert_eq!(price_range(&candles), NumericRange::new(1.0, 5.0));
        assert_eq!(time_range(&candles), NumericRange::new(1.0, 2.0));
    }

    #[test]
    fn degenerate_range_becomes_unit_span() {
        let r = NumericRange::new(4.0, 4.0).non_degenerate();
        assert_eq!(r, NumericRange::new(3.5, 4.5));
    }

    #[test]
    fn well_formed_rejects_inverted_wicks() {
        let mut c = candle(0, 1.0, 2.0);
        assert!(c.is_well_formed());
        c.high = 1.5;
        assert!(!c.is_well_formed());
        c.high = 2.0;
        c.volume = 0.0;
        assert!(!c.is_well_formed());
    }

    #[test]
    fn datetime_roundtrip() {
        let ts = 1_704_067_200_000;
        let dt = ms_to_datetime(ts).unwrap();
        assert_eq!(datetime_to_ms(dt), ts);
    }
}
