use crate::{Candle, Interval, Timestamp};

/// Aggregates chronological `candles` into `interval` buckets aligned to the
/// epoch. Each bucket is stamped with its start.
pub fn resample(candles: &[Candle], interval: Interval) -> Vec<Candle> {
    let Some((first, rest)) = candles.split_first() else {
        return Vec::new();
    };

    let step = interval.as_millis();
    let mut out: Vec<Candle> = Vec::new();
    let mut acc = Candle {
        timestamp: align_timestamp(first.timestamp, step),
        ..*first
    };

    for c in rest {
        if c.timestamp < acc.timestamp + step {
            acc.high = acc.high.max(c.high);
            acc.low = acc.low.min(c.low);
            acc.close = c.close;
            acc.volume += c.volume;
        } else {
            out.push(acc);
            acc = Candle {
                timestamp: align_timestamp(c.timestamp, step),
                ..*c
            };
        }
    }
    out.push(acc);

    out
}

/// Smallest positive gap between consecutive timestamps.
pub fn native_spacing(candles: &[Candle]) -> Option<i64> {
    candles
        .windows(2)
        .map(|pair| pair[1].timestamp - pair[0].timestamp)
        .filter(|gap| *gap > 0)
        .min()
}

fn align_timestamp(ts: Timestamp, step: i64) -> Timestamp {
    if step <= 0 {
        return ts;
    }
    ts - ts.rem_euclid(step)
}
