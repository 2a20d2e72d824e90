//! Bounded Markov-chain OHLCV simulator.
//!
//! Used for the initial series when no source answers and for backfill when
//! a fetch fails. The generator never errors: every input is clamped.

use std::env;
use std::fmt;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::{Candle, Interval, Timestamp, now_ms};

pub const TREND_BIAS_LIMIT: f64 = 0.002;
const TREND_THRESHOLD: f64 = 0.0005;
const TREND_ENTRY_BIAS: f64 = 0.001;
const REGIME_CHANGE_PROBABILITY: f64 = 0.05;
const REGIME_BIAS_SCALE: f64 = 0.002;
const DEFAULT_START_PRICE: f64 = 100.0;
// Floor for a single step so the price stays positive at large volatility.
const MIN_CLOSE_RATIO: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolumeBounds {
    pub min: f64,
    pub max: f64,
}

impl VolumeBounds {
    pub const DEFAULT_MIN: f64 = 100_000_000.0;
    pub const DEFAULT_MAX: f64 = 10_000_000_000.0;

    pub fn new(min: f64, max: f64) -> Self {
        let valid = |v: f64| v.is_finite() && v > 0.0;
        let min = if valid(min) { min } else { Self::DEFAULT_MIN };
        let max = if valid(max) { max } else { Self::DEFAULT_MAX };
        Self {
            min: min.min(max),
            max: min.max(max),
        }
    }

    pub fn clamp(&self, volume: f64) -> f64 {
        volume.clamp(self.min, self.max)
    }
}

impl Default for VolumeBounds {
    fn default() -> Self {
        let read = |key: &str, fallback: f64| {
            env::var(key)
                .ok()
                .and_then(|v| v.parse::<f64>().ok())
                .unwrap_or(fallback)
        };
        Self::new(
            read("KBAR_VOLUME_MIN", Self::DEFAULT_MIN),
            read("KBAR_VOLUME_MAX", Self::DEFAULT_MAX),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkovState {
    Uptrend,
    Downtrend,
    Ranging,
}

impl MarkovState {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarkovState::Uptrend => "uptrend",
            MarkovState::Downtrend => "downtrend",
            MarkovState::Ranging => "ranging",
        }
    }
}

impl fmt::Display for MarkovState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub struct MarketGenerator {
    current_price: f64,
    current_volume: f64,
    volatility: f64,
    trend_bias: f64,
    volume_bounds: VolumeBounds,
    rng: StdRng,
}

impl fmt::Debug for MarketGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MarketGenerator")
            .field("current_price", &self.current_price)
            .field("current_volume", &self.current_volume)
            .field("volatility", &self.volatility)
            .field("trend_bias", &self.trend_bias)
            .finish_non_exhaustive()
    }
}

impl MarketGenerator {
    /// `seed` pins the random stream; `None` draws one from the OS.
    pub fn new(start_price: f64, volatility: f64, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let volume_bounds = VolumeBounds::default();
        let mut generator = Self {
            current_price: DEFAULT_START_PRICE,
            current_volume: (volume_bounds.min * volume_bounds.max).sqrt(),
            volatility: 1.0,
            trend_bias: 0.0,
            volume_bounds,
            rng,
        };
        generator.reseed_price(start_price);
        generator.set_volatility(volatility);
        generator
    }

    pub fn with_volume_bounds(mut self, bounds: VolumeBounds) -> Self {
        self.volume_bounds = bounds;
        self.current_volume = bounds.clamp(self.current_volume);
        self
    }

    pub fn current_price(&self) -> f64 {
        self.current_price
    }

    pub fn current_volume(&self) -> f64 {
        self.current_volume
    }

    pub fn trend_bias(&self) -> f64 {
        self.trend_bias
    }

    pub fn volume_bounds(&self) -> VolumeBounds {
        self.volume_bounds
    }

    /// Continues from a known price, e.g. the last close of live data.
    pub fn reseed_price(&mut self, price: f64) {
        if price.is_finite() && price > 0.0 {
            self.current_price = price;
        }
    }

    pub fn set_volatility(&mut self, volatility: f64) {
        self.volatility = if volatility.is_finite() && volatility > 0.0 {
            volatility
        } else {
            1.0
        };
    }

    pub fn set_trend_bias(&mut self, bias: f64) {
        self.trend_bias = if bias.is_finite() {
            bias.clamp(-TREND_BIAS_LIMIT, TREND_BIAS_LIMIT)
        } else {
            0.0
        };
    }

    /// Resolves this candle's regime from the trend bias and one draw,
    /// decaying or flipping the bias along the way.
    pub fn markov_state(&mut self) -> MarkovState {
        let roll: f64 = self.rng.r#gen();
        let bias = self.trend_bias;
        if bias > TREND_THRESHOLD {
            if roll < 0.60 {
                MarkovState::Uptrend
            } else if roll < 0.85 {
                self.trend_bias = bias * 0.5;
                MarkovState::Ranging
            } else {
                self.trend_bias = -bias.abs();
                MarkovState::Downtrend
            }
        } else if bias < -TREND_THRESHOLD {
            if roll < 0.60 {
                MarkovState::Downtrend
            } else if roll < 0.85 {
                self.trend_bias = bias * 0.5;
                MarkovState::Ranging
            } else {
                self.trend_bias = bias.abs();
                MarkovState::Uptrend
            }
        } else if roll < 0.50 {
            MarkovState::Ranging
        } else if roll < 0.75 {
            self.trend_bias = TREND_ENTRY_BIAS;
            MarkovState::Uptrend
        } else {
            self.trend_bias = -TREND_ENTRY_BIAS;
            MarkovState::Downtrend
        }
    }

    fn price_change(&mut self, state: MarkovState) -> f64 {
        let price = self.current_price;
        let change = match state {
            MarkovState::Uptrend => {
                let base = (self.rng.gen_range(0.0..0.02) + self.trend_bias) * price;
                if self.rng.gen_bool(0.7) {
                    base.abs()
                } else {
                    -0.5 * base.abs()
                }
            }
            MarkovState::Downtrend => {
                let base = (self.rng.gen_range(0.0..0.02) - self.trend_bias) * price;
                if self.rng.gen_bool(0.7) {
                    -base.abs()
                } else {
                    0.5 * base.abs()
                }
            }
            MarkovState::Ranging => (self.rng.r#gen::<f64>() - 0.5) * 0.01 * price,
        };
        change * self.volatility
    }

    /// Produces one candle opening at the current price and advances it.
    pub fn next_candle(&mut self, timestamp: Timestamp) -> Candle {
        let state = self.markov_state();
        let open = self.current_price;
        let close = (open + self.price_change(state)).max(open * MIN_CLOSE_RATIO);
        let change = close - open;

        let wick = change.abs() * (0.5 + self.rng.r#gen::<f64>() * 1.5);
        let body_high = open.max(close);
        let body_low = open.min(close);
        let mut high = body_high + wick * self.rng.r#gen::<f64>();
        let mut low = (body_low - wick * self.rng.r#gen::<f64>()).max(0.0);
        if high < body_high {
            high = body_high * 1.001;
        }
        if low > body_low {
            low = body_low * 0.999;
        }

        let swing = (self.rng.r#gen::<f64>() - 0.5) * 0.3 + (change / open).abs() * 2.0;
        self.current_volume = self.volume_bounds.clamp(self.current_volume * (1.0 + swing));

        self.current_price = close;

        if self.rng.gen_bool(REGIME_CHANGE_PROBABILITY) {
            let bias = (self.rng.r#gen::<f64>() - 0.5) * REGIME_BIAS_SCALE;
            self.set_trend_bias(bias);
        }

        Candle {
            timestamp,
            open,
            high,
            low,
            close,
            volume: self.current_volume,
        }
    }

    /// `count` chronological candles ending one interval before now.
    pub fn generate(&mut self, count: usize, interval: Interval) -> Vec<Candle> {
        let start = now_ms() - count as i64 * interval.as_millis();
        self.generate_from(count, interval, start)
    }

    pub fn generate_from(
        &mut self,
        count: usize,
        interval: Interval,
        start: Timestamp,
    ) -> Vec<Candle> {
        let step = interval.as_millis();
        (0..count)
            .map(|i| self.next_candle(start + i as i64 * step))
            .collect()
    }

    /// `count` candles walking backward from `before`, newest first.
    ///
    /// Each forward candle is mirrored in time so an older candle closes
    /// where its newer neighbour opens; reseed with the oldest known open
    /// to stitch onto existing history.
    pub fn generate_before(
        &mut self,
        count: usize,
        interval: Interval,
        before: Timestamp,
    ) -> Vec<Candle> {
        let step = interval.as_millis();
        (0..count)
            .map(|i| {
                let forward = self.next_candle(before - (i as i64 + 1) * step);
                Candle {
                    open: forward.close,
                    close: forward.open,
                    ..forward
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    fn generator(seed: u64) -> MarketGenerator {
        MarketGenerator::new(42_000.0, 1.0, Some(seed))
            .with_volume_bounds(VolumeBounds::new(1e8, 1e10))
    }

    #[quickcheck]
    fn candles_respect_ohlc_and_volume_bounds(seed: u64, volatility: u8) -> bool {
        let mut g = generator(seed);
        g.set_volatility(0.25 + volatility as f64 / 16.0);
        g.generate(300, Interval::Minute(1)).iter().all(|c| {
            c.high >= c.open.max(c.close)
                && c.low <= c.open.min(c.close)
                && (1e8..=1e10).contains(&c.volume)
                && c.close > 0.0
        })
    }

    #[test]
    fn hourly_sequence_is_evenly_spaced() {
        let mut g = generator(7);
        let candles = g.generate(50, Interval::from_label("1h"));
        assert_eq!(candles.len(), 50);
        for pair in candles.windows(2) {
            assert_eq!(pair[1].timestamp - pair[0].timestamp, 3_600_000);
        }
        let expected_start = now_ms() - 50 * 3_600_000;
        assert!((candles[0].timestamp - expected_start).abs() < 60_000);
    }

    #[test]
    fn sequence_is_price_continuous() {
        let mut g = generator(11);
        let candles = g.generate(100, Interval::Minute(5));
        for pair in candles.windows(2) {
            assert_eq!(pair[1].open, pair[0].close);
        }
        assert_eq!(g.current_price(), candles.last().unwrap().close);
    }

    #[test]
    fn backward_generation_stitches_onto_open() {
        let mut g = generator(3);
        g.reseed_price(250.0);
        let older = g.generate_before(20, Interval::Hour(1), 1_000 * 3_600_000);
        assert_eq!(older[0].close, 250.0);
        assert_eq!(older[0].timestamp, 999 * 3_600_000);
        for pair in older.windows(2) {
            assert_eq!(pair[0].open, pair[1].close);
            assert_eq!(pair[0].timestamp - pair[1].timestamp, 3_600_000);
            assert!(pair[1].is_well_formed());
        }
    }

    #[test]
    fn biased_up_stays_uptrend_about_sixty_percent() {
        let mut g = generator(2024);
        let mut up = 0usize;
        for _ in 0..10_000 {
            g.set_trend_bias(0.001);
            let state = g.markov_state();
            assert!(matches!(state.as_str(), "uptrend" | "downtrend" | "ranging"));
            if state == MarkovState::Uptrend {
                up += 1;
            }
        }
        let share = up as f64 / 10_000.0;
        assert!((0.57..=0.63).contains(&share), "uptrend share {share}");
    }

    #[test]
    fn ranging_regime_enters_trends_with_fixed_bias() {
        let mut g = generator(5);
        for _ in 0..1_000 {
            g.set_trend_bias(0.0);
            match g.markov_state() {
                MarkovState::Uptrend => assert_eq!(g.trend_bias(), 0.001),
                MarkovState::Downtrend => assert_eq!(g.trend_bias(), -0.001),
                MarkovState::Ranging => assert_eq!(g.trend_bias(), 0.0),
            }
        }
    }

    #[test]
    fn trend_bias_stays_bounded() {
        let mut g = generator(9);
        g.set_trend_bias(0.5);
        assert_eq!(g.trend_bias(), TREND_BIAS_LIMIT);
        for _ in 0..5_000 {
            g.next_candle(0);
            assert!(g.trend_bias().abs() <= TREND_BIAS_LIMIT);
        }
    }

    #[test]
    fn invalid_inputs_fall_back() {
        let mut g = MarketGenerator::new(-5.0, f64::NAN, Some(1));
        assert_eq!(g.current_price(), DEFAULT_START_PRICE);
        let c = g.next_candle(0);
        assert!(c.is_well_formed());
    }

    #[test]
    fn same_seed_same_series() {
        let a = generator(77).generate_from(10, Interval::Day(1), 0);
        let b = generator(77).generate_from(10, Interval::Day(1), 0);
        assert_eq!(a, b);
    }
}
