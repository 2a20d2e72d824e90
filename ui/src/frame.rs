use kbar_core::{
    Candle, Interval, NumericRange, ViewportTransform, calculate_nice_ticks, calculate_ticks,
    ms_to_datetime,
};
use time::macros::format_description;

const BODY_RATIO: f64 = 0.8;
const MAX_PRICE_TICKS: usize = 8;
const TIME_TICKS: usize = 6;

/// Screen-space geometry of one candle, ready to be painted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CandleGeometry {
    pub timestamp: i64,
    pub x: f64,
    pub open_y: f64,
    pub close_y: f64,
    pub high_y: f64,
    pub low_y: f64,
    pub width: f64,
    pub bullish: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AxisTick {
    pub value: f64,
    pub position: f64,
    pub label: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    pub candles: Vec<CandleGeometry>,
    pub price_ticks: Vec<AxisTick>,
    pub time_ticks: Vec<AxisTick>,
    pub candle_width: f64,
}

/// Projects chronological `candles` through `transform`.
///
/// Candles whose high, low and close all fall outside the panned range are
/// culled. Tick values cover the range currently on screen, so they follow
/// zoom as well as pan.
pub fn build_frame(transform: &ViewportTransform, candles: &[Candle], interval: Interval) -> Frame {
    let rect = transform.rect();
    let (zoom_x, _) = transform.zoom_factors();
    let candle_width = transform.calculate_candle_width(candles.len(), BODY_RATIO * zoom_x);

    let geometry = candles
        .iter()
        .filter(|c| {
            let ts = c.timestamp as f64;
            transform.is_visible(ts, c.high)
                || transform.is_visible(ts, c.low)
                || transform.is_visible(ts, c.close)
        })
        .map(|c| {
            let ts = c.timestamp as f64;
            let (x, open_y) = transform.data_to_screen(ts, c.open);
            CandleGeometry {
                timestamp: c.timestamp,
                x,
                open_y,
                close_y: transform.data_to_screen(ts, c.close).1,
                high_y: transform.data_to_screen(ts, c.high).1,
                low_y: transform.data_to_screen(ts, c.low).1,
                width: candle_width,
                bullish: c.is_bullish(),
            }
        })
        .collect();

    let (left, top) = transform.screen_to_data(rect.x, rect.y);
    let (right, bottom) = transform.screen_to_data(rect.x + rect.width, rect.y + rect.height);

    let price_values = calculate_nice_ticks(NumericRange::new(bottom, top), MAX_PRICE_TICKS);
    let step = match price_values.as_slice() {
        [a, b, ..] => b - a,
        _ => 1.0,
    };
    let price_ticks = price_values
        .into_iter()
        .filter_map(|value| {
            let position = transform.data_to_screen(left, value).1;
            (position >= rect.y && position <= rect.y + rect.height).then(|| AxisTick {
                value,
                position,
                label: format_price(value, step),
            })
        })
        .collect();

    let time_ticks = calculate_ticks(NumericRange::new(left, right), TIME_TICKS)
        .into_iter()
        .map(|value| AxisTick {
            value,
            position: transform.data_to_screen(value, bottom).0,
            label: format_time(value.round() as i64, interval),
        })
        .collect();

    Frame {
        candles: geometry,
        price_ticks,
        time_ticks,
        candle_width,
    }
}

/// Prints `value` with enough decimals to tell ticks `step` apart.
pub fn format_price(value: f64, step: f64) -> String {
    let decimals = if step.is_finite() && step > 0.0 {
        (-step.log10().floor()).max(0.0) as usize
    } else {
        2
    };
    format!("{value:.decimals$}")
}

pub fn format_time(ts: i64, interval: Interval) -> String {
    let Some(dt) = ms_to_datetime(ts) else {
        return String::new();
    };
    let formatted = match interval {
        Interval::Day(_) => dt.format(format_description!("[year]-[month]-[day]")),
        _ => dt.format(format_description!("[month]-[day] [hour]:[minute]")),
    };
    formatted.unwrap_or_default()
}
