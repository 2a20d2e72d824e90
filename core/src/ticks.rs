//! Axis tick planning.
//!
//! Price axes use "nice" ticks snapped to `{1, 2, 5, 10} x 10^k`; the time
//! axis uses plain linear spacing between the visible endpoints.

use crate::NumericRange;

const MAX_NICE_TICKS: usize = 1_000;

/// Snaps `x` to a round value with a mantissa from `{1, 2, 5, 10}`.
///
/// With `round` the mantissa goes to the nearest candidate (thresholds 1.5,
/// 3 and 7); without it, to the smallest candidate not below the mantissa.
/// Non-positive or non-finite input yields `1.0`.
pub fn nice_number(x: f64, round: bool) -> f64 {
    if !(x.is_finite() && x > 0.0) {
        return 1.0;
    }
    let exp = x.log10().floor();
    let magnitude = 10f64.powf(exp);
    let fraction = x / magnitude;

    let snapped = if round {
        if fraction < 1.5 {
            1.0
        } else if fraction < 3.0 {
            2.0
        } else if fraction < 7.0 {
            5.0
        } else {
            10.0
        }
    } else if fraction <= 1.0 {
        1.0
    } else if fraction <= 2.0 {
        2.0
    } else if fraction <= 5.0 {
        5.0
    } else {
        10.0
    };

    snapped * magnitude
}

/// Evenly spaced round ticks covering `range`.
///
/// The first tick is `<= range.min` and the last `>= range.max`, so the
/// output can hold a few more than `max_ticks` values. `max_ticks` is held
/// to `[2, MAX_NICE_TICKS]`.
pub fn calculate_nice_ticks(range: NumericRange, max_ticks: usize) -> Vec<f64> {
    let range = range.non_degenerate();
    let max_ticks = max_ticks.clamp(2, MAX_NICE_TICKS);

    let tick_range = nice_number(range.span(), false);
    let spacing = nice_number(tick_range / (max_ticks - 1) as f64, true);

    let first = (range.min / spacing).floor() as i64;
    let last = (range.max / spacing).ceil() as i64;
    match last.checked_sub(first) {
        Some(steps) if (0..=MAX_NICE_TICKS as i64).contains(&steps) => {
            (first..=last).map(|k| k as f64 * spacing).collect()
        }
        // Spacing lost to float precision; fall back to the endpoints.
        _ => calculate_ticks(range, 2),
    }
}

/// `count` linearly spaced values including both endpoints.
///
/// `count == 1` yields `[range.min]`; `count == 0` yields nothing.
pub fn calculate_ticks(range: NumericRange, count: usize) -> Vec<f64> {
    match count {
        0 => Vec::new(),
        1 => vec![range.min],
        _ => {
            let step = range.span() / (count - 1) as f64;
            (0..count)
                .map(|i| {
                    if i == count - 1 {
                        range.max
                    } else {
                        range.min + step * i as f64
                    }
                })
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_even(ticks: &[f64]) {
        let step = ticks[1] - ticks[0];
        for pair in ticks.windows(2) {
            assert!(pair[1] > pair[0]);
            assert!(((pair[1] - pair[0]) - step).abs() < 1e-9 * step.abs().max(1.0));
        }
    }

    #[test]
    fn nice_number_rounds_to_nearest() {
        assert_eq!(nice_number(1.2, true), 1.0);
        assert_eq!(nice_number(2.5, true), 2.0);
        assert_eq!(nice_number(4.0, true), 5.0);
        assert_eq!(nice_number(8.0, true), 10.0);
        assert_eq!(nice_number(25.0, true), 20.0);
    }

    #[test]
    fn nice_number_ceils_without_round() {
        assert_eq!(nice_number(1.0, false), 1.0);
        assert_eq!(nice_number(1.2, false), 2.0);
        assert_eq!(nice_number(3.0, false), 5.0);
        assert_eq!(nice_number(94.0, false), 100.0);
        assert!((nice_number(0.034, false) - 0.05).abs() < 1e-12);
    }

    #[test]
    fn nice_number_guards_non_positive() {
        assert_eq!(nice_number(0.0, true), 1.0);
        assert_eq!(nice_number(-3.0, false), 1.0);
        assert_eq!(nice_number(f64::NAN, false), 1.0);
    }

    #[test]
    fn nice_ticks_cover_range() {
        let ticks = calculate_nice_ticks(NumericRange::new(3.0, 97.0), 5);
        assert_eq!(ticks, vec![0.0, 20.0, 40.0, 60.0, 80.0, 100.0]);
        assert!(ticks[0] <= 3.0);
        assert!(*ticks.last().unwrap() >= 97.0);
        assert_even(&ticks);
    }

    #[test]
    fn nice_ticks_on_price_scale() {
        let range = NumericRange::new(41_732.5, 42_918.25);
        let ticks = calculate_nice_ticks(range, 8);
        assert!(ticks[0] <= range.min);
        assert!(*ticks.last().unwrap() >= range.max);
        assert_even(&ticks);
    }

    #[test]
    fn nice_ticks_survive_degenerate_range() {
        let ticks = calculate_nice_ticks(NumericRange::new(10.0, 10.0), 5);
        assert!(ticks.len() >= 2);
        assert!(ticks[0] <= 10.0 && *ticks.last().unwrap() >= 10.0);
    }

    #[test]
    fn nice_ticks_clamp_max_ticks() {
        let ticks = calculate_nice_ticks(NumericRange::new(0.0, 10.0), 1);
        assert!(ticks.len() >= 2);
        assert_even(&ticks);
    }

    #[test]
    fn nice_ticks_output_is_bounded() {
        let ticks = calculate_nice_ticks(NumericRange::new(0.0, 1e6), usize::MAX);
        assert!(ticks.len() <= MAX_NICE_TICKS + 1);
        assert!(ticks[0] <= 0.0 && *ticks.last().unwrap() >= 1e6);
        assert_even(&ticks);
    }

    #[test]
    fn linear_ticks_include_endpoints() {
        let ticks = calculate_ticks(NumericRange::new(0.0, 10.0), 5);
        assert_eq!(ticks, vec![0.0, 2.5, 5.0, 7.5, 10.0]);
    }

    #[test]
    fn linear_ticks_single_and_empty() {
        let range = NumericRange::new(4.0, 9.0);
        assert_eq!(calculate_ticks(range, 1), vec![4.0]);
        assert!(calculate_ticks(range, 0).is_empty());
    }
}
