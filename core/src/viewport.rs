use std::env;

use crate::NumericRange;

pub const DEFAULT_CANDLE_WIDTH: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoomBounds {
    pub min: f64,
    pub max: f64,
}

impl ZoomBounds {
    pub const DEFAULT_MIN: f64 = 0.1;
    pub const DEFAULT_MAX: f64 = 100.0;

    /// Orders the bounds and keeps the minimum strictly positive.
    pub fn new(min: f64, max: f64) -> Self {
        let valid = |v: f64| v.is_finite() && v > 0.0;
        let min = if valid(min) { min } else { Self::DEFAULT_MIN };
        let max = if valid(max) { max } else { Self::DEFAULT_MAX };
        Self {
            min: min.min(max),
            max: min.max(max),
        }
    }

    pub fn clamp(&self, zoom: f64) -> f64 {
        zoom.clamp(self.min, self.max)
    }
}

impl Default for ZoomBounds {
    fn default() -> Self {
        let read = |key: &str, fallback: f64| {
            env::var(key)
                .ok()
                .and_then(|v| v.parse::<f64>().ok())
                .unwrap_or(fallback)
        };
        Self::new(
            read("KBAR_ZOOM_MIN", Self::DEFAULT_MIN),
            read("KBAR_ZOOM_MAX", Self::DEFAULT_MAX),
        )
    }
}

/// Pixel rectangle the chart body occupies.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChartRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl ChartRect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width: width.max(1.0),
            height: height.max(1.0),
        }
    }

    pub fn contains(&self, px: f64, py: f64) -> bool {
        px >= self.x && px <= self.x + self.width && py >= self.y && py <= self.y + self.height
    }
}

/// Bidirectional data/screen mapping with zoom and pan.
///
/// The effective visible span on each axis is the data span divided by the
/// zoom factor, anchored at the panned range minimum. Screen Y grows
/// downward, so the data maximum maps to the top row of the chart rect.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewportTransform {
    rect: ChartRect,
    x_range: NumericRange,
    y_range: NumericRange,
    zoom_x: f64,
    zoom_y: f64,
    pan_x: f64,
    pan_y: f64,
    bounds: ZoomBounds,
}

impl ViewportTransform {
    pub fn new(rect: ChartRect) -> Self {
        Self::with_bounds(rect, ZoomBounds::default())
    }

    pub fn with_bounds(rect: ChartRect, bounds: ZoomBounds) -> Self {
        Self {
            rect,
            x_range: NumericRange::UNIT,
            y_range: NumericRange::UNIT,
            zoom_x: 1.0,
            zoom_y: 1.0,
            pan_x: 0.0,
            pan_y: 0.0,
            bounds,
        }
    }

    pub fn rect(&self) -> ChartRect {
        self.rect
    }

    pub fn zoom_factors(&self) -> (f64, f64) {
        (self.zoom_x, self.zoom_y)
    }

    pub fn pan_offsets(&self) -> (f64, f64) {
        (self.pan_x, self.pan_y)
    }

    pub fn set_data_range(&mut self, x_min: f64, x_max: f64, y_min: f64, y_max: f64) {
        self.x_range = NumericRange::new(x_min, x_max);
        self.y_range = NumericRange::new(y_min, y_max);
    }

    pub fn data_range(&self) -> (NumericRange, NumericRange) {
        (self.x_range, self.y_range)
    }

    fn panned_x(&self) -> NumericRange {
        self.x_range.non_degenerate().shifted(self.pan_x)
    }

    fn panned_y(&self) -> NumericRange {
        self.y_range.non_degenerate().shifted(self.pan_y)
    }

    fn effective_span_x(&self) -> f64 {
        self.panned_x().span() / self.zoom_x
    }

    fn effective_span_y(&self) -> f64 {
        self.panned_y().span() / self.zoom_y
    }

    pub fn data_to_screen(&self, x: f64, y: f64) -> (f64, f64) {
        let norm_x = (x - self.panned_x().min) / self.effective_span_x();
        let norm_y = (y - self.panned_y().min) / self.effective_span_y();
        (
            self.rect.x + norm_x * self.rect.width,
            self.rect.y + (1.0 - norm_y) * self.rect.height,
        )
    }

    pub fn screen_to_data(&self, px: f64, py: f64) -> (f64, f64) {
        let norm_x = (px - self.rect.x) / self.rect.width;
        let norm_y = 1.0 - (py - self.rect.y) / self.rect.height;
        (
            self.panned_x().min + norm_x * self.effective_span_x(),
            self.panned_y().min + norm_y * self.effective_span_y(),
        )
    }

    /// Scales both axes by `factor` while the data point under
    /// `(center_px, center_py)` stays at that pixel.
    pub fn zoom(&mut self, factor: f64, center_px: f64, center_py: f64) {
        if !(factor.is_finite() && factor > 0.0 && center_px.is_finite() && center_py.is_finite()) {
            return;
        }
        let (anchor_x, anchor_y) = self.screen_to_data(center_px, center_py);

        self.zoom_x = self.bounds.clamp(self.zoom_x * factor);
        self.zoom_y = self.bounds.clamp(self.zoom_y * factor);

        let (moved_px, moved_py) = self.data_to_screen(anchor_x, anchor_y);
        self.pan_x += (moved_px - center_px) * self.effective_span_x() / self.rect.width;
        self.pan_y += (center_py - moved_py) * self.effective_span_y() / self.rect.height;
    }

    /// Non-finite deltas are ignored.
    pub fn pan(&mut self, delta_px: f64, delta_py: f64) {
        if !(delta_px.is_finite() && delta_py.is_finite()) {
            return;
        }
        self.pan_x += delta_px * self.effective_span_x() / self.rect.width;
        self.pan_y -= delta_py * self.effective_span_y() / self.rect.height;
    }

    /// Coarse culling against the panned range; zoom is ignored.
    pub fn is_visible(&self, x: f64, y: f64) -> bool {
        self.panned_x().contains(x) && self.panned_y().contains(y)
    }

    pub fn reset(&mut self) {
        self.zoom_x = 1.0;
        self.zoom_y = 1.0;
        self.pan_x = 0.0;
        self.pan_y = 0.0;
    }

    pub fn calculate_candle_width(&self, data_count: usize, width_ratio: f64) -> f64 {
        if data_count == 0 {
            return DEFAULT_CANDLE_WIDTH;
        }
        let per_point = self.rect.width / data_count as f64;
        let upper = (self.rect.width / 4.0).max(1.0);
        (per_point * width_ratio).min(upper).max(1.0)
    }
}
