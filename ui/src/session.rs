use kbar_core::{
    ChartRect, ViewportTransform, WindowedSeries, ZoomBounds, price_range, time_range,
};
use tracing::trace;

use crate::frame::{Frame, build_frame};

const ZOOM_IN: f64 = 1.1;
const ZOOM_OUT: f64 = 0.9;
const PRICE_PADDING: f64 = 0.01;
const KEY_STEP_DIVISOR: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavKey {
    Left,
    Right,
    Up,
    Down,
    Home,
}

/// Pointer and keyboard input, in screen pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputEvent {
    Wheel {
        delta_x: f64,
        delta_y: f64,
        x: f64,
        y: f64,
    },
    Drag {
        dx: f64,
        dy: f64,
    },
    KeyNav(NavKey),
    Resize {
        width: f64,
        height: f64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RedrawNeeded(pub bool);

/// Couples a windowed series with the transform that draws it.
///
/// Horizontal gestures move the data window by whole candles; vertical
/// gestures act on the transform. Sub-candle drag distance is carried over
/// to the next drag.
pub struct ChartSession {
    series: WindowedSeries,
    transform: ViewportTransform,
    bounds: ZoomBounds,
    drag_residual: f64,
}

impl ChartSession {
    pub fn new(series: WindowedSeries, rect: ChartRect, bounds: ZoomBounds) -> Self {
        let mut session = Self {
            series,
            transform: ViewportTransform::with_bounds(rect, bounds),
            bounds,
            drag_residual: 0.0,
        };
        session.sync_data_range();
        session
    }

    pub fn series(&self) -> &WindowedSeries {
        &self.series
    }

    pub fn series_mut(&mut self) -> &mut WindowedSeries {
        &mut self.series
    }

    pub fn transform(&self) -> &ViewportTransform {
        &self.transform
    }

    pub fn handle_input(&mut self, event: InputEvent) -> RedrawNeeded {
        trace!(?event, "chart input");
        let redraw = match event {
            InputEvent::Wheel {
                delta_x,
                delta_y,
                x,
                y,
            } => {
                let (delta_x, delta_y) = (finite_or_zero(delta_x), finite_or_zero(delta_y));
                let mut redraw = false;
                let candles = (delta_x / self.pixels_per_candle()).round();
                if candles != 0.0 {
                    redraw |= self.shift(candles as isize);
                }
                if delta_y != 0.0 {
                    let factor = if delta_y < 0.0 { ZOOM_IN } else { ZOOM_OUT };
                    self.transform.zoom(factor, x, y);
                    redraw = true;
                }
                redraw
            }
            InputEvent::Drag { dx, dy } => {
                let (dx, dy) = (finite_or_zero(dx), finite_or_zero(dy));
                let mut redraw = false;
                self.drag_residual += dx / self.pixels_per_candle();
                let whole = self.drag_residual.trunc();
                self.drag_residual -= whole;
                if whole != 0.0 {
                    redraw |= self.shift(whole as isize);
                }
                if dy != 0.0 {
                    // Content follows the pointer.
                    self.transform.pan(0.0, -dy);
                    redraw = true;
                }
                redraw
            }
            InputEvent::KeyNav(key) => {
                let step = (self.series.config().window_width / KEY_STEP_DIVISOR).max(1) as isize;
                let rect = self.transform.rect();
                let (cx, cy) = (rect.x + rect.width / 2.0, rect.y + rect.height / 2.0);
                match key {
                    NavKey::Left => self.shift(step),
                    NavKey::Right => self.shift(-step),
                    NavKey::Up => {
                        self.transform.zoom(ZOOM_IN, cx, cy);
                        true
                    }
                    NavKey::Down => {
                        self.transform.zoom(ZOOM_OUT, cx, cy);
                        true
                    }
                    NavKey::Home => {
                        self.series.jump_to_latest();
                        self.transform.reset();
                        self.drag_residual = 0.0;
                        self.sync_data_range();
                        true
                    }
                }
            }
            InputEvent::Resize { width, height } => {
                let rect = self.transform.rect();
                self.transform = ViewportTransform::with_bounds(
                    ChartRect::new(rect.x, rect.y, width, height),
                    self.bounds,
                );
                self.sync_data_range();
                true
            }
        };
        RedrawNeeded(redraw)
    }

    /// Re-clamps the window against the current series, picking up candles a
    /// finished backfill appended.
    pub fn refresh(&mut self) -> RedrawNeeded {
        RedrawNeeded(self.shift(0))
    }

    pub fn frame(&self) -> Frame {
        let visible = self.series.visible_data();
        build_frame(&self.transform, &visible, self.series.interval())
    }

    fn shift(&mut self, delta: isize) -> bool {
        let outcome = self.series.shift_viewport(delta);
        if outcome.redraw {
            self.sync_data_range();
        }
        outcome.redraw
    }

    fn pixels_per_candle(&self) -> f64 {
        let (start, end) = self.series.visible_range();
        let (zoom_x, _) = self.transform.zoom_factors();
        self.transform.rect().width * zoom_x / (end - start).max(1) as f64
    }

    /// Fits the transform to the visible slice: half a candle of margin on
    /// the time axis, a small pad on the price axis.
    fn sync_data_range(&mut self) {
        let visible = self.series.visible_data();
        let half = self.series.interval().as_millis() as f64 / 2.0;
        let times = time_range(&visible);
        let prices = price_range(&visible).padded(PRICE_PADDING);
        self.transform
            .set_data_range(times.min - half, times.max + half, prices.min, prices.max);
    }
}

fn finite_or_zero(v: f64) -> f64 {
    if v.is_finite() { v } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kbar_core::{Collaborators, Interval, MarketGenerator, WindowConfig};
    use tokio::runtime::Handle;

    fn session() -> ChartSession {
        let config = WindowConfig::new(100, 10, 50);
        let mut series = WindowedSeries::new(
            "TEST",
            Interval::Hour(1),
            config,
            MarketGenerator::new(100.0, 1.0, Some(3)),
            Collaborators::offline(Handle::current()),
        );
        let history = MarketGenerator::new(100.0, 1.0, Some(5)).generate_from(
            1_000,
            Interval::Hour(1),
            0,
        );
        series.load_history(history);
        ChartSession::new(
            series,
            ChartRect::new(0.0, 0.0, 800.0, 400.0),
            ZoomBounds::new(0.1, 100.0),
        )
    }

    #[tokio::test]
    async fn drag_moves_whole_candles_and_keeps_remainder() {
        let mut session = session();

        assert_eq!(
            session.handle_input(InputEvent::Drag { dx: 20.0, dy: 0.0 }),
            RedrawNeeded(true)
        );
        assert_eq!(session.series().visible_range(), (2, 102));

        session.handle_input(InputEvent::Drag { dx: 4.0, dy: 0.0 });
        assert_eq!(session.series().visible_range(), (3, 103));

        assert_eq!(
            session.handle_input(InputEvent::Drag { dx: -4.0, dy: 0.0 }),
            RedrawNeeded(false)
        );
        assert_eq!(session.series().visible_range(), (3, 103));
    }

    #[tokio::test]
    async fn non_finite_deltas_are_ignored() {
        let mut session = session();
        let before = session.transform().clone();

        let redraw = session.handle_input(InputEvent::Drag {
            dx: f64::NAN,
            dy: f64::NAN,
        });
        assert_eq!(redraw, RedrawNeeded(false));
        session.handle_input(InputEvent::Wheel {
            delta_x: f64::INFINITY,
            delta_y: f64::NAN,
            x: 10.0,
            y: 10.0,
        });
        assert_eq!(session.transform(), &before);

        session.handle_input(InputEvent::Drag { dx: 8.0, dy: 0.0 });
        assert_eq!(session.series().visible_range(), (1, 101));
    }

    #[tokio::test]
    async fn vertical_drag_pans_price_axis() {
        let mut session = session();
        let before = session.transform().screen_to_data(400.0, 200.0).1;

        assert_eq!(
            session.handle_input(InputEvent::Drag { dx: 0.0, dy: 40.0 }),
            RedrawNeeded(true)
        );
        assert!(session.transform().pan_offsets().1 > 0.0);
        assert!(session.transform().screen_to_data(400.0, 200.0).1 > before);
        assert_eq!(session.series().visible_range(), (0, 100));
    }

    #[tokio::test]
    async fn wheel_zooms_about_cursor() {
        let mut session = session();
        let anchor = session.transform().screen_to_data(200.0, 100.0);

        session.handle_input(InputEvent::Wheel {
            delta_x: 0.0,
            delta_y: -1.0,
            x: 200.0,
            y: 100.0,
        });
        assert_eq!(session.transform().zoom_factors(), (1.1, 1.1));
        let (px, py) = session.transform().data_to_screen(anchor.0, anchor.1);
        assert!((px - 200.0).abs() < 1e-6);
        assert!((py - 100.0).abs() < 1e-6);

        session.handle_input(InputEvent::Wheel {
            delta_x: 0.0,
            delta_y: 1.0,
            x: 200.0,
            y: 100.0,
        });
        assert!((session.transform().zoom_factors().0 - 0.99).abs() < 1e-9);
    }

    #[tokio::test]
    async fn horizontal_wheel_scrolls_candles() {
        let mut session = session();
        let redraw = session.handle_input(InputEvent::Wheel {
            delta_x: 16.0,
            delta_y: 0.0,
            x: 0.0,
            y: 0.0,
        });
        assert_eq!(redraw, RedrawNeeded(true));
        assert_eq!(session.series().visible_range(), (2, 102));

        let idle = session.handle_input(InputEvent::Wheel {
            delta_x: 1.0,
            delta_y: 0.0,
            x: 0.0,
            y: 0.0,
        });
        assert_eq!(idle, RedrawNeeded(false));
    }

    #[tokio::test]
    async fn keys_step_by_a_tenth_of_the_window() {
        let mut session = session();
        session.handle_input(InputEvent::KeyNav(NavKey::Left));
        assert_eq!(session.series().visible_range(), (10, 110));
        session.handle_input(InputEvent::KeyNav(NavKey::Left));
        session.handle_input(InputEvent::KeyNav(NavKey::Right));
        assert_eq!(session.series().visible_range(), (10, 110));

        session.handle_input(InputEvent::KeyNav(NavKey::Up));
        assert_eq!(session.transform().zoom_factors(), (1.1, 1.1));

        session.handle_input(InputEvent::KeyNav(NavKey::Home));
        assert_eq!(session.series().visible_range(), (0, 100));
        assert_eq!(session.transform().zoom_factors(), (1.0, 1.0));
        assert_eq!(session.transform().pan_offsets(), (0.0, 0.0));
    }

    #[tokio::test]
    async fn resize_replaces_transform() {
        let mut session = session();
        session.handle_input(InputEvent::KeyNav(NavKey::Up));

        let redraw = session.handle_input(InputEvent::Resize {
            width: 1024.0,
            height: 600.0,
        });
        assert_eq!(redraw, RedrawNeeded(true));
        let rect = session.transform().rect();
        assert_eq!((rect.width, rect.height), (1024.0, 600.0));
        assert_eq!(session.transform().zoom_factors(), (1.0, 1.0));
    }

    #[tokio::test]
    async fn frame_covers_visible_window() {
        let session = session();
        let frame = session.frame();

        assert_eq!(frame.candles.len(), 100);
        assert!(frame.candles.iter().all(|c| c.x > 0.0 && c.x < 800.0));
        assert_eq!(frame.time_ticks.len(), 6);
        assert!(!frame.price_ticks.is_empty());

        let visible = session.series().visible_data();
        assert_eq!(frame.candles[99].timestamp, visible[99].timestamp);
    }
}
