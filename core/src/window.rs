//! Sliding window over a growing candle series.
//!
//! Storage is newest-first: index 0 is the latest candle and the last element
//! is the oldest. Positive shifts move the window toward older data. Nearing
//! the oldest stored candle kicks off a single background backfill that
//! fetches older candles or, failing that, generates them.

use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{
    Candle, CandleFetcher, Interval, MarketGenerator, OfflineFetcher, Timestamp, now_ms,
    parse_records,
};

pub const DEFAULT_WINDOW_WIDTH: usize = 100;
pub const DEFAULT_PREFETCH_SIZE: usize = 50;
pub const DEFAULT_BACKFILL_BATCH: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowConfig {
    /// Visible window width in candles.
    pub window_width: usize,
    /// Backfill starts once fewer than this many candles lie past the window.
    pub prefetch_size: usize,
    /// Candles requested per backfill.
    pub backfill_batch: usize,
}

impl WindowConfig {
    pub fn new(window_width: usize, prefetch_size: usize, backfill_batch: usize) -> Self {
        Self {
            window_width: window_width.max(1),
            prefetch_size,
            backfill_batch: backfill_batch.max(1),
        }
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        let read = |key: &str, fallback: usize| {
            env::var(key)
                .ok()
                .and_then(|v| v.parse::<usize>().ok())
                .unwrap_or(fallback)
        };
        Self::new(
            read("KBAR_WINDOW_WIDTH", DEFAULT_WINDOW_WIDTH),
            read("KBAR_PREFETCH_SIZE", DEFAULT_PREFETCH_SIZE),
            read("KBAR_BACKFILL_BATCH", DEFAULT_BACKFILL_BATCH),
        )
    }
}

/// Called after a backfill lands so the renderer can pull a fresh slice.
pub trait RedrawNotifier: Send + Sync {
    fn request_redraw(&self);
}

impl<F> RedrawNotifier for F
where
    F: Fn() + Send + Sync,
{
    fn request_redraw(&self) {
        self()
    }
}

/// External collaborators the series depends on.
pub struct Collaborators {
    pub fetcher: Arc<dyn CandleFetcher>,
    pub notifier: Arc<dyn RedrawNotifier>,
    pub runtime: Handle,
}

impl Collaborators {
    /// Synthetic-only session that never asks for a redraw.
    pub fn offline(runtime: Handle) -> Self {
        Self {
            fetcher: Arc::new(OfflineFetcher),
            notifier: Arc::new(|| {}),
            runtime,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackfillSource {
    Fetched,
    Generated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackfillReport {
    pub source: BackfillSource,
    pub appended: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ShiftOutcome {
    /// The window moved or sits within the prefetch threshold.
    pub redraw: bool,
    pub needs_fetch: bool,
    /// This shift started a backfill (false if one was already running).
    pub backfill_started: bool,
}

/// Applies `start` with a fixed `width`, clamped to `[0, len]`.
///
/// When both edges overflow the end clamp wins, keeping the newest data.
pub fn clamp_window(start: i64, width: usize, len: usize) -> (usize, usize) {
    let width = width as i64;
    let len_i = len as i64;
    let mut start = start;
    let mut end = start.saturating_add(width);
    if start < 0 {
        start = 0;
        end = width;
    }
    if end > len_i {
        end = len_i;
        start = (end - width).max(0);
    }
    (start as usize, end as usize)
}

struct Shared {
    symbol: String,
    interval: Interval,
    series: RwLock<Vec<Candle>>,
    generator: Mutex<MarketGenerator>,
    in_flight: AtomicBool,
    fetcher: Arc<dyn CandleFetcher>,
    notifier: Arc<dyn RedrawNotifier>,
}

impl Shared {
    fn read(&self) -> RwLockReadGuard<'_, Vec<Candle>> {
        self.series.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Candle>> {
        self.series.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn generator(&self) -> MutexGuard<'_, MarketGenerator> {
        self.generator.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends newest-first `batch` past the oldest stored candle, skipping
    /// anything that is not strictly older.
    fn append_older(&self, batch: Vec<Candle>) -> usize {
        let mut series = self.write();
        let mut oldest = series.last().map(|c| c.timestamp);
        let before = series.len();
        for candle in batch {
            if oldest.is_none_or(|ts| candle.timestamp < ts) {
                oldest = Some(candle.timestamp);
                series.push(candle);
            }
        }
        series.len() - before
    }
}

/// Clears the in-flight flag when the backfill task ends, including by panic.
struct InFlightGuard(Arc<Shared>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.in_flight.store(false, Ordering::Release);
    }
}

pub struct WindowedSeries {
    shared: Arc<Shared>,
    config: WindowConfig,
    visible_start: usize,
    visible_end: usize,
    runtime: Handle,
    backfill: Option<JoinHandle<BackfillReport>>,
}

impl WindowedSeries {
    pub fn new(
        symbol: impl Into<String>,
        interval: Interval,
        config: WindowConfig,
        generator: MarketGenerator,
        collaborators: Collaborators,
    ) -> Self {
        let shared = Shared {
            symbol: symbol.into(),
            interval,
            series: RwLock::new(Vec::new()),
            generator: Mutex::new(generator),
            in_flight: AtomicBool::new(false),
            fetcher: collaborators.fetcher,
            notifier: collaborators.notifier,
        };
        Self {
            shared: Arc::new(shared),
            config,
            visible_start: 0,
            visible_end: 0,
            runtime: collaborators.runtime,
            backfill: None,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.shared.symbol
    }

    pub fn interval(&self) -> Interval {
        self.shared.interval
    }

    pub fn config(&self) -> WindowConfig {
        self.config
    }

    pub fn len(&self) -> usize {
        self.shared.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `[start, end)` indices into the newest-first series.
    pub fn visible_range(&self) -> (usize, usize) {
        (self.visible_start, self.visible_end)
    }

    pub fn is_backfilling(&self) -> bool {
        self.shared.in_flight.load(Ordering::Acquire)
    }

    /// Replaces the series with chronological `candles` and shows the newest
    /// window. Malformed or out-of-order candles are dropped.
    pub fn load_history(&mut self, candles: Vec<Candle>) -> usize {
        let mut kept: Vec<Candle> = Vec::with_capacity(candles.len());
        for candle in candles {
            let ordered = kept.last().is_none_or(|prev| prev.timestamp < candle.timestamp);
            if ordered && candle.is_well_formed() {
                kept.push(candle);
            }
        }
        if let Some(newest) = kept.last() {
            self.shared.generator().reseed_price(newest.close);
        }
        kept.reverse();
        let len = kept.len();
        *self.shared.write() = kept;

        (self.visible_start, self.visible_end) = clamp_window(0, self.config.window_width, len);
        len
    }

    /// Loads the newest `count` candles from the fetcher, generating them if
    /// the fetch fails or comes back short.
    pub async fn bootstrap(&mut self, count: usize) -> BackfillSource {
        let now = now_ms();
        let fetched = match self
            .shared
            .fetcher
            .fetch_older_candles(&self.shared.symbol, self.shared.interval, count, now)
            .await
        {
            Ok(rows) => parse_records(&rows, now),
            Err(err) => {
                warn!(symbol = %self.shared.symbol, %err, "initial fetch failed");
                Vec::new()
            }
        };

        let (source, history) = if count > 0 && fetched.len() >= count {
            let mut history = fetched;
            history.truncate(count);
            history.reverse();
            (BackfillSource::Fetched, history)
        } else {
            let history = self
                .shared
                .generator()
                .generate(count, self.shared.interval);
            (BackfillSource::Generated, history)
        };
        let loaded = self.load_history(history);
        info!(symbol = %self.shared.symbol, ?source, loaded, "series bootstrapped");
        source
    }

    /// Moves the window by `delta` candles (positive is older) and starts a
    /// backfill when it comes within the prefetch threshold of the oldest
    /// candle. The redraw collaborator is notified whenever `redraw` is set.
    pub fn shift_viewport(&mut self, delta: isize) -> ShiftOutcome {
        let len = self.len();
        let previous = (self.visible_start, self.visible_end);
        let target = (self.visible_start as i64).saturating_add(delta as i64);
        let (start, end) = clamp_window(target, self.config.window_width, len);
        self.visible_start = start;
        self.visible_end = end;

        let needs_fetch = len.saturating_sub(end) < self.config.prefetch_size;
        let redraw = (start, end) != previous || needs_fetch;
        let backfill_started = needs_fetch && self.start_backfill();
        debug!(delta, start, end, len, needs_fetch, backfill_started, "window shifted");
        if redraw {
            self.shared.notifier.request_redraw();
        }

        ShiftOutcome {
            redraw,
            needs_fetch,
            backfill_started,
        }
    }

    /// Changes the window width, keeping the current start where possible.
    pub fn set_window_width(&mut self, width: usize) -> ShiftOutcome {
        self.config.window_width = width.max(1);
        self.shift_viewport(0)
    }

    /// Returns to the newest candles.
    pub fn jump_to_latest(&mut self) -> ShiftOutcome {
        self.shift_viewport(-(self.visible_start as isize))
    }

    /// Chronological copy of the visible window, re-clamped to the current
    /// series length.
    pub fn visible_data(&self) -> Vec<Candle> {
        let series = self.shared.read();
        let end = self.visible_end.min(series.len());
        let start = self.visible_start.min(end);
        series[start..end].iter().rev().copied().collect()
    }

    /// Hands out the most recent backfill task so callers can await it.
    pub fn take_backfill(&mut self) -> Option<JoinHandle<BackfillReport>> {
        self.backfill.take()
    }

    fn start_backfill(&mut self) -> bool {
        if self
            .shared
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        let guard = InFlightGuard(Arc::clone(&self.shared));
        let count = self.config.backfill_batch;
        self.backfill = Some(self.runtime.spawn(run_backfill(guard, count)));
        true
    }
}

async fn run_backfill(guard: InFlightGuard, count: usize) -> BackfillReport {
    let shared = Arc::clone(&guard.0);
    let (before, anchor_open): (Timestamp, Option<f64>) = {
        let series = shared.read();
        match series.last() {
            Some(oldest) => (oldest.timestamp, Some(oldest.open)),
            None => (now_ms(), None),
        }
    };

    let fetched = match shared
        .fetcher
        .fetch_older_candles(&shared.symbol, shared.interval, count, before)
        .await
    {
        Ok(rows) => parse_records(&rows, before),
        Err(err) => {
            warn!(symbol = %shared.symbol, %err, "backfill fetch failed, generating");
            Vec::new()
        }
    };

    let (source, batch) = if fetched.len() >= count {
        let mut batch = fetched;
        batch.truncate(count);
        (BackfillSource::Fetched, batch)
    } else {
        if !fetched.is_empty() {
            warn!(
                symbol = %shared.symbol,
                received = fetched.len(),
                requested = count,
                "short backfill batch, generating"
            );
        }
        let mut generator = shared.generator();
        if let Some(open) = anchor_open {
            generator.reseed_price(open);
        }
        let batch = generator.generate_before(count, shared.interval, before);
        (BackfillSource::Generated, batch)
    };

    let appended = shared.append_older(batch);
    drop(guard);
    info!(symbol = %shared.symbol, ?source, appended, "backfill complete");
    shared.notifier.request_redraw();

    BackfillReport { source, appended }
}
