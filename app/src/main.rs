use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Result;
use clap::Parser;
use kbar_core::{
    CandleFetcher, ChartRect, Collaborators, Interval, MarketGenerator, OfflineFetcher,
    WindowConfig, WindowedSeries, ZoomBounds,
};
use kbar_ui::{ChartSession, FileSource, init_logging, shared_runtime};
use tracing::info;
use tracing::level_filters::LevelFilter;

mod input;
use input::{InputFormat, parse_script};

const CHART_WIDTH: f64 = 960.0;
const CHART_HEIGHT: f64 = 540.0;

#[derive(Parser, Debug)]
#[command(name = "kbar")]
struct Args {
    /// CSV or Parquet OHLCV history. Without it every candle is synthetic.
    path: Option<PathBuf>,

    /// Explicitly set the file format. If omitted, inferred from extension.
    #[arg(long, value_enum)]
    format: Option<InputFormat>,

    /// Candle interval (1m, 5m, 15m, 30m, 1h, 4h, 1d). File rows are resampled to it.
    #[arg(long, value_parser = parse_interval, default_value = "1h")]
    interval: Interval,

    #[arg(long, default_value = "SYNTH")]
    symbol: String,

    /// Candles loaded before the first frame.
    #[arg(long, default_value_t = 500)]
    count: usize,

    /// Seed for the synthetic generator; random when omitted.
    #[arg(long)]
    seed: Option<u64>,

    #[arg(long, default_value_t = 100.0)]
    start_price: f64,

    #[arg(long, default_value_t = 1.0)]
    volatility: f64,

    /// Visible candles (overrides KBAR_WINDOW_WIDTH).
    #[arg(long)]
    window: Option<usize>,

    /// Distance to the oldest candle that triggers a backfill (overrides KBAR_PREFETCH_SIZE).
    #[arg(long)]
    prefetch: Option<usize>,

    /// Candles per backfill (overrides KBAR_BACKFILL_BATCH).
    #[arg(long)]
    batch: Option<usize>,

    /// Input steps to replay, e.g. "key:left,drag:-120,wheel:0:-1,resize:1024x600".
    #[arg(long)]
    script: Option<String>,

    #[arg(long, default_value = "info")]
    log_level: LevelFilter,
}

fn main() -> Result<()> {
    let args = Args::parse();
    if let Some(path) = init_logging(args.log_level) {
        info!(path = %path.display(), "logging to file");
    }

    let runtime = shared_runtime();
    let file = args
        .path
        .as_deref()
        .map(|path| FileSource::open(path, args.format.map(Into::into), args.interval))
        .transpose()?;
    // A file shorter than the requested count would read as a short fetch.
    let count = file.as_ref().map_or(args.count, |f| args.count.min(f.len()));
    let fetcher: Arc<dyn CandleFetcher> = match file {
        Some(file) => Arc::new(file),
        None => Arc::new(OfflineFetcher),
    };

    let defaults = WindowConfig::default();
    let config = WindowConfig::new(
        args.window.unwrap_or(defaults.window_width),
        args.prefetch.unwrap_or(defaults.prefetch_size),
        args.batch.unwrap_or(defaults.backfill_batch),
    );

    let redraws = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&redraws);
    let collaborators = Collaborators {
        fetcher,
        notifier: Arc::new(move || {
            counter.fetch_add(1, Ordering::Relaxed);
        }),
        runtime: runtime.handle().clone(),
    };
    let generator = MarketGenerator::new(args.start_price, args.volatility, args.seed);
    let mut series = WindowedSeries::new(
        args.symbol.clone(),
        args.interval,
        config,
        generator,
        collaborators,
    );

    let source = runtime.block_on(series.bootstrap(count));
    info!(symbol = %args.symbol, interval = %args.interval.label(), ?source, ?config, "bootstrapped");

    let rect = ChartRect::new(0.0, 0.0, CHART_WIDTH, CHART_HEIGHT);
    let mut session = ChartSession::new(series, rect, ZoomBounds::default());
    print_frame("initial", &session);

    let events = match &args.script {
        Some(script) => parse_script(script, (CHART_WIDTH / 2.0, CHART_HEIGHT / 2.0))?,
        None => Vec::new(),
    };
    for (step, event) in events.into_iter().enumerate() {
        let mut redraw = session.handle_input(event).0;
        if let Some(task) = session.series_mut().take_backfill() {
            let report = runtime.block_on(task)?;
            info!(step, source = ?report.source, appended = report.appended, "backfill joined");
            redraw |= session.refresh().0;
        }
        if redraw {
            print_frame(&format!("step {step} {event:?}"), &session);
        }
    }

    info!(
        candles = session.series().len(),
        redraws = redraws.load(Ordering::Relaxed),
        "session finished"
    );
    Ok(())
}

fn print_frame(label: &str, session: &ChartSession) {
    let frame = session.frame();
    let (start, end) = session.series().visible_range();
    let (zoom_x, zoom_y) = session.transform().zoom_factors();
    let first_time = frame.time_ticks.first().map(|t| t.label.as_str()).unwrap_or("-");
    let last_time = frame.time_ticks.last().map(|t| t.label.as_str()).unwrap_or("-");
    let prices: Vec<&str> = frame.price_ticks.iter().map(|t| t.label.as_str()).collect();

    println!(
        "{label}: window {start}..{end} of {len} | {drawn} candles @ {width:.1}px | zoom {zoom_x:.2}x{zoom_y:.2} | time {first_time} .. {last_time} | price [{prices}]",
        len = session.series().len(),
        drawn = frame.candles.len(),
        width = frame.candle_width,
        prices = prices.join(" "),
    );
}

fn parse_interval(raw: &str) -> Result<Interval, String> {
    Interval::parse_label(&raw.to_ascii_lowercase()).ok_or_else(|| {
        let supported: Vec<String> = Interval::SUPPORTED.iter().map(Interval::label).collect();
        format!(
            "unsupported interval {raw} (use one of {})",
            supported.join(", ")
        )
    })
}
