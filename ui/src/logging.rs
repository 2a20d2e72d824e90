use std::fs::{File, OpenOptions, create_dir_all};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::level_filters::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{Layer, fmt};

const LOG_DIR: &str = "tmp";
const LOG_BASENAME: &str = "kbar";

fn log_path() -> PathBuf {
    let ts_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    let pid = std::process::id();
    let filename = format!("{LOG_BASENAME}_{ts_ms}_pid{pid}.log");
    Path::new(LOG_DIR).join(filename)
}

fn open_log_file(path: &Path) -> Option<File> {
    if let Some(parent) = path.parent() {
        if let Err(err) = create_dir_all(parent) {
            eprintln!("[log] failed to create log dir {:?}: {err}", parent);
            return None;
        }
    }
    match OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)
    {
        Ok(file) => Some(file),
        Err(err) => {
            eprintln!("[log] failed to open log file {:?}: {err}", path);
            None
        }
    }
}

/// Installs stdout and file logging at `level`.
///
/// Returns the log file path when the file layer could be opened. Later
/// calls are no-ops that return the first result.
pub fn init_logging(level: LevelFilter) -> Option<PathBuf> {
    static INSTALLED: OnceLock<Option<PathBuf>> = OnceLock::new();

    INSTALLED
        .get_or_init(|| {
            let path = log_path();
            let file = open_log_file(&path);
            let file_path = file.as_ref().map(|_| path.clone());

            let stdout_layer = fmt::layer()
                .compact()
                .with_target(false)
                .with_filter(level);
            let file_layer = file.map(|file| {
                fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file))
                    .with_filter(level)
            });

            if let Err(err) = tracing_subscriber::registry()
                .with(stdout_layer)
                .with(file_layer)
                .try_init()
            {
                eprintln!("[log] subscriber already installed: {err}");
                return None;
            }
            file_path
        })
        .clone()
}
