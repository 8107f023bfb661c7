//! Process-wide logging setup for the `chord-node` binary.
//!
//! Library code only emits `tracing` events inside component spans; installing a subscriber is
//! left to the binary.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_log::LogTracer;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, Layer, Registry};

/// File name prefix of the daily log files written under the configured log directory.
pub const LOG_FILE_PREFIX: &str = "chord-node.log";

#[derive(ValueEnum, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for Level {
    fn from(val: LogLevel) -> Self {
        match val {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

impl From<LogLevel> for LevelFilter {
    fn from(val: LogLevel) -> Self {
        LevelFilter::from_level(val.into())
    }
}

/// Records panics as `ERROR` events, inside whatever span was current when the panic happened.
pub fn set_panic_hook() {
    std::panic::set_hook(Box::new(|panic| {
        let location = panic
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "unknown location".to_string());
        tracing::error!("panic at {}: {}", location, panic);
    }));
}

/// Installs the global subscriber: stderr at `level`, plus a daily-rolling file under `log_dir`
/// when one is given. The returned guard flushes the file writer on drop and must be kept alive
/// for the lifetime of the process.
pub fn init_logging(
    level: LogLevel,
    log_dir: Option<&Path>,
) -> anyhow::Result<Option<WorkerGuard>> {
    set_panic_hook();

    let level_filter: LevelFilter = level.into();
    let stderr = fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(level_filter);

    let (file, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .map_err(|e| anyhow::anyhow!("failed to create log directory {:?}: {}", dir, e))?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_ansi(false)
                .with_writer(writer)
                .with_filter(level_filter);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let subscriber = Registry::default().with(stderr).with(file);

    // bridge `log` records from dependencies; a tracer may already be installed
    let _ = LogTracer::init();
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {}", e))?;

    Ok(guard)
}
