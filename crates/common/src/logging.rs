//! Tracing setup for Voty services

use std::path::Path;

use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

use crate::error::{Error, Result};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` overrides `log_level` when set. When `log_dir` is given, a
/// daily-rolling `{name}.log` file receives the same events without ANSI
/// colouring.
pub fn init_logging(log_dir: Option<&Path>, name: &str, log_level: &str) -> Result<()> {
    let env_filter = || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let console_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_filter(env_filter());

    let file_layer = log_dir.map(|dir| {
        let file_appender =
            RollingFileAppender::new(Rotation::DAILY, dir, format!("{}.log", name));

        fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_ansi(false)
            .with_writer(file_appender)
            .with_filter(env_filter())
    });

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| Error::configuration(format!("Failed to initialize logging: {}", e)))?;

    Ok(())
}
