//! Logging setup for iosrv and its tools
//!
//! Console output goes to stderr as `timestamp [LEVEL] message`, leaving
//! stdout free for command results. With `logging.dir` set, a daily-rolling
//! file is written as well, in the same format or as JSON lines.

use crate::config::LoggingConfig;
use errors::{DriverError, DriverResult};
use std::fmt::Write as _;
use std::sync::{Mutex, OnceLock};
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{self, FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

fn format_level(level: &Level) -> &'static str {
    match *level {
        Level::TRACE => "[TRACE]",
        Level::DEBUG => "[DEBUG]",
        Level::INFO => "[INFO]",
        Level::WARN => "[WARN]",
        Level::ERROR => "[ERROR]",
    }
}

/// `2026-03-02T00:50:44.809123Z [INFO] Server ready`
struct BracketedLevelFormat;

impl<S, N> FormatEvent<S, N> for BracketedLevelFormat
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        let now = chrono::Utc::now();
        write!(writer, "{} ", now.format("%Y-%m-%dT%H:%M:%S%.6fZ"))?;

        let level = *event.metadata().level();
        if writer.has_ansi_escapes() {
            let color = match level {
                Level::TRACE => "\x1b[35m",
                Level::DEBUG => "\x1b[34m",
                Level::INFO => "\x1b[32m",
                Level::WARN => "\x1b[33m",
                Level::ERROR => "\x1b[31m",
            };
            write!(writer, "{}{}\x1b[0m ", color, format_level(&level))?;
        } else {
            write!(writer, "{} ", format_level(&level))?;
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

// Keeps the non-blocking file writer flushing until process exit
static GUARDS: OnceLock<Mutex<Vec<WorkerGuard>>> = OnceLock::new();

/// Filter directive in effect: `RUST_LOG` wins over the configured level
pub fn filter_directive(config: &LoggingConfig) -> String {
    match std::env::var("RUST_LOG") {
        Ok(env) if !env.trim().is_empty() => env,
        _ => config.level.clone(),
    }
}

/// Install the global subscriber.
///
/// Fails with a configuration error on a bad filter directive, an
/// unusable log directory, or when a subscriber is already installed.
pub fn init_logging(config: &LoggingConfig) -> DriverResult<()> {
    let directive = filter_directive(config);
    let filter = EnvFilter::try_new(&directive)
        .map_err(|e| DriverError::config(format!("invalid log filter '{directive}': {e}")))?;

    let console_layer = fmt::layer()
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .event_format(BracketedLevelFormat)
        .boxed();

    let file_layer = match &config.dir {
        Some(dir) => {
            std::fs::create_dir_all(dir).map_err(|e| {
                DriverError::config(format!("cannot create log directory {dir:?}: {e}"))
            })?;
            let appender =
                tracing_appender::rolling::daily(dir, format!("{}.log", config.file_prefix));
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);

            let guards = GUARDS.get_or_init(|| Mutex::new(Vec::new()));
            match guards.lock() {
                Ok(mut guards) => guards.push(guard),
                Err(poisoned) => poisoned.into_inner().push(guard),
            }

            let layer = if config.json {
                fmt::layer()
                    .json()
                    .with_writer(non_blocking)
                    .with_target(true)
                    .with_thread_names(true)
                    .boxed()
            } else {
                fmt::layer()
                    .with_writer(non_blocking)
                    .with_ansi(false)
                    .event_format(BracketedLevelFormat)
                    .boxed()
            };
            Some(layer)
        },
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| DriverError::config(format!("logging already initialized: {e}")))?;

    let mut summary = format!("Logging initialized: filter={directive}");
    if let Some(dir) = &config.dir {
        let _ = write!(summary, ", dir={}, json={}", dir.display(), config.json);
    }
    tracing::debug!("{}", summary);
    Ok(())
}
