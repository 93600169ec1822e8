use std::path::Path;
use std::sync::{Mutex, OnceLock};
use tracing_subscriber::{
    layer::{Layered, SubscriberExt},
    reload,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

type FilteredRegistry = Layered<reload::Layer<EnvFilter, Registry>, Registry>;

const LOG_FILE_NAME: &str = "mysql-s3-backup.log";

/// Must be kept alive for the entire application lifetime
static LOG_GUARD: OnceLock<Mutex<Option<tracing_appender::non_blocking::WorkerGuard>>> = OnceLock::new();

/// Reload handle for changing the log filter at runtime
static RELOAD_HANDLE: OnceLock<Mutex<reload::Handle<EnvFilter, Registry>>> = OnceLock::new();

/// Whether the active filter came from `RUST_LOG`, which reloads must not replace
static FILTER_FROM_ENV: OnceLock<bool> = OnceLock::new();

/// Level given at startup, restored when a reload clears the configured level
static STARTUP_LEVEL: OnceLock<String> = OnceLock::new();

/// Log rotation strategy for the optional log file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Rotation {
    #[default]
    Daily,
    Hourly,
    Never,
}

/// Line format of every log output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

type BoxedLayer = Box<dyn Layer<FilteredRegistry> + Send + Sync>;

fn build_filter(level: &str) -> anyhow::Result<EnvFilter> {
    EnvFilter::try_new(level).map_err(|e| anyhow::anyhow!("Invalid log level '{}': {}", level, e))
}

fn format_layer<W>(writer: W, format: LogFormat, ansi: bool) -> BoxedLayer
where
    W: for<'w> tracing_subscriber::fmt::MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_target(true)
        .with_ansi(ansi);

    match format {
        LogFormat::Text => layer.boxed(),
        LogFormat::Json => layer.json().boxed(),
    }
}

/// Install the global subscriber. `RUST_LOG` overrides `level` when set.
pub fn init_logging(
    level: &str,
    log_dir: Option<&Path>,
    rotation: Rotation,
    format: LogFormat,
) -> anyhow::Result<()> {
    let (filter, from_env) = match EnvFilter::try_from_default_env() {
        Ok(filter) => (filter, true),
        Err(_) => (build_filter(level)?, false),
    };

    let (filter_layer, reload_handle) = reload::Layer::new(filter);

    let mut layers: Vec<BoxedLayer> = vec![format_layer(std::io::stdout, format, true)];

    if let Some(dir) = log_dir {
        std::fs::create_dir_all(dir)?;

        let file_appender = match rotation {
            Rotation::Daily => tracing_appender::rolling::daily(dir, LOG_FILE_NAME),
            Rotation::Hourly => tracing_appender::rolling::hourly(dir, LOG_FILE_NAME),
            Rotation::Never => tracing_appender::rolling::never(dir, LOG_FILE_NAME),
        };

        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        layers.push(format_layer(non_blocking, format, false));

        LOG_GUARD
            .set(Mutex::new(Some(guard)))
            .map_err(|_| anyhow::anyhow!("Logger already initialized"))?;
    }

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(layers)
        .try_init()?;

    RELOAD_HANDLE
        .set(Mutex::new(reload_handle))
        .map_err(|_| anyhow::anyhow!("Reload handle already initialized"))?;
    let _ = FILTER_FROM_ENV.set(from_env);
    let _ = STARTUP_LEVEL.set(level.to_string());

    Ok(())
}

/// Swap the active log filter; `None` restores the startup level.
///
/// A no-op before `init_logging` has run, and while `RUST_LOG` is in effect.
pub fn reload_log_level(level: Option<&str>) -> anyhow::Result<()> {
    let Some(handle_mutex) = RELOAD_HANDLE.get() else {
        return Ok(());
    };

    if FILTER_FROM_ENV.get().copied().unwrap_or(false) {
        tracing::debug!("RUST_LOG is set, keeping the current log filter");
        return Ok(());
    }

    let level = level
        .or_else(|| STARTUP_LEVEL.get().map(String::as_str))
        .unwrap_or("info");
    let new_filter = build_filter(level)?;
    let handle = handle_mutex
        .lock()
        .map_err(|_| anyhow::anyhow!("Log reload handle poisoned"))?;
    handle.reload(new_filter)?;

    tracing::info!("Log level changed to '{}'", level);
    Ok(())
}

/// Flush buffered file output
pub fn shutdown_logging() {
    if let Some(mutex) = LOG_GUARD.get() {
        if let Ok(mut guard_option) = mutex.lock() {
            if let Some(guard) = guard_option.take() {
                drop(guard);
            }
        }
    }
}
