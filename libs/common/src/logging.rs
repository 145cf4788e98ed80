//! Logging setup for VoltageEMS services
//!
//! One subscriber per process: a reloadable `EnvFilter` in front of a console
//! layer and an optional daily file layer (`{YYYYMMDD}_{service}.log`) written
//! through a non-blocking appender.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, format::Writer, FmtContext, FormatEvent, FormatFields},
    layer::SubscriberExt,
    registry::LookupSpan,
    reload,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

use crate::error::{Error, Result};

/// Bracketed level tag: `[INFO]`, `[WARN]`, ...
fn format_level(level: &Level) -> &'static str {
    match *level {
        Level::TRACE => "[TRACE]",
        Level::DEBUG => "[DEBUG]",
        Level::INFO => "[INFO]",
        Level::WARN => "[WARN]",
        Level::ERROR => "[ERROR]",
    }
}

fn level_color(level: &Level) -> &'static str {
    match *level {
        Level::TRACE => "\x1b[35m",
        Level::DEBUG => "\x1b[34m",
        Level::INFO => "\x1b[32m",
        Level::WARN => "\x1b[33m",
        Level::ERROR => "\x1b[31m",
    }
}

/// `2025-12-02T00:50:44.809123Z [INFO] message key=value`
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
        write!(
            writer,
            "{} ",
            chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ")
        )?;

        let level = event.metadata().level();
        if writer.has_ansi_escapes() {
            write!(writer, "{}{}\x1b[0m ", level_color(level), format_level(level))?;
        } else {
            write!(writer, "{} ", format_level(level))?;
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// File writer that switches to a new file when the local date changes
struct DailyRollingWriter {
    service_name: String,
    log_dir: PathBuf,
    current_date: String,
    file: File,
}

impl DailyRollingWriter {
    fn new(service_name: impl Into<String>, log_dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let service_name = service_name.into();
        let log_dir = log_dir.into();
        let current_date = today();
        let file = open_log_file(&log_dir, &current_date, &service_name)?;
        Ok(Self {
            service_name,
            log_dir,
            current_date,
            file,
        })
    }

    fn file_name(date: &str, service_name: &str) -> String {
        format!("{}_{}.log", date, service_name)
    }

    fn roll_if_needed(&mut self) -> std::io::Result<()> {
        let date = today();
        let path = self
            .log_dir
            .join(Self::file_name(&self.current_date, &self.service_name));
        // Also reopen when the file was removed underneath us
        if date != self.current_date || !path.exists() {
            self.file = open_log_file(&self.log_dir, &date, &self.service_name)?;
            self.current_date = date;
        }
        Ok(())
    }
}

impl Write for DailyRollingWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.roll_if_needed()?;
        self.file.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.file.flush()
    }
}

fn today() -> String {
    chrono::Local::now().format("%Y%m%d").to_string()
}

fn open_log_file(log_dir: &Path, date: &str, service_name: &str) -> std::io::Result<File> {
    fs::create_dir_all(log_dir)?;
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join(DailyRollingWriter::file_name(date, service_name)))
}

// Keeps the non-blocking writer flushing until process exit
static GUARDS: OnceLock<Mutex<Vec<WorkerGuard>>> = OnceLock::new();

type EnvFilterReloadHandle = reload::Handle<EnvFilter, tracing_subscriber::Registry>;
static LOG_FILTER_HANDLE: OnceLock<EnvFilterReloadHandle> = OnceLock::new();
static CURRENT_LOG_LEVEL: OnceLock<Mutex<String>> = OnceLock::new();

/// Logger configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Service name, used in the file name and as the default filter target
    pub service_name: String,
    /// Filter directive, e.g. `info` or `info,voltage_calc=trace`
    pub level: String,
    /// Directory for the daily file; `None` disables the file layer
    pub log_dir: Option<PathBuf>,
    /// JSON lines in the file instead of the bracketed format
    pub enable_json: bool,
    /// ANSI colors on the console
    pub ansi: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown".to_string(),
            level: "info".to_string(),
            log_dir: None,
            enable_json: false,
            ansi: true,
        }
    }
}

impl LogConfig {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            ..Default::default()
        }
    }

    /// `RUST_LOG` wins over the configured level
    fn filter_directive(&self) -> String {
        std::env::var("RUST_LOG")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| self.level.clone())
    }
}

/// Initialize the global subscriber
///
/// Fails if a global subscriber is already installed.
pub fn init_with_config(config: LogConfig) -> Result<()> {
    let directive = config.filter_directive();
    let env_filter = EnvFilter::try_new(&directive)
        .map_err(|e| Error::Logging(format!("invalid filter '{}': {}", directive, e)))?;

    let (reload_filter, reload_handle) = reload::Layer::new(env_filter);

    let console_layer = fmt::layer()
        .with_ansi(config.ansi)
        .event_format(BracketedLevelFormat)
        .boxed();

    let file_layer = match &config.log_dir {
        Some(dir) => {
            let writer = DailyRollingWriter::new(config.service_name.clone(), dir.clone())?;
            let (non_blocking, guard) = tracing_appender::non_blocking(writer);
            let guards = GUARDS.get_or_init(|| Mutex::new(Vec::new()));
            match guards.lock() {
                Ok(mut guards) => guards.push(guard),
                Err(poisoned) => poisoned.into_inner().push(guard),
            }

            let layer = if config.enable_json {
                fmt::layer()
                    .json()
                    .with_writer(non_blocking)
                    .with_target(true)
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
        .with(reload_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| Error::Logging(e.to_string()))?;

    let _ = LOG_FILTER_HANDLE.set(reload_handle);
    store_level(directive);

    match &config.log_dir {
        Some(dir) => tracing::info!("Logging: {} @ {}", config.service_name, dir.display()),
        None => tracing::info!("Logging: {} (console only)", config.service_name),
    }
    Ok(())
}

fn store_level(level: String) {
    let slot = CURRENT_LOG_LEVEL.get_or_init(|| Mutex::new(String::new()));
    match slot.lock() {
        Ok(mut current) => *current = level,
        Err(poisoned) => *poisoned.into_inner() = level,
    }
}

/// Replace the active filter directive at runtime
pub fn set_log_level(level: &str) -> Result<()> {
    let handle = LOG_FILTER_HANDLE
        .get()
        .ok_or_else(|| Error::Logging("logging not initialized".to_string()))?;
    let filter = EnvFilter::try_new(level)
        .map_err(|e| Error::Logging(format!("invalid filter '{}': {}", level, e)))?;
    handle
        .reload(filter)
        .map_err(|e| Error::Logging(e.to_string()))?;
    store_level(level.to_string());
    tracing::info!("Log level changed to {}", level);
    Ok(())
}

/// Active filter directive, `None` before initialization
pub fn get_log_level() -> Option<String> {
    let slot = CURRENT_LOG_LEVEL.get()?;
    match slot.lock() {
        Ok(level) => Some(level.clone()),
        Err(poisoned) => Some(poisoned.into_inner().clone()),
    }
}
