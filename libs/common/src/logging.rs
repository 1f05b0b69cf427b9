//! Unified logging module for the MDW services
//!
//! Console output plus a daily rolling log file per service

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{
        self,
        format::{FmtSpan, Writer},
        FmtContext, FormatEvent, FormatFields,
    },
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Custom format for log level with brackets: `[INFO]`, `[WARN]`, etc.
fn format_level(level: &Level) -> &'static str {
    match *level {
        Level::TRACE => "[TRACE]",
        Level::DEBUG => "[DEBUG]",
        Level::INFO => "[INFO]",
        Level::WARN => "[WARN]",
        Level::ERROR => "[ERROR]",
    }
}

/// Custom event formatter that outputs: `timestamp [LEVEL] message`
///
/// Example output: `2026-03-02T00:50:44.809123Z [INFO] Connected to /dev/ttyUSB0`
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
                Level::TRACE => "\x1b[35m", // magenta
                Level::DEBUG => "\x1b[34m", // blue
                Level::INFO => "\x1b[32m",  // green
                Level::WARN => "\x1b[33m",  // yellow
                Level::ERROR => "\x1b[31m", // red
            };
            write!(writer, "{}{}\x1b[0m ", color, format_level(&level))?;
        } else {
            write!(writer, "{} ", format_level(&level))?;
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;

        writeln!(writer)
    }
}

// Global guard keeping the non-blocking file writer alive
static GUARDS: OnceLock<Mutex<Vec<WorkerGuard>>> = OnceLock::new();

// ============================================================================
// Log Root Directory Configuration
// ============================================================================

/// Environment variable overriding the log root directory
pub const LOG_DIR_ENV: &str = "MDW_LOG_DIR";

/// Global log root directory (initialized once from config or env)
static LOG_ROOT: OnceLock<PathBuf> = OnceLock::new();

fn resolve_log_root(env_dir: Option<String>, config_dir: Option<&str>) -> PathBuf {
    env_dir
        .filter(|d| !d.is_empty())
        .map(PathBuf::from)
        .or_else(|| config_dir.map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("logs"))
}

/// Initialize log root directory from config or environment
///
/// Priority:
/// 1. `MDW_LOG_DIR` environment variable (highest)
/// 2. `config_dir` parameter (from the settings file)
/// 3. Default value "logs" (lowest)
pub fn init_log_root(config_dir: Option<&str>) {
    LOG_ROOT.get_or_init(|| resolve_log_root(std::env::var(LOG_DIR_ENV).ok(), config_dir));
}

/// Get log root directory
pub fn get_log_root() -> PathBuf {
    LOG_ROOT
        .get()
        .cloned()
        .unwrap_or_else(|| resolve_log_root(std::env::var(LOG_DIR_ENV).ok(), None))
}

/// Default max file size: 100MB
const DEFAULT_MAX_FILE_SIZE: u64 = 100 * 1024 * 1024;

// Daily rolling file writer with naming format: {YYYYMMDD}_{service}.log
// Also supports size-based rotation within a day ({YYYYMMDD}_{service}.N.log)
struct DailyRollingWriter {
    service_name: String,
    log_dir: PathBuf,
    current_date: Arc<Mutex<String>>,
    current_file: Arc<Mutex<Option<File>>>,
    current_size: Arc<AtomicU64>,
    max_file_size: u64,
    rotation_count: Arc<AtomicU32>,
}

fn lock_err<T>(e: std::sync::PoisonError<T>) -> std::io::Error {
    std::io::Error::other(format!("Mutex poisoned: {}", e))
}

impl DailyRollingWriter {
    fn new(service_name: String, log_dir: PathBuf) -> std::io::Result<Self> {
        Self::with_max_size(service_name, log_dir, DEFAULT_MAX_FILE_SIZE)
    }

    fn with_max_size(
        service_name: String,
        log_dir: PathBuf,
        max_file_size: u64,
    ) -> std::io::Result<Self> {
        let current_date = chrono::Local::now().format("%Y%m%d").to_string();
        let file_path = log_dir.join(format!("{}_{}.log", current_date, service_name));

        fs::create_dir_all(&log_dir)?;

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&file_path)?;
        let initial_size = file.metadata().map(|m| m.len()).unwrap_or(0);

        Ok(Self {
            service_name,
            log_dir,
            current_date: Arc::new(Mutex::new(current_date)),
            current_file: Arc::new(Mutex::new(Some(file))),
            current_size: Arc::new(AtomicU64::new(initial_size)),
            max_file_size,
            rotation_count: Arc::new(AtomicU32::new(0)),
        })
    }

    fn rotate_by_size(&self) -> std::io::Result<()> {
        let current_date = self.current_date.lock().map_err(lock_err)?;
        let count = self.rotation_count.fetch_add(1, Ordering::SeqCst) + 1;

        let new_file_path = self.log_dir.join(format!(
            "{}_{}.{}.log",
            *current_date, self.service_name, count
        ));
        let new_file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&new_file_path)?;

        self.current_size.store(0, Ordering::SeqCst);
        *self.current_file.lock().map_err(lock_err)? = Some(new_file);
        Ok(())
    }

    fn get_writer(&self) -> std::io::Result<std::sync::MutexGuard<'_, Option<File>>> {
        let today = chrono::Local::now().format("%Y%m%d").to_string();
        let mut current_date = self.current_date.lock().map_err(lock_err)?;

        if *current_date != today {
            fs::create_dir_all(&self.log_dir)?;
            let new_file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(
                    self.log_dir
                        .join(format!("{}_{}.log", today, self.service_name)),
                )?;
            let initial_size = new_file.metadata().map(|m| m.len()).unwrap_or(0);

            *current_date = today;
            self.rotation_count.store(0, Ordering::SeqCst);
            self.current_size.store(initial_size, Ordering::SeqCst);
            *self.current_file.lock().map_err(lock_err)? = Some(new_file);
        }

        self.current_file.lock().map_err(lock_err)
    }
}

impl Write for DailyRollingWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let current_size = self.current_size.load(Ordering::Relaxed);
        if current_size > 0 && current_size + buf.len() as u64 > self.max_file_size {
            self.rotate_by_size()?;
        }

        if let Some(ref mut file) = *self.get_writer()? {
            let written = file.write(buf)?;
            self.current_size
                .fetch_add(written as u64, Ordering::Relaxed);
            Ok(written)
        } else {
            Ok(0)
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        if let Some(ref mut file) = *self.get_writer()? {
            file.flush()
        } else {
            Ok(())
        }
    }
}

/// Logger configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Service name (e.g., "mdwsrv")
    pub service_name: String,
    /// Directory for this service's log files
    pub log_dir: PathBuf,
    /// Default level when RUST_LOG is not set
    pub level: Level,
    /// Write a daily log file in addition to the console
    pub file_output: bool,
    /// Enable JSON format for the log file
    pub enable_json: bool,
    /// Colored console output
    pub ansi: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown".to_string(),
            log_dir: get_log_root(),
            level: Level::INFO,
            file_output: true,
            enable_json: false,
            ansi: true,
        }
    }
}

/// Filter directive: RUST_LOG wins, otherwise `level` for everything
pub fn filter_directive(rust_log: Option<&str>, level: Level) -> String {
    match rust_log {
        Some(env) if !env.trim().is_empty() => env.to_string(),
        _ => level.as_str().to_lowercase(),
    }
}

/// Initialize logging system with configuration
pub fn init_with_config(config: LogConfig) -> Result<(), Box<dyn std::error::Error>> {
    let directive = filter_directive(std::env::var("RUST_LOG").ok().as_deref(), config.level);
    let env_filter = EnvFilter::try_new(&directive)?;

    let console_layer = fmt::layer()
        .with_ansi(config.ansi)
        .event_format(BracketedLevelFormat)
        .boxed();

    let file_layer = if config.file_output {
        let writer = DailyRollingWriter::new(config.service_name.clone(), config.log_dir.clone())?;
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
                .with_level(true)
                .with_target(true)
                .with_span_events(FmtSpan::CLOSE)
                .boxed()
        } else {
            fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .event_format(BracketedLevelFormat)
                .boxed()
        };
        Some(layer)
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()?;

    if config.file_output {
        tracing::debug!(
            "Logging: {} @ {:?} (filter: {})",
            config.service_name,
            config.log_dir,
            directive
        );
    }

    Ok(())
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_log_root_priority() {
        assert_eq!(
            resolve_log_root(Some("/var/log/mdw".into()), Some("cfg")),
            PathBuf::from("/var/log/mdw")
        );
        assert_eq!(resolve_log_root(None, Some("cfg")), PathBuf::from("cfg"));
        assert_eq!(
            resolve_log_root(Some(String::new()), None),
            PathBuf::from("logs")
        );
    }

    #[test]
    fn test_filter_directive() {
        assert_eq!(filter_directive(None, Level::INFO), "info");
        assert_eq!(filter_directive(Some(""), Level::DEBUG), "debug");
        assert_eq!(
            filter_directive(Some("warn,mdwsrv=trace"), Level::INFO),
            "warn,mdwsrv=trace"
        );
    }

    #[test]
    fn test_daily_file_name() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer =
            DailyRollingWriter::new("mdwsrv".to_string(), dir.path().to_path_buf()).unwrap();
        writer.write_all(b"hello\n").unwrap();
        writer.flush().unwrap();

        let today = chrono::Local::now().format("%Y%m%d").to_string();
        let content =
            fs::read_to_string(dir.path().join(format!("{}_mdwsrv.log", today))).unwrap();
        assert_eq!(content, "hello\n");
    }

    #[test]
    fn test_size_rotation() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer =
            DailyRollingWriter::with_max_size("mdwsrv".to_string(), dir.path().to_path_buf(), 8)
                .unwrap();
        writer.write_all(b"0123456").unwrap();
        writer.write_all(b"abcdef").unwrap();
        writer.flush().unwrap();

        let today = chrono::Local::now().format("%Y%m%d").to_string();
        let rotated =
            fs::read_to_string(dir.path().join(format!("{}_mdwsrv.1.log", today))).unwrap();
        assert_eq!(rotated, "abcdef");
    }
}
