//! Unified service bootstrap utilities
//!
//! Startup banner and logging initialization shared by the MDW binaries.

use crate::logging::{self, LogConfig};
use serde::{Deserialize, Serialize};
use tracing::{info, Level};

/// Service metadata for startup
pub struct ServiceInfo {
    /// Service name (e.g., "mdwsrv")
    pub name: String,
    /// Service version from Cargo.toml
    pub version: String,
    /// Service description
    pub description: String,
}

impl ServiceInfo {
    pub fn new(name: impl Into<String>, version: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            description: description.into(),
        }
    }
}

/// `logging` section of a service settings file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default level when RUST_LOG is not set
    pub level: String,
    /// Log root directory (MDW_LOG_DIR wins)
    pub dir: Option<String>,
    /// JSON lines in the log file
    pub enable_json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            dir: None,
            enable_json: false,
        }
    }
}

/// Print unified startup banner
pub fn print_startup_banner(service: &ServiceInfo) {
    let banner = r#"
 ███╗   ███╗██████╗ ██╗    ██╗███████╗██████╗ ██╗   ██╗
 ████╗ ████║██╔══██╗██║    ██║██╔════╝██╔══██╗██║   ██║
 ██╔████╔██║██║  ██║██║ █╗ ██║███████╗██████╔╝██║   ██║
 ██║╚██╔╝██║██║  ██║██║███╗██║╚════██║██╔══██╗╚██╗ ██╔╝
 ██║ ╚═╝ ██║██████╔╝╚███╔███╔╝███████║██║  ██║ ╚████╔╝
 ╚═╝     ╚═╝╚═════╝  ╚══╝╚══╝ ╚══════╝╚═╝  ╚═╝  ╚═══╝
    "#;

    info!("{}", banner);
    info!(" {} v{}", service.name.to_uppercase(), service.version);
    info!(" {}", service.description);
    info!("");
}

/// Parse a level name, falling back to INFO
pub fn parse_level(level: &str) -> Level {
    level.trim().parse::<Level>().unwrap_or(Level::INFO)
}

/// Initialize logging for a service
///
/// Log root directory priority:
/// 1. MDW_LOG_DIR environment variable
/// 2. `settings.dir`
/// 3. Default "logs"
///
/// `level_override` (from the command line) replaces `settings.level`;
/// RUST_LOG still wins over both.
pub fn init_logging(
    service: &ServiceInfo,
    settings: &LoggingSettings,
    level_override: Option<&str>,
    file_output: bool,
    ansi: bool,
) -> anyhow::Result<()> {
    logging::init_log_root(settings.dir.as_deref());

    let level = parse_level(level_override.unwrap_or(&settings.level));
    let log_config = LogConfig {
        service_name: service.name.clone(),
        log_dir: logging::get_log_root(),
        level,
        file_output,
        enable_json: settings.enable_json,
        ansi,
    };

    logging::init_with_config(log_config).map_err(|e| anyhow::anyhow!("{}", e))?;

    Ok(())
}
