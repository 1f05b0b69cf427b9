//! Service settings
//!
//! Loaded with figment from a YAML file, with `MDWSRV_SECTION__KEY`
//! environment overrides, then validated before anything touches the port.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use common::config_loader;
use common::LoggingSettings;
use errors::{MdwError, MdwResult};
use register_map::{ReaderOptions, RegisterMap, WordOrder};
use tracing::{debug, warn};

/// Default settings file location
pub const DEFAULT_CONFIG_PATH: &str = "config/mdwsrv.yaml";
/// Environment variable naming the settings file
pub const CONFIG_PATH_ENV: &str = "MDWSRV_CONFIG";
/// Prefix of per-key environment overrides
pub const ENV_PREFIX: &str = "MDWSRV_";

/// Serial parity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Parity {
    #[serde(rename = "N", alias = "n", alias = "None", alias = "none")]
    None,
    #[serde(rename = "E", alias = "e", alias = "Even", alias = "even")]
    Even,
    #[serde(rename = "O", alias = "o", alias = "Odd", alias = "odd")]
    Odd,
}

impl fmt::Display for Parity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Parity::None => write!(f, "N"),
            Parity::Even => write!(f, "E"),
            Parity::Odd => write!(f, "O"),
        }
    }
}

/// `modbus` section: serial link and slave
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModbusSettings {
    pub port: String,
    #[serde(default = "default_baudrate")]
    pub baudrate: u32,
    #[serde(default = "default_parity")]
    pub parity: Parity,
    #[serde(default = "default_stopbits")]
    pub stopbits: u8,
    #[serde(default = "default_bytesize")]
    pub bytesize: u8,
    /// Response timeout per request
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Read attempts per request
    #[serde(default = "default_retries")]
    pub retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_slave_id")]
    pub slave_id: u8,
}

/// `read` section: what to poll and how often
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadSettings {
    /// Added to every register offset to form the wire address
    pub base_address: i64,
    pub profile: String,
    pub interval_ms: u64,
    pub word_order: WordOrder,
    /// Alternative register map file (built-in MDW map when unset)
    pub register_map: Option<PathBuf>,
    /// Pause between closing a lost link and reconnecting
    pub reconnect_cooldown_ms: u64,
    /// Consecutive all-unavailable cycles treated as a lost link
    pub max_failed_cycles: u32,
}

impl Default for ReadSettings {
    fn default() -> Self {
        Self {
            base_address: 0,
            profile: "basic".to_string(),
            interval_ms: 1000,
            word_order: WordOrder::HiLo,
            register_map: None,
            reconnect_cooldown_ms: 3000,
            max_failed_cycles: 3,
        }
    }
}

/// `scan` section: serial parameter sweep
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanSettings {
    /// Defaults to `[modbus.baudrate]`
    pub baudrates: Option<Vec<u32>>,
    /// Defaults to `[modbus.parity]`
    pub parities: Option<Vec<Parity>>,
    /// Range expression, e.g. `1-10, 20, 30-35`
    pub slave_ids: String,
    pub test_address: u16,
    pub test_count: u16,
    pub timeout_ms: u64,
    pub retries: u32,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            baudrates: None,
            parities: None,
            slave_ids: "0-246".to_string(),
            test_address: 1,
            test_count: 1,
            timeout_ms: 200,
            retries: 1,
        }
    }
}

/// Complete service settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MdwSettings {
    pub modbus: ModbusSettings,
    #[serde(default)]
    pub read: ReadSettings,
    #[serde(default)]
    pub scan: ScanSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

fn default_baudrate() -> u32 {
    9600
}

fn default_parity() -> Parity {
    Parity::None
}

fn default_stopbits() -> u8 {
    1
}

fn default_bytesize() -> u8 {
    8
}

fn default_timeout_ms() -> u64 {
    1000
}

fn default_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    100
}

fn default_slave_id() -> u8 {
    1
}

/// Collected validation findings
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn add_error(&mut self, msg: String) {
        self.errors.push(msg);
    }

    pub fn add_warning(&mut self, msg: String) {
        self.warnings.push(msg);
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

impl ModbusSettings {
    pub fn validate(&self, result: &mut ValidationResult) {
        if self.port.trim().is_empty() {
            result.add_error("modbus.port cannot be empty".to_string());
        }
        if self.baudrate == 0 {
            result.add_error("modbus.baudrate cannot be 0".to_string());
        }
        if !(5..=8).contains(&self.bytesize) {
            result.add_error(format!("modbus.bytesize {} not in 5..=8", self.bytesize));
        }
        if !(1..=2).contains(&self.stopbits) {
            result.add_error(format!("modbus.stopbits {} not in 1..=2", self.stopbits));
        }
        if self.timeout_ms == 0 {
            result.add_error("modbus.timeout_ms cannot be 0".to_string());
        }
        if self.retries == 0 {
            result.add_error("modbus.retries must be at least 1".to_string());
        }
        if self.slave_id > 247 {
            result.add_warning(format!(
                "modbus.slave_id {} is outside the unicast range 1..=247",
                self.slave_id
            ));
        }
    }
}

impl ReadSettings {
    pub fn validate(&self, result: &mut ValidationResult) {
        if self.interval_ms == 0 {
            result.add_error("read.interval_ms cannot be 0".to_string());
        }
        if self.max_failed_cycles == 0 {
            result.add_error("read.max_failed_cycles must be at least 1".to_string());
        }
        if self.profile.trim().is_empty() {
            result.add_error("read.profile cannot be empty".to_string());
        }
    }
}

impl ScanSettings {
    pub fn validate(&self, result: &mut ValidationResult) {
        if let Err(e) = parse_id_ranges(&self.slave_ids) {
            result.add_error(format!("scan.slave_ids: {}", e));
        }
        if self.test_count == 0 {
            result.add_error("scan.test_count cannot be 0".to_string());
        }
        if self.retries == 0 {
            result.add_error("scan.retries must be at least 1".to_string());
        }
        if matches!(&self.baudrates, Some(b) if b.is_empty()) {
            result.add_error("scan.baudrates cannot be an empty list".to_string());
        }
        if matches!(&self.parities, Some(p) if p.is_empty()) {
            result.add_error("scan.parities cannot be an empty list".to_string());
        }
    }
}

impl MdwSettings {
    /// Load from `path` plus environment overrides, then validate
    pub fn load(path: &Path) -> MdwResult<Self> {
        if !path.is_file() {
            return Err(MdwError::ConfigNotFound(path.display().to_string()));
        }
        let settings: Self = config_loader::load_yaml_config(path, ENV_PREFIX)?;
        settings.check()?;
        debug!("Settings loaded: {:?}", settings);
        Ok(settings)
    }

    /// Path resolution: CLI flag > MDWSRV_CONFIG > config/mdwsrv.yaml
    pub fn resolve_path(cli_path: Option<&Path>) -> PathBuf {
        config_loader::resolve_config_path(cli_path, CONFIG_PATH_ENV, DEFAULT_CONFIG_PATH)
    }

    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();
        self.modbus.validate(&mut result);
        self.read.validate(&mut result);
        self.scan.validate(&mut result);
        result
    }

    /// Validate, logging warnings and failing if any error was found
    pub fn check(&self) -> MdwResult<()> {
        let result = self.validate();
        for warning in &result.warnings {
            warn!("{}", warning);
        }
        if result.is_valid() {
            Ok(())
        } else {
            Err(MdwError::InvalidConfig {
                field: "settings".to_string(),
                reason: result.errors.join("; "),
            })
        }
    }

    /// Register map named by `read.register_map`, or the built-in one
    pub fn register_map(&self) -> MdwResult<RegisterMap> {
        let map = match &self.read.register_map {
            Some(path) => RegisterMap::from_file(path)?,
            None => RegisterMap::mdw_default()?,
        };
        Ok(map)
    }

    pub fn reader_options(&self) -> ReaderOptions {
        ReaderOptions {
            base_address: self.read.base_address,
            slave_id: self.modbus.slave_id,
            word_order: self.read.word_order,
        }
    }

    pub fn serial_params(&self) -> SerialParams {
        SerialParams {
            port: self.modbus.port.clone(),
            baudrate: self.modbus.baudrate,
            parity: self.modbus.parity,
            stopbits: self.modbus.stopbits,
            bytesize: self.modbus.bytesize,
            timeout: Duration::from_millis(self.modbus.timeout_ms),
            retries: self.modbus.retries,
            retry_delay: Duration::from_millis(self.modbus.retry_delay_ms),
        }
    }

    pub fn scan_baudrates(&self) -> Vec<u32> {
        self.scan
            .baudrates
            .clone()
            .unwrap_or_else(|| vec![self.modbus.baudrate])
    }

    pub fn scan_parities(&self) -> Vec<Parity> {
        self.scan
            .parities
            .clone()
            .unwrap_or_else(|| vec![self.modbus.parity])
    }
}

/// Everything needed to open one serial link
#[derive(Debug, Clone, PartialEq)]
pub struct SerialParams {
    pub port: String,
    pub baudrate: u32,
    pub parity: Parity,
    pub stopbits: u8,
    pub bytesize: u8,
    pub timeout: Duration,
    pub retries: u32,
    pub retry_delay: Duration,
}

impl fmt::Display for SerialParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}{}{}",
            self.port, self.baudrate, self.bytesize, self.parity, self.stopbits
        )
    }
}

/// Parse a slave id list such as `1-10, 20, 30-35`
///
/// Ranges are inclusive and may run downwards (`10-1`). Order is preserved.
pub fn parse_id_ranges(expr: &str) -> MdwResult<Vec<u8>> {
    let mut ids = Vec::new();
    for part in expr.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        match part.split_once('-') {
            Some((start, end)) => {
                let start = parse_id(start)?;
                let end = parse_id(end)?;
                if start <= end {
                    ids.extend(start..=end);
                } else {
                    ids.extend((end..=start).rev());
                }
            },
            None => ids.push(parse_id(part)?),
        }
    }
    Ok(ids)
}

fn parse_id(token: &str) -> MdwResult<u8> {
    token
        .trim()
        .parse::<u8>()
        .map_err(|e| MdwError::InvalidParameter {
            param: "slave id".to_string(),
            reason: format!("'{}': {}", token.trim(), e),
        })
}
