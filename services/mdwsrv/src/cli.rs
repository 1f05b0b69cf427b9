//! Command line interface

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "mdwsrv",
    version = env!("CARGO_PKG_VERSION"),
    about = "MDW blender Modbus RTU register poller"
)]
pub struct Args {
    /// Settings file (overrides MDWSRV_CONFIG)
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Disable ANSI colors on the console
    #[arg(long)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, PartialEq, Subcommand)]
pub enum Command {
    /// Poll the configured profile until stopped (default)
    Run,
    /// Check settings and register map, list profiles
    Validate,
    /// Read one variable and print it as JSON
    Read {
        /// Variable name
        variable: String,
    },
    /// Write one variable
    Write {
        /// Variable name
        variable: String,
        /// Engineering value for numeric variables
        #[arg(long, allow_hyphen_values = true, conflicts_with = "flags", required_unless_present = "flags")]
        value: Option<f64>,
        /// Comma separated flag names to set for bit-field variables
        #[arg(long, value_delimiter = ',')]
        flags: Option<Vec<String>>,
    },
    /// Print the register span of a profile
    Span {
        /// Profile name
        profile: String,
    },
    /// Sweep baud rates, parities and slave ids for a responding device
    Scan,
    /// Probe slave id and base address, then sweep addresses
    Diagnose {
        #[arg(long, default_value_t = 0)]
        sweep_from: u16,
        #[arg(long, default_value_t = 100)]
        sweep_to: u16,
    },
}

impl Command {
    /// Long-running commands also log to files
    pub fn is_service(&self) -> bool {
        matches!(self, Command::Run)
    }
}
