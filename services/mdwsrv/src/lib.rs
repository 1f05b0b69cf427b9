//! MDW blender poller service
//!
//! Modbus RTU transport, settings, the poll loop and the scan / diagnose
//! tools built on the `register-map` library.

pub mod bootstrap;
pub mod cli;
pub mod config;
pub mod diagnose;
pub mod poller;
pub mod scan;
pub mod transport;

pub use config::{MdwSettings, Parity, SerialParams};
pub use poller::{PollStats, Poller, PollerOptions};
pub use transport::{Connector, Retrying, RtuClient, RtuConnector, RtuLink};
