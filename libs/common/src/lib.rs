//! MDW services basic library
//!
//! Provides basic functions shared by all services, including:
//! - logging functions
//! - settings file loading
//! - startup banner and shutdown handling

pub mod config_loader;
pub mod logging;
pub mod service_bootstrap;
pub mod shutdown;

pub use service_bootstrap::{LoggingSettings, ServiceInfo};
