//! Configuration loading helper functions
//!
//! Settings come from one YAML file with environment overrides layered on
//! top (`{PREFIX}SECTION__KEY=value`).

use figment::{
    providers::{Env, Format, Yaml},
    Figment,
};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Resolve the settings file path with priority: CLI flag > ENV > Default
pub fn resolve_config_path(cli_path: Option<&Path>, env_var: &str, default: &str) -> PathBuf {
    if let Some(path) = cli_path {
        debug!("Using config path from command line: {}", path.display());
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(env_var) {
        if !path.is_empty() {
            debug!("Using config path from {}: {}", env_var, path);
            return PathBuf::from(path);
        }
    }

    PathBuf::from(default)
}

/// Figment for `path` plus `env_prefix` overrides (`__` separates sections)
pub fn yaml_figment(path: &Path, env_prefix: &str) -> Figment {
    Figment::new()
        .merge(Yaml::file(path))
        .merge(Env::prefixed(env_prefix).split("__"))
}

/// Load settings from a YAML file that must exist
pub fn load_yaml_config<T>(path: &Path, env_prefix: &str) -> Result<T, figment::Error>
where
    T: DeserializeOwned,
{
    if !path.is_file() {
        return Err(figment::Error::from(format!(
            "Configuration file not found: {}",
            path.display()
        )));
    }

    info!("Loading configuration from: {}", path.display());
    yaml_figment(path, env_prefix).extract()
}
