//! Register map loading
//!
//! A register map is a YAML document with a `registers` table and a
//! `profiles` table. The built-in MDW map is embedded at compile time;
//! installations with a different firmware can point at their own file.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

use tracing::debug;

use crate::catalog::{RawRegisterSpec, RegisterCatalog};
use crate::error::{RegisterError, Result};
use crate::profile::ProfileSet;

const MDW_MAP: &str = include_str!("../data/mdw.yaml");

#[derive(Debug, Deserialize)]
struct RawRegisterMap {
    registers: BTreeMap<String, RawRegisterSpec>,
    #[serde(default)]
    profiles: BTreeMap<String, Vec<String>>,
}

/// Validated catalog plus the profiles that reference it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterMap {
    pub catalog: RegisterCatalog,
    pub profiles: ProfileSet,
}

impl RegisterMap {
    /// Built-in MDW blender map
    pub fn mdw_default() -> Result<Self> {
        Self::from_yaml_str(MDW_MAP)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let raw: RawRegisterMap = serde_yaml::from_str(yaml)?;
        if raw.registers.is_empty() {
            return Err(RegisterError::Parse("register map has no registers".into()));
        }
        let catalog = RegisterCatalog::from_raw(&raw.registers)?;
        let profiles = ProfileSet::from_raw(&raw.profiles, &catalog)?;
        debug!(
            "Register map loaded: {} variables, {} profiles",
            catalog.len(),
            profiles.names().len()
        );
        Ok(Self { catalog, profiles })
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| RegisterError::Parse(format!("{}: {}", path.display(), e)))?;
        Self::from_yaml_str(&content)
    }
}
