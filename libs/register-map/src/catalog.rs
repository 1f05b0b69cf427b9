//! Register catalog
//!
//! Declarative description of every logical variable exposed by the device.
//! Raw entries (as written in the register map file) are validated once into
//! [`RegisterSpec`]s whose [`RegisterKind`] fixes the decode path, so nothing
//! is re-interpreted per read.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

use crate::error::{RegisterError, Result};

/// Largest decimal scaling accepted for a 32-bit register
pub const MAX_DECIMALS: u8 = 9;

/// Register width as written in the map file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegisterType {
    U16,
    U32,
}

/// Access mode (advisory for reads, enforced for writes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Access {
    #[serde(rename = "R", alias = "r", alias = "ro")]
    ReadOnly,
    #[serde(rename = "W", alias = "w", alias = "wo")]
    WriteOnly,
    #[default]
    #[serde(rename = "R/W", alias = "r/w", alias = "RW", alias = "rw")]
    ReadWrite,
}

impl Access {
    pub fn is_readable(&self) -> bool {
        !matches!(self, Access::WriteOnly)
    }

    pub fn is_writable(&self) -> bool {
        !matches!(self, Access::ReadOnly)
    }
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Access::ReadOnly => write!(f, "R"),
            Access::WriteOnly => write!(f, "W"),
            Access::ReadWrite => write!(f, "R/W"),
        }
    }
}

/// Register entry as it appears in the map file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawRegisterSpec {
    pub offset: i64,
    #[serde(rename = "type")]
    pub register_type: RegisterType,
    #[serde(default)]
    pub decimals: Option<i64>,
    #[serde(default)]
    pub bits: Option<BTreeMap<i64, String>>,
    #[serde(default, alias = "rw")]
    pub access: Access,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Decode path of a variable, fixed at catalog load
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisterKind {
    /// One register, scaled by `10^decimals`
    Numeric16 { decimals: u8 },
    /// Two registers composed per word order, scaled by `10^decimals`
    Numeric32 { decimals: u8 },
    /// One register whose declared bits are named flags
    BitField { bits: BTreeMap<u8, String> },
}

impl RegisterKind {
    /// Number of registers occupied
    pub fn width(&self) -> u16 {
        match self {
            RegisterKind::Numeric32 { .. } => 2,
            RegisterKind::Numeric16 { .. } | RegisterKind::BitField { .. } => 1,
        }
    }
}

/// Validated, immutable description of one logical variable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterSpec {
    pub offset: u16,
    pub kind: RegisterKind,
    pub access: Access,
    pub unit: Option<String>,
    pub description: Option<String>,
}

impl RegisterSpec {
    pub fn width(&self) -> u16 {
        self.kind.width()
    }

    /// Inclusive `[first, last]` word range relative to the base address
    pub fn word_range(&self) -> (u32, u32) {
        let first = u32::from(self.offset);
        (first, first + u32::from(self.width()) - 1)
    }

    /// Validate a raw file entry
    ///
    /// Rejects negative offsets, bit positions outside 0..=15, duplicate flag
    /// names, bit maps on 32-bit registers and variables declaring both a bit
    /// map and decimal scaling.
    pub fn from_raw(name: &str, raw: &RawRegisterSpec) -> Result<Self> {
        let offset = u16::try_from(raw.offset).map_err(|_| {
            RegisterError::invalid_spec(
                name,
                format!("offset {} outside 0..={}", raw.offset, u16::MAX),
            )
        })?;

        let decimals = match raw.decimals {
            None => 0,
            Some(d) if (0..=i64::from(MAX_DECIMALS)).contains(&d) => d as u8,
            Some(d) => {
                return Err(RegisterError::invalid_spec(
                    name,
                    format!("decimals {d} outside 0..={MAX_DECIMALS}"),
                ))
            },
        };

        let kind = match (&raw.bits, raw.register_type) {
            (Some(bits), RegisterType::U16) => {
                if decimals > 0 {
                    return Err(RegisterError::invalid_spec(
                        name,
                        "bit map and decimal scaling are mutually exclusive",
                    ));
                }
                RegisterKind::BitField {
                    bits: validate_bits(name, bits)?,
                }
            },
            (Some(_), RegisterType::U32) => {
                return Err(RegisterError::invalid_spec(
                    name,
                    "bit maps are only supported on u16 registers",
                ))
            },
            (None, RegisterType::U16) => RegisterKind::Numeric16 { decimals },
            (None, RegisterType::U32) => RegisterKind::Numeric32 { decimals },
        };

        if u32::from(offset) + u32::from(kind.width()) - 1 > u32::from(u16::MAX) {
            return Err(RegisterError::invalid_spec(
                name,
                "u32 register runs past the end of the offset space",
            ));
        }

        Ok(Self {
            offset,
            kind,
            access: raw.access,
            unit: raw.unit.clone(),
            description: raw.description.clone(),
        })
    }
}

fn validate_bits(name: &str, bits: &BTreeMap<i64, String>) -> Result<BTreeMap<u8, String>> {
    if bits.is_empty() {
        return Err(RegisterError::invalid_spec(name, "bit map is empty"));
    }

    let mut seen = HashSet::new();
    let mut out = BTreeMap::new();
    for (&bit, flag) in bits {
        if !(0..=15).contains(&bit) {
            return Err(RegisterError::invalid_spec(
                name,
                format!("bit position {bit} outside 0..=15"),
            ));
        }
        let flag = flag.trim();
        if flag.is_empty() {
            return Err(RegisterError::invalid_spec(
                name,
                format!("bit {bit} has an empty flag name"),
            ));
        }
        if !seen.insert(flag.to_string()) {
            return Err(RegisterError::invalid_spec(
                name,
                format!("flag name '{flag}' declared twice"),
            ));
        }
        out.insert(bit as u8, flag.to_string());
    }
    Ok(out)
}

/// Name → spec mapping, immutable after construction
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegisterCatalog {
    specs: BTreeMap<String, RegisterSpec>,
}

impl RegisterCatalog {
    /// Validate every raw entry; the first invalid entry fails the whole catalog
    pub fn from_raw(raw: &BTreeMap<String, RawRegisterSpec>) -> Result<Self> {
        let mut specs = BTreeMap::new();
        for (name, entry) in raw {
            if name.trim().is_empty() {
                return Err(RegisterError::invalid_spec(name, "empty variable name"));
            }
            specs.insert(name.clone(), RegisterSpec::from_raw(name, entry)?);
        }
        Ok(Self { specs })
    }

    pub fn get(&self, name: &str) -> Option<&RegisterSpec> {
        self.specs.get(name)
    }

    /// Look up a variable, failing with `UnknownVariable`
    pub fn spec(&self, name: &str) -> Result<&RegisterSpec> {
        self.specs
            .get(name)
            .ok_or_else(|| RegisterError::UnknownVariable(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.specs.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RegisterSpec)> {
        self.specs.iter().map(|(k, v)| (k.as_str(), v))
    }
}
