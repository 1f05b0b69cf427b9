//! Named read profiles
//!
//! A profile is an ordered list of catalog variable names; results are
//! reported in that order.

use std::collections::{BTreeMap, HashSet};

use tracing::warn;

use crate::catalog::RegisterCatalog;
use crate::error::{RegisterError, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileSet {
    profiles: BTreeMap<String, Vec<String>>,
}

impl ProfileSet {
    /// Validate raw profiles against the catalog
    ///
    /// Every profile must be non-empty and name only catalog variables.
    /// Repeated names are collapsed to their first occurrence.
    pub fn from_raw(
        raw: &BTreeMap<String, Vec<String>>,
        catalog: &RegisterCatalog,
    ) -> Result<Self> {
        let mut profiles = BTreeMap::new();
        for (name, members) in raw {
            if members.is_empty() {
                return Err(RegisterError::invalid_spec(name, "profile has no variables"));
            }

            let mut seen = HashSet::new();
            let mut ordered = Vec::with_capacity(members.len());
            for member in members {
                if !catalog.contains(member) {
                    return Err(RegisterError::invalid_spec(
                        name,
                        format!("profile references unknown variable '{member}'"),
                    ));
                }
                if seen.insert(member.as_str()) {
                    ordered.push(member.clone());
                } else {
                    warn!("Profile '{}' lists '{}' more than once", name, member);
                }
            }
            profiles.insert(name.clone(), ordered);
        }
        Ok(Self { profiles })
    }

    /// Ordered variable names of a profile
    pub fn get(&self, name: &str) -> Result<&[String]> {
        self.profiles
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| RegisterError::UnknownProfile {
                name: name.to_string(),
                available: self.names(),
            })
    }

    pub fn names(&self) -> Vec<String> {
        self.profiles.keys().cloned().collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.profiles.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.profiles
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_slice()))
    }
}
