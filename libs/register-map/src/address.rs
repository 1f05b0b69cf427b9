//! Wire address resolution
//!
//! Vendor manuals number registers as offsets ("+9") from an installation
//! specific base (0, 1, 40001, ...). Resolution is plain `base + offset`;
//! whether the result fits the 16-bit Modbus address space is only checked
//! when a request is built.

use crate::catalog::RegisterSpec;
use crate::error::{RegisterError, Result};

/// `base_address + offset`, never overflowing
pub fn resolve_address(offset: u16, base_address: i64) -> i64 {
    base_address.saturating_add(i64::from(offset))
}

/// One pending request: where to read and how many words
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedRead {
    pub wire_address: i64,
    pub word_count: u16,
}

impl ResolvedRead {
    pub fn for_spec(spec: &RegisterSpec, base_address: i64) -> Self {
        Self {
            wire_address: resolve_address(spec.offset, base_address),
            word_count: spec.width(),
        }
    }

    /// Protocol address, or `ReadFailed` if the block leaves `0..=65535`
    pub fn protocol_address(&self) -> Result<u16> {
        checked_address(self.wire_address, self.word_count).ok_or_else(|| {
            RegisterError::ReadFailed {
                address: self.wire_address,
                count: self.word_count,
                reason: OUT_OF_SPACE.into(),
            }
        })
    }
}

pub(crate) const OUT_OF_SPACE: &str = "address outside the Modbus address space";

/// 16-bit start address if the whole `count`-word block fits the address space
pub fn checked_address(wire_address: i64, count: u16) -> Option<u16> {
    let last = wire_address
        .saturating_add(i64::from(count.max(1)))
        .saturating_sub(1);
    if last > i64::from(u16::MAX) {
        return None;
    }
    u16::try_from(wire_address).ok()
}
