//! Link diagnostics
//!
//! Three stages on one link with single-attempt reads: find a slave id that
//! answers, find the base address that makes offset 9 readable, then sweep
//! a wire-address range for readable registers.

use serde::Serialize;
use std::fmt;
use std::ops::RangeInclusive;
use tracing::{debug, info, warn};

use crate::config::SerialParams;
use crate::transport::Connector;
use errors::MdwResult;
use register_map::{checked_address, resolve_address, RegisterTransport};

/// Common base address conventions
pub const BASE_CANDIDATES: [(i64, &str); 4] = [
    (0, "direct (0-based)"),
    (1, "1-based"),
    (40001, "Modicon 40001+"),
    (400000, "Modicon 400000+"),
];

/// Offset of the first register of the `basic` profile
pub const PROBE_OFFSET: u16 = 9;

pub const SLAVE_PROBE_IDS: RangeInclusive<u8> = 1..=10;
pub const SLAVE_PROBE_ADDRESS: u16 = 0;
pub const DEFAULT_SWEEP: RangeInclusive<u16> = 0..=100;

/// Base address that answered the probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BaseProbe {
    pub base: i64,
    pub description: String,
    pub address: u16,
    pub value: u16,
}

/// One readable register found by the sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SweptRegister {
    pub address: u16,
    pub value: u16,
}

impl fmt::Display for SweptRegister {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:3}: {:5} (0x{:04X})", self.address, self.value, self.value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiagnoseReport {
    pub configured_slave_id: u8,
    pub found_slave_id: Option<u8>,
    pub base: Option<BaseProbe>,
    pub registers: Vec<SweptRegister>,
}

impl DiagnoseReport {
    /// Slave id the later stages ran against
    pub fn effective_slave_id(&self) -> u8 {
        self.found_slave_id.unwrap_or(self.configured_slave_id)
    }
}

impl fmt::Display for DiagnoseReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.found_slave_id {
            Some(id) => writeln!(f, "Slave ID: {}", id)?,
            None => writeln!(f, "Slave ID: not detected")?,
        }
        match &self.base {
            Some(probe) => writeln!(f, "Base address: {} ({})", probe.base, probe.description)?,
            None => writeln!(f, "Base address: not detected")?,
        }
        match (self.registers.first(), self.registers.last()) {
            (Some(first), Some(last)) => write!(
                f,
                "Readable registers: {} ({}..={})",
                self.registers.len(),
                first.address,
                last.address
            ),
            _ => write!(f, "Readable registers: none"),
        }
    }
}

/// First id in `ids` that answers a one-register read at `address`
pub async fn probe_slave_ids<T>(transport: &mut T, ids: RangeInclusive<u8>, address: u16) -> Option<u8>
where
    T: RegisterTransport + ?Sized,
{
    for slave_id in ids {
        match transport.read_holding(slave_id, address, 1).await {
            Ok(_) => {
                info!("Slave id {} answered", slave_id);
                return Some(slave_id);
            },
            Err(e) => debug!("Slave id {}: no answer ({})", slave_id, e),
        }
    }
    None
}

/// First base in [`BASE_CANDIDATES`] for which `base + PROBE_OFFSET` reads
///
/// Candidates whose wire address falls outside 0..=65535 count as failed.
pub async fn probe_base_address<T>(transport: &mut T, slave_id: u8) -> Option<BaseProbe>
where
    T: RegisterTransport + ?Sized,
{
    for (base, description) in BASE_CANDIDATES {
        let wire = resolve_address(PROBE_OFFSET, base);
        let Some(address) = checked_address(wire, 1) else {
            debug!("Base {} ({}): address {} out of range", base, description, wire);
            continue;
        };

        match transport.read_holding(slave_id, address, 1).await {
            Ok(words) => {
                let value = words.first().copied().unwrap_or_default();
                info!("Base {} ({}) answered: {}", base, description, value);
                return Some(BaseProbe {
                    base,
                    description: description.to_string(),
                    address,
                    value,
                });
            },
            Err(e) => debug!("Base {} ({}): {}", base, description, e),
        }
    }
    None
}

/// Every address in `range` that answers a one-register read
pub async fn sweep_addresses<T>(
    transport: &mut T,
    slave_id: u8,
    range: RangeInclusive<u16>,
) -> Vec<SweptRegister>
where
    T: RegisterTransport + ?Sized,
{
    let mut found = Vec::new();
    for address in range {
        if let Ok(words) = transport.read_holding(slave_id, address, 1).await {
            if let Some(&value) = words.first() {
                found.push(SweptRegister { address, value });
            }
        }
    }
    found
}

/// Run all three stages on one link
///
/// Reads use a single attempt regardless of the configured retries.
pub async fn diagnose<C: Connector>(
    connector: &C,
    params: &SerialParams,
    configured_slave_id: u8,
    sweep: RangeInclusive<u16>,
) -> MdwResult<DiagnoseReport> {
    let params = SerialParams {
        retries: 1,
        ..params.clone()
    };
    let mut link = connector.connect(&params).await?;

    info!("Stage 1: slave id probe {:?}", SLAVE_PROBE_IDS);
    let found_slave_id = probe_slave_ids(&mut link, SLAVE_PROBE_IDS, SLAVE_PROBE_ADDRESS).await;
    let slave_id = match found_slave_id {
        Some(id) if id != configured_slave_id => {
            warn!("Slave id {} answered, settings say {}", id, configured_slave_id);
            id
        },
        _ => configured_slave_id,
    };

    info!("Stage 2: base address probe (offset {})", PROBE_OFFSET);
    let base = probe_base_address(&mut link, slave_id).await;

    info!("Stage 3: address sweep {:?}", sweep);
    let registers = sweep_addresses(&mut link, slave_id, sweep).await;
    for register in &registers {
        info!("{}", register);
    }

    connector.close(link).await;

    Ok(DiagnoseReport {
        configured_slave_id,
        found_slave_id,
        base,
        registers,
    })
}
