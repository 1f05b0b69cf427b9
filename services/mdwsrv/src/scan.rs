//! Serial parameter sweep
//!
//! Tries every baud rate × parity × slave id with a fresh link and stops at
//! the first combination that answers a holding register read.

use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::{parse_id_ranges, MdwSettings, Parity, SerialParams};
use crate::transport::Connector;
use errors::{MdwErrorTrait, MdwResult};
use register_map::RegisterTransport;

/// What to try
#[derive(Debug, Clone, PartialEq)]
pub struct ScanPlan {
    /// Port, framing, timeout and retries shared by every attempt
    pub base: SerialParams,
    pub baudrates: Vec<u32>,
    pub parities: Vec<Parity>,
    pub slave_ids: Vec<u8>,
    pub test_address: u16,
    pub test_count: u16,
}

impl ScanPlan {
    pub fn from_settings(settings: &MdwSettings) -> MdwResult<Self> {
        let mut base = settings.serial_params();
        base.timeout = Duration::from_millis(settings.scan.timeout_ms);
        base.retries = settings.scan.retries.max(1);

        Ok(Self {
            base,
            baudrates: settings.scan_baudrates(),
            parities: settings.scan_parities(),
            slave_ids: parse_id_ranges(&settings.scan.slave_ids)?,
            test_address: settings.scan.test_address,
            test_count: settings.scan.test_count.max(1),
        })
    }

    /// Number of (baud, parity, id) combinations
    pub fn attempts(&self) -> usize {
        self.baudrates.len() * self.parities.len() * self.slave_ids.len()
    }
}

/// First responding combination
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanHit {
    pub baudrate: u32,
    pub parity: Parity,
    pub slave_id: u8,
    pub words: Vec<u16>,
}

/// Run the sweep; `Ok(None)` when nothing answered
pub async fn scan<C: Connector>(connector: &C, plan: &ScanPlan) -> MdwResult<Option<ScanHit>> {
    info!(
        "Scanning {} ({} combinations, register {} x{})",
        plan.base.port,
        plan.attempts(),
        plan.test_address,
        plan.test_count
    );

    for &baudrate in &plan.baudrates {
        for &parity in &plan.parities {
            info!("Trying {} baud, parity {}", baudrate, parity);
            let params = SerialParams {
                baudrate,
                parity,
                ..plan.base.clone()
            };

            for &slave_id in &plan.slave_ids {
                let mut link = match connector.connect(&params).await {
                    Ok(link) => link,
                    Err(e) if !e.is_retryable() => return Err(e),
                    Err(e) => {
                        debug!("Open failed for id {}: {}", slave_id, e);
                        continue;
                    },
                };

                let outcome = link
                    .read_holding(slave_id, plan.test_address, plan.test_count)
                    .await;
                connector.close(link).await;

                match outcome {
                    Ok(words) => {
                        info!(
                            "Device found: {} baud, parity {}, slave id {}",
                            baudrate, parity, slave_id
                        );
                        return Ok(Some(ScanHit {
                            baudrate,
                            parity,
                            slave_id,
                            words,
                        }));
                    },
                    Err(e) => debug!("No answer from id {}: {}", slave_id, e),
                }
            }
        }
    }

    info!("Scan finished without a response");
    Ok(None)
}
