//! Common test utilities and helpers

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use errors::{MdwError, MdwResult};
use mdwsrv::{Connector, Parity, SerialParams};
use register_map::test_utils::MemoryTransport;
use register_map::{RegisterError, RegisterTransport};

#[derive(Debug, Default)]
struct ConnectorState {
    connects: u32,
    closes: u32,
    /// Remaining connects to refuse
    refuse: u32,
    /// Refuse with a non-retryable error
    fatal: bool,
    /// Only this (baud, parity) reaches the device
    line: Option<(u32, Parity)>,
    opened: Vec<SerialParams>,
}

/// Connector handing out links onto one shared [`MemoryTransport`]
#[derive(Debug, Clone, Default)]
pub struct MemoryConnector {
    pub transport: MemoryTransport,
    state: Arc<Mutex<ConnectorState>>,
}

impl MemoryConnector {
    pub fn new(transport: MemoryTransport) -> Self {
        Self {
            transport,
            state: Arc::default(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ConnectorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fail the next `count` connection attempts
    pub fn refuse_next(&self, count: u32) {
        self.lock().refuse = count;
    }

    /// Fail every connection attempt with a configuration error
    pub fn refuse_fatally(&self) {
        self.lock().fatal = true;
    }

    /// Device only answers on this baud rate and parity
    pub fn device_line(&self, baudrate: u32, parity: Parity) {
        self.lock().line = Some((baudrate, parity));
    }

    pub fn connects(&self) -> u32 {
        self.lock().connects
    }

    pub fn closes(&self) -> u32 {
        self.lock().closes
    }

    pub fn opened(&self) -> Vec<SerialParams> {
        self.lock().opened.clone()
    }
}

/// One link; unreachable links time out every request
#[derive(Debug)]
pub struct MemoryLink {
    transport: MemoryTransport,
    reachable: bool,
}

fn unreachable_read(address: u16, count: u16) -> RegisterError {
    RegisterError::ReadFailed {
        address: i64::from(address),
        count,
        reason: "no response (timeout)".to_string(),
    }
}

#[async_trait]
impl RegisterTransport for MemoryLink {
    async fn read_holding(&mut self, slave_id: u8, address: u16, count: u16) -> register_map::Result<Vec<u16>> {
        if !self.reachable {
            return Err(unreachable_read(address, count));
        }
        self.transport.read_holding(slave_id, address, count).await
    }

    async fn write_single(&mut self, slave_id: u8, address: u16, value: u16) -> register_map::Result<()> {
        self.transport.write_single(slave_id, address, value).await
    }

    async fn write_multiple(&mut self, slave_id: u8, address: u16, values: &[u16]) -> register_map::Result<()> {
        self.transport.write_multiple(slave_id, address, values).await
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    type Link = MemoryLink;

    async fn connect(&self, params: &SerialParams) -> MdwResult<MemoryLink> {
        let mut state = self.lock();
        state.connects += 1;
        if state.fatal {
            return Err(MdwError::InvalidParameter {
                param: "bytesize".to_string(),
                reason: "9 not in 5..=8".to_string(),
            });
        }
        if state.refuse > 0 {
            state.refuse -= 1;
            return Err(MdwError::ConnectionFailed {
                endpoint: params.to_string(),
                reason: "port busy".to_string(),
            });
        }
        state.opened.push(params.clone());
        let reachable = state
            .line
            .map_or(true, |(baud, parity)| baud == params.baudrate && parity == params.parity);

        Ok(MemoryLink {
            transport: self.transport.clone(),
            reachable,
        })
    }

    async fn close(&self, _link: MemoryLink) {
        self.lock().closes += 1;
    }
}

pub fn serial_params() -> SerialParams {
    SerialParams {
        port: "/dev/ttyTEST0".to_string(),
        baudrate: 9600,
        parity: Parity::None,
        stopbits: 1,
        bytesize: 8,
        timeout: Duration::from_millis(50),
        retries: 3,
        retry_delay: Duration::from_millis(1),
    }
}

/// Bank answering the whole `basic` profile at `base`
///
/// throughput 125.0 kg/h, status run|auto_mode, batch 1500 g,
/// blend weight 7753.6 kg, station 1 setpoint 12.5 %, others 0.
pub fn basic_bank(base: u16) -> MemoryTransport {
    MemoryTransport::with_registers([
        (base + 28, 1250),
        (base + 50, 0b1010),
        (base + 23, 1500),
        (base + 24, 0x0001),
        (base + 25, 0x2EE0),
        (base + 9, 125),
        (base + 10, 0),
        (base + 11, 0),
        (base + 12, 0),
        (base + 13, 0),
        (base + 14, 0),
    ])
}
