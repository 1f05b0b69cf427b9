//! Modbus RTU transport
//!
//! [`Connector`] opens and closes links; a link is any
//! [`RegisterTransport`]. The production pair wraps `voltage_modbus`'s RTU
//! client in [`Retrying`], which gives reads and writes up to `retries`
//! attempts.

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info, warn};
use voltage_modbus::{ModbusClient, ModbusRtuClient};

use crate::config::{Parity, SerialParams};
use errors::{MdwError, MdwResult};
use register_map::{RegisterError, RegisterTransport};

/// Opens links to the bus and closes them again
///
/// `close` consumes the link, so each opened link is closed at most once.
#[async_trait]
pub trait Connector: Send + Sync {
    type Link: RegisterTransport + Send;

    async fn connect(&self, params: &SerialParams) -> MdwResult<Self::Link>;

    async fn close(&self, link: Self::Link);
}

/// Connector for real serial ports
#[derive(Debug, Default, Clone, Copy)]
pub struct RtuConnector;

#[async_trait]
impl Connector for RtuConnector {
    type Link = RtuClient;

    async fn connect(&self, params: &SerialParams) -> MdwResult<RtuClient> {
        RtuClient::open(params)
    }

    async fn close(&self, link: RtuClient) {
        let mut link = link.into_inner();
        if let Err(e) = link.client.close().await {
            warn!("Closing {} failed: {}", link.endpoint, e);
        } else {
            debug!("Closed {}", link.endpoint);
        }
    }
}

/// Bounded retry around any [`RegisterTransport`]
///
/// Every request gets up to `retries` attempts with a fixed `delay` between
/// them; the caller sees one `ReadFailed`/`WriteFailed` after the last. A
/// read returning a different word count than requested is a failed attempt.
/// Errors that are not link errors are returned at once.
#[derive(Debug)]
pub struct Retrying<T> {
    inner: T,
    retries: u32,
    delay: Duration,
}

impl<T> Retrying<T> {
    pub fn new(inner: T, retries: u32, delay: Duration) -> Self {
        Self {
            inner,
            retries: retries.max(1),
            delay,
        }
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn into_inner(self) -> T {
        self.inner
    }
}

fn failure_reason(err: RegisterError) -> String {
    match err {
        RegisterError::ReadFailed { reason, .. } | RegisterError::WriteFailed { reason, .. } => {
            reason
        },
        other => other.to_string(),
    }
}

#[async_trait]
impl<T: RegisterTransport> RegisterTransport for Retrying<T> {
    async fn read_holding(
        &mut self,
        slave_id: u8,
        address: u16,
        count: u16,
    ) -> register_map::Result<Vec<u16>> {
        let mut last_error = String::new();

        for attempt in 1..=self.retries {
            match self.inner.read_holding(slave_id, address, count).await {
                Ok(words) if words.len() == usize::from(count) => return Ok(words),
                Ok(words) => {
                    last_error = format!("short response: {} of {} registers", words.len(), count);
                },
                Err(e) if !e.is_transient() => return Err(e),
                Err(e) => last_error = failure_reason(e),
            }

            debug!(
                "Read {}@{} attempt {}/{} failed: {}",
                count, address, attempt, self.retries, last_error
            );
            if attempt < self.retries {
                tokio::time::sleep(self.delay).await;
            }
        }

        Err(RegisterError::ReadFailed {
            address: i64::from(address),
            count,
            reason: last_error,
        })
    }

    async fn write_single(
        &mut self,
        slave_id: u8,
        address: u16,
        value: u16,
    ) -> register_map::Result<()> {
        let mut last_error = String::new();

        for attempt in 1..=self.retries {
            match self.inner.write_single(slave_id, address, value).await {
                Ok(()) => return Ok(()),
                Err(e) if !e.is_transient() => return Err(e),
                Err(e) => last_error = failure_reason(e),
            }

            debug!(
                "Write {}={} attempt {}/{} failed: {}",
                address, value, attempt, self.retries, last_error
            );
            if attempt < self.retries {
                tokio::time::sleep(self.delay).await;
            }
        }

        Err(RegisterError::WriteFailed {
            address: i64::from(address),
            reason: last_error,
        })
    }

    async fn write_multiple(
        &mut self,
        slave_id: u8,
        address: u16,
        values: &[u16],
    ) -> register_map::Result<()> {
        let mut last_error = String::new();

        for attempt in 1..=self.retries {
            match self.inner.write_multiple(slave_id, address, values).await {
                Ok(()) => return Ok(()),
                Err(e) if !e.is_transient() => return Err(e),
                Err(e) => last_error = failure_reason(e),
            }

            debug!(
                "Write {} words @{} attempt {}/{} failed: {}",
                values.len(),
                address,
                attempt,
                self.retries,
                last_error
            );
            if attempt < self.retries {
                tokio::time::sleep(self.delay).await;
            }
        }

        Err(RegisterError::WriteFailed {
            address: i64::from(address),
            reason: last_error,
        })
    }
}

/// Single-attempt RTU link over `voltage_modbus`
pub struct RtuLink {
    client: ModbusRtuClient,
    endpoint: String,
}

impl std::fmt::Debug for RtuLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RtuLink")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

#[async_trait]
impl RegisterTransport for RtuLink {
    async fn read_holding(
        &mut self,
        slave_id: u8,
        address: u16,
        count: u16,
    ) -> register_map::Result<Vec<u16>> {
        self.client
            .read_03(slave_id, address, count)
            .await
            .map_err(|e| RegisterError::ReadFailed {
                address: i64::from(address),
                count,
                reason: e.to_string(),
            })
    }

    async fn write_single(
        &mut self,
        slave_id: u8,
        address: u16,
        value: u16,
    ) -> register_map::Result<()> {
        self.client
            .write_06(slave_id, address, value)
            .await
            .map_err(|e| RegisterError::WriteFailed {
                address: i64::from(address),
                reason: e.to_string(),
            })
    }

    async fn write_multiple(
        &mut self,
        slave_id: u8,
        address: u16,
        values: &[u16],
    ) -> register_map::Result<()> {
        self.client
            .write_10(slave_id, address, values)
            .await
            .map_err(|e| RegisterError::WriteFailed {
                address: i64::from(address),
                reason: e.to_string(),
            })
    }
}

/// One open RTU link with its retry policy
pub type RtuClient = Retrying<RtuLink>;

impl Retrying<RtuLink> {
    pub fn open(params: &SerialParams) -> MdwResult<Self> {
        let endpoint = params.to_string();
        debug!("Opening serial port {}", endpoint);

        let client = ModbusRtuClient::with_config_and_logging(
            &params.port,
            params.baudrate,
            data_bits(params.bytesize)?,
            stop_bits(params.stopbits)?,
            serial_parity(params.parity),
            params.timeout,
            None,
        )
        .map_err(|e| MdwError::ConnectionFailed {
            endpoint: endpoint.clone(),
            reason: e.to_string(),
        })?;

        info!("Connected: {}", endpoint);
        Ok(Self::new(
            RtuLink { client, endpoint },
            params.retries,
            params.retry_delay,
        ))
    }

    pub fn endpoint(&self) -> &str {
        &self.inner.endpoint
    }
}

fn data_bits(bytesize: u8) -> MdwResult<tokio_serial::DataBits> {
    match bytesize {
        5 => Ok(tokio_serial::DataBits::Five),
        6 => Ok(tokio_serial::DataBits::Six),
        7 => Ok(tokio_serial::DataBits::Seven),
        8 => Ok(tokio_serial::DataBits::Eight),
        other => Err(MdwError::InvalidParameter {
            param: "bytesize".to_string(),
            reason: format!("{} not in 5..=8", other),
        }),
    }
}

fn stop_bits(stopbits: u8) -> MdwResult<tokio_serial::StopBits> {
    match stopbits {
        1 => Ok(tokio_serial::StopBits::One),
        2 => Ok(tokio_serial::StopBits::Two),
        other => Err(MdwError::InvalidParameter {
            param: "stopbits".to_string(),
            reason: format!("{} not in 1..=2", other),
        }),
    }
}

fn serial_parity(parity: Parity) -> tokio_serial::Parity {
    match parity {
        Parity::None => tokio_serial::Parity::None,
        Parity::Even => tokio_serial::Parity::Even,
        Parity::Odd => tokio_serial::Parity::Odd,
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use register_map::test_utils::{MemoryTransport, Request};
    use std::time::Instant;

    #[test]
    fn test_serial_conversions() {
        assert_eq!(data_bits(7).unwrap(), tokio_serial::DataBits::Seven);
        assert!(data_bits(9).is_err());
        assert_eq!(stop_bits(2).unwrap(), tokio_serial::StopBits::Two);
        assert!(stop_bits(0).is_err());
        assert_eq!(serial_parity(Parity::Even), tokio_serial::Parity::Even);
    }

    fn retrying(bank: &MemoryTransport, retries: u32) -> Retrying<MemoryTransport> {
        Retrying::new(bank.clone(), retries, Duration::from_millis(20))
    }

    #[tokio::test]
    async fn test_read_recovers_before_last_attempt() {
        let bank = MemoryTransport::with_registers([(10, 42)]);
        bank.fail_next(2);
        let mut link = retrying(&bank, 3);

        let started = Instant::now();
        let words = link.read_holding(1, 10, 1).await.unwrap();

        assert_eq!(words, vec![42]);
        assert_eq!(bank.read_count(), 3);
        // two fixed delays between three attempts
        assert!(started.elapsed() >= Duration::from_millis(40));
    }

    #[tokio::test]
    async fn test_read_fails_once_after_all_attempts() {
        let bank = MemoryTransport::with_registers([(10, 42)]);
        bank.set_offline(true);
        let mut link = retrying(&bank, 3);

        let err = link.read_holding(1, 10, 1).await.unwrap_err();

        assert_eq!(bank.read_count(), 3);
        match err {
            RegisterError::ReadFailed {
                address,
                count,
                reason,
            } => {
                assert_eq!(address, 10);
                assert_eq!(count, 1);
                assert!(reason.contains("timeout"));
            },
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_short_read_counts_as_failed_attempt() {
        let bank = MemoryTransport::with_registers([(10, 1), (11, 2)]);
        bank.set_short_reads(true);
        let mut link = retrying(&bank, 2);

        let err = link.read_holding(1, 10, 2).await.unwrap_err();

        assert_eq!(bank.read_count(), 2);
        assert!(matches!(
            err,
            RegisterError::ReadFailed { ref reason, .. } if reason.contains("short response: 1 of 2")
        ));
    }

    #[tokio::test]
    async fn test_zero_retries_still_attempts_once() {
        let bank = MemoryTransport::with_registers([(0, 7)]);
        let mut link = retrying(&bank, 0);

        assert_eq!(link.retries(), 1);
        assert_eq!(link.read_holding(1, 0, 1).await.unwrap(), vec![7]);
    }

    #[tokio::test]
    async fn test_write_single_is_retried() {
        let bank = MemoryTransport::new();
        bank.fail_next(1);
        let mut link = retrying(&bank, 3);

        link.write_single(1, 5, 0x00FF).await.unwrap();

        assert_eq!(bank.register(5), Some(0x00FF));
        assert_eq!(bank.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_write_multiple_fails_once_after_all_attempts() {
        let bank = MemoryTransport::new();
        bank.set_offline(true);
        let mut link = retrying(&bank, 3);

        let err = link.write_multiple(1, 24, &[1, 2]).await.unwrap_err();

        assert_eq!(bank.requests().len(), 3);
        assert!(bank
            .requests()
            .iter()
            .all(|r| matches!(r, Request::WriteMultiple { address: 24, .. })));
        assert!(matches!(err, RegisterError::WriteFailed { address: 24, .. }));
    }

    #[tokio::test]
    async fn test_write_multiple_recovers() {
        let bank = MemoryTransport::new();
        bank.fail_next(2);
        let mut link = retrying(&bank, 3);

        link.write_multiple(1, 24, &[0x0001, 0x2EE0]).await.unwrap();

        assert_eq!(bank.register(24), Some(0x0001));
        assert_eq!(bank.register(25), Some(0x2EE0));
        assert_eq!(bank.requests().len(), 3);
    }

    #[tokio::test]
    async fn test_open_missing_port_fails() {
        let params = SerialParams {
            port: "/dev/mdwsrv-no-such-port".to_string(),
            baudrate: 9600,
            parity: Parity::None,
            stopbits: 1,
            bytesize: 8,
            timeout: Duration::from_millis(100),
            retries: 1,
            retry_delay: Duration::from_millis(10),
        };
        let err = RtuClient::open(&params).unwrap_err();
        assert!(matches!(err, MdwError::ConnectionFailed { .. }));
    }
}
