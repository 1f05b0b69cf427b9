//! Register transport contract
//!
//! Anything that can read and write holding registers on a slave. The RTU
//! client lives in the service; tests use in-memory implementations.
//! Implementations own their retry policy and return a single error after
//! the last attempt.

use async_trait::async_trait;

use crate::error::Result;

#[async_trait]
pub trait RegisterTransport: Send {
    /// Read `count` holding registers starting at `address` (FC03)
    ///
    /// Must return exactly `count` words or fail with `ReadFailed`.
    async fn read_holding(&mut self, slave_id: u8, address: u16, count: u16) -> Result<Vec<u16>>;

    /// Write one holding register (FC06)
    async fn write_single(&mut self, slave_id: u8, address: u16, value: u16) -> Result<()>;

    /// Write consecutive holding registers (FC16)
    async fn write_multiple(&mut self, slave_id: u8, address: u16, values: &[u16]) -> Result<()>;
}
