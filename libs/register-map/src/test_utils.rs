//! Test utilities for register-map consumers
//!
//! [`MemoryTransport`] is a scripted register bank: reads of populated
//! addresses succeed, everything else fails like an unanswered request.
//! Clones share state so a test can keep a handle after moving one into the
//! code under test.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::{RegisterError, Result};
use crate::transport::RegisterTransport;

/// One request seen by the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Read {
        slave_id: u8,
        address: u16,
        count: u16,
    },
    WriteSingle {
        slave_id: u8,
        address: u16,
        value: u16,
    },
    WriteMultiple {
        slave_id: u8,
        address: u16,
        values: Vec<u16>,
    },
}

#[derive(Debug, Default)]
struct State {
    registers: BTreeMap<u16, u16>,
    failing: HashSet<u16>,
    offline: bool,
    short_reads: bool,
    fail_next: usize,
    slave_id: Option<u8>,
    requests: Vec<Request>,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    state: Arc<Mutex<State>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bank pre-filled with `(address, value)` pairs
    pub fn with_registers(registers: impl IntoIterator<Item = (u16, u16)>) -> Self {
        let transport = Self::new();
        transport.lock().registers.extend(registers);
        transport
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_register(&self, address: u16, value: u16) {
        self.lock().registers.insert(address, value);
    }

    pub fn register(&self, address: u16) -> Option<u16> {
        self.lock().registers.get(&address).copied()
    }

    /// Make any request touching `address` fail
    pub fn fail_address(&self, address: u16) {
        self.lock().failing.insert(address);
    }

    pub fn heal_address(&self, address: u16) {
        self.lock().failing.remove(&address);
    }

    /// Fail every request, as with a disconnected cable
    pub fn set_offline(&self, offline: bool) {
        self.lock().offline = offline;
    }

    /// Return one word less than requested
    pub fn set_short_reads(&self, short: bool) {
        self.lock().short_reads = short;
    }

    /// Fail the next `count` requests, then answer normally
    pub fn fail_next(&self, count: usize) {
        self.lock().fail_next = count;
    }

    /// Only answer this slave id (all ids answer by default)
    pub fn answer_only(&self, slave_id: u8) {
        self.lock().slave_id = Some(slave_id);
    }

    pub fn requests(&self) -> Vec<Request> {
        self.lock().requests.clone()
    }

    pub fn read_count(&self) -> usize {
        self.lock()
            .requests
            .iter()
            .filter(|r| matches!(r, Request::Read { .. }))
            .count()
    }

    pub fn clear_requests(&self) {
        self.lock().requests.clear();
    }
}

impl State {
    fn reject(&mut self, slave_id: u8, address: u16, count: u16) -> Option<&'static str> {
        if self.fail_next > 0 {
            self.fail_next -= 1;
            return Some("CRC error");
        }
        if self.offline {
            return Some("no response (timeout)");
        }
        if self.slave_id.is_some_and(|id| id != slave_id) {
            return Some("no response (timeout)");
        }
        let last = u32::from(address) + u32::from(count.max(1)) - 1;
        if (u32::from(address)..=last).any(|a| self.failing.contains(&(a as u16))) {
            return Some("CRC error");
        }
        None
    }
}

#[async_trait]
impl RegisterTransport for MemoryTransport {
    async fn read_holding(&mut self, slave_id: u8, address: u16, count: u16) -> Result<Vec<u16>> {
        let mut state = self.lock();
        state.requests.push(Request::Read {
            slave_id,
            address,
            count,
        });

        let failed = |reason: &str| RegisterError::ReadFailed {
            address: i64::from(address),
            count,
            reason: reason.to_string(),
        };
        if let Some(reason) = state.reject(slave_id, address, count) {
            return Err(failed(reason));
        }

        let mut words = Vec::with_capacity(usize::from(count));
        for offset in 0..count {
            let a = address
                .checked_add(offset)
                .ok_or_else(|| failed("illegal data address"))?;
            let word = state
                .registers
                .get(&a)
                .copied()
                .ok_or_else(|| failed("illegal data address"))?;
            words.push(word);
        }
        if state.short_reads {
            words.pop();
        }
        Ok(words)
    }

    async fn write_single(&mut self, slave_id: u8, address: u16, value: u16) -> Result<()> {
        let mut state = self.lock();
        state.requests.push(Request::WriteSingle {
            slave_id,
            address,
            value,
        });
        if let Some(reason) = state.reject(slave_id, address, 1) {
            return Err(RegisterError::WriteFailed {
                address: i64::from(address),
                reason: reason.to_string(),
            });
        }
        state.registers.insert(address, value);
        Ok(())
    }

    async fn write_multiple(&mut self, slave_id: u8, address: u16, values: &[u16]) -> Result<()> {
        let mut state = self.lock();
        state.requests.push(Request::WriteMultiple {
            slave_id,
            address,
            values: values.to_vec(),
        });
        if let Some(reason) = state.reject(slave_id, address, values.len() as u16) {
            return Err(RegisterError::WriteFailed {
                address: i64::from(address),
                reason: reason.to_string(),
            });
        }
        for (i, value) in values.iter().enumerate() {
            state.registers.insert(address.wrapping_add(i as u16), *value);
        }
        Ok(())
    }
}
