//! Variable writes
//!
//! Engineering values are encoded back to raw words and written with FC06
//! (one register) or FC16 (two registers). Read-only variables are refused
//! before anything reaches the wire.

use std::sync::Arc;

use tracing::info;

use crate::address::{checked_address, resolve_address, OUT_OF_SPACE};
use crate::catalog::{RegisterKind, RegisterSpec};
use crate::codec::{encode_bits, encode_scaled, encode_u32};
use crate::error::{RegisterError, Result};
use crate::map::RegisterMap;
use crate::reader::ReaderOptions;
use crate::transport::RegisterTransport;

pub struct ValueWriter {
    map: Arc<RegisterMap>,
    options: ReaderOptions,
}

impl ValueWriter {
    pub fn new(map: Arc<RegisterMap>, options: ReaderOptions) -> Self {
        Self { map, options }
    }

    fn writable_spec(&self, name: &str) -> Result<&RegisterSpec> {
        let spec = self.map.catalog.spec(name)?;
        if !spec.access.is_writable() {
            return Err(RegisterError::AccessDenied {
                name: name.to_string(),
                reason: "variable is read-only".into(),
            });
        }
        Ok(spec)
    }

    fn address(&self, spec: &RegisterSpec) -> Result<u16> {
        let wire = resolve_address(spec.offset, self.options.base_address);
        checked_address(wire, spec.width()).ok_or_else(|| RegisterError::WriteFailed {
            address: wire,
            reason: OUT_OF_SPACE.into(),
        })
    }

    /// Write an engineering value to a numeric variable
    ///
    /// Returns the raw words sent.
    pub async fn write_value<T>(&self, transport: &mut T, name: &str, value: f64) -> Result<Vec<u16>>
    where
        T: RegisterTransport + ?Sized,
    {
        let spec = self.writable_spec(name)?;
        let address = self.address(spec)?;
        let slave_id = self.options.slave_id;

        let words = match &spec.kind {
            RegisterKind::Numeric16 { decimals } => {
                let raw = encode_scaled(value, i32::from(*decimals), u32::from(u16::MAX))?;
                let word = raw as u16;
                transport.write_single(slave_id, address, word).await?;
                vec![word]
            },
            RegisterKind::Numeric32 { decimals } => {
                let raw = encode_scaled(value, i32::from(*decimals), u32::MAX)?;
                let words = encode_u32(raw, self.options.word_order);
                transport.write_multiple(slave_id, address, &words).await?;
                words.to_vec()
            },
            RegisterKind::BitField { .. } => {
                return Err(RegisterError::AccessDenied {
                    name: name.to_string(),
                    reason: "bit-field variable, write flags instead".into(),
                })
            },
        };
        info!("Wrote {} = {} ({:04X?}) at {}", name, value, words, address);
        Ok(words)
    }

    /// Write a bit-field variable with exactly the named flags set
    pub async fn write_flags<T, S>(&self, transport: &mut T, name: &str, flags: &[S]) -> Result<u16>
    where
        T: RegisterTransport + ?Sized,
        S: AsRef<str> + Sync,
    {
        let spec = self.writable_spec(name)?;
        let RegisterKind::BitField { bits } = &spec.kind else {
            return Err(RegisterError::AccessDenied {
                name: name.to_string(),
                reason: "not a bit-field variable".into(),
            });
        };
        let word = encode_bits(name, flags, bits)?;
        let address = self.address(spec)?;
        transport
            .write_single(self.options.slave_id, address, word)
            .await?;
        info!("Wrote {} = {:#06X} at {}", name, word, address);
        Ok(word)
    }
}
