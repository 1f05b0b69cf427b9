//! Register value codec
//!
//! Pure conversions between raw holding-register words and engineering values:
//! - `u16`: the word is the value
//! - `u32`: two consecutive words composed in a configurable word order
//! - bit words: each declared bit is an independent boolean flag
//! - decimal scaling: wire value divided by `10^decimals`
//!
//! Scaled results are `f64` approximations of the decimal value, not exact
//! decimals. The division is by an exactly representable power of ten, so the
//! only error is the rounding of that single division.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::trace;

use crate::error::{RegisterError, Result};

/// Powers of ten that are exact in `f64` (10^0 ..= 10^22)
const POW10: [f64; 23] = [
    1e0, 1e1, 1e2, 1e3, 1e4, 1e5, 1e6, 1e7, 1e8, 1e9, 1e10, 1e11, 1e12, 1e13, 1e14, 1e15, 1e16,
    1e17, 1e18, 1e19, 1e20, 1e21, 1e22,
];

/// Order of the two registers holding a 32-bit value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum WordOrder {
    /// First register is the high 16 bits
    #[default]
    HiLo,
    /// First register is the low 16 bits
    LoHi,
}

impl WordOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            WordOrder::HiLo => "HI_LO",
            WordOrder::LoHi => "LO_HI",
        }
    }
}

impl fmt::Display for WordOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WordOrder {
    type Err = RegisterError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "HI_LO" => Ok(WordOrder::HiLo),
            "LO_HI" => Ok(WordOrder::LoHi),
            _ => Err(RegisterError::InvalidWordOrder(s.to_string())),
        }
    }
}

impl TryFrom<String> for WordOrder {
    type Error = RegisterError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<WordOrder> for String {
    fn from(order: WordOrder) -> Self {
        order.as_str().to_string()
    }
}

/// Decode a single-register unsigned value
pub fn decode_u16(word: u16) -> u16 {
    word
}

/// Compose a 32-bit unsigned value from exactly two registers
pub fn decode_u32(words: &[u16], order: WordOrder) -> Result<u32> {
    let [w0, w1] = words else {
        return Err(RegisterError::InvalidWordCount {
            expected: 2,
            actual: words.len(),
        });
    };

    let (hi, lo) = match order {
        WordOrder::HiLo => (*w0, *w1),
        WordOrder::LoHi => (*w1, *w0),
    };
    let value = (u32::from(hi) << 16) | u32::from(lo);

    trace!(
        "Decoded u32: words=[0x{:04X}, 0x{:04X}], order={}, value={}",
        w0,
        w1,
        order,
        value
    );
    Ok(value)
}

/// Rescale a raw wire value by `10^decimals`
///
/// `decimals <= 0` returns the raw value unchanged.
pub fn apply_scale(raw: i64, decimals: i32) -> f64 {
    if decimals <= 0 {
        return raw as f64;
    }
    raw as f64 / pow10(decimals)
}

fn pow10(decimals: i32) -> f64 {
    POW10
        .get(decimals as usize)
        .copied()
        .unwrap_or_else(|| 10f64.powi(decimals))
}

/// Unpack the declared bits of a status word
///
/// Bits not present in `bit_map` are not reported.
pub fn decode_bits(word: u16, bit_map: &BTreeMap<u8, String>) -> BTreeMap<String, bool> {
    bit_map
        .iter()
        .map(|(&bit, name)| {
            let set = bit < 16 && ((word >> bit) & 0x01) != 0;
            (name.clone(), set)
        })
        .collect()
}

// ============================================================================
// Encoding (write path)
// ============================================================================

/// Split a 32-bit value into two registers in the given word order
pub fn encode_u32(value: u32, order: WordOrder) -> [u16; 2] {
    let hi = (value >> 16) as u16;
    let lo = (value & 0xFFFF) as u16;
    match order {
        WordOrder::HiLo => [hi, lo],
        WordOrder::LoHi => [lo, hi],
    }
}

/// Convert an engineering value to its raw wire integer
///
/// The value is multiplied by `10^decimals`, rounded to the nearest integer
/// and checked against `[0, max]`.
pub fn encode_scaled(value: f64, decimals: i32, max: u32) -> Result<u32> {
    let scaled = if decimals <= 0 {
        value
    } else {
        value * pow10(decimals)
    };
    let raw = scaled.round();

    if !raw.is_finite() || raw < 0.0 || raw > f64::from(max) {
        return Err(RegisterError::OutOfRange {
            value: value.to_string(),
            min: "0".to_string(),
            max: apply_scale(i64::from(max), decimals).to_string(),
        });
    }
    Ok(raw as u32)
}

/// Build a command word with the named flags set and every other bit cleared
pub fn encode_bits<S: AsRef<str>>(
    variable: &str,
    flags: &[S],
    bit_map: &BTreeMap<u8, String>,
) -> Result<u16> {
    let mut word = 0u16;
    for flag in flags {
        let flag = flag.as_ref();
        let bit = bit_map
            .iter()
            .find_map(|(&bit, name)| (name == flag).then_some(bit))
            .ok_or_else(|| RegisterError::UnknownFlag {
                name: variable.to_string(),
                flag: flag.to_string(),
            })?;
        if bit >= 16 {
            return Err(RegisterError::invalid_spec(
                variable,
                format!("flag '{}' on bit {} outside a 16-bit register", flag, bit),
            ));
        }
        word |= 1 << bit;
    }
    Ok(word)
}
