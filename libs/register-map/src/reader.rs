//! Profile read orchestration
//!
//! Reads every variable of a profile with one request each, decodes the raw
//! words and assembles an ordered name → value mapping. A failure on one
//! variable marks that variable unavailable and never aborts the cycle.

use chrono::{DateTime, Utc};
use serde::ser::{SerializeMap, SerializeStruct};
use serde::{Serialize, Serializer};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tracing::{debug, info, trace, warn};

use crate::address::ResolvedRead;
use crate::catalog::{RegisterKind, RegisterSpec};
use crate::codec::{apply_scale, decode_bits, decode_u16, decode_u32, WordOrder};
use crate::error::{RegisterError, Result};
use crate::map::RegisterMap;
use crate::span::{compute_span, Span};
use crate::transport::RegisterTransport;

/// Per-installation read parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaderOptions {
    pub base_address: i64,
    pub slave_id: u8,
    pub word_order: WordOrder,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            base_address: 0,
            slave_id: 1,
            word_order: WordOrder::HiLo,
        }
    }
}

/// Decoded value of one variable
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum VariableValue {
    Number(f64),
    Flags(BTreeMap<String, bool>),
    /// Read or decode failed this cycle
    Unavailable,
}

impl VariableValue {
    pub fn is_available(&self) -> bool {
        !matches!(self, VariableValue::Unavailable)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            VariableValue::Number(v) => Some(*v),
            _ => None,
        }
    }

    pub fn flag(&self, name: &str) -> Option<bool> {
        match self {
            VariableValue::Flags(flags) => flags.get(name).copied(),
            _ => None,
        }
    }
}

/// Outcome of one profile read, in profile order
#[derive(Debug, Clone, PartialEq)]
pub struct ReadResult {
    pub profile: String,
    pub timestamp: DateTime<Utc>,
    values: Vec<(String, VariableValue)>,
}

impl ReadResult {
    pub fn get(&self, name: &str) -> Option<&VariableValue> {
        self.values.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &VariableValue)> {
        self.values.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn names(&self) -> Vec<&str> {
        self.values.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn available_count(&self) -> usize {
        self.values.iter().filter(|(_, v)| v.is_available()).count()
    }

    /// True when no variable could be read (typically a dead link)
    pub fn all_unavailable(&self) -> bool {
        self.available_count() == 0
    }
}

struct OrderedValues<'a>(&'a [(String, VariableValue)]);

impl Serialize for OrderedValues<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, value) in self.0 {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

impl Serialize for ReadResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("ReadResult", 3)?;
        s.serialize_field("profile", &self.profile)?;
        s.serialize_field("timestamp", &self.timestamp)?;
        s.serialize_field("values", &OrderedValues(&self.values))?;
        s.end()
    }
}

/// Decode raw words according to the variable's kind
pub fn decode_value(spec: &RegisterSpec, words: &[u16], order: WordOrder) -> Result<VariableValue> {
    match &spec.kind {
        RegisterKind::Numeric16 { decimals } => {
            let word = single_word(words)?;
            Ok(VariableValue::Number(apply_scale(
                i64::from(decode_u16(word)),
                i32::from(*decimals),
            )))
        },
        RegisterKind::Numeric32 { decimals } => {
            let raw = decode_u32(words, order)?;
            Ok(VariableValue::Number(apply_scale(
                i64::from(raw),
                i32::from(*decimals),
            )))
        },
        RegisterKind::BitField { bits } => {
            let word = single_word(words)?;
            Ok(VariableValue::Flags(decode_bits(word, bits)))
        },
    }
}

fn single_word(words: &[u16]) -> Result<u16> {
    match words {
        [word] => Ok(*word),
        _ => Err(RegisterError::InvalidWordCount {
            expected: 1,
            actual: words.len(),
        }),
    }
}

pub struct ReadOrchestrator {
    map: Arc<RegisterMap>,
    options: ReaderOptions,
    /// Consecutive failed reads per variable, for log rate limiting
    failure_streaks: HashMap<String, u32>,
}

impl ReadOrchestrator {
    pub fn new(map: Arc<RegisterMap>, options: ReaderOptions) -> Self {
        Self {
            map,
            options,
            failure_streaks: HashMap::new(),
        }
    }

    pub fn options(&self) -> &ReaderOptions {
        &self.options
    }

    pub fn map(&self) -> &RegisterMap {
        &self.map
    }

    /// Offset span of a profile (informational)
    pub fn profile_span(&self, profile: &str) -> Result<Span> {
        let names = self.map.profiles.get(profile)?;
        compute_span(&self.map.catalog, names)
    }

    /// Read and decode one variable, propagating any failure
    pub async fn read_variable<T>(&self, transport: &mut T, name: &str) -> Result<VariableValue>
    where
        T: RegisterTransport + ?Sized,
    {
        let spec = self.map.catalog.spec(name)?;
        if !spec.access.is_readable() {
            debug!("Reading write-only variable {}", name);
        }
        let request = ResolvedRead::for_spec(spec, self.options.base_address);
        let address = request.protocol_address()?;
        let words = transport
            .read_holding(self.options.slave_id, address, request.word_count)
            .await?;
        trace!("{} @ {} -> {:04X?}", name, request.wire_address, words);
        decode_value(spec, &words, self.options.word_order)
    }

    /// Read every variable of a profile once, in profile order
    ///
    /// Only an unknown profile fails the call; per-variable errors are
    /// reported as [`VariableValue::Unavailable`].
    pub async fn read_profile<T>(&mut self, transport: &mut T, profile: &str) -> Result<ReadResult>
    where
        T: RegisterTransport + ?Sized,
    {
        let names = self.map.profiles.get(profile)?.to_vec();
        let mut values = Vec::with_capacity(names.len());

        for name in names {
            let outcome = self.read_variable(&mut *transport, &name).await;
            let value = match outcome {
                Ok(value) => {
                    self.note_success(&name);
                    value
                },
                Err(e) => {
                    self.note_failure(&name, &e);
                    VariableValue::Unavailable
                },
            };
            values.push((name, value));
        }

        let result = ReadResult {
            profile: profile.to_string(),
            timestamp: Utc::now(),
            values,
        };
        debug!(
            "Profile {}: {}/{} variables available",
            profile,
            result.available_count(),
            result.len()
        );
        Ok(result)
    }

    fn note_failure(&mut self, name: &str, err: &RegisterError) {
        let streak = self.failure_streaks.entry(name.to_string()).or_insert(0);
        *streak += 1;
        if *streak == 1 {
            warn!("{} unavailable: {}", name, err);
        } else {
            debug!("{} still unavailable ({} consecutive): {}", name, streak, err);
        }
    }

    fn note_success(&mut self, name: &str) {
        if let Some(streak) = self.failure_streaks.remove(name) {
            info!("{} recovered after {} failed reads", name, streak);
        }
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::test_utils::{MemoryTransport, Request};
    use tracing_test::traced_test;

    fn orchestrator(options: ReaderOptions) -> ReadOrchestrator {
        ReadOrchestrator::new(Arc::new(RegisterMap::mdw_default().unwrap()), options)
    }

    fn basic_bank(base: u16) -> MemoryTransport {
        let bank = MemoryTransport::new();
        for offset in [9, 10, 11, 12, 13, 14, 23, 24, 25, 28, 50] {
            bank.set_register(base + offset, 0);
        }
        bank
    }

    #[tokio::test]
    async fn test_setpoint_scaled() {
        let mut bank = MemoryTransport::with_registers([(10, 125)]);
        let reader = orchestrator(ReaderOptions {
            base_address: 1,
            ..Default::default()
        });
        let value = reader
            .read_variable(&mut bank, "station_1_setpoint")
            .await
            .unwrap();
        assert_eq!(value, VariableValue::Number(12.5));
        assert_eq!(
            bank.requests(),
            vec![Request::Read {
                slave_id: 1,
                address: 10,
                count: 1
            }]
        );
    }

    #[tokio::test]
    async fn test_u32_word_order() {
        let mut bank = MemoryTransport::with_registers([(24, 0x0001), (25, 0x2EE0)]);
        let hi_lo = orchestrator(ReaderOptions::default());
        assert_eq!(
            hi_lo
                .read_variable(&mut bank, "blend_weight_kg")
                .await
                .unwrap(),
            VariableValue::Number(7753.6)
        );

        let lo_hi = orchestrator(ReaderOptions {
            word_order: WordOrder::LoHi,
            ..Default::default()
        });
        let swapped = lo_hi
            .read_variable(&mut bank, "blend_weight_kg")
            .await
            .unwrap();
        assert_eq!(
            swapped,
            VariableValue::Number(apply_scale(0x2EE0_0001, 1))
        );
    }

    #[tokio::test]
    async fn test_status_flags() {
        let mut bank = MemoryTransport::with_registers([(50, 0b0010_0000_0000_1010)]);
        let reader = orchestrator(ReaderOptions::default());
        let value = reader.read_variable(&mut bank, "mdw_status").await.unwrap();

        assert_eq!(value.flag("run"), Some(true));
        assert_eq!(value.flag("auto_mode"), Some(true));
        assert_eq!(value.flag("pause_over_10h"), Some(true));
        assert_eq!(value.flag("stop"), Some(false));
        match value {
            VariableValue::Flags(flags) => assert_eq!(flags.len(), 11),
            other => panic!("unexpected value {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_read_variable_errors_propagate() {
        let mut bank = MemoryTransport::new();
        let reader = orchestrator(ReaderOptions::default());
        assert!(matches!(
            reader.read_variable(&mut bank, "nope").await,
            Err(RegisterError::UnknownVariable(_))
        ));
        assert!(matches!(
            reader.read_variable(&mut bank, "mdw_status").await,
            Err(RegisterError::ReadFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_short_read_is_not_decoded() {
        let mut bank = MemoryTransport::with_registers([(24, 1), (25, 2)]);
        bank.set_short_reads(true);
        let reader = orchestrator(ReaderOptions::default());
        assert!(matches!(
            reader.read_variable(&mut bank, "blend_weight_kg").await,
            Err(RegisterError::InvalidWordCount {
                expected: 2,
                actual: 1
            })
        ));
    }

    #[tokio::test]
    async fn test_profile_order_and_single_attempt() {
        let mut bank = basic_bank(0);
        let mut reader = orchestrator(ReaderOptions::default());
        let result = reader.read_profile(&mut bank, "basic").await.unwrap();

        let expected = RegisterMap::mdw_default().unwrap();
        assert_eq!(result.names(), expected.profiles.get("basic").unwrap());
        assert_eq!(result.available_count(), 10);
        assert_eq!(bank.read_count(), 10);
        assert_eq!(result.profile, "basic");
    }

    #[tokio::test]
    #[traced_test]
    async fn test_partial_failure_isolated() {
        let mut bank = basic_bank(0);
        bank.set_register(9, 125);
        bank.fail_address(28);
        let mut reader = orchestrator(ReaderOptions::default());

        let result = reader.read_profile(&mut bank, "basic").await.unwrap();
        assert_eq!(
            result.get("actual_throughput_kgh"),
            Some(&VariableValue::Unavailable)
        );
        assert_eq!(
            result.get("station_1_setpoint"),
            Some(&VariableValue::Number(12.5))
        );
        assert_eq!(result.available_count(), 9);
        assert!(!result.all_unavailable());
        assert!(logs_contain("actual_throughput_kgh unavailable"));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_failure_logging_rate_limited() {
        let mut bank = basic_bank(0);
        bank.fail_address(50);
        let mut reader = orchestrator(ReaderOptions::default());

        for _ in 0..3 {
            reader.read_profile(&mut bank, "basic").await.unwrap();
        }
        assert!(logs_contain("mdw_status unavailable"));
        assert!(logs_contain("mdw_status still unavailable (3 consecutive)"));

        bank.heal_address(50);
        let result = reader.read_profile(&mut bank, "basic").await.unwrap();
        assert!(result.get("mdw_status").unwrap().is_available());
        assert!(logs_contain("mdw_status recovered after 3 failed reads"));
    }

    #[tokio::test]
    async fn test_dead_link_all_unavailable() {
        let mut bank = basic_bank(0);
        bank.set_offline(true);
        let mut reader = orchestrator(ReaderOptions::default());
        let result = reader.read_profile(&mut bank, "basic").await.unwrap();
        assert!(result.all_unavailable());
        assert_eq!(result.len(), 10);
    }

    #[tokio::test]
    async fn test_unknown_profile() {
        let mut bank = MemoryTransport::new();
        let mut reader = orchestrator(ReaderOptions::default());
        let err = reader.read_profile(&mut bank, "bogus").await.unwrap_err();
        assert!(matches!(err, RegisterError::UnknownProfile { .. }));
        assert!(bank.requests().is_empty());
    }

    #[tokio::test]
    async fn test_address_outside_space_is_unavailable() {
        let mut bank = MemoryTransport::new();
        let mut reader = orchestrator(ReaderOptions {
            base_address: 400000,
            ..Default::default()
        });
        let result = reader.read_profile(&mut bank, "alarms").await.unwrap();
        assert!(result.all_unavailable());
        assert!(bank.requests().is_empty());
    }

    #[tokio::test]
    async fn test_idempotent_reads() {
        let mut bank = basic_bank(1);
        bank.set_register(10, 125);
        bank.set_register(51, 0x0003);
        let mut reader = orchestrator(ReaderOptions {
            base_address: 1,
            ..Default::default()
        });
        let first = reader.read_profile(&mut bank, "basic").await.unwrap();
        let second = reader.read_profile(&mut bank, "basic").await.unwrap();
        assert_eq!(
            first.iter().collect::<Vec<_>>(),
            second.iter().collect::<Vec<_>>()
        );
    }

    #[tokio::test]
    async fn test_result_json() {
        let mut bank = MemoryTransport::with_registers([(50, 0b10), (51, 7)]);
        let mut reader = orchestrator(ReaderOptions::default());
        let result = reader.read_profile(&mut bank, "alarms").await.unwrap();

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["profile"], "alarms");
        assert_eq!(json["values"]["alarms_word_1"], 7.0);
        assert_eq!(json["values"]["mdw_status"]["run"], true);
        assert!(json["values"]["digital_inputs"].is_null());

        let text = serde_json::to_string(&result).unwrap();
        let status = text.find("mdw_status").unwrap();
        let outputs = text.find("digital_outputs").unwrap();
        assert!(status < outputs);
    }

    #[test]
    fn test_profile_span() {
        let reader = orchestrator(ReaderOptions::default());
        let span = reader.profile_span("production").unwrap();
        assert_eq!((span.min_offset, span.max_offset), (28, 74));
        assert!(reader.profile_span("bogus").is_err());
    }

    #[test]
    fn test_decode_value_wrong_width() {
        let map = RegisterMap::mdw_default().unwrap();
        let spec = map.catalog.spec("station_1_setpoint").unwrap();
        assert!(decode_value(spec, &[1, 2], WordOrder::HiLo).is_err());
        assert!(decode_value(spec, &[], WordOrder::HiLo).is_err());
    }
}
