//! Scan and diagnose integration tests

use std::time::Duration;

use mdwsrv::diagnose::{self, BASE_CANDIDATES, PROBE_OFFSET};
use mdwsrv::scan::{scan, ScanPlan};
use mdwsrv::Parity;
use register_map::test_utils::{MemoryTransport, Request};

mod support;
use support::{serial_params, MemoryConnector};

fn plan(baudrates: Vec<u32>, parities: Vec<Parity>, slave_ids: Vec<u8>) -> ScanPlan {
    let mut base = serial_params();
    base.timeout = Duration::from_millis(20);
    base.retries = 1;
    ScanPlan {
        base,
        baudrates,
        parities,
        slave_ids,
        test_address: 1,
        test_count: 1,
    }
}

#[tokio::test]
async fn test_scan_finds_first_answering_combination() {
    let bank = MemoryTransport::with_registers([(1, 0x00AB)]);
    bank.answer_only(7);
    let connector = MemoryConnector::new(bank);
    connector.device_line(19200, Parity::Even);

    let plan = plan(vec![9600, 19200], vec![Parity::None, Parity::Even], (1..=10).collect());
    let hit = scan(&connector, &plan).await.unwrap().unwrap();

    assert_eq!(hit.baudrate, 19200);
    assert_eq!(hit.parity, Parity::Even);
    assert_eq!(hit.slave_id, 7);
    assert_eq!(hit.words, vec![0x00AB]);

    // 9600/N, 9600/E, 19200/N fully tried, then ids 1..=7 on 19200/E
    assert_eq!(connector.connects(), 10 * 3 + 7);
    assert_eq!(connector.closes(), connector.connects());
    assert!(connector.opened().iter().all(|p| p.retries == 1));
}

#[tokio::test]
async fn test_scan_without_answer() {
    let connector = MemoryConnector::new(MemoryTransport::new());
    let plan = plan(vec![9600], vec![Parity::None, Parity::Odd], vec![1, 2, 3]);

    assert!(scan(&connector, &plan).await.unwrap().is_none());
    assert_eq!(plan.attempts(), 6);
    assert_eq!(connector.connects(), 6);
    assert_eq!(connector.closes(), 6);
}

#[tokio::test]
async fn test_scan_skips_unopenable_attempts() {
    let bank = MemoryTransport::with_registers([(1, 5)]);
    let connector = MemoryConnector::new(bank);
    connector.refuse_next(2);

    let plan = plan(vec![9600], vec![Parity::None], vec![1, 2, 3]);
    let hit = scan(&connector, &plan).await.unwrap().unwrap();

    assert_eq!(hit.slave_id, 3);
    assert_eq!(connector.closes(), 1);
}

#[tokio::test]
async fn test_scan_stops_on_fatal_error() {
    let connector = MemoryConnector::new(MemoryTransport::new());
    connector.refuse_fatally();

    let plan = plan(vec![9600, 19200], vec![Parity::None], vec![1, 2]);
    assert!(scan(&connector, &plan).await.is_err());
    assert_eq!(connector.connects(), 1);
}

#[tokio::test]
async fn test_diagnose_finds_slave_base_and_registers() {
    // Device at slave 3, registers 40010..=40012 (Modicon 40001+ base)
    let bank = MemoryTransport::with_registers([(0, 1), (40010, 125), (40011, 0), (40012, 0xBEEF)]);
    bank.answer_only(3);
    let connector = MemoryConnector::new(bank.clone());

    let report = diagnose::diagnose(&connector, &serial_params(), 1, 0..=20).await.unwrap();

    assert_eq!(report.configured_slave_id, 1);
    assert_eq!(report.found_slave_id, Some(3));
    assert_eq!(report.effective_slave_id(), 3);

    let base = report.base.as_ref().unwrap();
    assert_eq!(base.base, 40001);
    assert_eq!(base.address, 40001 + PROBE_OFFSET);
    assert_eq!(base.value, 125);

    assert_eq!(report.registers.len(), 1);
    assert_eq!(report.registers[0].address, 0);

    // Single attempt per probe, one link for the whole run
    assert!(connector.opened().iter().all(|p| p.retries == 1));
    assert_eq!(connector.connects(), 1);
    assert_eq!(connector.closes(), 1);

    // Ids 1 and 2 time out, id 3 answers; later stages use id 3
    let requests = bank.requests();
    assert!(matches!(requests[2], Request::Read { slave_id: 3, address: 0, .. }));
    assert!(requests[3..]
        .iter()
        .all(|r| matches!(r, Request::Read { slave_id: 3, .. })));
}

#[tokio::test]
async fn test_diagnose_report_without_device() {
    let bank = MemoryTransport::new();
    bank.set_offline(true);
    let connector = MemoryConnector::new(bank.clone());

    let report = diagnose::diagnose(&connector, &serial_params(), 5, 0..=4).await.unwrap();

    assert_eq!(report.found_slave_id, None);
    assert_eq!(report.effective_slave_id(), 5);
    assert!(report.base.is_none());
    assert!(report.registers.is_empty());

    // 10 slave probes, in-range base candidates (400009 is skipped), 5 sweep reads
    let in_range = BASE_CANDIDATES
        .iter()
        .filter(|(base, _)| base + i64::from(PROBE_OFFSET) <= 65535)
        .count();
    assert_eq!(in_range, 3);
    assert_eq!(bank.read_count(), 10 + in_range + 5);

    let text = report.to_string();
    assert!(text.contains("Slave ID: not detected"));
    assert!(text.contains("Readable registers: none"));
}

#[tokio::test]
async fn test_sweep_reports_hex_values() {
    let mut bank = MemoryTransport::with_registers([(2, 0x000A), (4, 0xFFFF)]);
    let found = diagnose::sweep_addresses(&mut bank, 1, 0..=5).await;

    let lines: Vec<String> = found.iter().map(|r| r.to_string()).collect();
    assert_eq!(lines, vec!["  2:    10 (0x000A)", "  4: 65535 (0xFFFF)"]);
}
