//! Service bootstrap and command dispatch
//!
//! Settings are loaded before logging so the `logging` section applies;
//! a settings failure is reported after logging comes up with defaults.

use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::cli::{Args, Command};
use crate::config::MdwSettings;
use crate::diagnose;
use crate::poller::{Poller, PollerOptions};
use crate::scan::{self, ScanPlan};
use crate::transport::{Connector, RtuConnector};
use common::service_bootstrap::{init_logging, print_startup_banner};
use common::{LoggingSettings, ServiceInfo};
use errors::{MdwError, MdwResult};
use register_map::{ReadOrchestrator, RegisterKind, RegisterMap, ValueWriter};

pub fn create_service_info() -> ServiceInfo {
    ServiceInfo::new(
        "mdwsrv",
        env!("CARGO_PKG_VERSION"),
        "MDW blender Modbus RTU register poller",
    )
}

/// Parse-independent entry point used by `main`
pub async fn execute(args: Args) -> MdwResult<()> {
    let service = create_service_info();
    let command = args.command.clone().unwrap_or(Command::Run);

    let path = MdwSettings::resolve_path(args.config.as_deref());
    let loaded = MdwSettings::load(&path);
    let logging = loaded
        .as_ref()
        .map(|s| s.logging.clone())
        .unwrap_or_else(|_| LoggingSettings::default());

    init_logging(
        &service,
        &logging,
        args.log_level.as_deref(),
        command.is_service(),
        !args.no_color,
    )
    .map_err(|e| MdwError::StartupFailed(format!("logging: {}", e)))?;

    let settings = loaded?;
    let map = Arc::new(settings.register_map()?);

    match command {
        Command::Run => {
            print_startup_banner(&service);
            run_service(&settings, map).await
        },
        Command::Validate => validate(&settings, map),
        Command::Read { variable } => read_variable(&settings, map, &variable).await,
        Command::Write {
            variable,
            value,
            flags,
        } => write_variable(&settings, map, &variable, value, flags).await,
        Command::Span { profile } => print_span(&settings, map, &profile),
        Command::Scan => run_scan(&settings).await,
        Command::Diagnose {
            sweep_from,
            sweep_to,
        } => run_diagnose(&settings, sweep_from, sweep_to).await,
    }
}

async fn run_service(settings: &MdwSettings, map: Arc<RegisterMap>) -> MdwResult<()> {
    let orchestrator = ReadOrchestrator::new(map, settings.reader_options());
    let mut poller = Poller::new(
        RtuConnector,
        settings.serial_params(),
        orchestrator,
        PollerOptions::from_settings(settings),
    );

    let token = common::shutdown::shutdown_token();
    let stats = poller
        .run(token, |result| match serde_json::to_string(result) {
            Ok(line) => info!("{}", line),
            Err(e) => warn!("Cannot serialize result: {}", e),
        })
        .await?;

    info!("Shutdown complete ({} cycles)", stats.cycles);
    Ok(())
}

fn validate(settings: &MdwSettings, map: Arc<RegisterMap>) -> MdwResult<()> {
    let reader = ReadOrchestrator::new(Arc::clone(&map), settings.reader_options());
    reader.profile_span(&settings.read.profile)?;

    println!(
        "Settings OK: {} ({} variables, {} profiles)",
        settings.serial_params(),
        map.catalog.len(),
        map.profiles.names().len()
    );
    for (profile, names) in map.profiles.iter() {
        let marker = if profile == settings.read.profile { " *" } else { "" };
        println!("\n[{}]{} span {}", profile, marker, reader.profile_span(profile)?);
        for name in names {
            let spec = map.catalog.spec(name)?;
            let kind = match &spec.kind {
                RegisterKind::Numeric16 { .. } => "u16",
                RegisterKind::Numeric32 { .. } => "u32",
                RegisterKind::BitField { .. } => "bits",
            };
            println!(
                "  {:<24} +{:<4} {:<4} {:<3} {:<5} {}",
                name,
                spec.offset,
                kind,
                spec.access.to_string(),
                spec.unit.as_deref().unwrap_or(""),
                spec.description.as_deref().unwrap_or("")
            );
        }
    }
    Ok(())
}

async fn read_variable(settings: &MdwSettings, map: Arc<RegisterMap>, variable: &str) -> MdwResult<()> {
    let reader = ReadOrchestrator::new(map, settings.reader_options());
    // Unknown names fail before the port is opened
    reader.map().catalog.spec(variable)?;

    let connector = RtuConnector;
    let mut link = connector.connect(&settings.serial_params()).await?;
    let outcome = reader.read_variable(&mut link, variable).await;
    connector.close(link).await;

    let value = outcome?;
    println!("{}", json!({ "variable": variable, "value": value }));
    Ok(())
}

enum WriteRequest {
    Value(f64),
    Flags(Vec<String>),
}

async fn write_variable(
    settings: &MdwSettings,
    map: Arc<RegisterMap>,
    variable: &str,
    value: Option<f64>,
    flags: Option<Vec<String>>,
) -> MdwResult<()> {
    let request = match (value, flags) {
        (Some(value), _) => WriteRequest::Value(value),
        (None, Some(flags)) => WriteRequest::Flags(flags),
        (None, None) => {
            return Err(MdwError::InvalidParameter {
                param: "value".to_string(),
                reason: "use --value or --flags".to_string(),
            })
        },
    };
    map.catalog.spec(variable)?;

    let writer = ValueWriter::new(map, settings.reader_options());
    let connector = RtuConnector;
    let mut link = connector.connect(&settings.serial_params()).await?;

    let outcome = match request {
        WriteRequest::Value(value) => writer.write_value(&mut link, variable, value).await,
        WriteRequest::Flags(flags) => {
            let flags: Vec<&str> = flags.iter().map(|f| f.trim()).filter(|f| !f.is_empty()).collect();
            writer
                .write_flags(&mut link, variable, &flags)
                .await
                .map(|word| vec![word])
        },
    };
    connector.close(link).await;

    let words = outcome?;
    println!("{}", json!({ "variable": variable, "written": words }));
    Ok(())
}

fn print_span(settings: &MdwSettings, map: Arc<RegisterMap>, profile: &str) -> MdwResult<()> {
    let reader = ReadOrchestrator::new(map, settings.reader_options());
    let span = reader.profile_span(profile)?;
    println!("{}", json!({ "profile": profile, "span": span, "display": span.to_string() }));
    Ok(())
}

async fn run_scan(settings: &MdwSettings) -> MdwResult<()> {
    let plan = ScanPlan::from_settings(settings)?;
    match scan::scan(&RtuConnector, &plan).await? {
        Some(hit) => {
            println!("{}", serde_json::to_string_pretty(&hit)?);
            Ok(())
        },
        None => {
            warn!("No device answered. Try swapping the A/B lines and check for duplicate slave ids");
            Err(MdwError::NoDeviceFound(plan.base.port))
        },
    }
}

async fn run_diagnose(settings: &MdwSettings, sweep_from: u16, sweep_to: u16) -> MdwResult<()> {
    if sweep_from > sweep_to {
        return Err(MdwError::InvalidParameter {
            param: "sweep".to_string(),
            reason: format!("--sweep-from {} is above --sweep-to {}", sweep_from, sweep_to),
        });
    }

    let report = diagnose::diagnose(
        &RtuConnector,
        &settings.serial_params(),
        settings.modbus.slave_id,
        sweep_from..=sweep_to,
    )
    .await?;

    println!("{}", report);
    if report.found_slave_id.is_none() && report.registers.is_empty() {
        error!("Device did not answer any probe");
        return Err(MdwError::NoDeviceFound(settings.modbus.port.clone()));
    }
    Ok(())
}
