//! mdwsrv - MDW blender Modbus RTU register poller

use clap::Parser;
use std::process::ExitCode;
use tracing::error;

use errors::{MdwError, MdwErrorTrait};
use mdwsrv::bootstrap;
use mdwsrv::cli::Args;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    match bootstrap::execute(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if matches!(e, MdwError::StartupFailed(_)) {
                // Logging may not be up
                eprintln!("{}", e);
            } else {
                error!("[{}] {}", e.error_code(), e);
            }
            ExitCode::from(u8::try_from(e.exit_code()).unwrap_or(1))
        },
    }
}
