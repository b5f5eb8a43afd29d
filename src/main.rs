//! Gatepass entry point.

use std::process::ExitCode;

use tracing::{error, info};

use gatepass::config::Config;
use gatepass::cycle::Driver;
use gatepass::ledger::Ledger;

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    // Configuration errors are the only fatal path: halt with a clear
    // message and the config exit code.
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            error!("{e}");
            return ExitCode::from(e.exit_code());
        }
    };

    let mut ledger = Ledger::load(&config.ledger_path);
    info!(
        entries = ledger.len(),
        ledger = %config.ledger_path.display(),
        export_dir = %config.export_dir.display(),
        cadence_secs = config.poll_cadence.as_secs(),
        "starting sync loop"
    );

    let driver = match Driver::new(config) {
        Ok(driver) => driver,
        Err(e) => {
            error!("{e}");
            return ExitCode::from(e.exit_code());
        }
    };

    // Runs until externally terminated.
    driver.run(&mut ledger).await;
    ExitCode::SUCCESS
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    // Honor RUST_LOG if set, otherwise default to info for the daemon
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
