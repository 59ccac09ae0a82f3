#![forbid(unsafe_code)]

//! `pantry-supervisor` — session supervisor for the pantry appliance.
//!
//! Starts the login stage, watches it and the sentinel namespace, launches
//! classification jobs on hardware events, and tears everything down on
//! Ctrl-C or SIGTERM.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use pantry_session::config::GlobalConfig;
use pantry_session::logging::{init_tracing, LogFormat};
use pantry_session::orchestrator::supervisor::SessionSupervisor;
use pantry_session::shutdown::cancel_on_shutdown;
use pantry_session::{AppError, Result};

#[derive(Debug, Parser)]
#[command(name = "pantry-supervisor", about = "Pantry appliance session supervisor", version, long_about = None)]
struct Cli {
    /// Optional TOML configuration file; built-in defaults are used otherwise.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

fn main() -> ExitCode {
    let args = Cli::parse();
    if let Err(err) = init_tracing(args.log_format) {
        eprintln!("{err}");
        return ExitCode::FAILURE;
    }
    info!("pantry-supervisor bootstrap");

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))
    {
        Ok(runtime) => runtime,
        Err(err) => {
            error!(%err, "startup failed");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(args)) {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            error!(%err, "supervisor failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Cli) -> Result<u8> {
    let config = GlobalConfig::load(args.config.as_deref())?;
    config.ensure_runtime_dir()?;
    let config = Arc::new(config);
    info!(runtime_dir = %config.runtime_dir.display(), "configuration loaded");

    let ct = CancellationToken::new();
    cancel_on_shutdown(&ct);

    let report = SessionSupervisor::new(config).run(ct).await?;
    info!(
        reason = %report.reason,
        login_spawns = report.login_spawns,
        jobs_launched = report.jobs_launched,
        "application terminated"
    );
    Ok(report.exit_code())
}
