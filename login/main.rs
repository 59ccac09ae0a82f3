#![forbid(unsafe_code)]

//! `pantry-login` — login stage of the pantry appliance.
//!
//! Serves the login surface on the terminal, hands off to the main
//! application after sign-in, and exits with a code the supervisor maps
//! back to a [`LoginOutcome`].

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use pantry_session::auth::command::CommandAuthenticator;
use pantry_session::config::GlobalConfig;
use pantry_session::login::stage::LoginStage;
use pantry_session::login::surface::{StdinLines, TerminalSurface};
use pantry_session::logging::{init_tracing, LogFormat};
use pantry_session::models::state::LoginOutcome;
use pantry_session::shutdown::cancel_on_shutdown;
use pantry_session::{AppError, Result};

#[derive(Debug, Parser)]
#[command(name = "pantry-login", about = "Pantry appliance login stage", version, long_about = None)]
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
        return ExitCode::from(exit_code(LoginOutcome::Failed(None)));
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))
    {
        Ok(runtime) => runtime,
        Err(err) => {
            error!(%err, "startup failed");
            return ExitCode::from(exit_code(LoginOutcome::Failed(None)));
        }
    };

    match runtime.block_on(run(args)) {
        Ok(outcome) => ExitCode::from(exit_code(outcome)),
        Err(err) => {
            error!(%err, "login stage failed");
            ExitCode::from(exit_code(LoginOutcome::Failed(None)))
        }
    }
}

async fn run(args: Cli) -> Result<LoginOutcome> {
    let config = GlobalConfig::load(args.config.as_deref())?;
    config.ensure_runtime_dir()?;
    let config = Arc::new(config);
    info!(runtime_dir = %config.runtime_dir.display(), "login stage starting");

    let ct = CancellationToken::new();
    cancel_on_shutdown(&ct);

    let auth = CommandAuthenticator::new(config.auth.clone());
    let surface = TerminalSurface::from_lines(StdinLines::spawn()?, std::io::stdout());
    LoginStage::new(config, auth, surface).run(ct).await
}

fn exit_code(outcome: LoginOutcome) -> u8 {
    u8::try_from(outcome.exit_code()).unwrap_or(1)
}
