#![forbid(unsafe_code)]

//! `pantry-ctl` — local companion CLI for the pantry appliance.
//!
//! Writes and inspects the sentinel files in the runtime directory. Used by
//! the main application and hardware listener scripts to signal the
//! supervisor, and by an operator on the device to check session state.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde::Serialize;

use pantry_session::config::GlobalConfig;
use pantry_session::models::event::HardwareEvent;
use pantry_session::sentinel::identity::IdentityStore;
use pantry_session::sentinel::{Marker, SentinelChannel};
use pantry_session::{AppError, Result};

#[derive(Debug, Parser)]
#[command(
    name = "pantry-ctl",
    about = "Local CLI for the pantry session supervisor",
    version,
    long_about = None
)]
struct Cli {
    /// Runtime directory holding the sentinel files.
    ///
    /// When omitted, resolved from `--config`, then `PANTRY_RUNTIME_DIR`,
    /// then the current directory.
    #[arg(long)]
    runtime_dir: Option<PathBuf>,

    /// Optional TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Report that the main application was closed.
    Closed,

    /// Report that the user logged out of the main application.
    LoggedOut,

    /// Report a hardware event to the supervisor.
    Event {
        /// Event payload, e.g. "In button clicked".
        payload: String,
    },

    /// Print the signed-in username.
    Whoami,

    /// Print pending markers and the current identity as JSON.
    Status,
}

#[derive(Debug, Serialize)]
struct Status {
    runtime_dir: PathBuf,
    pending: Vec<&'static str>,
    user: Option<String>,
}

fn main() -> ExitCode {
    let args = Cli::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Cli) -> Result<()> {
    let runtime_dir = match args.runtime_dir {
        Some(dir) => dir,
        None => GlobalConfig::load(args.config.as_deref())?.runtime_dir,
    };
    let channel = SentinelChannel::new(&runtime_dir);

    match args.command {
        Command::Closed => channel.signal(Marker::GuiClosed, None)?,
        Command::LoggedOut => channel.signal(Marker::GuiLoggedOut, None)?,
        Command::Event { payload } => {
            let event = HardwareEvent::from_payload(&payload).ok_or_else(|| {
                let known: Vec<&str> = HardwareEvent::ALL
                    .into_iter()
                    .map(HardwareEvent::payload)
                    .collect();
                AppError::Config(format!(
                    "unrecognized event `{payload}`; expected one of: {}",
                    known.join(", ")
                ))
            })?;
            channel.signal(Marker::ManagementSignal, Some(event.payload()))?;
        }
        Command::Whoami => match IdentityStore::new(&runtime_dir).read()? {
            Some(user) => println!("{user}"),
            None => return Err(AppError::Io("no user is signed in".into())),
        },
        Command::Status => {
            let pending = Marker::ALL
                .into_iter()
                .filter(|marker| channel.path(*marker).exists())
                .map(Marker::name)
                .collect();
            let user = IdentityStore::new(&runtime_dir)
                .read()?
                .map(|user| user.as_str().to_owned());
            let status = Status {
                runtime_dir,
                pending,
                user,
            };
            let json = serde_json::to_string_pretty(&status)
                .map_err(|err| AppError::Io(format!("failed to encode status: {err}")))?;
            println!("{json}");
        }
    }
    Ok(())
}
