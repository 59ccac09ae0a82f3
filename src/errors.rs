//! Error types shared across the supervisor, login stage, and companion CLI.

use std::fmt::{Display, Formatter};

use crate::auth::AuthError;

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all orchestration failure modes.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// A primary child process could not be started.
    Spawn(String),
    /// Reading, writing, or removing a sentinel or identity file failed.
    SentinelIo(String),
    /// Waiting on or signalling a running child process failed.
    Process(String),
    /// The fire-and-forget classification job could not be launched.
    JobLaunch(String),
    /// Authentication was rejected by the identity provider.
    Auth(AuthError),
    /// Other file-system or terminal I/O failure.
    Io(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Spawn(msg) => write!(f, "spawn: {msg}"),
            Self::SentinelIo(msg) => write!(f, "sentinel io: {msg}"),
            Self::Process(msg) => write!(f, "process: {msg}"),
            Self::JobLaunch(msg) => write!(f, "job launch: {msg}"),
            Self::Auth(err) => write!(f, "auth: {err}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        Self::Auth(err)
    }
}
