//! Global configuration parsing, validation, and environment overrides.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::{AppError, Result};

/// Environment variable overriding [`GlobalConfig::runtime_dir`].
///
/// Also exported to every child so sibling processes agree on where the
/// sentinel namespace lives.
pub const RUNTIME_DIR_ENV: &str = "PANTRY_RUNTIME_DIR";

/// Environment variable carrying the active identity to MainStage and jobs.
pub const USER_ENV: &str = "PANTRY_USER";

/// An external executable plus its fixed arguments.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct CommandSpec {
    /// Program name or path.
    pub command: String,
    /// Arguments passed verbatim.
    #[serde(default)]
    pub args: Vec<String>,
}

impl CommandSpec {
    /// Build a spec from a program and argument list.
    #[must_use]
    pub fn new(command: impl Into<String>, args: &[&str]) -> Self {
        Self {
            command: command.into(),
            args: args.iter().map(|&a| a.to_owned()).collect(),
        }
    }

    /// Human-readable command line for logs.
    #[must_use]
    pub fn display(&self) -> String {
        if self.args.is_empty() {
            self.command.clone()
        } else {
            format!("{} {}", self.command, self.args.join(" "))
        }
    }
}

fn default_login_stage() -> CommandSpec {
    CommandSpec::new("pantry-login", &[])
}

fn default_main_stage() -> CommandSpec {
    CommandSpec::new("python3.8", &["GUI.py"])
}

fn default_classification_job() -> CommandSpec {
    CommandSpec::new("python3", &["image_classification.py"])
}

fn default_auth() -> CommandSpec {
    CommandSpec::new("pantry-auth", &[])
}

/// On-screen keyboard helper that must not linger over the main screen.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct KeyboardConfig {
    /// Command that terminates the helper.
    #[serde(default = "default_keyboard_command")]
    pub command: String,
    /// Arguments for the termination command.
    #[serde(default = "default_keyboard_args")]
    pub args: Vec<String>,
    /// Delay after the kill request before continuing the handoff.
    #[serde(default = "default_keyboard_settle_ms")]
    pub settle_ms: u64,
}

fn default_keyboard_command() -> String {
    "pkill".into()
}

fn default_keyboard_args() -> Vec<String> {
    vec!["-f".into(), "florence".into()]
}

fn default_keyboard_settle_ms() -> u64 {
    1000
}

impl Default for KeyboardConfig {
    fn default() -> Self {
        Self {
            command: default_keyboard_command(),
            args: default_keyboard_args(),
            settle_ms: default_keyboard_settle_ms(),
        }
    }
}

impl KeyboardConfig {
    /// The termination command as a spawnable spec.
    #[must_use]
    pub fn kill_command(&self) -> CommandSpec {
        CommandSpec {
            command: self.command.clone(),
            args: self.args.clone(),
        }
    }
}

/// Poll cadences and termination grace period.
///
/// The close and logout intervals are kept separate on purpose: logout must
/// be observed quickly, process exit is a coarse safety net.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct TimingConfig {
    /// Supervisor tick.
    #[serde(default = "default_slow_poll_ms")]
    pub supervisor_poll_ms: u64,
    /// LoginStage close-observer tick.
    #[serde(default = "default_slow_poll_ms")]
    pub close_poll_ms: u64,
    /// LoginStage logout-observer tick.
    #[serde(default = "default_logout_poll_ms")]
    pub logout_poll_ms: u64,
    /// Seconds to wait after a termination request before force-killing.
    #[serde(default = "default_grace_seconds")]
    pub grace_seconds: u64,
}

fn default_slow_poll_ms() -> u64 {
    1000
}

fn default_logout_poll_ms() -> u64 {
    100
}

fn default_grace_seconds() -> u64 {
    5
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            supervisor_poll_ms: default_slow_poll_ms(),
            close_poll_ms: default_slow_poll_ms(),
            logout_poll_ms: default_logout_poll_ms(),
            grace_seconds: default_grace_seconds(),
        }
    }
}

impl TimingConfig {
    /// Supervisor tick as a [`Duration`].
    #[must_use]
    pub fn supervisor_poll(&self) -> Duration {
        Duration::from_millis(self.supervisor_poll_ms)
    }

    /// Close-observer tick as a [`Duration`].
    #[must_use]
    pub fn close_poll(&self) -> Duration {
        Duration::from_millis(self.close_poll_ms)
    }

    /// Logout-observer tick as a [`Duration`].
    #[must_use]
    pub fn logout_poll(&self) -> Duration {
        Duration::from_millis(self.logout_poll_ms)
    }

    /// Grace period as a [`Duration`].
    #[must_use]
    pub fn grace(&self) -> Duration {
        Duration::from_secs(self.grace_seconds)
    }
}

/// Restart policy applied when the login stage ends.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct PolicyConfig {
    /// Start a fresh login stage after a user-initiated logout.
    #[serde(default = "default_true")]
    pub respawn_on_logout: bool,
}

fn default_true() -> bool {
    true
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            respawn_on_logout: true,
        }
    }
}

fn default_runtime_dir() -> PathBuf {
    PathBuf::from(".")
}

/// Global configuration parsed from `pantry.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Directory holding the sentinel markers and the identity file.
    #[serde(default = "default_runtime_dir")]
    pub runtime_dir: PathBuf,
    /// Login stage executable spawned by the supervisor.
    #[serde(default = "default_login_stage")]
    pub login_stage: CommandSpec,
    /// Main application executable spawned after authentication.
    #[serde(default = "default_main_stage")]
    pub main_stage: CommandSpec,
    /// Image-classification job launched on hardware events.
    #[serde(default = "default_classification_job")]
    pub classification_job: CommandSpec,
    /// Identity-provider helper used by the command-backed authenticator.
    #[serde(default = "default_auth")]
    pub auth: CommandSpec,
    /// On-screen keyboard handling.
    #[serde(default)]
    pub keyboard: KeyboardConfig,
    /// Poll cadences and grace period.
    #[serde(default)]
    pub timing: TimingConfig,
    /// Restart policy.
    #[serde(default)]
    pub policy: PolicyConfig,
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Load from `path` when given, otherwise use built-in defaults.
    ///
    /// The `PANTRY_RUNTIME_DIR` override is applied in both cases.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` on read, parse, or validation failure.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load_from_path(path)?,
            None => Self::from_toml_str("")?,
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides on top of file values.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(dir) = env::var(RUNTIME_DIR_ENV) {
            if !dir.trim().is_empty() {
                self.runtime_dir = PathBuf::from(dir);
            }
        }
    }

    /// Create the runtime directory if needed.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the directory cannot be created.
    pub fn ensure_runtime_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.runtime_dir).map_err(|err| {
            AppError::Config(format!(
                "failed to create runtime dir {}: {err}",
                self.runtime_dir.display()
            ))
        })
    }

    fn validate(&self) -> Result<()> {
        let timing = &self.timing;
        if timing.supervisor_poll_ms == 0 || timing.close_poll_ms == 0 || timing.logout_poll_ms == 0
        {
            return Err(AppError::Config(
                "poll intervals must be greater than zero".into(),
            ));
        }

        for (name, spec) in [
            ("login_stage", &self.login_stage),
            ("main_stage", &self.main_stage),
            ("classification_job", &self.classification_job),
            ("auth", &self.auth),
        ] {
            if spec.command.trim().is_empty() {
                return Err(AppError::Config(format!("{name}.command must not be empty")));
            }
        }

        if self.runtime_dir.as_os_str().is_empty() {
            return Err(AppError::Config("runtime_dir must not be empty".into()));
        }

        Ok(())
    }
}
