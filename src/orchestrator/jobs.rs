//! Fire-and-forget launcher for the image-classification job.
//!
//! The supervisor hands each recognized hardware event to
//! [`JobLauncher::launch`], which spawns the job and returns immediately. A
//! detached task reaps the process and logs its exit; the supervisor never
//! waits for or inspects the result.

use std::path::PathBuf;

use tracing::{info, warn, Instrument};

use crate::config::{CommandSpec, RUNTIME_DIR_ENV, USER_ENV};
use crate::models::event::HardwareEvent;
use crate::orchestrator::child::{ManagedProcess, SpawnOptions};
use crate::sentinel::identity::IdentityStore;
use crate::{AppError, Result};

/// Environment variable naming the event that triggered the job.
pub const EVENT_ENV: &str = "PANTRY_EVENT";

/// Launches classification jobs with the ambient identity in their environment.
#[derive(Debug, Clone)]
pub struct JobLauncher {
    spec: CommandSpec,
    runtime_dir: PathBuf,
    identity: IdentityStore,
}

impl JobLauncher {
    /// Launcher for `spec`, reading the identity from `runtime_dir`.
    #[must_use]
    pub fn new(spec: CommandSpec, runtime_dir: impl Into<PathBuf>) -> Self {
        let runtime_dir = runtime_dir.into();
        Self {
            identity: IdentityStore::new(&runtime_dir),
            spec,
            runtime_dir,
        }
    }

    /// Spawn one job for `event` without waiting for it.
    ///
    /// Returns the job's pid when known.
    ///
    /// # Errors
    ///
    /// Returns `AppError::JobLaunch` if the job cannot be started. Callers
    /// log and ignore it.
    pub fn launch(&self, event: HardwareEvent) -> Result<Option<u32>> {
        let mut options = SpawnOptions::capture()
            .env(RUNTIME_DIR_ENV, self.runtime_dir.to_string_lossy())
            .env(EVENT_ENV, event.payload());

        match self.identity.read() {
            Ok(Some(user)) => options = options.env(USER_ENV, user.as_str()),
            Ok(None) => {}
            Err(err) => warn!(%err, "identity unavailable for classification job"),
        }

        let mut process = ManagedProcess::spawn("classification_job", &self.spec, &options)
            .map_err(|err| AppError::JobLaunch(err.to_string()))?;
        let pid = process.pid();

        let span = tracing::info_span!("classification_job", %event, pid = pid.unwrap_or(0));
        tokio::spawn(
            async move {
                match process.wait_blocking().await {
                    Ok(state) => info!(?state, "classification job finished"),
                    Err(err) => warn!(%err, "classification job wait failed"),
                }
            }
            .instrument(span),
        );

        Ok(pid)
    }
}
