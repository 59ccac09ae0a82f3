//! Top-level session supervisor.
//!
//! Spawns the login stage, then ticks on a fixed cadence. Each tick checks,
//! in priority order:
//!
//! 1. whether the login stage process has exited,
//! 2. whether the `initial_gui_closed` marker can be consumed,
//! 3. whether a `management_signal` marker carries a hardware event.
//!
//! The first two end the session (or, after a logout, restart the login
//! stage per policy). The third launches the classification job without
//! blocking the loop. Teardown always runs, on every exit path.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::config::{GlobalConfig, RUNTIME_DIR_ENV};
use crate::models::event::HardwareEvent;
use crate::models::state::{
    Directive, LoginOutcome, ShutdownReason, SupervisorEvent, SupervisorState,
};
use crate::orchestrator::child::{ManagedProcess, SpawnOptions, TeardownOutcome};
use crate::orchestrator::jobs::JobLauncher;
use crate::sentinel::{Marker, SentinelChannel};
use crate::Result;

/// What happened to the login stage during teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginTeardown {
    /// No login stage was owned when the session ended.
    NotRunning,
    /// The login stage was stopped.
    Stopped(TeardownOutcome),
    /// Stopping the login stage failed; it may still be running.
    Failed,
}

/// Summary returned once the supervisor has torn everything down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorReport {
    /// Why the session ended.
    pub reason: ShutdownReason,
    /// How the login stage was stopped.
    pub teardown: LoginTeardown,
    /// Number of login stage processes started.
    pub login_spawns: u32,
    /// Number of classification jobs launched.
    pub jobs_launched: u32,
}

impl SupervisorReport {
    /// Process exit status for the supervisor binary.
    ///
    /// `3` when the login stage could not be stopped, `2` when it had to be
    /// force-killed, `1` after a fatal error, `0` otherwise.
    #[must_use]
    pub fn exit_code(self) -> u8 {
        match (self.reason, self.teardown) {
            (_, LoginTeardown::Failed) => 3,
            (_, LoginTeardown::Stopped(TeardownOutcome::ForceKilled)) => 2,
            (ShutdownReason::Fatal, _) => 1,
            _ => 0,
        }
    }
}

/// The supervising control loop.
#[derive(Debug)]
pub struct SessionSupervisor {
    config: Arc<GlobalConfig>,
    channel: SentinelChannel,
    jobs: JobLauncher,
    state: SupervisorState,
    login: Option<ManagedProcess>,
    login_spawns: u32,
    jobs_launched: u32,
}

impl SessionSupervisor {
    /// Build a supervisor over the configured runtime directory.
    #[must_use]
    pub fn new(config: Arc<GlobalConfig>) -> Self {
        Self {
            channel: SentinelChannel::new(&config.runtime_dir),
            jobs: JobLauncher::new(config.classification_job.clone(), &config.runtime_dir),
            state: SupervisorState::Idle,
            login: None,
            login_spawns: 0,
            jobs_launched: 0,
            config,
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> SupervisorState {
        self.state
    }

    /// Run until the session ends or `cancel` fires, then tear down.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Spawn` if the login stage cannot be started and
    /// `AppError::SentinelIo` / `AppError::Process` on orchestration
    /// failures. Teardown has completed before any error is returned.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<SupervisorReport> {
        let span = info_span!(
            "supervisor",
            runtime_dir = %self.config.runtime_dir.display()
        );

        async move {
            let outcome = self.supervise(&cancel).await;
            if outcome.is_err() {
                self.apply(SupervisorEvent::Fatal);
            }

            let teardown = self.teardown().await;
            let reason = match self.state {
                SupervisorState::ShuttingDown(reason) => reason,
                SupervisorState::Idle | SupervisorState::LoginActive => ShutdownReason::Fatal,
            };
            info!(%reason, ?teardown, "supervisor terminated");

            outcome.map(|()| SupervisorReport {
                reason,
                teardown,
                login_spawns: self.login_spawns,
                jobs_launched: self.jobs_launched,
            })
        }
        .instrument(span)
        .await
    }

    async fn supervise(&mut self, cancel: &CancellationToken) -> Result<()> {
        if self.channel.clear(Marker::InitialGuiClosed)? {
            info!("removed stale initial_gui_closed marker from a previous run");
        }
        self.spawn_login()?;

        let poll = self.config.timing.supervisor_poll();
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    info!("interrupt received, shutting down");
                    self.apply(SupervisorEvent::Interrupted);
                    return Ok(());
                }
                () = tokio::time::sleep(poll) => {}
            }

            match self.tick()? {
                Directive::Stay => {}
                Directive::SpawnLogin => self.spawn_login()?,
                Directive::Teardown => return Ok(()),
            }
        }
    }

    /// One supervision tick. Checks are ordered so that a single tick never
    /// handles both an exit and a close for the same session.
    fn tick(&mut self) -> Result<Directive> {
        if let Some(login) = self.login.as_mut() {
            let state = login.poll()?;
            if state.is_finished() {
                self.login = None;
                let outcome = LoginOutcome::from_exit_code(state.code());
                if self.channel.clear(Marker::InitialGuiClosed)? {
                    debug!("initial_gui_closed consumed alongside login stage exit");
                }
                info!(%outcome, "login stage exited");
                return Ok(self.apply(SupervisorEvent::LoginExited(outcome)));
            }
        }

        if self.channel.consume(Marker::InitialGuiClosed)?.is_some() {
            info!("initial_gui_closed observed");
            return Ok(self.apply(SupervisorEvent::InitialGuiClosed));
        }

        self.dispatch_management_signal()?;
        Ok(Directive::Stay)
    }

    fn dispatch_management_signal(&mut self) -> Result<()> {
        let Some(payload) = self.channel.consume(Marker::ManagementSignal)? else {
            return Ok(());
        };

        match HardwareEvent::from_payload(&payload) {
            Some(event) => match self.jobs.launch(event) {
                Ok(pid) => {
                    self.jobs_launched += 1;
                    info!(%event, pid = pid.unwrap_or(0), "classification job launched");
                }
                Err(err) => warn!(%event, %err, "classification job launch failed"),
            },
            None => warn!(payload = payload.trim(), "ignoring unrecognized management signal"),
        }
        Ok(())
    }

    fn spawn_login(&mut self) -> Result<()> {
        let options = SpawnOptions::inherit().env(
            RUNTIME_DIR_ENV,
            self.config.runtime_dir.to_string_lossy(),
        );
        let process = ManagedProcess::spawn("login_stage", &self.config.login_stage, &options)?;
        self.login = Some(process);
        self.login_spawns += 1;
        self.apply(SupervisorEvent::LoginSpawned);
        Ok(())
    }

    fn apply(&mut self, event: SupervisorEvent) -> Directive {
        let (next, directive) = self
            .state
            .on(event, self.config.policy.respawn_on_logout);
        if next != self.state {
            info!(from = ?self.state, to = ?next, ?event, "supervisor transition");
        }
        self.state = next;
        directive
    }

    async fn teardown(&mut self) -> LoginTeardown {
        let Some(mut login) = self.login.take() else {
            return LoginTeardown::NotRunning;
        };
        match login
            .terminate_and_wait(self.config.timing.grace())
            .await
        {
            Ok(outcome) => {
                info!(?outcome, "login stage torn down");
                LoginTeardown::Stopped(outcome)
            }
            Err(err) => {
                error!(%err, "login stage teardown failed; dropping handle");
                LoginTeardown::Failed
            }
        }
    }
}
