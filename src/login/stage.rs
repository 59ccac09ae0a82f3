//! Login stage: authentication, handoff to MainStage, and exit observation.
//!
//! After a successful sign-in the stage persists the identity, dismisses
//! the keyboard helper, spawns MainStage, and hides its surface. It then
//! runs three tasks until the first one reports:
//!
//! - the close-observer, which consumes `gui_closed`,
//! - the logout-observer, which consumes `gui_logged_out` on a tighter
//!   cadence,
//! - the exit watcher, which owns MainStage and waits for it to exit.
//!
//! Only a close notifies the supervisor through `initial_gui_closed`; a
//! logout ends the stage silently so the supervisor can start a new login.
//!
//! MainStage writes at most one of its two exit markers per session. If
//! both ever appear, whichever observer consumes first wins and the other
//! is cancelled.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::auth::{AuthError, Authenticator};
use crate::config::{GlobalConfig, RUNTIME_DIR_ENV, USER_ENV};
use crate::login::keyboard::dismiss_keyboard;
use crate::login::surface::{LoginRequest, LoginSurface, Notice};
use crate::models::identity::Identity;
use crate::models::state::{LoginEvent, LoginOutcome, LoginState};
use crate::orchestrator::child::{ManagedProcess, SpawnOptions};
use crate::sentinel::identity::IdentityStore;
use crate::sentinel::{Marker, SentinelChannel};
use crate::Result;

type EventTx = mpsc::Sender<Result<LoginEvent>>;

/// The login stage state machine and its collaborators.
pub struct LoginStage<A, S> {
    config: Arc<GlobalConfig>,
    channel: SentinelChannel,
    identity: IdentityStore,
    auth: A,
    surface: S,
    state: LoginState,
}

impl<A, S> LoginStage<A, S>
where
    A: Authenticator,
    S: LoginSurface,
{
    /// Stage over the configured runtime directory.
    pub fn new(config: Arc<GlobalConfig>, auth: A, surface: S) -> Self {
        Self {
            channel: SentinelChannel::new(&config.runtime_dir),
            identity: IdentityStore::new(&config.runtime_dir),
            auth,
            surface,
            state: LoginState::AwaitingAuth,
            config,
        }
    }

    /// Current state.
    pub fn state(&self) -> &LoginState {
        &self.state
    }

    /// Run the stage to completion.
    ///
    /// # Errors
    ///
    /// Returns `AppError::SentinelIo` if the identity or a marker cannot be
    /// written, `AppError::Spawn` if MainStage cannot be started, and
    /// `AppError::Io` if the surface input fails. MainStage has been torn
    /// down before any error is returned.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<LoginOutcome> {
        let span = info_span!("login_stage");
        async move {
            let result = self.drive(&cancel).await;
            if let Err(ref err) = result {
                error!(%err, "login stage failed");
                self.apply(LoginEvent::Failed);
            }
            let outcome = self.state.outcome().unwrap_or(LoginOutcome::Failed(None));
            info!(%outcome, "login stage closed");
            result.map(|()| outcome)
        }
        .instrument(span)
        .await
    }

    async fn drive(&mut self, cancel: &CancellationToken) -> Result<()> {
        let submitted = tokio::select! {
            biased;
            () = cancel.cancelled() => None,
            user = self.await_auth() => Some(user?),
        };

        let Some(user) = submitted else {
            self.apply(LoginEvent::Interrupted);
            return Ok(());
        };
        let Some(user) = user else {
            self.apply(LoginEvent::SurfaceEnded);
            return Ok(());
        };

        let main = self.handoff(&user).await?;
        self.apply(LoginEvent::Authenticated(user));
        self.surface.hide();

        self.observe(main, cancel).await
    }

    /// Serve the surface until someone signs in or it closes.
    async fn await_auth(&mut self) -> Result<Option<Identity>> {
        loop {
            let Some(request) = self.surface.next_request().await? else {
                return Ok(None);
            };

            match request {
                LoginRequest::SignIn { username, password } => {
                    match self.sign_in(&username, &password).await {
                        Ok(user) => {
                            info!(user = %user, "authentication succeeded");
                            return Ok(Some(user));
                        }
                        Err(err) => {
                            warn!(%err, "authentication failed");
                            let title = if matches!(err, AuthError::MissingFields(_)) {
                                "Login Error"
                            } else {
                                "Login Failed"
                            };
                            self.surface.notify(&Notice::error(title, err.to_string()));
                        }
                    }
                }
                LoginRequest::SignUp {
                    username,
                    password,
                    email,
                } => match self.sign_up(&username, &password, &email).await {
                    Ok(()) => {
                        info!(username = username.trim(), "account created");
                        self.surface
                            .notify(&Notice::info("Signup", "Account created successfully!"));
                    }
                    Err(err) => {
                        warn!(%err, "sign-up failed");
                        self.surface
                            .notify(&Notice::error("Signup Failed", err.to_string()));
                    }
                },
            }
        }
    }

    async fn sign_in(
        &self,
        username: &str,
        password: &str,
    ) -> std::result::Result<Identity, AuthError> {
        let username = username.trim();
        if username.is_empty() || password.is_empty() {
            return Err(AuthError::MissingFields("Both fields are required!".into()));
        }
        if !self.auth.username_exists(username).await? {
            return Err(AuthError::UnknownUser);
        }
        self.auth.sign_in(username, password).await?;
        Identity::new(username).map_err(|err| AuthError::Rejected(err.to_string()))
    }

    async fn sign_up(
        &self,
        username: &str,
        password: &str,
        email: &str,
    ) -> std::result::Result<(), AuthError> {
        let username = username.trim();
        let email = email.trim();
        if username.is_empty() || password.is_empty() || email.is_empty() {
            return Err(AuthError::MissingFields("All fields are required!".into()));
        }
        self.auth.sign_up(username, password, email).await
    }

    /// Persist the identity and start MainStage.
    ///
    /// The identity is on disk before MainStage exists, so its first read
    /// always sees the new user.
    async fn handoff(&self, user: &Identity) -> Result<ManagedProcess> {
        self.identity.write(user)?;

        let dismissal = dismiss_keyboard(&self.config.keyboard).await;
        debug!(?dismissal, "keyboard helper handled");

        for marker in [Marker::GuiClosed, Marker::GuiLoggedOut] {
            if self.channel.clear(marker)? {
                info!(%marker, "removed stale marker before starting main stage");
            }
        }

        let options = SpawnOptions::capture()
            .env(USER_ENV, user.as_str())
            .env(RUNTIME_DIR_ENV, self.config.runtime_dir.to_string_lossy());
        ManagedProcess::spawn("main_stage", &self.config.main_stage, &options)
    }

    /// Run the observers until the first terminal event, then tear down.
    async fn observe(&mut self, main: ManagedProcess, cancel: &CancellationToken) -> Result<()> {
        let timing = self.config.timing.clone();
        let observers = cancel.child_token();
        let (tx, mut rx) = mpsc::channel(4);

        let close = tokio::spawn(
            observe_marker(
                self.channel.clone(),
                Marker::GuiClosed,
                timing.close_poll(),
                LoginEvent::GuiClosed,
                tx.clone(),
                observers.clone(),
            )
            .instrument(info_span!("close_observer")),
        );
        let logout = tokio::spawn(
            observe_marker(
                self.channel.clone(),
                Marker::GuiLoggedOut,
                timing.logout_poll(),
                LoginEvent::GuiLoggedOut,
                tx.clone(),
                observers.clone(),
            )
            .instrument(info_span!("logout_observer")),
        );
        // Markers are written just before MainStage exits; give the
        // observers two of their ticks to claim them before reporting a lost
        // main stage.
        let settle = timing.close_poll().max(timing.logout_poll()) * 2;
        let exit_watch = tokio::spawn(
            watch_exit(main, settle, tx, observers.clone())
                .instrument(info_span!("main_stage_watch")),
        );

        let event = tokio::select! {
            biased;
            () = cancel.cancelled() => Ok(LoginEvent::Interrupted),
            received = rx.recv() => received.unwrap_or(Ok(LoginEvent::Failed)),
        };
        observers.cancel();

        let result = match event {
            Ok(event) => {
                let notify = event == LoginEvent::GuiClosed;
                self.apply(event);
                if notify {
                    self.notify_supervisor()
                } else {
                    Ok(())
                }
            }
            Err(err) => Err(err),
        };

        match exit_watch.await {
            Ok(mut main) => match main.terminate_and_wait(timing.grace()).await {
                Ok(outcome) => info!(?outcome, "main stage torn down"),
                Err(err) => error!(%err, "main stage teardown failed; dropping handle"),
            },
            Err(err) => error!(%err, "main stage watcher panicked"),
        }
        let (close, logout) = tokio::join!(close, logout);
        for (observer, joined) in [("close_observer", close), ("logout_observer", logout)] {
            if let Err(err) = joined {
                error!(%err, observer, "marker observer panicked");
            }
        }

        result
    }

    /// Replace any leftover `initial_gui_closed` with a fresh one.
    fn notify_supervisor(&self) -> Result<()> {
        if self.channel.clear(Marker::InitialGuiClosed)? {
            debug!("removed stale initial_gui_closed before signalling");
        }
        self.channel.signal(Marker::InitialGuiClosed, None)?;
        info!("supervisor notified of main stage close");
        Ok(())
    }

    fn apply(&mut self, event: LoginEvent) {
        let next = self.state.clone().on(event.clone());
        if next != self.state {
            info!(from = ?self.state, to = ?next, ?event, "login stage transition");
        }
        self.state = next;
    }
}

/// Consume `marker` on its own cadence and report `event` once.
async fn observe_marker(
    channel: SentinelChannel,
    marker: Marker,
    interval: Duration,
    event: LoginEvent,
    tx: EventTx,
    cancel: CancellationToken,
) {
    let message = match channel.wait(marker, interval, &cancel).await {
        Ok(Some(_)) => {
            info!(%marker, "marker consumed");
            Ok(event)
        }
        Ok(None) => return,
        Err(err) => Err(err),
    };
    if tx.send(message).await.is_err() {
        debug!(%marker, "stage stopped listening before observer reported");
    }
}

/// Own MainStage until it exits or `cancel` fires, then hand it back.
async fn watch_exit(
    mut main: ManagedProcess,
    settle: Duration,
    tx: EventTx,
    cancel: CancellationToken,
) -> ManagedProcess {
    let exited = tokio::select! {
        () = cancel.cancelled() => None,
        state = main.wait_blocking() => Some(state),
    };
    let Some(exited) = exited else {
        return main;
    };

    let message = match exited {
        Ok(state) => {
            debug!(?state, "main stage exited; waiting for exit marker");
            tokio::select! {
                () = cancel.cancelled() => return main,
                () = tokio::time::sleep(settle) => {}
            }
            warn!(?state, "main stage exited without an exit marker");
            Ok(LoginEvent::MainStageExited)
        }
        Err(err) => Err(err),
    };
    if tx.send(message).await.is_err() {
        debug!("stage stopped listening before exit watcher reported");
    }
    main
}
