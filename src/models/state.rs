//! Explicit state machines for the supervisor and the login stage.
//!
//! Both machines are driven by total transition functions: every
//! `(state, event)` pair has a defined result, and terminal states absorb
//! any further event. The processes never infer their state from which
//! marker files happen to exist.

use std::fmt::{Display, Formatter};

use crate::models::identity::Identity;

/// How a login stage process ended, carried across the process boundary
/// as its exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginOutcome {
    /// MainStage closed normally; the supervisor was notified.
    Closed,
    /// The user logged out; a fresh login is expected.
    LoggedOut,
    /// The login surface ended before anyone authenticated.
    Abandoned,
    /// MainStage exited without writing either exit marker.
    MainStageLost,
    /// The stage received an operator interrupt.
    Interrupted,
    /// The stage failed, or exited with an unknown status.
    Failed(Option<i32>),
}

impl LoginOutcome {
    /// Exit status the login stage process reports for this outcome.
    #[must_use]
    pub const fn exit_code(self) -> i32 {
        match self {
            Self::Closed => 0,
            Self::Failed(_) => 1,
            Self::LoggedOut => 3,
            Self::Abandoned => 4,
            Self::MainStageLost => 5,
            Self::Interrupted => 6,
        }
    }

    /// Decode the exit status of a finished login stage process.
    ///
    /// `None` means the process was terminated by a signal.
    #[must_use]
    pub const fn from_exit_code(code: Option<i32>) -> Self {
        match code {
            Some(0) => Self::Closed,
            Some(3) => Self::LoggedOut,
            Some(4) => Self::Abandoned,
            Some(5) => Self::MainStageLost,
            Some(6) => Self::Interrupted,
            other => Self::Failed(other),
        }
    }
}

impl Display for LoginOutcome {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => f.write_str("closed"),
            Self::LoggedOut => f.write_str("logged out"),
            Self::Abandoned => f.write_str("abandoned before login"),
            Self::MainStageLost => f.write_str("main stage exited without a marker"),
            Self::Interrupted => f.write_str("interrupted"),
            Self::Failed(Some(code)) => write!(f, "failed with code {code}"),
            Self::Failed(None) => f.write_str("terminated by signal"),
        }
    }
}

// ── Supervisor ───────────────────────────────────────────────────────────────

/// Why the supervisor left [`SupervisorState::LoginActive`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// The login stage process ended on its own.
    LoginEnded(LoginOutcome),
    /// The `initial_gui_closed` marker was consumed.
    InitialGuiClosed,
    /// Operator interrupt (Ctrl-C or SIGTERM).
    Interrupted,
    /// An unrecoverable spawn or sentinel failure.
    Fatal,
}

impl Display for ShutdownReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LoginEnded(outcome) => write!(f, "login stage {outcome}"),
            Self::InitialGuiClosed => f.write_str("login stage signalled close"),
            Self::Interrupted => f.write_str("operator interrupt"),
            Self::Fatal => f.write_str("fatal error"),
        }
    }
}

/// Supervisor session state.
///
/// The supervisor cannot observe MainStage directly, so the main-screen
/// phase is tracked by the login stage ([`LoginState::MainActive`]) and is
/// folded into `LoginActive` here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    /// Nothing spawned yet.
    Idle,
    /// A login stage process is running.
    LoginActive,
    /// Terminal: tearing down and exiting.
    ShuttingDown(ShutdownReason),
}

/// Inputs to the supervisor state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorEvent {
    /// A login stage process was started.
    LoginSpawned,
    /// The login stage process was observed to have exited.
    LoginExited(LoginOutcome),
    /// The `initial_gui_closed` marker was consumed.
    InitialGuiClosed,
    /// Operator interrupt.
    Interrupted,
    /// Unrecoverable failure in the supervision loop.
    Fatal,
}

/// Side effect the supervision loop must perform after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    /// Keep ticking.
    Stay,
    /// Start a fresh login stage process.
    SpawnLogin,
    /// Terminate the login stage and leave the loop.
    Teardown,
}

impl SupervisorState {
    /// Apply `event`, returning the next state and the loop directive.
    #[must_use]
    pub fn on(self, event: SupervisorEvent, respawn_on_logout: bool) -> (Self, Directive) {
        match (self, event) {
            (Self::ShuttingDown(reason), _) => (Self::ShuttingDown(reason), Directive::Stay),
            (_, SupervisorEvent::Interrupted) => (
                Self::ShuttingDown(ShutdownReason::Interrupted),
                Directive::Teardown,
            ),
            (_, SupervisorEvent::Fatal) => {
                (Self::ShuttingDown(ShutdownReason::Fatal), Directive::Teardown)
            }
            (Self::Idle | Self::LoginActive, SupervisorEvent::LoginSpawned) => {
                (Self::LoginActive, Directive::Stay)
            }
            (Self::Idle, _) => (Self::Idle, Directive::Stay),
            (Self::LoginActive, SupervisorEvent::LoginExited(LoginOutcome::LoggedOut))
                if respawn_on_logout =>
            {
                (Self::LoginActive, Directive::SpawnLogin)
            }
            (Self::LoginActive, SupervisorEvent::LoginExited(outcome)) => (
                Self::ShuttingDown(ShutdownReason::LoginEnded(outcome)),
                Directive::Teardown,
            ),
            (Self::LoginActive, SupervisorEvent::InitialGuiClosed) => (
                Self::ShuttingDown(ShutdownReason::InitialGuiClosed),
                Directive::Teardown,
            ),
        }
    }

    /// Whether the state is terminal.
    #[must_use]
    pub const fn is_shutting_down(self) -> bool {
        matches!(self, Self::ShuttingDown(_))
    }
}

// ── Login stage ──────────────────────────────────────────────────────────────

/// Login stage state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginState {
    /// Login surface is interactive; nobody is signed in.
    AwaitingAuth,
    /// MainStage is running for the given user; the surface is hidden.
    MainActive(Identity),
    /// Terminal.
    Closed(LoginOutcome),
}

/// Inputs to the login stage state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginEvent {
    /// Authentication succeeded and MainStage was spawned.
    Authenticated(Identity),
    /// The login surface ended (EOF or quit) without authentication.
    SurfaceEnded,
    /// The close-observer consumed `gui_closed`.
    GuiClosed,
    /// The logout-observer consumed `gui_logged_out`.
    GuiLoggedOut,
    /// MainStage exited and neither exit marker was found.
    MainStageExited,
    /// Operator interrupt.
    Interrupted,
    /// Unrecoverable failure inside the stage.
    Failed,
}

impl LoginState {
    /// Apply `event`, returning the next state.
    ///
    /// The first terminal event wins; later events are absorbed.
    #[must_use]
    pub fn on(self, event: LoginEvent) -> Self {
        match (self, event) {
            (Self::Closed(outcome), _) => Self::Closed(outcome),
            (_, LoginEvent::Interrupted) => Self::Closed(LoginOutcome::Interrupted),
            (_, LoginEvent::Failed) => Self::Closed(LoginOutcome::Failed(None)),
            (Self::AwaitingAuth, LoginEvent::Authenticated(user)) => Self::MainActive(user),
            (Self::AwaitingAuth, LoginEvent::SurfaceEnded) => Self::Closed(LoginOutcome::Abandoned),
            (Self::AwaitingAuth, _) => Self::AwaitingAuth,
            (Self::MainActive(_), LoginEvent::GuiClosed) => Self::Closed(LoginOutcome::Closed),
            (Self::MainActive(_), LoginEvent::GuiLoggedOut) => {
                Self::Closed(LoginOutcome::LoggedOut)
            }
            (Self::MainActive(_), LoginEvent::MainStageExited) => {
                Self::Closed(LoginOutcome::MainStageLost)
            }
            (Self::MainActive(user), _) => Self::MainActive(user),
        }
    }

    /// Outcome once the state is terminal.
    #[must_use]
    pub const fn outcome(&self) -> Option<LoginOutcome> {
        match self {
            Self::Closed(outcome) => Some(*outcome),
            _ => None,
        }
    }
}
