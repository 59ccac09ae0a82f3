//! The interactive login surface.
//!
//! Widget rendering is not this crate's concern; the stage only needs a
//! source of sign-in / sign-up requests and somewhere to show notices.
//! [`TerminalSurface`] provides that over a line-oriented terminal:
//!
//! ```text
//! login <username> <password>
//! signup <username> <password> <email>
//! quit
//! ```

use std::future::Future;
use std::io::{BufRead, Write};
use std::pin::Pin;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::{AppError, Result};

/// A request submitted through the login form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginRequest {
    /// Sign in to an existing account.
    SignIn {
        /// Username field.
        username: String,
        /// Password field.
        password: String,
    },
    /// Create a new account.
    SignUp {
        /// Username field.
        username: String,
        /// Password field.
        password: String,
        /// Email field.
        email: String,
    },
}

/// Message box shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// Informational message.
    Info {
        /// Dialog title.
        title: String,
        /// Dialog body.
        message: String,
    },
    /// Error message.
    Error {
        /// Dialog title.
        title: String,
        /// Dialog body.
        message: String,
    },
}

impl Notice {
    /// Informational notice.
    #[must_use]
    pub fn info(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Info {
            title: title.into(),
            message: message.into(),
        }
    }

    /// Error notice.
    #[must_use]
    pub fn error(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error {
            title: title.into(),
            message: message.into(),
        }
    }
}

/// Front end of the login stage.
pub trait LoginSurface: Send {
    /// Wait for the next submitted request. `Ok(None)` means the surface was
    /// closed without anyone signing in.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the underlying input fails.
    fn next_request(&mut self)
        -> Pin<Box<dyn Future<Output = Result<Option<LoginRequest>>> + Send + '_>>;

    /// Show a message to the user.
    fn notify(&mut self, notice: &Notice);

    /// Withdraw the surface while the main application runs. The surface
    /// stays resident but takes no further input.
    fn hide(&mut self);
}

/// One parsed terminal line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// A form submission.
    Request(LoginRequest),
    /// Close the surface.
    Quit,
    /// Blank line.
    Empty,
    /// Anything unrecognised.
    Unknown(String),
}

/// Parse one terminal line. Missing fields are left empty so the stage can
/// report them.
#[must_use]
pub fn parse_command(line: &str) -> Command {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Command::Empty;
    };
    let mut field = || words.next().unwrap_or_default().to_owned();

    match verb {
        "login" => Command::Request(LoginRequest::SignIn {
            username: field(),
            password: field(),
        }),
        "signup" => Command::Request(LoginRequest::SignUp {
            username: field(),
            password: field(),
            email: field(),
        }),
        "quit" | "exit" => Command::Quit,
        other => Command::Unknown(other.to_owned()),
    }
}

const USAGE: &str =
    "commands: login <username> <password> | signup <username> <password> <email> | quit";

/// Boxed future yielding the next input line, `None` at end of input.
pub type LineFuture<'a> =
    Pin<Box<dyn Future<Output = std::io::Result<Option<String>>> + Send + 'a>>;

/// Source of input lines for [`TerminalSurface`].
///
/// Implementations must be cancel safe: dropping the returned future loses
/// no line and leaves nothing blocking behind.
pub trait LineSource: Send {
    /// Next line without its terminator.
    fn next_line(&mut self) -> LineFuture<'_>;
}

impl<R> LineSource for Lines<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    fn next_line(&mut self) -> LineFuture<'_> {
        Box::pin(Lines::next_line(self))
    }
}

/// Process stdin read on a dedicated OS thread.
///
/// `tokio::io::stdin` reads on the runtime's blocking pool, and a read
/// parked there keeps the runtime from shutting down until a line arrives.
/// The thread here is detached instead, so an interrupted stage can exit
/// while the terminal is idle.
#[derive(Debug)]
pub struct StdinLines {
    rx: mpsc::Receiver<std::io::Result<String>>,
}

impl StdinLines {
    /// Start the reader thread.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the thread cannot be started.
    pub fn spawn() -> Result<Self> {
        let (tx, rx) = mpsc::channel(16);
        std::thread::Builder::new()
            .name("login-stdin".into())
            .spawn(move || {
                for line in std::io::stdin().lock().lines() {
                    let failed = line.is_err();
                    if tx.blocking_send(line).is_err() || failed {
                        break;
                    }
                }
                debug!("stdin reader finished");
            })
            .map_err(|err| AppError::Io(format!("failed to start stdin reader: {err}")))?;
        Ok(Self { rx })
    }
}

impl LineSource for StdinLines {
    fn next_line(&mut self) -> LineFuture<'_> {
        Box::pin(async move { self.rx.recv().await.transpose() })
    }
}

/// Line-oriented surface over a [`LineSource`] and a blocking writer.
pub struct TerminalSurface<L, W> {
    lines: L,
    out: W,
    hidden: bool,
    greeted: bool,
}

impl<R, W> TerminalSurface<Lines<R>, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: Write + Send,
{
    /// Surface reading commands from `input` and writing to `out`.
    #[must_use]
    pub fn new(input: R, out: W) -> Self {
        Self::from_lines(input.lines(), out)
    }
}

impl<L, W> TerminalSurface<L, W>
where
    L: LineSource,
    W: Write + Send,
{
    /// Surface reading commands from an existing line source.
    #[must_use]
    pub fn from_lines(lines: L, out: W) -> Self {
        Self {
            lines,
            out,
            hidden: false,
            greeted: false,
        }
    }

    /// Whether [`LoginSurface::hide`] has been called.
    #[must_use]
    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    /// Recover the output writer.
    #[must_use]
    pub fn into_output(self) -> W {
        self.out
    }

    fn emit(&mut self, text: &str) {
        if let Err(err) = writeln!(self.out, "{text}").and_then(|()| self.out.flush()) {
            warn!(%err, "failed to write to login surface");
        }
    }

    async fn read_request(&mut self) -> Result<Option<LoginRequest>> {
        if !self.greeted {
            self.greeted = true;
            self.emit("Smart Refrigerator");
            self.emit(USAGE);
        }

        loop {
            let line = self
                .lines
                .next_line()
                .await
                .map_err(|err| AppError::Io(format!("failed to read login input: {err}")))?;
            let Some(line) = line else {
                return Ok(None);
            };

            match parse_command(&line) {
                Command::Request(request) => return Ok(Some(request)),
                Command::Quit => return Ok(None),
                Command::Empty => {}
                Command::Unknown(verb) => {
                    self.emit(&format!("unknown command `{verb}`"));
                    self.emit(USAGE);
                }
            }
        }
    }
}

impl<L, W> LoginSurface for TerminalSurface<L, W>
where
    L: LineSource,
    W: Write + Send,
{
    fn next_request(
        &mut self,
    ) -> Pin<Box<dyn Future<Output = Result<Option<LoginRequest>>> + Send + '_>> {
        Box::pin(self.read_request())
    }

    fn notify(&mut self, notice: &Notice) {
        match notice {
            Notice::Info { title, message } => self.emit(&format!("[{title}] {message}")),
            Notice::Error { title, message } => self.emit(&format!("[{title}] error: {message}")),
        }
    }

    fn hide(&mut self) {
        self.hidden = true;
        self.emit("signed in; main application running");
    }
}
