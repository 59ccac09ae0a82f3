//! [`Authenticator`] backed by an external helper executable.
//!
//! The helper is invoked as `<command> <args..> <verb> <username> [email]`
//! with the password on stdin. Verbs are `sign-in`, `sign-up`, and
//! `exists`. Exit status `0` means success (or "exists"), `2` means the user
//! is unknown, `3` means the password is wrong; anything else is a rejection
//! whose message is the helper's stderr.

use std::process::Stdio;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use super::{AuthError, AuthFuture, Authenticator};
use crate::config::CommandSpec;

const EXIT_UNKNOWN_USER: i32 = 2;
const EXIT_WRONG_PASSWORD: i32 = 3;

/// Raw result of one helper invocation.
struct HelperReply {
    code: Option<i32>,
    stderr: String,
}

impl HelperReply {
    fn rejection(&self) -> AuthError {
        if self.stderr.is_empty() {
            AuthError::Rejected(self.code.map_or_else(
                || "identity provider was terminated".to_owned(),
                |code| format!("identity provider exited with status {code}"),
            ))
        } else {
            AuthError::Rejected(self.stderr.clone())
        }
    }
}

/// Authenticator delegating to a configured helper process.
#[derive(Debug, Clone)]
pub struct CommandAuthenticator {
    spec: CommandSpec,
}

impl CommandAuthenticator {
    /// Authenticator running `spec`.
    #[must_use]
    pub fn new(spec: CommandSpec) -> Self {
        Self { spec }
    }

    async fn invoke(
        &self,
        verb: &str,
        operands: &[&str],
        password: Option<&str>,
    ) -> Result<HelperReply, AuthError> {
        let mut cmd = Command::new(&self.spec.command);
        cmd.args(&self.spec.args)
            .arg(verb)
            .args(operands)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|err| {
            AuthError::Unavailable(format!("failed to start {}: {err}", self.spec.command))
        })?;

        if let Some(mut stdin) = child.stdin.take() {
            let secret = password.unwrap_or_default();
            // A helper that exits without reading stdin yields a broken pipe;
            // its exit status is still authoritative.
            if let Err(err) = stdin.write_all(format!("{secret}\n").as_bytes()).await {
                debug!(%err, "identity helper closed stdin early");
            }
            drop(stdin);
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|err| AuthError::Unavailable(format!("identity helper failed: {err}")))?;

        debug!(verb, code = ?output.status.code(), "identity helper finished");
        Ok(HelperReply {
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
        })
    }
}

impl Authenticator for CommandAuthenticator {
    fn sign_up<'a>(
        &'a self,
        username: &'a str,
        password: &'a str,
        email: &'a str,
    ) -> AuthFuture<'a, ()> {
        Box::pin(async move {
            let reply = self
                .invoke("sign-up", &[username, email], Some(password))
                .await?;
            match reply.code {
                Some(0) => Ok(()),
                _ => Err(reply.rejection()),
            }
        })
    }

    fn sign_in<'a>(&'a self, username: &'a str, password: &'a str) -> AuthFuture<'a, ()> {
        Box::pin(async move {
            let reply = self.invoke("sign-in", &[username], Some(password)).await?;
            match reply.code {
                Some(0) => Ok(()),
                Some(EXIT_UNKNOWN_USER) => Err(AuthError::UnknownUser),
                Some(EXIT_WRONG_PASSWORD) => Err(AuthError::WrongPassword),
                _ => Err(reply.rejection()),
            }
        })
    }

    fn username_exists<'a>(&'a self, username: &'a str) -> AuthFuture<'a, bool> {
        Box::pin(async move {
            let reply = self.invoke("exists", &[username], None).await?;
            match reply.code {
                Some(0) => Ok(true),
                Some(EXIT_UNKNOWN_USER) => Ok(false),
                _ => Err(reply.rejection()),
            }
        })
    }
}
