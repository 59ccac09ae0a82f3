//! Best-effort dismissal of the on-screen keyboard helper.
//!
//! The helper may legitimately not be running, and the handoff must not
//! fail because of it, so every failure here is logged and swallowed.

use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, info};

use crate::config::KeyboardConfig;

/// Result of a dismissal attempt, for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HelperDismissal {
    /// The kill command matched and signalled the helper.
    Signalled,
    /// The kill command ran but found no helper process.
    NotRunning,
    /// The kill command could not be run or failed.
    Unavailable,
}

/// Ask the keyboard helper to exit, then give it time to disappear.
///
/// The settle delay is only applied when a helper was actually signalled.
pub async fn dismiss_keyboard(config: &KeyboardConfig) -> HelperDismissal {
    let spec = config.kill_command();
    let status = Command::new(&spec.command)
        .args(&spec.args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .status()
        .await;

    let dismissal = match status {
        Ok(status) if status.success() => HelperDismissal::Signalled,
        // pkill reports "no process matched" with status 1.
        Ok(status) if status.code() == Some(1) => HelperDismissal::NotRunning,
        Ok(status) => {
            debug!(code = ?status.code(), "keyboard helper kill command failed");
            HelperDismissal::Unavailable
        }
        Err(err) => {
            debug!(%err, command = %spec.display(), "keyboard helper kill command unavailable");
            HelperDismissal::Unavailable
        }
    };

    if dismissal == HelperDismissal::Signalled {
        info!("on-screen keyboard dismissed");
        tokio::time::sleep(Duration::from_millis(config.settle_ms)).await;
    }
    dismissal
}
