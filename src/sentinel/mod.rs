//! Filesystem-backed sentinel markers used in place of message passing.
//!
//! Each [`Marker`] is a file in the runtime directory. A producer creates it
//! with [`SentinelChannel::signal`]; the single consumer takes it with
//! [`SentinelChannel::consume`], which claims the file by renaming it to a
//! unique name before reading and deleting it. Only one rename of the same
//! source can succeed, so two observers can never both act on one signal.
//!
//! There is no in-process buffering: latency is bounded below by the poll
//! interval the caller chooses.

pub mod identity;
pub mod writer;

use std::fmt::{Display, Formatter};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{AppError, Result};

/// The fixed set of protocol markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Marker {
    /// MainStage closed normally. Written by MainStage, read by LoginStage.
    GuiClosed,
    /// The user logged out. Written by MainStage, read by LoginStage.
    GuiLoggedOut,
    /// LoginStage ended after a normal close. Read by the supervisor.
    InitialGuiClosed,
    /// Hardware event; the payload names the event. Read by the supervisor.
    ManagementSignal,
}

impl Marker {
    /// Every marker in the protocol.
    pub const ALL: [Self; 4] = [
        Self::GuiClosed,
        Self::GuiLoggedOut,
        Self::InitialGuiClosed,
        Self::ManagementSignal,
    ];

    /// Protocol name of the marker.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::GuiClosed => "gui_closed",
            Self::GuiLoggedOut => "gui_logged_out",
            Self::InitialGuiClosed => "initial_gui_closed",
            Self::ManagementSignal => "management_signal",
        }
    }

    /// File name of the marker inside the runtime directory.
    ///
    /// MainStage writes its two exit markers with an upper-case `GUI` prefix.
    #[must_use]
    pub const fn file_name(self) -> &'static str {
        match self {
            Self::GuiClosed => "GUI_closed.txt",
            Self::GuiLoggedOut => "GUI_logged_out.txt",
            Self::InitialGuiClosed => "initial_gui_closed.txt",
            Self::ManagementSignal => "management_signal.txt",
        }
    }
}

impl Display for Marker {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Handle on the sentinel namespace rooted at one directory.
///
/// Cheap to clone; every observer task gets its own copy.
#[derive(Debug, Clone)]
pub struct SentinelChannel {
    dir: PathBuf,
}

impl SentinelChannel {
    /// Channel over markers stored in `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Runtime directory backing the channel.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Absolute path of a marker file.
    #[must_use]
    pub fn path(&self, marker: Marker) -> PathBuf {
        self.dir.join(marker.file_name())
    }

    /// Create or overwrite `marker`, optionally carrying `payload`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::SentinelIo` if the marker cannot be written. The
    /// caller must treat this as a failed handoff.
    pub fn signal(&self, marker: Marker, payload: Option<&str>) -> Result<()> {
        writer::write_atomic(&self.path(marker), payload.unwrap_or_default())?;
        debug!(%marker, "marker signalled");
        Ok(())
    }

    /// Non-blocking existence check.
    ///
    /// Returns the payload (empty when the marker carries none) without
    /// removing the marker.
    ///
    /// # Errors
    ///
    /// Returns `AppError::SentinelIo` on any read failure other than absence.
    pub fn poll(&self, marker: Marker) -> Result<Option<String>> {
        match std::fs::read_to_string(self.path(marker)) {
            Ok(payload) => Ok(Some(payload)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(AppError::SentinelIo(format!(
                "failed to read {marker}: {err}"
            ))),
        }
    }

    /// Atomically take `marker`, returning its payload if it was present.
    ///
    /// The marker is renamed to a unique claim file first, so at most one
    /// caller receives any given signal.
    ///
    /// # Errors
    ///
    /// Returns `AppError::SentinelIo` if the claim, read, or delete fails.
    pub fn consume(&self, marker: Marker) -> Result<Option<String>> {
        let claim = self
            .dir
            .join(format!(".{}.{}.claim", marker.name(), uuid::Uuid::new_v4()));

        match std::fs::rename(self.path(marker), &claim) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(AppError::SentinelIo(format!(
                    "failed to claim {marker}: {err}"
                )))
            }
        }

        let read = std::fs::read_to_string(&claim);
        let removed = std::fs::remove_file(&claim);

        let payload = read.map_err(|err| {
            AppError::SentinelIo(format!("failed to read claimed {marker}: {err}"))
        })?;
        removed.map_err(|err| {
            AppError::SentinelIo(format!("failed to delete claimed {marker}: {err}"))
        })?;

        debug!(%marker, "marker consumed");
        Ok(Some(payload))
    }

    /// Delete `marker` if present. Returns whether a marker was removed.
    ///
    /// # Errors
    ///
    /// Returns `AppError::SentinelIo` on any failure other than absence.
    pub fn clear(&self, marker: Marker) -> Result<bool> {
        Ok(self.consume(marker)?.is_some())
    }

    /// Poll every `interval` until `marker` is consumed or `cancel` fires.
    ///
    /// Returns `Ok(None)` on cancellation.
    ///
    /// # Errors
    ///
    /// Returns `AppError::SentinelIo` if a consume attempt fails.
    pub async fn wait(
        &self,
        marker: Marker,
        interval: Duration,
        cancel: &CancellationToken,
    ) -> Result<Option<String>> {
        loop {
            if cancel.is_cancelled() {
                return Ok(None);
            }
            if let Some(payload) = self.consume(marker)? {
                return Ok(Some(payload));
            }
            tokio::select! {
                () = cancel.cancelled() => return Ok(None),
                () = tokio::time::sleep(interval) => {}
            }
        }
    }
}
