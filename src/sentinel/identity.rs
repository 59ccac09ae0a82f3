//! Persisted identity file (`current_user.txt`).
//!
//! Written by the login stage before MainStage is spawned and read by
//! MainStage and the classification job launcher. A new login overwrites
//! the previous identity; logout leaves the file in place.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::models::identity::Identity;
use crate::sentinel::writer::write_atomic;
use crate::{AppError, Result};

/// File name of the identity marker inside the runtime directory.
pub const IDENTITY_FILE: &str = "current_user.txt";

/// Reader/writer for the device-wide active identity.
#[derive(Debug, Clone)]
pub struct IdentityStore {
    path: PathBuf,
}

impl IdentityStore {
    /// Store rooted at the runtime directory `dir`.
    #[must_use]
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(IDENTITY_FILE),
        }
    }

    /// Path of the identity file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persist `identity`, replacing whoever was signed in before.
    ///
    /// # Errors
    ///
    /// Returns `AppError::SentinelIo` if the file cannot be written.
    pub fn write(&self, identity: &Identity) -> Result<()> {
        write_atomic(&self.path, identity.as_str())?;
        info!(user = %identity, "active identity persisted");
        Ok(())
    }

    /// Read the active identity, if any.
    ///
    /// # Errors
    ///
    /// Returns `AppError::SentinelIo` if the file exists but cannot be read.
    pub fn read(&self) -> Result<Option<Identity>> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) if raw.trim().is_empty() => Ok(None),
            Ok(raw) => Identity::new(raw).map(Some),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(AppError::SentinelIo(format!(
                "failed to read identity file: {err}"
            ))),
        }
    }
}
