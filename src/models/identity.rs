//! Authenticated user identity shared across process boundaries.

use std::fmt::{Display, Formatter};

use crate::{AppError, Result};

/// Name of the single active authenticated user on the device.
///
/// Stored trimmed; never empty and never multi-line, since sibling processes
/// read it back as the whole content of the identity file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity(String);

impl Identity {
    /// Validate and wrap a username.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the name is blank or contains a line break.
    pub fn new(username: impl AsRef<str>) -> Result<Self> {
        let trimmed = username.as_ref().trim();
        if trimmed.is_empty() {
            return Err(AppError::Config("identity must not be empty".into()));
        }
        if trimmed.contains(['\n', '\r']) {
            return Err(AppError::Config(
                "identity must be a single line".into(),
            ));
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Borrow the username.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Identity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
