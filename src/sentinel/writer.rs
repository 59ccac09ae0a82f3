//! Atomic small-file writes for markers and the identity file.
//!
//! Content goes to a temporary file in the target's directory and is then
//! renamed over the target with `tempfile::NamedTempFile::persist()`, so a
//! concurrent reader sees either the old file, no file, or the complete new
//! content, never a partial write.

use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;

use crate::{AppError, Result};

/// Atomically replace `path` with `content`.
///
/// Creates the parent directory if it does not exist.
///
/// # Errors
///
/// Returns `AppError::SentinelIo` on directory creation, temp file write,
/// flush, or rename failure.
pub fn write_atomic(path: &Path, content: &str) -> Result<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    std::fs::create_dir_all(parent).map_err(|err| {
        AppError::SentinelIo(format!(
            "failed to create directory {}: {err}",
            parent.display()
        ))
    })?;

    let mut tmp = NamedTempFile::new_in(parent)
        .map_err(|err| AppError::SentinelIo(format!("failed to create temporary file: {err}")))?;

    tmp.write_all(content.as_bytes())
        .and_then(|()| tmp.as_file().sync_all())
        .map_err(|err| AppError::SentinelIo(format!("failed to write temporary file: {err}")))?;

    tmp.persist(path).map_err(|err| {
        AppError::SentinelIo(format!("failed to persist {}: {err}", path.display()))
    })?;

    Ok(())
}
