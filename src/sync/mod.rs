//! External sync command invocation.
//!
//! The store is mirrored to a remote by an external CLI; the flush cycle
//! shells out to it before and after applying pending items. The command is
//! opaque: possibly slow, possibly failing, no structured result beyond
//! success/failure and captured text.

use crate::error::{Result, SpoolError};
use std::path::Path;
use std::process::Command;
use tracing::debug;

/// Result of one sync command invocation.
#[derive(Debug, Clone)]
pub struct SyncOutcome {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl SyncOutcome {
    /// A short description of why the sync failed, for history entries.
    #[must_use]
    pub fn failure_text(&self) -> String {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            "sync command exited with failure".to_string()
        } else {
            stderr.to_string()
        }
    }
}

/// Run `<command> sync` with the project root as working directory.
///
/// A non-zero exit is reported through [`SyncOutcome::success`], not as an
/// error; `Err` means the command could not be spawned at all.
///
/// # Errors
///
/// Returns [`SpoolError::Sync`] if the executable cannot be spawned.
pub fn run_sync(command: &str, project: &Path) -> Result<SyncOutcome> {
    debug!(command, project = %project.display(), "invoking sync command");

    let output = Command::new(command)
        .arg("sync")
        .current_dir(project)
        .output()
        .map_err(|e| SpoolError::Sync {
            message: format!("failed to spawn '{command} sync': {e}"),
        })?;

    Ok(SyncOutcome {
        success: output.status.success(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}
