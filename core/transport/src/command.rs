//! Subprocess helpers shared by the external-tool transports.

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

use lagoon_common::{Error, RepoId, Result};

/// Resolve a program on `PATH`.
///
/// # Errors
/// - `Error::Preflight` if the program cannot be found
pub fn resolve(repo: &RepoId, program: &Path) -> Result<PathBuf> {
    which::which(program).map_err(|e| {
        Error::preflight(repo.as_str(), format!("{}: {}", program.display(), e))
    })
}

/// Render a command line for logging.
pub fn command_line(program: &Path, args: &[OsString]) -> String {
    std::iter::once(program.as_os_str())
        .chain(args.iter().map(OsString::as_os_str))
        .map(OsStr::to_string_lossy)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Run a program to completion.
///
/// Stdout is discarded; stderr is captured and attached to the error.
///
/// # Errors
/// - `Error::Transport` if the program cannot be spawned or exits non-zero
pub async fn run(repo: &RepoId, program: &Path, args: &[OsString]) -> Result<()> {
    let line = command_line(program, args);
    debug!(repo = %repo, command = %line, "Executing {}", program.display());

    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| Error::Transport(format!("failed to execute {}: {}", program.display(), e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::Transport(format!(
            "{} exited with {}: {}",
            program.display(),
            output.status,
            stderr.trim()
        )));
    }

    Ok(())
}
