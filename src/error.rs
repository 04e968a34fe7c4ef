//! Errors raised by the process runner.

use std::path::PathBuf;

/// Error type for runner lifecycle failures.
///
/// Per-tick metric failures are not represented here: they are logged by the
/// sampler and never leave it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunnerError {
    /// The executable could not be spawned or the output sink opened.
    Launch { path: PathBuf, reason: String },
    /// The launched pid could not be resolved to a live process.
    ProcessLookup { pid: u32, reason: String },
    /// `stop` or `watch` without a running process.
    NotRunning,
    /// `start` on a runner that has already been started.
    AlreadyStarted,
    /// A second concurrent `watch` on the same runner.
    AlreadyWatching,
    /// Collecting the exit status of the process failed.
    Wait(String),
}

impl std::fmt::Display for RunnerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunnerError::Launch { path, reason } => {
                write!(f, "cannot launch {}: {}", path.display(), reason)
            }
            RunnerError::ProcessLookup { pid, reason } => {
                write!(f, "cannot resolve process {}: {}", pid, reason)
            }
            RunnerError::NotRunning => write!(f, "no agent running"),
            RunnerError::AlreadyStarted => write!(f, "agent already started"),
            RunnerError::AlreadyWatching => {
                write!(f, "resource consumption is already being watched")
            }
            RunnerError::Wait(reason) => write!(f, "cannot wait for agent exit: {}", reason),
        }
    }
}

impl std::error::Error for RunnerError {}
