//! Delivering termination requests to the supervised process.

use std::io;
use std::sync::Arc;

use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;

/// Kind of termination request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TermSignal {
    /// Ask the process to shut down (SIGTERM).
    Graceful,
    /// Kill the process outright (SIGKILL).
    Forced,
}

impl TermSignal {
    fn as_signal(self) -> Signal {
        match self {
            TermSignal::Graceful => Signal::SIGTERM,
            TermSignal::Forced => Signal::SIGKILL,
        }
    }
}

impl std::fmt::Display for TermSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_signal().as_str())
    }
}

/// Sends termination requests to a process.
pub trait Terminator: Send + Sync {
    fn signal(&self, pid: u32, signal: TermSignal) -> io::Result<()>;
}

impl<T: Terminator + ?Sized> Terminator for Arc<T> {
    fn signal(&self, pid: u32, signal: TermSignal) -> io::Result<()> {
        (**self).signal(pid, signal)
    }
}

/// Delivers Unix signals with `kill(2)`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SignalTerminator;

impl Terminator for SignalTerminator {
    fn signal(&self, pid: u32, signal: TermSignal) -> io::Result<()> {
        let pid = i32::try_from(pid)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;
        kill(Pid::from_raw(pid), signal.as_signal())?;
        Ok(())
    }
}
