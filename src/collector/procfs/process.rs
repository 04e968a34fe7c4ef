//! Per-process metrics read from `/proc/[pid]/`.

use crate::collector::procfs::parser::{parse_proc_io, parse_proc_stat, parse_proc_status};
use crate::collector::traits::{CpuTimes, FileSystem, IoCounters, MetricsSource};
use std::path::Path;
use std::time::Duration;

/// Clock ticks per second (USER_HZ). Standard value for Linux.
const CLK_TCK: u64 = 100;

/// Error type for a failed metric query.
#[derive(Debug)]
pub enum CollectError {
    /// Process disappeared during collection.
    ProcessGone(u32),
    /// I/O error reading process files.
    Io(std::io::Error),
    /// Parse error in process files.
    Parse(String),
}

impl std::fmt::Display for CollectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CollectError::ProcessGone(pid) => write!(f, "process {} disappeared", pid),
            CollectError::Io(e) => write!(f, "I/O error: {}", e),
            CollectError::Parse(msg) => write!(f, "parse error: {}", msg),
        }
    }
}

impl std::error::Error for CollectError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CollectError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for CollectError {
    fn from(e: std::io::Error) -> Self {
        CollectError::Io(e)
    }
}

/// Reads CPU, memory and I/O for a single process from `/proc/[pid]/`.
pub struct ProcfsSource<F: FileSystem> {
    fs: F,
    proc_path: String,
}

impl<F: FileSystem> ProcfsSource<F> {
    /// Creates a new procfs source.
    ///
    /// # Arguments
    /// * `fs` - Filesystem implementation (real or mock)
    /// * `proc_path` - Base path to proc filesystem (usually "/proc")
    pub fn new(fs: F, proc_path: impl Into<String>) -> Self {
        Self {
            fs,
            proc_path: proc_path.into(),
        }
    }

    fn read(&self, pid: u32, file: &str) -> Result<String, CollectError> {
        let path = format!("{}/{}/{}", self.proc_path, pid, file);
        self.fs.read_to_string(Path::new(&path)).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CollectError::ProcessGone(pid)
            } else {
                CollectError::Io(e)
            }
        })
    }
}

fn ticks_to_duration(ticks: u64) -> Duration {
    Duration::from_secs(ticks / CLK_TCK)
        + Duration::from_nanos((ticks % CLK_TCK) * (1_000_000_000 / CLK_TCK))
}

impl<F: FileSystem> MetricsSource for ProcfsSource<F> {
    fn exists(&self, pid: u32) -> bool {
        let stat_path = format!("{}/{}/stat", self.proc_path, pid);
        self.fs.exists(Path::new(&stat_path))
    }

    fn process_times(&self, pid: u32) -> Result<CpuTimes, CollectError> {
        let content = self.read(pid, "stat")?;
        let stat = parse_proc_stat(&content).map_err(|e| CollectError::Parse(e.message))?;
        Ok(CpuTimes {
            user: ticks_to_duration(stat.utime),
            system: ticks_to_duration(stat.stime),
        })
    }

    fn memory_info(&self, pid: u32) -> Result<u64, CollectError> {
        let content = self.read(pid, "status")?;
        let status = parse_proc_status(&content).map_err(|e| CollectError::Parse(e.message))?;
        Ok(status.vm_rss * 1024)
    }

    fn io_counters(&self, pid: u32) -> Result<IoCounters, CollectError> {
        let content = self.read(pid, "io")?;
        let io = parse_proc_io(&content).map_err(|e| CollectError::Parse(e.message))?;
        Ok(IoCounters {
            read_bytes: io.read_bytes,
            write_bytes: io.write_bytes,
        })
    }
}
