//! Abstractions over the operating system so the sampler can be tested.
//!
//! The `FileSystem` trait lets the procfs source read from the real `/proc`
//! on Linux or from an in-memory mock. The `MetricsSource` trait is what the
//! runner consumes: three point-in-time queries for a single process.

use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::collector::procfs::CollectError;

/// Abstraction for filesystem operations.
///
/// This trait allows collectors to read from the real filesystem or from
/// a mock implementation for testing purposes.
pub trait FileSystem: Send + Sync {
    /// Reads the entire contents of a file as a string.
    fn read_to_string(&self, path: &Path) -> io::Result<String>;

    /// Checks if a path exists.
    fn exists(&self, path: &Path) -> bool;
}

/// Real filesystem implementation that delegates to `std::fs`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealFs;

impl RealFs {
    /// Creates a new `RealFs` instance.
    pub fn new() -> Self {
        Self
    }
}

impl FileSystem for RealFs {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }
}

/// CPU time a process has consumed since it started.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuTimes {
    pub user: Duration,
    pub system: Duration,
}

impl CpuTimes {
    /// User plus system time.
    pub fn total(&self) -> Duration {
        self.user + self.system
    }
}

/// Cumulative storage I/O of a process, in bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IoCounters {
    pub read_bytes: u64,
    pub write_bytes: u64,
}

/// Point-in-time resource queries for a single process.
///
/// Implementations do not cache: every call reflects the process state at
/// the moment of the call, and any call may fail if the process is exiting.
pub trait MetricsSource: Send + Sync {
    /// Returns `true` if `pid` currently names a process.
    fn exists(&self, pid: u32) -> bool;

    /// Accumulated user and system CPU time.
    fn process_times(&self, pid: u32) -> Result<CpuTimes, CollectError>;

    /// Resident set size in bytes.
    fn memory_info(&self, pid: u32) -> Result<u64, CollectError>;

    /// Cumulative bytes read from and written to storage.
    fn io_counters(&self, pid: u32) -> Result<IoCounters, CollectError>;
}

impl<S: MetricsSource + ?Sized> MetricsSource for Arc<S> {
    fn exists(&self, pid: u32) -> bool {
        (**self).exists(pid)
    }

    fn process_times(&self, pid: u32) -> Result<CpuTimes, CollectError> {
        (**self).process_times(pid)
    }

    fn memory_info(&self, pid: u32) -> Result<u64, CollectError> {
        (**self).memory_info(pid)
    }

    fn io_counters(&self, pid: u32) -> Result<IoCounters, CollectError> {
        (**self).io_counters(pid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn test_real_fs_read_to_string() {
        let fs = RealFs::new();
        // Read Cargo.toml which should exist in project root
        let cargo_toml = env::current_dir().unwrap().join("Cargo.toml");
        let content = fs.read_to_string(&cargo_toml).unwrap();
        assert!(content.contains("[package]"));
    }

    #[test]
    fn test_real_fs_exists() {
        let fs = RealFs::new();
        let cargo_toml = env::current_dir().unwrap().join("Cargo.toml");
        assert!(fs.exists(&cargo_toml));
        assert!(!fs.exists(Path::new("/nonexistent/path/12345")));
    }

    #[test]
    fn test_cpu_times_total() {
        let times = CpuTimes {
            user: Duration::from_millis(1500),
            system: Duration::from_millis(250),
        };
        assert_eq!(times.total(), Duration::from_millis(1750));
    }
}
