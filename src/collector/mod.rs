//! Process metrics collection.
//!
//! The runner samples the supervised process through the [`MetricsSource`]
//! trait. On Linux the production implementation reads `/proc/[pid]/`:
//!
//! ```text
//!   ChildRunner ──► MetricsSource (trait)
//!                        │
//!                  ProcfsSource<F>
//!                   - /proc/[pid]/stat    utime, stime
//!                   - /proc/[pid]/status  VmRSS
//!                   - /proc/[pid]/io      read_bytes, write_bytes
//!                        │
//!                  FileSystem (trait)
//!                   ├── RealFs
//!                   └── MockFs (tests)
//! ```
//!
//! # Usage
//!
//! ```
//! use perfbed::collector::{MetricsSource, MockFs, ProcfsSource};
//!
//! let fs = MockFs::running_process(42, 150, 50, 2048, 0, 0);
//! let source = ProcfsSource::new(fs, "/proc");
//! assert_eq!(source.memory_info(42).unwrap(), 2048 * 1024);
//! ```

pub mod mock;
pub mod procfs;
pub mod traits;

pub use mock::MockFs;
pub use procfs::{CollectError, ProcfsSource};
pub use traits::{CpuTimes, FileSystem, IoCounters, MetricsSource, RealFs};
