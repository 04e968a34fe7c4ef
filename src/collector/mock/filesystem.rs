//! In-memory mock filesystem for testing the procfs source without real `/proc`.

use crate::collector::traits::FileSystem;
use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};

/// In-memory filesystem for testing.
///
/// Stores files and directories in memory, allowing tests to simulate
/// various `/proc` states (live, zombie, vanished) deterministically.
#[derive(Debug, Clone, Default)]
pub struct MockFs {
    /// Map from path to file contents.
    files: HashMap<PathBuf, String>,
    /// Set of known directories.
    directories: HashSet<PathBuf>,
}

impl MockFs {
    /// Creates a new empty mock filesystem.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a file with the given content.
    ///
    /// Parent directories are automatically created.
    pub fn add_file(&mut self, path: impl AsRef<Path>, content: impl Into<String>) {
        let path = path.as_ref().to_path_buf();
        self.add_parents(&path);
        self.files.insert(path, content.into());
    }

    /// Adds an empty directory.
    pub fn add_dir(&mut self, path: impl AsRef<Path>) {
        let path = path.as_ref().to_path_buf();
        self.add_parents(&path);
        self.directories.insert(path);
    }

    /// Adds a process with the `/proc/[pid]/` files the sampler reads.
    ///
    /// `io` may be empty to simulate a process whose I/O accounting is not
    /// readable.
    pub fn add_process(&mut self, pid: u32, stat: &str, status: &str, io: &str) {
        let base = PathBuf::from(format!("/proc/{}", pid));
        self.add_dir(&base);
        self.add_file(base.join("stat"), stat);
        self.add_file(base.join("status"), status);
        if !io.is_empty() {
            self.add_file(base.join("io"), io);
        }
    }

    /// Removes every file and directory under `/proc/[pid]`.
    pub fn remove_process(&mut self, pid: u32) {
        let base = PathBuf::from(format!("/proc/{}", pid));
        self.files.retain(|path, _| !path.starts_with(&base));
        self.directories.retain(|path| !path.starts_with(&base));
    }

    fn add_parents(&mut self, path: &Path) {
        let mut parent = path.parent();
        while let Some(p) = parent {
            if !p.as_os_str().is_empty() {
                self.directories.insert(p.to_path_buf());
            }
            parent = p.parent();
        }
    }
}

impl FileSystem for MockFs {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        self.files.get(path).cloned().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("file not found: {:?}", path),
            )
        })
    }

    fn exists(&self, path: &Path) -> bool {
        self.files.contains_key(path) || self.directories.contains(path)
    }
}
