//! Mock filesystem implementations for testing.
//!
//! This module provides `MockFs` and pre-built `/proc` states for testing the
//! procfs metrics source without requiring Linux.

mod filesystem;
mod scenarios;

pub use filesystem::MockFs;
