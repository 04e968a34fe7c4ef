//! Metrics source backed by the Linux `/proc` filesystem.

pub mod parser;
pub mod process;

pub use process::{CollectError, ProcfsSource};
