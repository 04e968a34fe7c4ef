//! perfbed - Resource consumption test bed library.
//!
//! Runs a long-lived process under supervision, samples its CPU, memory
//! and I/O from `/proc`, and validates the summary against thresholds:
//! - `runner` - process lifecycle and sampling
//! - `validator` - thresholds and reports
//! - `scenario` - start, watch, wait, stop, validate

pub mod collector;
pub mod config;
pub mod error;
pub mod fmt;
pub mod runner;
pub mod scenario;
pub mod sync;
pub mod terminate;
pub mod util;
pub mod validator;
