//! Utility modules.

pub mod duration_parser;

pub use duration_parser::{DurationParseError, parse_duration};
