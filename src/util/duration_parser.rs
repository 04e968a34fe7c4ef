//! Duration parser for CLI arguments.
//!
//! Accepts a number followed by a unit: `500ms`, `30s`, `4m`, `1h`.
//! A bare number is read as seconds.

use std::time::Duration;

/// Error type for duration parsing failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DurationParseError {
    pub input: String,
    pub message: String,
}

impl std::fmt::Display for DurationParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Failed to parse duration '{}': {}",
            self.input, self.message
        )
    }
}

impl std::error::Error for DurationParseError {}

/// Parse a duration string.
///
/// | Format | Example | Description |
/// |--------|---------|-------------|
/// | Milliseconds | `500ms` | |
/// | Seconds | `30s`, `30` | Unit optional |
/// | Minutes | `4m` | |
/// | Hours | `1h` | |
///
/// # Examples
///
/// ```
/// use perfbed::util::parse_duration;
/// use std::time::Duration;
///
/// assert_eq!(parse_duration("4m").unwrap(), Duration::from_secs(240));
/// assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
/// ```
pub fn parse_duration(input: &str) -> Result<Duration, DurationParseError> {
    let input = input.trim();
    let error = |message: &str| DurationParseError {
        input: input.to_string(),
        message: message.to_string(),
    };

    let split = input
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(input.len());
    let (number_str, unit) = input.split_at(split);
    if number_str.is_empty() {
        return Err(error("expected a number, e.g. 30s, 500ms, 4m, 1h"));
    }
    let number: u64 = number_str
        .parse()
        .map_err(|_| error("number out of range"))?;

    let millis = match unit {
        "ms" => Some(number),
        "" | "s" => number.checked_mul(1_000),
        "m" => number.checked_mul(60_000),
        "h" => number.checked_mul(3_600_000),
        _ => return Err(error("unknown unit, use ms, s, m or h")),
    };
    millis
        .map(Duration::from_millis)
        .ok_or_else(|| error("number out of range"))
}
