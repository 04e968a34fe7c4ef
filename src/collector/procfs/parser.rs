//! Parsers for the per-process `/proc` files the sampler reads.
//!
//! Only the fields behind CPU time, resident memory and storage I/O are
//! extracted. The functions are pure over file contents.

/// Error type for parsing failures.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
}

impl ParseError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            message: msg.into(),
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Parse error: {}", self.message)
    }
}

impl std::error::Error for ParseError {}

/// CPU time from `/proc/[pid]/stat`, in clock ticks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcStat {
    pub utime: u64,
    pub stime: u64,
}

/// Field positions counted from the state field, the first after `(comm)`.
const UTIME_FIELD: usize = 11;
const STIME_FIELD: usize = 12;

/// Parses `/proc/[pid]/stat` content.
///
/// comm may itself contain spaces and parentheses, so fields are counted
/// from the last `)`.
pub fn parse_proc_stat(content: &str) -> Result<ProcStat, ParseError> {
    let content = content.trim();
    let open = content
        .find('(')
        .ok_or_else(|| ParseError::new("missing '(' in stat"))?;
    let close = content
        .rfind(')')
        .filter(|&close| close > open)
        .ok_or_else(|| ParseError::new("missing ')' in stat"))?;

    content[..open]
        .trim()
        .parse::<u32>()
        .map_err(|_| ParseError::new("invalid pid"))?;

    let fields: Vec<&str> = content[close + 1..].split_whitespace().collect();
    if fields.len() <= STIME_FIELD {
        return Err(ParseError::new(format!(
            "not enough fields in stat: expected {}+, got {}",
            STIME_FIELD + 1,
            fields.len()
        )));
    }

    let ticks = |idx: usize, name: &str| -> Result<u64, ParseError> {
        fields[idx]
            .parse()
            .map_err(|_| ParseError::new(format!("invalid {}", name)))
    };

    Ok(ProcStat {
        utime: ticks(UTIME_FIELD, "utime")?,
        stime: ticks(STIME_FIELD, "stime")?,
    })
}

/// Resident memory from `/proc/[pid]/status`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcStatus {
    /// VmRSS in kB. Zero when the line is absent (zombies, kernel threads).
    pub vm_rss: u64,
}

/// Parses `/proc/[pid]/status` content.
pub fn parse_proc_status(content: &str) -> Result<ProcStatus, ParseError> {
    let mut has_pid = false;
    let mut status = ProcStatus::default();

    for (key, value) in content.lines().filter_map(|l| l.split_once(':')) {
        match key.trim() {
            "Pid" => has_pid = true,
            // "12345 kB"
            "VmRSS" => {
                status.vm_rss = value
                    .split_whitespace()
                    .next()
                    .and_then(|kb| kb.parse().ok())
                    .ok_or_else(|| ParseError::new("invalid VmRSS"))?;
            }
            _ => {}
        }
    }

    if !has_pid {
        return Err(ParseError::new("missing Pid in status"));
    }
    Ok(status)
}

/// Storage I/O from `/proc/[pid]/io`, in bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcIo {
    pub read_bytes: u64,
    pub write_bytes: u64,
}

/// Parses `/proc/[pid]/io` content.
pub fn parse_proc_io(content: &str) -> Result<ProcIo, ParseError> {
    let mut read_bytes = None;
    let mut write_bytes = None;

    for (key, value) in content.lines().filter_map(|l| l.split_once(':')) {
        let slot = match key.trim() {
            "read_bytes" => &mut read_bytes,
            "write_bytes" => &mut write_bytes,
            _ => continue,
        };
        *slot = Some(
            value
                .trim()
                .parse::<u64>()
                .map_err(|_| ParseError::new(format!("invalid {}", key.trim())))?,
        );
    }

    match (read_bytes, write_bytes) {
        (Some(read_bytes), Some(write_bytes)) => Ok(ProcIo {
            read_bytes,
            write_bytes,
        }),
        _ => Err(ParseError::new("missing read_bytes/write_bytes in io")),
    }
}
