//! Threshold validation and reporting of a run's resource consumption.

use crossterm::style::{Stylize, style};
use serde::{Deserialize, Serialize};

use crate::fmt::{format_bytes, format_bytes_si};
use crate::runner::ResourceConsumption;

/// Accepted, warning and critical levels for average CPU and memory.
///
/// Only the critical levels decide pass or fail; the others pick the band a
/// value is reported in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ThresholdConfig {
    /// Average CPU, in percent of one core.
    pub accepted_cpu: f64,
    pub warning_cpu: f64,
    pub critical_cpu: f64,
    /// Average resident memory, in bytes.
    pub accepted_mem: u64,
    pub warning_mem: u64,
    pub critical_mem: u64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            accepted_cpu: 2.0,
            warning_cpu: 3.0,
            critical_cpu: 5.0,
            accepted_mem: 50_000_000,
            warning_mem: 500_000_000,
            critical_mem: 700_000_000,
        }
    }
}

impl ThresholdConfig {
    /// `true` if each metric's levels satisfy accepted <= warning <= critical.
    pub fn is_ordered(&self) -> bool {
        self.accepted_cpu <= self.warning_cpu
            && self.warning_cpu <= self.critical_cpu
            && self.accepted_mem <= self.warning_mem
            && self.warning_mem <= self.critical_mem
    }

    pub fn cpu_band(&self, percent: f64) -> Band {
        Band::classify(
            percent,
            self.accepted_cpu,
            self.warning_cpu,
            self.critical_cpu,
        )
    }

    pub fn memory_band(&self, bytes: u64) -> Band {
        Band::classify(
            bytes as f64,
            self.accepted_mem as f64,
            self.warning_mem as f64,
            self.critical_mem as f64,
        )
    }
}

/// Where a value falls relative to the thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Band {
    /// Below the accepted level.
    Accepted,
    /// At or above accepted, below warning.
    Elevated,
    /// At or above warning, below critical.
    Warning,
    /// At or above critical.
    Critical,
}

impl Band {
    fn classify(value: f64, accepted: f64, warning: f64, critical: f64) -> Self {
        if value >= critical {
            Band::Critical
        } else if value >= warning {
            Band::Warning
        } else if value >= accepted {
            Band::Elevated
        } else {
            Band::Accepted
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Band::Accepted => "accepted",
            Band::Elevated => "elevated",
            Band::Warning => "warning",
            Band::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    Cpu,
    Memory,
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Metric::Cpu => write!(f, "CPU"),
            Metric::Memory => write!(f, "Memory"),
        }
    }
}

/// Reason a run failed validation.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// The average was never measured.
    NoData(Metric),
    CriticalThresholdExceeded {
        metric: Metric,
        value: f64,
        threshold: f64,
    },
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::NoData(Metric::Cpu) => write!(f, "No average CPU recorded"),
            ValidationError::NoData(Metric::Memory) => {
                write!(f, "No average Memory RAM recorded")
            }
            ValidationError::CriticalThresholdExceeded {
                metric: Metric::Cpu,
                value,
                threshold,
            } => write!(
                f,
                "Average CPU surpassed critical threshold: {:.1}% >= {:.1}%",
                value, threshold
            ),
            ValidationError::CriticalThresholdExceeded {
                metric: Metric::Memory,
                value,
                threshold,
            } => write!(
                f,
                "Average Memory surpassed critical threshold: {:.0} B >= {:.0} B",
                value, threshold
            ),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Judges a [`ResourceConsumption`] and renders it for humans.
pub trait ResourceValidator: Send + Sync {
    fn validate(&self, consumption: &ResourceConsumption) -> Result<(), ValidationError>;

    fn report(&self, consumption: &ResourceConsumption) -> String;
}

/// Validates average CPU and memory against a [`ThresholdConfig`].
#[derive(Debug, Clone, Default)]
pub struct PerfValidator {
    thresholds: ThresholdConfig,
    color: bool,
}

impl PerfValidator {
    pub fn new(thresholds: ThresholdConfig) -> Self {
        Self {
            thresholds,
            color: false,
        }
    }

    /// Enables ANSI colouring of values by band in [`report`](ResourceValidator::report).
    pub fn with_color(mut self, color: bool) -> Self {
        self.color = color;
        self
    }

    pub fn thresholds(&self) -> &ThresholdConfig {
        &self.thresholds
    }

    fn paint(&self, text: String, band: Band) -> String {
        if !self.color {
            return text;
        }
        match band {
            Band::Accepted => style(text).green().bold().to_string(),
            Band::Elevated => style(text).cyan().bold().to_string(),
            Band::Warning => style(text).yellow().bold().to_string(),
            Band::Critical => style(text).red().bold().to_string(),
        }
    }

    fn cpu_line(&self, label: &str, percent: f64) -> String {
        let band = self.thresholds.cpu_band(percent);
        format!(
            "{}: {} ({})\n",
            label,
            self.paint(format!("{:4.1}%", percent), band),
            band.label()
        )
    }

    fn mem_line(&self, label: &str, bytes: u64) -> String {
        let band = self.thresholds.memory_band(bytes);
        format!(
            "{}: {} ({}, {})\n",
            label,
            self.paint(format!("{:4} B", bytes), band),
            format_bytes(bytes),
            band.label()
        )
    }
}

impl ResourceValidator for PerfValidator {
    fn validate(&self, c: &ResourceConsumption) -> Result<(), ValidationError> {
        let t = &self.thresholds;

        if c.cpu_percent_avg <= 0.0 {
            return Err(ValidationError::NoData(Metric::Cpu));
        }
        if c.cpu_percent_avg >= t.critical_cpu {
            return Err(ValidationError::CriticalThresholdExceeded {
                metric: Metric::Cpu,
                value: c.cpu_percent_avg,
                threshold: t.critical_cpu,
            });
        }

        if c.ram_avg == 0 {
            return Err(ValidationError::NoData(Metric::Memory));
        }
        if c.ram_avg >= t.critical_mem {
            return Err(ValidationError::CriticalThresholdExceeded {
                metric: Metric::Memory,
                value: c.ram_avg as f64,
                threshold: t.critical_mem as f64,
            });
        }

        Ok(())
    }

    fn report(&self, c: &ResourceConsumption) -> String {
        let t = &self.thresholds;
        let mut output = String::from("\n======= CPU\n");
        output += &self.cpu_line("Max CPU", c.cpu_percent_max);
        output += &self.cpu_line("Avg CPU", c.cpu_percent_avg);
        output += &format!(
            "Thresholds: {:.1}% / {:.1}% / {:.1}%\n",
            t.accepted_cpu, t.warning_cpu, t.critical_cpu
        );

        output += "======== MEM\n";
        output += &self.mem_line("Max RAM", c.ram_max);
        output += &self.mem_line("Avg RAM", c.ram_avg);
        output += &format!(
            "Thresholds: {} / {} / {}\n",
            format_bytes_si(t.accepted_mem as f64),
            format_bytes_si(t.warning_mem as f64),
            format_bytes_si(t.critical_mem as f64)
        );

        output += "======== IO\n";
        output += &format!(
            "Total Read: {:4} B ({})\n",
            c.read_io_total,
            format_bytes(c.read_io_total)
        );
        output += &format!(
            "Total Writes: {:4} B ({})\n",
            c.write_io_total,
            format_bytes(c.write_io_total)
        );
        output += &format!("Samples: {}", c.samples);
        output
    }
}
