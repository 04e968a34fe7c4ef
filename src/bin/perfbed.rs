//! perfbed - Resource consumption test bed for long-running agents.
//!
//! Launches the agent, samples its CPU, memory and I/O for the duration of
//! the scenario, stops it and validates the averages against thresholds.

use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use serde::Serialize;
use tracing::{Level, error, info, warn};
use tracing_subscriber::EnvFilter;

use perfbed::config::load_thresholds;
use perfbed::runner::{ChildRunner, InfraRunner, ResourceConsumption, RunnerConfig};
use perfbed::scenario::{Phase, TestCase};
use perfbed::util::parse_duration;
use perfbed::validator::{PerfValidator, ThresholdConfig};

/// Resource consumption test bed.
#[derive(Parser, Debug)]
#[command(name = "perfbed", about = "Resource consumption test bed", version)]
struct Args {
    /// Agent executable to run.
    #[arg(long, value_name = "PATH")]
    bin: PathBuf,

    /// Agent configuration file, passed as `--config <PATH>`.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// File receiving the agent's stdout and stderr (appended to).
    #[arg(long, default_value = "agent.log")]
    log_file: PathBuf,

    /// How long the scenario runs (e.g. "240s", "4m").
    #[arg(long, default_value = "240s", value_parser = parse_duration)]
    duration: Duration,

    /// Delay before the first sample, skipping start-up load.
    #[arg(long, default_value = "20s", value_parser = parse_duration)]
    settle: Duration,

    /// Sampling interval.
    #[arg(long, default_value = "10s", value_parser = parse_duration)]
    interval: Duration,

    /// Time between SIGTERM and SIGKILL on stop.
    #[arg(long, default_value = "15s", value_parser = parse_duration)]
    grace: Duration,

    /// JSON file overriding the default thresholds.
    #[arg(long, value_name = "JSON")]
    thresholds: Option<PathBuf>,

    /// Print the result as JSON on stdout.
    #[arg(long)]
    json: bool,

    /// Never colour the report.
    #[arg(long)]
    no_color: bool,

    /// Path to /proc filesystem.
    #[arg(long, default_value = "/proc")]
    proc_path: String,

    /// Increase logging verbosity (-v for debug, -vv for trace). Default is info level.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,

    /// Extra arguments for the agent.
    #[arg(last = true)]
    agent_args: Vec<String>,
}

impl Args {
    fn runner_config(&self) -> RunnerConfig {
        let config = match &self.config {
            Some(agent_config) => RunnerConfig::for_agent(&self.bin, agent_config, &self.log_file),
            None => RunnerConfig::new(&self.bin, &self.log_file),
        };
        config
            .with_args(self.agent_args.iter().cloned())
            .with_settle_delay(self.settle)
            .with_sample_interval(self.interval)
            .with_grace_period(self.grace)
            .with_proc_path(self.proc_path.clone())
    }
}

/// Machine-readable outcome printed with `--json`.
#[derive(Serialize)]
struct Summary {
    passed: bool,
    error: Option<String>,
    started_at: Option<String>,
    exit_status: Option<String>,
    consumption: ResourceConsumption,
}

/// Initializes the tracing subscriber with the appropriate log level.
/// Default level is INFO. Use -q for quiet mode (errors only).
fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let mut filter = EnvFilter::from_default_env();
    if let Ok(directive) = format!("perfbed={}", level).parse() {
        filter = filter.add_directive(directive);
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    if args.interval.is_zero() {
        error!("--interval must be greater than zero");
        return ExitCode::from(2);
    }

    let thresholds = match &args.thresholds {
        Some(path) => match load_thresholds(path) {
            Ok(thresholds) => thresholds,
            Err(e) => {
                error!("{}", e);
                return ExitCode::from(2);
            }
        },
        None => ThresholdConfig::default(),
    };

    let color = !args.no_color && std::io::stdout().is_terminal();
    let runner = Arc::new(ChildRunner::new(args.runner_config()));
    let test_case = TestCase::new(
        Arc::clone(&runner),
        PerfValidator::new(thresholds).with_color(color),
    );

    let abort = test_case.abort_handle();
    if let Err(e) = ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        abort.abort();
    }) {
        warn!("Failed to set Ctrl-C handler: {}", e);
    }

    test_case.start_agent();
    if !test_case.failed() {
        test_case.sleep(args.duration);
    }
    let consumption = if test_case.phase() == Phase::Idle {
        runner.resource_consumption()
    } else {
        test_case.stop_agent()
    };

    let result = test_case.result();
    if args.json {
        let summary = Summary {
            passed: result.is_ok(),
            error: result.as_ref().err().map(ToString::to_string),
            started_at: runner.started_at().map(|t| t.to_rfc3339()),
            exit_status: runner.exit_status().map(|s| s.to_string()),
            consumption,
        };
        match serde_json::to_string_pretty(&summary) {
            Ok(json) => println!("{}", json),
            Err(e) => error!("Cannot encode summary: {}", e),
        }
    }

    match result {
        Ok(()) => {
            info!("Scenario passed");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Scenario failed: {}", e);
            ExitCode::from(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_runner_defaults() {
        let args = Args::try_parse_from(["perfbed", "--bin", "/usr/bin/agent"]).unwrap();
        let config = args.runner_config();

        assert_eq!(args.duration, Duration::from_secs(240));
        assert_eq!(config.settle_delay, Duration::from_secs(20));
        assert_eq!(config.sample_interval, Duration::from_secs(10));
        assert_eq!(config.grace_period, Duration::from_secs(15));
        assert!(config.args.is_empty());
    }

    #[test]
    fn test_agent_config_and_extra_args() {
        let args = Args::try_parse_from([
            "perfbed",
            "--bin",
            "/usr/bin/agent",
            "--config",
            "/etc/agent.yml",
            "--interval",
            "500ms",
            "--",
            "--verbose",
            "3",
        ])
        .unwrap();
        let config = args.runner_config();

        assert_eq!(
            config.args,
            vec!["--config", "/etc/agent.yml", "--verbose", "3"]
        );
        assert_eq!(config.sample_interval, Duration::from_millis(500));
    }

    #[test]
    fn test_invalid_duration_rejected() {
        assert!(Args::try_parse_from(["perfbed", "--bin", "x", "--duration", "4days"]).is_err());
    }
}
