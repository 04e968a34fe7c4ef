//! Supervised child process with resource accounting.
//!
//! A [`ChildRunner`] launches one executable, samples it on a fixed cadence
//! while [`InfraRunner::watch_resource_consumption`] runs on a background
//! thread, and terminates it on [`InfraRunner::stop`]: SIGTERM first, SIGKILL
//! once the grace period runs out.
//!
//! ```text
//! NotStarted ──start──► Running ──stop──► StoppingGraceful ──grace expired──► StoppingForced
//!                                               │                                  │
//!                                               └──────────── reaped ──────────────┴──► Stopped
//! ```

mod sampler;

use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU32, Ordering};
use std::sync::{Mutex, OnceLock, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::collector::{MetricsSource, ProcfsSource, RealFs};
use crate::error::RunnerError;
use crate::sync::{Latch, OpenOnDrop};
use crate::terminate::{SignalTerminator, TermSignal, Terminator};

pub use sampler::{LiveUsage, SamplerState, cpu_percent};
use sampler::Sampler;

/// Delay before the first sample, so start-up load is not counted.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(20);
/// Time between two samples.
pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_secs(10);
/// Time allowed between SIGTERM and SIGKILL.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(15);

/// Summary of the resources a process consumed over one run.
///
/// Averages are zero when nothing was sampled; `samples` tells the two cases
/// apart.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceConsumption {
    pub cpu_percent_avg: f64,
    pub cpu_percent_max: f64,
    /// Average resident memory in bytes.
    pub ram_avg: u64,
    pub ram_max: u64,
    /// Cumulative storage I/O in bytes.
    pub read_io_total: u64,
    pub write_io_total: u64,
    /// Number of memory samples behind `ram_avg`.
    pub samples: u64,
}

/// Lifecycle state of a [`ChildRunner`].
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerState {
    NotStarted = 0,
    Running = 1,
    StoppingGraceful = 2,
    StoppingForced = 3,
    Stopped = 4,
}

impl RunnerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => RunnerState::NotStarted,
            1 => RunnerState::Running,
            2 => RunnerState::StoppingGraceful,
            3 => RunnerState::StoppingForced,
            _ => RunnerState::Stopped,
        }
    }
}

/// What to run and how to pace sampling and termination.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub bin_path: PathBuf,
    pub args: Vec<String>,
    /// Added to the inherited environment.
    pub envs: Vec<(String, String)>,
    /// Receives the child's stdout and stderr. Created if missing, appended to.
    pub log_path: PathBuf,
    pub settle_delay: Duration,
    pub sample_interval: Duration,
    pub grace_period: Duration,
    pub proc_path: String,
}

impl RunnerConfig {
    pub fn new(bin_path: impl Into<PathBuf>, log_path: impl Into<PathBuf>) -> Self {
        Self {
            bin_path: bin_path.into(),
            args: Vec::new(),
            envs: Vec::new(),
            log_path: log_path.into(),
            settle_delay: DEFAULT_SETTLE_DELAY,
            sample_interval: DEFAULT_SAMPLE_INTERVAL,
            grace_period: DEFAULT_GRACE_PERIOD,
            proc_path: "/proc".to_string(),
        }
    }

    /// An agent started as `<bin> --config <config>`.
    pub fn for_agent(
        bin_path: impl Into<PathBuf>,
        config_path: impl AsRef<Path>,
        log_path: impl Into<PathBuf>,
    ) -> Self {
        Self::new(bin_path, log_path).with_args([
            "--config".to_string(),
            config_path.as_ref().display().to_string(),
        ])
    }

    /// Appends arguments to the command line.
    pub fn with_args<I, A>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub fn with_sample_interval(mut self, interval: Duration) -> Self {
        self.sample_interval = interval;
        self
    }

    pub fn with_grace_period(mut self, grace: Duration) -> Self {
        self.grace_period = grace;
        self
    }

    pub fn with_proc_path(mut self, proc_path: impl Into<String>) -> Self {
        self.proc_path = proc_path.into();
        self
    }
}

/// A process under test whose resource consumption can be watched.
pub trait InfraRunner: Send + Sync {
    /// Launches the process.
    fn start(&self) -> Result<(), RunnerError>;

    /// Terminates the process and waits until it has been reaped.
    fn stop(&self) -> Result<(), RunnerError>;

    /// Samples the process until `stop` is requested. Blocks the caller.
    fn watch_resource_consumption(&self) -> Result<(), RunnerError>;

    /// Summary of everything sampled so far.
    fn resource_consumption(&self) -> ResourceConsumption;
}

/// Runs the process under test as a child of the current process.
pub struct ChildRunner<S: MetricsSource = ProcfsSource<RealFs>, T: Terminator = SignalTerminator> {
    config: RunnerConfig,
    source: S,
    terminator: T,
    state: AtomicU8,
    child: Mutex<Option<Child>>,
    pid: AtomicU32,
    started: OnceLock<(Instant, DateTime<Utc>)>,
    usage: SamplerState,
    /// Opened when stop begins; ends the sampling loop.
    done: Latch,
    watching: AtomicBool,
    /// Opened when the sampling loop has returned.
    watch_finished: Latch,
    stop_outcome: OnceLock<Result<(), RunnerError>>,
    exit_status: OnceLock<ExitStatus>,
}

impl ChildRunner {
    /// A runner sampling through the real `/proc` and signalling with `kill(2)`.
    pub fn new(config: RunnerConfig) -> Self {
        let source = ProcfsSource::new(RealFs::new(), config.proc_path.clone());
        Self::with_parts(config, source, SignalTerminator)
    }
}

impl<S: MetricsSource, T: Terminator> ChildRunner<S, T> {
    pub fn with_parts(config: RunnerConfig, source: S, terminator: T) -> Self {
        Self {
            config,
            source,
            terminator,
            state: AtomicU8::new(RunnerState::NotStarted as u8),
            child: Mutex::new(None),
            pid: AtomicU32::new(0),
            started: OnceLock::new(),
            usage: SamplerState::new(),
            done: Latch::new(),
            watching: AtomicBool::new(false),
            watch_finished: Latch::new(),
            stop_outcome: OnceLock::new(),
            exit_status: OnceLock::new(),
        }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    pub fn state(&self) -> RunnerState {
        RunnerState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn set_state(&self, state: RunnerState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    pub fn pid(&self) -> Option<u32> {
        match self.pid.load(Ordering::SeqCst) {
            0 => None,
            pid => Some(pid),
        }
    }

    /// Wall-clock time the process was launched.
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started.get().map(|(_, at)| *at)
    }

    /// Exit status, once the process has been reaped.
    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.exit_status.get().copied()
    }

    /// Most recent instantaneous values; all zero before the first sample
    /// and after stop.
    pub fn live_usage(&self) -> LiveUsage {
        self.usage.live()
    }

    fn open_log(&self) -> io::Result<File> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.config.log_path)
    }

    fn launch(&self) -> Result<Child, RunnerError> {
        let launch_error = |reason: String| RunnerError::Launch {
            path: self.config.bin_path.clone(),
            reason,
        };

        let stdout = self.open_log().map_err(|e| {
            launch_error(format!(
                "cannot open {}: {}",
                self.config.log_path.display(),
                e
            ))
        })?;
        let stderr = stdout
            .try_clone()
            .map_err(|e| launch_error(format!("cannot share log file: {}", e)))?;

        Command::new(&self.config.bin_path)
            .args(&self.config.args)
            .envs(self.config.envs.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            // Keep terminal signals (Ctrl-C) away from the child; we stop it ourselves.
            .process_group(0)
            .spawn()
            .map_err(|e| launch_error(e.to_string()))
    }

    fn sample_until_done(&self, pid: u32, started: Instant) -> Result<(), RunnerError> {
        if !self.source.exists(pid) {
            return Err(RunnerError::ProcessLookup {
                pid,
                reason: "no such process".to_string(),
            });
        }
        let reference =
            self.source
                .process_times(pid)
                .map_err(|e| RunnerError::ProcessLookup {
                    pid,
                    reason: e.to_string(),
                })?;
        let mut sampler = Sampler::new(
            pid,
            &self.source,
            &self.usage,
            started,
            reference,
            Instant::now(),
        );

        info!(
            "Sleeping {:?} to skip start-up resource consumption",
            self.config.settle_delay
        );
        if self.done.wait_timeout(self.config.settle_delay) {
            return Ok(());
        }

        let interval = self.config.sample_interval.max(Duration::from_millis(1));
        let mut next_tick = Instant::now() + interval;
        while !self
            .done
            .wait_timeout(next_tick.saturating_duration_since(Instant::now()))
        {
            sampler.tick(&self.done);

            next_tick += interval;
            let now = Instant::now();
            if next_tick <= now {
                debug!("Sampling pid={} overran its interval, skipping ticks", pid);
                next_tick = now + interval;
            }
        }
        Ok(())
    }

    /// The termination sequence; runs at most once per runner.
    fn terminate(&self) -> Result<(), RunnerError> {
        self.set_state(RunnerState::StoppingGraceful);
        self.done.open();
        if self.watching.load(Ordering::SeqCst) {
            self.watch_finished.wait();
        }

        let child = self
            .child
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(mut child) = child else {
            self.set_state(RunnerState::Stopped);
            return Err(RunnerError::NotRunning);
        };
        let pid = child.id();

        info!(
            "Gracefully terminating agent pid={}, sending {}...",
            pid,
            TermSignal::Graceful
        );
        if let Err(e) = self.terminator.signal(pid, TermSignal::Graceful) {
            warn!("Cannot send {}: {}", TermSignal::Graceful, e);
        }

        let exited = Latch::new();
        let grace = self.config.grace_period;
        let reaped = thread::scope(|s| {
            s.spawn(|| {
                if exited.wait_timeout(grace) {
                    return;
                }
                self.set_state(RunnerState::StoppingForced);
                warn!(
                    "Agent pid={} is not responding to {}. Sending {} to kill forcedly.",
                    pid,
                    TermSignal::Graceful,
                    TermSignal::Forced
                );
                if let Err(e) = self.terminator.signal(pid, TermSignal::Forced) {
                    warn!("Cannot send {}: {}", TermSignal::Forced, e);
                }
            });

            // Wait for exit without reaping, so the pid cannot be recycled
            // before the escalation thread is joined.
            match wait_for_exit(pid) {
                Ok(()) => {
                    exited.open();
                    None
                }
                Err(e) => {
                    debug!("Falling back to reaping wait for pid={}: {}", pid, e);
                    let status = child.wait();
                    exited.open();
                    Some(status)
                }
            }
        });

        let status = match reaped {
            Some(status) => status,
            None => child.wait(),
        };
        self.set_state(RunnerState::Stopped);

        match status {
            Ok(status) => {
                self.usage.reset_current();
                let _ = self.exit_status.set(status);
                info!("Agent pid={} exited ({})", pid, status);
                Ok(())
            }
            Err(e) => Err(RunnerError::Wait(e.to_string())),
        }
    }
}

#[cfg(target_os = "linux")]
fn wait_for_exit(pid: u32) -> nix::Result<()> {
    use nix::errno::Errno;
    use nix::sys::wait::{Id, WaitPidFlag, waitid};
    use nix::unistd::Pid;

    let pid = Pid::from_raw(i32::try_from(pid).map_err(|_| Errno::EINVAL)?);
    loop {
        match waitid(Id::Pid(pid), WaitPidFlag::WEXITED | WaitPidFlag::WNOWAIT) {
            Err(Errno::EINTR) => continue,
            result => return result.map(drop),
        }
    }
}

#[cfg(not(target_os = "linux"))]
fn wait_for_exit(_pid: u32) -> nix::Result<()> {
    Err(nix::errno::Errno::ENOSYS)
}

impl<S: MetricsSource, T: Terminator> InfraRunner for ChildRunner<S, T> {
    fn start(&self) -> Result<(), RunnerError> {
        let mut slot = self.child.lock().unwrap_or_else(PoisonError::into_inner);
        if self.state() != RunnerState::NotStarted || slot.is_some() {
            return Err(RunnerError::AlreadyStarted);
        }

        info!("Starting agent ({})", self.config.bin_path.display());
        let child = self.launch()?;
        let pid = child.id();

        let _ = self.started.set((Instant::now(), Utc::now()));
        self.pid.store(pid, Ordering::SeqCst);
        *slot = Some(child);
        self.set_state(RunnerState::Running);

        info!(
            "Agent running, pid={}, logfile={}",
            pid,
            self.config.log_path.display()
        );
        Ok(())
    }

    fn stop(&self) -> Result<(), RunnerError> {
        // Callers arriving while a stop is in flight block on the gate and
        // share its outcome; only a stop that has already returned is final.
        if self.state() == RunnerState::NotStarted || self.stop_outcome.get().is_some() {
            return Err(RunnerError::NotRunning);
        }
        self.stop_outcome.get_or_init(|| self.terminate()).clone()
    }

    fn watch_resource_consumption(&self) -> Result<(), RunnerError> {
        if self.state() == RunnerState::NotStarted {
            return Err(RunnerError::NotRunning);
        }
        if self.watching.swap(true, Ordering::SeqCst) {
            return Err(RunnerError::AlreadyWatching);
        }
        let _finished = OpenOnDrop(&self.watch_finished);

        // stop may already have begun; it checks `watching` after opening `done`
        if self.done.is_open() {
            return Ok(());
        }
        let Some(&(started, _)) = self.started.get() else {
            return Err(RunnerError::NotRunning);
        };

        let result = self.sample_until_done(self.pid.load(Ordering::SeqCst), started);
        if result.is_ok() {
            info!("Stopping watching resource consumption");
        }
        result
    }

    fn resource_consumption(&self) -> ResourceConsumption {
        self.usage.snapshot()
    }
}

impl<S: MetricsSource, T: Terminator> Drop for ChildRunner<S, T> {
    fn drop(&mut self) {
        let child = self
            .child
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(mut child) = child {
            warn!("Agent pid={} still running on drop, killing it", child.id());
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::{MockFs, ProcfsSource};
    use std::os::unix::process::ExitStatusExt;
    use std::sync::{Arc, Barrier};
    use tempfile::TempDir;

    /// Forwards to `kill(2)` and remembers every request.
    #[derive(Default)]
    struct RecordingTerminator {
        calls: Mutex<Vec<(u32, TermSignal)>>,
    }

    impl RecordingTerminator {
        fn signals(&self) -> Vec<TermSignal> {
            self.calls.lock().unwrap().iter().map(|(_, s)| *s).collect()
        }
    }

    impl Terminator for RecordingTerminator {
        fn signal(&self, pid: u32, signal: TermSignal) -> io::Result<()> {
            self.calls.lock().unwrap().push((pid, signal));
            SignalTerminator.signal(pid, signal)
        }
    }

    type TestRunner = ChildRunner<ProcfsSource<RealFs>, Arc<RecordingTerminator>>;

    fn runner(
        dir: &TempDir,
        config: impl FnOnce(RunnerConfig) -> RunnerConfig,
    ) -> (TestRunner, Arc<RecordingTerminator>) {
        let terminator = Arc::new(RecordingTerminator::default());
        let config = config(RunnerConfig::new("sleep", dir.path().join("agent.log")));
        let source = ProcfsSource::new(RealFs::new(), "/proc");
        (
            ChildRunner::with_parts(config, source, Arc::clone(&terminator)),
            terminator,
        )
    }

    fn fast(config: RunnerConfig) -> RunnerConfig {
        config
            .with_settle_delay(Duration::from_millis(50))
            .with_sample_interval(Duration::from_millis(50))
            .with_grace_period(Duration::from_secs(5))
    }

    #[test]
    fn test_for_agent_args() {
        let config = RunnerConfig::for_agent("/usr/bin/agent", "/tmp/agent.yml", "/tmp/agent.log");
        assert_eq!(config.args, vec!["--config", "/tmp/agent.yml"]);
        assert_eq!(config.settle_delay, DEFAULT_SETTLE_DELAY);
        assert_eq!(config.sample_interval, DEFAULT_SAMPLE_INTERVAL);
        assert_eq!(config.grace_period, DEFAULT_GRACE_PERIOD);
    }

    #[test]
    fn test_stop_before_start() {
        let dir = TempDir::new().unwrap();
        let (runner, terminator) = runner(&dir, |c| c.with_args(["30"]));

        assert_eq!(runner.stop(), Err(RunnerError::NotRunning));
        assert!(terminator.signals().is_empty());
        assert_eq!(runner.state(), RunnerState::NotStarted);
    }

    #[test]
    fn test_watch_before_start() {
        let dir = TempDir::new().unwrap();
        let (runner, _) = runner(&dir, |c| c);

        assert_eq!(
            runner.watch_resource_consumption(),
            Err(RunnerError::NotRunning)
        );
        assert_eq!(runner.resource_consumption(), ResourceConsumption::default());
    }

    #[test]
    fn test_start_missing_executable() {
        let dir = TempDir::new().unwrap();
        let (runner, _) = runner(&dir, |mut c| {
            c.bin_path = PathBuf::from("/nonexistent/agent-binary");
            c
        });

        assert!(matches!(runner.start(), Err(RunnerError::Launch { .. })));
        assert_eq!(runner.state(), RunnerState::NotStarted);
        assert_eq!(runner.stop(), Err(RunnerError::NotRunning));
    }

    #[test]
    fn test_start_unopenable_log() {
        let dir = TempDir::new().unwrap();
        let (runner, _) = runner(&dir, |mut c| {
            c.log_path = dir.path().join("missing").join("agent.log");
            c.with_args(["30"])
        });

        let err = runner.start().unwrap_err();
        assert!(matches!(err, RunnerError::Launch { .. }));
        assert!(err.to_string().contains("cannot open"));
    }

    #[test]
    fn test_start_twice() {
        let dir = TempDir::new().unwrap();
        let (runner, _) = runner(&dir, |c| c.with_args(["30"]));

        runner.start().unwrap();
        assert_eq!(runner.start(), Err(RunnerError::AlreadyStarted));
        runner.stop().unwrap();
    }

    #[test]
    fn test_graceful_stop() {
        let dir = TempDir::new().unwrap();
        let (runner, terminator) = runner(&dir, |c| c.with_args(["30"]));

        runner.start().unwrap();
        assert_eq!(runner.state(), RunnerState::Running);
        assert!(runner.pid().is_some());
        assert!(runner.started_at().is_some());

        runner.stop().unwrap();

        assert_eq!(runner.state(), RunnerState::Stopped);
        assert_eq!(terminator.signals(), vec![TermSignal::Graceful]);
        assert_eq!(runner.exit_status().and_then(|s| s.signal()), Some(15));
        assert_eq!(runner.live_usage(), LiveUsage::default());

        // A completed stop cannot be repeated.
        assert_eq!(runner.stop(), Err(RunnerError::NotRunning));
        assert_eq!(terminator.signals().len(), 1);
    }

    #[test]
    fn test_concurrent_stops_share_one_termination() {
        let dir = TempDir::new().unwrap();
        let (runner, terminator) = runner(&dir, |c| c.with_args(["30"]));
        let runner = Arc::new(runner);
        runner.start().unwrap();

        let barrier = Arc::new(Barrier::new(2));
        let stoppers: Vec<_> = (0..2)
            .map(|_| {
                let runner = Arc::clone(&runner);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    runner.stop()
                })
            })
            .collect();
        let outcomes: Vec<_> = stoppers.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(outcomes, vec![Ok(()), Ok(())]);
        assert_eq!(terminator.signals(), vec![TermSignal::Graceful]);
        assert_eq!(runner.state(), RunnerState::Stopped);
    }

    #[cfg(target_os = "linux")]
    fn wait_for_comm(pid: u32, comm: &str) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            let current = std::fs::read_to_string(format!("/proc/{}/comm", pid)).unwrap_or_default();
            if current.trim() == comm {
                return;
            }
            thread::sleep(Duration::from_millis(10));
        }
        panic!("process {} never became {}", pid, comm);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_forced_stop_after_grace_period() {
        let dir = TempDir::new().unwrap();
        let (runner, terminator) = runner(&dir, |mut c| {
            // The ignored SIGTERM disposition survives exec.
            c.bin_path = PathBuf::from("sh");
            c.with_args(["-c", "trap '' TERM; exec sleep 30"])
                .with_grace_period(Duration::from_millis(300))
        });

        runner.start().unwrap();
        wait_for_comm(runner.pid().unwrap(), "sleep");

        let started = Instant::now();
        runner.stop().unwrap();

        assert!(started.elapsed() >= Duration::from_millis(300));
        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(
            terminator.signals(),
            vec![TermSignal::Graceful, TermSignal::Forced]
        );
        assert_eq!(runner.exit_status().and_then(|s| s.signal()), Some(9));
        assert_eq!(runner.state(), RunnerState::Stopped);
    }

    #[test]
    fn test_env_passed_to_child() {
        let dir = TempDir::new().unwrap();
        let log_path = dir.path().join("agent.log");
        let (runner, _) = runner(&dir, |mut c| {
            c.bin_path = PathBuf::from("sh");
            c.with_args(["-c", "echo \"mode=$PERFBED_MODE\""])
                .with_env("PERFBED_MODE", "soak")
        });

        runner.start().unwrap();
        thread::sleep(Duration::from_millis(200));
        runner.stop().unwrap();

        let log = std::fs::read_to_string(&log_path).unwrap();
        assert!(log.contains("mode=soak"));
    }

    #[test]
    fn test_output_captured_in_log() {
        let dir = TempDir::new().unwrap();
        let log_path = dir.path().join("agent.log");
        std::fs::write(&log_path, "previous run\n").unwrap();
        let (runner, _) = runner(&dir, |mut c| {
            c.bin_path = PathBuf::from("sh");
            c.with_args(["-c", "echo to-stdout; echo to-stderr >&2"])
        });

        runner.start().unwrap();
        thread::sleep(Duration::from_millis(200));
        runner.stop().unwrap();

        let log = std::fs::read_to_string(&log_path).unwrap();
        assert!(log.starts_with("previous run\n"));
        assert!(log.contains("to-stdout"));
        assert!(log.contains("to-stderr"));
        assert_eq!(runner.exit_status().and_then(|s| s.code()), Some(0));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_watch_samples_until_stop() {
        let dir = TempDir::new().unwrap();
        let (runner, _) = runner(&dir, |c| fast(c.with_args(["30"])));
        let runner = Arc::new(runner);
        runner.start().unwrap();

        let watcher = {
            let runner = Arc::clone(&runner);
            thread::spawn(move || runner.watch_resource_consumption())
        };
        thread::sleep(Duration::from_millis(400));
        assert!(runner.live_usage().ram_bytes > 0);

        runner.stop().unwrap();
        assert_eq!(watcher.join().unwrap(), Ok(()));

        let rc = runner.resource_consumption();
        assert!(rc.samples >= 2, "only {} samples", rc.samples);
        assert!(rc.ram_avg > 0);
        assert!(rc.ram_max >= rc.ram_avg);
        assert!(rc.cpu_percent_avg >= 0.0);

        let after = runner.resource_consumption();
        assert_eq!(after, rc);
    }

    #[test]
    fn test_stop_interrupts_settle_delay() {
        let dir = TempDir::new().unwrap();
        let (runner, _) = runner(&dir, |c| {
            c.with_args(["30"])
                .with_settle_delay(Duration::from_secs(60))
        });
        let runner = Arc::new(runner);
        runner.start().unwrap();

        let watcher = {
            let runner = Arc::clone(&runner);
            thread::spawn(move || runner.watch_resource_consumption())
        };
        thread::sleep(Duration::from_millis(100));

        let started = Instant::now();
        runner.stop().unwrap();
        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(watcher.join().unwrap().is_ok());
        assert_eq!(runner.resource_consumption(), ResourceConsumption::default());
    }

    #[test]
    fn test_watch_twice() {
        let dir = TempDir::new().unwrap();
        let (runner, _) = runner(&dir, |c| {
            c.with_args(["30"])
                .with_settle_delay(Duration::from_secs(60))
        });
        let runner = Arc::new(runner);
        runner.start().unwrap();

        let watcher = {
            let runner = Arc::clone(&runner);
            thread::spawn(move || runner.watch_resource_consumption())
        };
        thread::sleep(Duration::from_millis(100));

        assert_eq!(
            runner.watch_resource_consumption(),
            Err(RunnerError::AlreadyWatching)
        );
        runner.stop().unwrap();
        assert!(watcher.join().unwrap().is_ok());
    }

    #[test]
    fn test_watch_unresolvable_process() {
        let dir = TempDir::new().unwrap();
        let config = RunnerConfig::new("sleep", dir.path().join("agent.log")).with_args(["30"]);
        // An empty /proc: the launched pid is unknown to the source.
        let source = ProcfsSource::new(MockFs::new(), "/proc");
        let runner = ChildRunner::with_parts(config, source, SignalTerminator);

        runner.start().unwrap();
        let pid = runner.pid().unwrap();

        assert!(matches!(
            runner.watch_resource_consumption(),
            Err(RunnerError::ProcessLookup { pid: p, .. }) if p == pid
        ));
        runner.stop().unwrap();
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_drop_kills_running_child() {
        let dir = TempDir::new().unwrap();
        let (runner, _) = runner(&dir, |c| c.with_args(["30"]));
        runner.start().unwrap();
        let pid = runner.pid().unwrap();

        drop(runner);

        assert!(!Path::new(&format!("/proc/{}", pid)).exists());
    }
}
