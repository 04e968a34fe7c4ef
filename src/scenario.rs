//! One performance scenario: start, watch, wait, stop, validate.
//!
//! Every failure, from any stage or thread, goes through a single error
//! signal. The signal opens once; it cuts a pending [`TestCase::sleep`]
//! short, and the most recent cause is kept for [`TestCase::result`].

use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{error, info, warn};

use crate::error::RunnerError;
use crate::runner::{InfraRunner, ResourceConsumption};
use crate::sync::Latch;
use crate::validator::{ResourceValidator, ValidationError};

/// Why a scenario failed.
#[derive(Debug, Clone, PartialEq)]
pub enum ScenarioError {
    Runner(RunnerError),
    Validation(ValidationError),
    /// Aborted from outside, e.g. by Ctrl-C.
    Interrupted,
}

impl std::fmt::Display for ScenarioError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScenarioError::Runner(e) => write!(f, "{}", e),
            ScenarioError::Validation(e) => write!(f, "{}", e),
            ScenarioError::Interrupted => write!(f, "scenario interrupted"),
        }
    }
}

impl std::error::Error for ScenarioError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ScenarioError::Runner(e) => Some(e),
            ScenarioError::Validation(e) => Some(e),
            ScenarioError::Interrupted => None,
        }
    }
}

impl From<RunnerError> for ScenarioError {
    fn from(e: RunnerError) -> Self {
        ScenarioError::Runner(e)
    }
}

impl From<ValidationError> for ScenarioError {
    fn from(e: ValidationError) -> Self {
        ScenarioError::Validation(e)
    }
}

/// Progress of a [`TestCase`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Started,
    Watching,
    Stopped,
}

#[derive(Default)]
struct ErrorSignal {
    raised: Latch,
    cause: Mutex<Option<ScenarioError>>,
}

impl ErrorSignal {
    fn raise(&self, err: ScenarioError) {
        error!("{}", err);
        *self.cause.lock().unwrap_or_else(PoisonError::into_inner) = Some(err);
        self.raised.open();
    }
}

/// Aborts a running [`TestCase`] from another thread.
#[derive(Clone)]
pub struct AbortHandle(Arc<ErrorSignal>);

impl AbortHandle {
    pub fn abort(&self) {
        self.0.raise(ScenarioError::Interrupted);
    }
}

/// Drives one scenario against an [`InfraRunner`].
pub struct TestCase<R: InfraRunner + 'static, V: ResourceValidator> {
    runner: Arc<R>,
    validator: V,
    errors: Arc<ErrorSignal>,
    phase: Mutex<Phase>,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

impl<R: InfraRunner + 'static, V: ResourceValidator> TestCase<R, V> {
    pub fn new(runner: Arc<R>, validator: V) -> Self {
        Self {
            runner,
            validator,
            errors: Arc::new(ErrorSignal::default()),
            phase: Mutex::new(Phase::Idle),
            watcher: Mutex::new(None),
        }
    }

    pub fn runner(&self) -> &Arc<R> {
        &self.runner
    }

    pub fn phase(&self) -> Phase {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_phase(&self, phase: Phase) {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner) = phase;
    }

    pub fn abort_handle(&self) -> AbortHandle {
        AbortHandle(Arc::clone(&self.errors))
    }

    /// Fails the scenario as interrupted.
    pub fn abort(&self) {
        self.errors.raise(ScenarioError::Interrupted);
    }

    /// Starts the runner and watches it on a background thread.
    ///
    /// Failures are reported through the error signal, not returned.
    pub fn start_agent(&self) {
        if let Err(e) = self.runner.start() {
            self.errors.raise(e.into());
            return;
        }
        self.set_phase(Phase::Started);

        let runner = Arc::clone(&self.runner);
        let errors = Arc::clone(&self.errors);
        let handle = thread::spawn(move || {
            if let Err(e) = runner.watch_resource_consumption() {
                errors.raise(e.into());
            }
        });
        *self.watcher.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
        self.set_phase(Phase::Watching);
    }

    /// Waits for `duration` or until the scenario fails, whichever comes first.
    ///
    /// Returns `true` if the full duration elapsed.
    pub fn sleep(&self, duration: Duration) -> bool {
        info!("Running scenario for {:?}", duration);
        if self.errors.raised.wait_timeout(duration) {
            warn!("Scenario wait cut short by a failure");
            return false;
        }
        true
    }

    /// Reports and stops the runner, then validates what was consumed.
    ///
    /// Returns the snapshot that was validated.
    pub fn stop_agent(&self) -> ResourceConsumption {
        let consumption = self.runner.resource_consumption();
        info!("{}", self.validator.report(&consumption));

        let stopped = self.runner.stop();
        self.join_watcher();
        self.set_phase(Phase::Stopped);

        if let Err(e) = stopped {
            self.errors.raise(e.into());
            return consumption;
        }
        if let Err(e) = self.validator.validate(&consumption) {
            self.errors.raise(e.into());
        }
        consumption
    }

    fn join_watcher(&self) {
        let handle = self
            .watcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle
            && handle.join().is_err()
        {
            error!("Resource watcher thread panicked");
        }
    }

    /// `true` once any stage has failed.
    pub fn failed(&self) -> bool {
        self.errors.raised.is_open()
    }

    /// The most recent failure, if any.
    pub fn result(&self) -> Result<(), ScenarioError> {
        match &*self
            .errors
            .cause
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
        {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }
}

impl<R: InfraRunner + 'static, V: ResourceValidator> Drop for TestCase<R, V> {
    fn drop(&mut self) {
        let watching = self
            .watcher
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some();
        if watching {
            warn!("Scenario dropped without stopping the agent, stopping it now");
            if let Err(e) = self.runner.stop() {
                warn!("Cannot stop agent: {}", e);
            }
            self.join_watcher();
        }
    }
}
