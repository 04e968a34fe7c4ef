//! Periodic sampling of the supervised process.
//!
//! The watch thread owns a [`Sampler`] and is the only writer of the
//! [`SamplerState`]; any thread may read it at any time without blocking.

use std::hint;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, warn};

use crate::collector::{CollectError, CpuTimes, IoCounters, MetricsSource};
use crate::runner::ResourceConsumption;
use crate::sync::Latch;

/// CPU percentages are stored as fixed point with three decimals.
const CPU_SCALE: f64 = 1000.0;

/// CPU used over an interval, as a percentage of one core.
///
/// A negative CPU delta (seen transiently while a process exits) counts as
/// zero, as does an empty interval.
pub fn cpu_percent(delta_cpu: f64, delta_wall: f64) -> f64 {
    if delta_wall <= 0.0 {
        return 0.0;
    }
    delta_cpu.max(0.0) * 100.0 / delta_wall
}

fn to_fixed(percent: f64) -> u64 {
    (percent * CPU_SCALE).round() as u64
}

fn from_fixed(fixed: u64) -> f64 {
    fixed as f64 / CPU_SCALE
}

fn to_micros(d: Duration) -> u64 {
    u64::try_from(d.as_micros()).unwrap_or(u64::MAX)
}

/// Latest instantaneous values of the supervised process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LiveUsage {
    pub ram_bytes: u64,
    pub read_io_bytes: u64,
    pub write_io_bytes: u64,
    pub cpu_percent: f64,
}

/// Concurrency-safe aggregate state of one run.
///
/// Current values and maxima are independent atomics. Values that are only
/// meaningful together (memory sum and count, CPU time and the wall time it
/// was sampled at) are written under `generation`, an even/odd sequence
/// counter, and read back with a retry loop so readers never see a torn pair.
#[derive(Debug, Default)]
pub struct SamplerState {
    ram_cur: AtomicU64,
    io_read_cur: AtomicU64,
    io_write_cur: AtomicU64,
    cpu_percent_cur: AtomicU64,

    ram_max: AtomicU64,
    cpu_percent_max: AtomicU64,
    io_read_total: AtomicU64,
    io_write_total: AtomicU64,

    generation: AtomicU64,
    mem_samples: AtomicU64,
    ram_total: AtomicU64,
    cpu_time_us: AtomicU64,
    elapsed_us: AtomicU64,
}

impl SamplerState {
    pub fn new() -> Self {
        Self::default()
    }

    fn publish(&self, write: impl FnOnce()) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        write();
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    fn read_consistent<T>(&self, read: impl Fn() -> T) -> T {
        loop {
            let before = self.generation.load(Ordering::SeqCst);
            if before % 2 == 1 {
                hint::spin_loop();
                continue;
            }
            let value = read();
            if self.generation.load(Ordering::SeqCst) == before {
                return value;
            }
        }
    }

    pub fn record_memory(&self, ram_bytes: u64) {
        self.publish(|| {
            self.ram_total.fetch_add(ram_bytes, Ordering::SeqCst);
            self.mem_samples.fetch_add(1, Ordering::SeqCst);
        });
        self.ram_max.fetch_max(ram_bytes, Ordering::SeqCst);
        self.ram_cur.store(ram_bytes, Ordering::SeqCst);
    }

    pub fn record_io(&self, read_bytes: u64, write_bytes: u64) {
        self.io_read_cur.store(read_bytes, Ordering::SeqCst);
        self.io_write_cur.store(write_bytes, Ordering::SeqCst);
        self.io_read_total.store(read_bytes, Ordering::SeqCst);
        self.io_write_total.store(write_bytes, Ordering::SeqCst);
    }

    /// Records one CPU sample: the interval percentage and the cumulative
    /// CPU time observed `elapsed` after process start.
    pub fn record_cpu(&self, percent: f64, cpu_time: Duration, elapsed: Duration) {
        let fixed = to_fixed(percent);
        self.cpu_percent_max.fetch_max(fixed, Ordering::SeqCst);
        self.cpu_percent_cur.store(fixed, Ordering::SeqCst);
        self.publish(|| {
            self.cpu_time_us.store(to_micros(cpu_time), Ordering::SeqCst);
            self.elapsed_us.store(to_micros(elapsed), Ordering::SeqCst);
        });
    }

    /// Zeroes the live gauges. Aggregates are kept for the final snapshot.
    pub fn reset_current(&self) {
        self.ram_cur.store(0, Ordering::SeqCst);
        self.cpu_percent_cur.store(0, Ordering::SeqCst);
        self.io_read_cur.store(0, Ordering::SeqCst);
        self.io_write_cur.store(0, Ordering::SeqCst);
    }

    pub fn live(&self) -> LiveUsage {
        LiveUsage {
            ram_bytes: self.ram_cur.load(Ordering::SeqCst),
            read_io_bytes: self.io_read_cur.load(Ordering::SeqCst),
            write_io_bytes: self.io_write_cur.load(Ordering::SeqCst),
            cpu_percent: from_fixed(self.cpu_percent_cur.load(Ordering::SeqCst)),
        }
    }

    /// Builds the run summary from the current aggregates.
    ///
    /// Average CPU is the cumulative CPU time at the last successful sample
    /// divided by the wall time from process start to that sample.
    pub fn snapshot(&self) -> ResourceConsumption {
        let (samples, ram_total, cpu_time_us, elapsed_us) = self.read_consistent(|| {
            (
                self.mem_samples.load(Ordering::SeqCst),
                self.ram_total.load(Ordering::SeqCst),
                self.cpu_time_us.load(Ordering::SeqCst),
                self.elapsed_us.load(Ordering::SeqCst),
            )
        });

        ResourceConsumption {
            cpu_percent_avg: if elapsed_us > 0 {
                cpu_time_us as f64 / elapsed_us as f64 * 100.0
            } else {
                0.0
            },
            cpu_percent_max: from_fixed(self.cpu_percent_max.load(Ordering::SeqCst)),
            ram_avg: if samples > 0 { ram_total / samples } else { 0 },
            ram_max: self.ram_max.load(Ordering::SeqCst),
            read_io_total: self.io_read_total.load(Ordering::SeqCst),
            write_io_total: self.io_write_total.load(Ordering::SeqCst),
            samples,
        }
    }
}

/// Raw query results of one tick.
struct Reading {
    memory: Result<u64, CollectError>,
    io: Result<IoCounters, CollectError>,
    times: Result<CpuTimes, CollectError>,
}

/// Takes one sample per tick and folds it into a [`SamplerState`].
pub(crate) struct Sampler<'a, S: MetricsSource> {
    pid: u32,
    source: &'a S,
    state: &'a SamplerState,
    started: Instant,
    last_at: Instant,
    last_cpu: Duration,
}

impl<'a, S: MetricsSource> Sampler<'a, S> {
    /// Creates a sampler from the reference CPU reading taken at `at`.
    ///
    /// The reference only seeds the first interval; nothing reaches `state`
    /// until a tick succeeds.
    pub(crate) fn new(
        pid: u32,
        source: &'a S,
        state: &'a SamplerState,
        started: Instant,
        reference: CpuTimes,
        at: Instant,
    ) -> Self {
        Self {
            pid,
            source,
            state,
            started,
            last_at: at,
            last_cpu: reference.total(),
        }
    }

    /// Queries the source and records the results.
    ///
    /// Failed queries are logged and skipped. If `done` opened while the
    /// queries were in flight the whole tick is discarded and `false` returned.
    pub(crate) fn tick(&mut self, done: &Latch) -> bool {
        let reading = self.read();
        self.record(reading, Instant::now(), done)
    }

    #[cfg(test)]
    fn tick_at(&mut self, now: Instant, done: &Latch) -> bool {
        let reading = self.read();
        self.record(reading, now, done)
    }

    fn read(&self) -> Reading {
        Reading {
            memory: self.source.memory_info(self.pid),
            io: self.source.io_counters(self.pid),
            times: self.source.process_times(self.pid),
        }
    }

    /// Folds `reading` into the state as sampled at `now`.
    fn record(&mut self, reading: Reading, now: Instant, done: &Latch) -> bool {
        if done.is_open() {
            debug!("Discarding sample for pid={} taken during stop", self.pid);
            return false;
        }

        match reading.memory {
            Ok(ram) => self.state.record_memory(ram),
            Err(e) => warn!("cannot get process memory for {}: {}", self.pid, e),
        }

        match reading.io {
            Ok(io) => self.state.record_io(io.read_bytes, io.write_bytes),
            Err(e) => warn!("cannot get process io counters for {}: {}", self.pid, e),
        }

        match reading.times {
            Ok(times) => {
                let cpu = times.total();
                let delta_wall = now.saturating_duration_since(self.last_at).as_secs_f64();
                let delta_cpu = cpu.as_secs_f64() - self.last_cpu.as_secs_f64();
                let percent = cpu_percent(delta_cpu, delta_wall);

                self.last_at = now;
                self.last_cpu = cpu;
                self.state
                    .record_cpu(percent, cpu, now.saturating_duration_since(self.started));
            }
            Err(e) => warn!("cannot get process times for {}: {}", self.pid, e),
        }

        let live = self.state.live();
        debug!(
            "pid={} cpu={:.1}% rss={} read={} write={}",
            self.pid, live.cpu_percent, live.ram_bytes, live.read_io_bytes, live.write_io_bytes
        );
        true
    }
}
