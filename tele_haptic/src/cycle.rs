//! Fixed-cadence control loop: exchange → force → relay → pace.
//!
//! One thread owns the device exchange and force computation exclusively.
//! Pacing is best-effort with an explicit no-catch-up policy: if a cycle
//! body overruns the period, the next cycle starts immediately and the
//! cadence re-anchors to now — ticks are never queued.
//!
//! ## RT Setup Sequence (`rt` feature)
//! 1. `mlockall(MCL_CURRENT | MCL_FUTURE)` — lock all pages.
//! 2. Prefault stack pages.
//! 3. `sched_setaffinity` — pin to an isolated CPU core.
//! 4. `sched_setscheduler(SCHED_FIFO)` — RT priority.
//!
//! Without the `rt` feature all RT calls are no-ops and pacing uses a
//! monotonic `Instant` with `std::thread::sleep`.

use crate::force::ForceField;
use crate::relay::RelayTarget;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tele_common::haptic::HapticDevice;
use tele_common::math::Vec3;
use tele_common::pose::MotionCommand;
use tele_common::workspace::WorkspaceBounds;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Errors during RT setup or cycle execution.
#[derive(Debug, Error)]
pub enum CycleError {
    /// RT system call failed.
    #[error("RT setup error: {0}")]
    RtSetup(String),

    /// Fatal device failure; the loop has stopped and released the handle.
    #[error(transparent)]
    Device(#[from] tele_common::haptic::DeviceError),
}

// ─── Cycle Statistics ───────────────────────────────────────────────

/// O(1) per-cycle timing statistics.
///
/// Updated every cycle with no allocation.
#[derive(Debug, Clone)]
pub struct CycleStats {
    /// Total cycles executed.
    pub cycle_count: u64,
    /// Last cycle body duration [ns].
    pub last_cycle_ns: i64,
    /// Minimum cycle body duration [ns].
    pub min_cycle_ns: i64,
    /// Maximum cycle body duration [ns].
    pub max_cycle_ns: i64,
    /// Running sum for average computation.
    pub sum_cycle_ns: i64,
    /// Number of cycles whose body exceeded the period.
    pub overruns: u64,
    /// Maximum wake-up latency [ns] (actual wake vs. deadline).
    pub max_latency_ns: i64,
    /// Poses successfully handed to the relay.
    pub relayed: u64,
    /// Relay submissions that failed (non-fatal).
    pub relay_failures: u64,
}

impl CycleStats {
    pub const fn new() -> Self {
        Self {
            cycle_count: 0,
            last_cycle_ns: 0,
            min_cycle_ns: i64::MAX,
            max_cycle_ns: 0,
            sum_cycle_ns: 0,
            overruns: 0,
            max_latency_ns: 0,
            relayed: 0,
            relay_failures: 0,
        }
    }

    /// Record a cycle body duration and wake latency. O(1).
    #[inline]
    pub fn record(&mut self, duration_ns: i64, latency_ns: i64) {
        self.cycle_count += 1;
        self.last_cycle_ns = duration_ns;
        if duration_ns < self.min_cycle_ns {
            self.min_cycle_ns = duration_ns;
        }
        if duration_ns > self.max_cycle_ns {
            self.max_cycle_ns = duration_ns;
        }
        self.sum_cycle_ns += duration_ns;
        if latency_ns > self.max_latency_ns {
            self.max_latency_ns = latency_ns;
        }
    }

    /// Average cycle body time [ns] (0 if no cycles).
    #[inline]
    pub fn avg_cycle_ns(&self) -> i64 {
        if self.cycle_count == 0 {
            0
        } else {
            self.sum_cycle_ns / self.cycle_count as i64
        }
    }
}

impl Default for CycleStats {
    fn default() -> Self {
        Self::new()
    }
}

// ─── RT Setup ───────────────────────────────────────────────────────

/// Lock all current and future memory pages.
#[cfg(feature = "rt")]
fn rt_mlockall() -> Result<(), CycleError> {
    use nix::sys::mman::{MlockallFlags, mlockall};
    mlockall(MlockallFlags::MCL_CURRENT | MlockallFlags::MCL_FUTURE)
        .map_err(|e| CycleError::RtSetup(format!("mlockall failed: {e}")))?;
    Ok(())
}

#[cfg(not(feature = "rt"))]
fn rt_mlockall() -> Result<(), CycleError> {
    Ok(()) // No-op in simulation mode
}

/// Prefault stack pages so the loop never page-faults.
fn prefault_stack() {
    let mut buf = [0u8; 64 * 1024];
    for byte in buf.iter_mut() {
        unsafe { core::ptr::write_volatile(byte, 0xFF) };
    }
    core::hint::black_box(&buf);
}

/// Pin the current thread to a specific CPU core.
#[cfg(feature = "rt")]
fn rt_set_affinity(cpu: usize) -> Result<(), CycleError> {
    use nix::sched::{CpuSet, sched_setaffinity};
    use nix::unistd::Pid;

    let mut cpuset = CpuSet::new();
    cpuset
        .set(cpu)
        .map_err(|e| CycleError::RtSetup(format!("CpuSet::set({cpu}) failed: {e}")))?;
    sched_setaffinity(Pid::from_raw(0), &cpuset)
        .map_err(|e| CycleError::RtSetup(format!("sched_setaffinity failed: {e}")))?;
    Ok(())
}

#[cfg(not(feature = "rt"))]
fn rt_set_affinity(_cpu: usize) -> Result<(), CycleError> {
    Ok(())
}

/// Set SCHED_FIFO with the given RT priority.
#[cfg(feature = "rt")]
fn rt_set_scheduler(priority: i32) -> Result<(), CycleError> {
    let param = libc::sched_param {
        sched_priority: priority,
    };
    let ret = unsafe { libc::sched_setscheduler(0, libc::SCHED_FIFO, &param) };
    if ret != 0 {
        let err = std::io::Error::last_os_error();
        return Err(CycleError::RtSetup(format!(
            "sched_setscheduler(SCHED_FIFO, {priority}) failed: {err}"
        )));
    }
    Ok(())
}

#[cfg(not(feature = "rt"))]
fn rt_set_scheduler(_priority: i32) -> Result<(), CycleError> {
    Ok(())
}

/// Perform the full RT setup sequence before entering the loop.
///
/// In simulation mode (no `rt` feature), all RT calls are no-ops.
pub fn rt_setup(cpu_core: usize, rt_priority: i32) -> Result<(), CycleError> {
    rt_mlockall()?;
    prefault_stack();
    rt_set_affinity(cpu_core)?;
    rt_set_scheduler(rt_priority)?;
    Ok(())
}

// ─── Tick Scheduler ─────────────────────────────────────────────────

/// "Sleep until the next tick boundary" over a monotonic clock.
///
/// The deadline advances by the period each tick. An overrun re-anchors
/// the deadline to now — no catch-up, never more than one wake per period.
#[cfg(not(feature = "rt"))]
pub struct TickScheduler {
    period: Duration,
    next_deadline: Instant,
}

#[cfg(not(feature = "rt"))]
impl TickScheduler {
    /// Start the cadence; the first deadline is one period from now.
    pub fn start(period: Duration) -> Self {
        Self {
            period,
            next_deadline: Instant::now() + period,
        }
    }

    /// Block until the next tick boundary. Returns the wake latency [ns].
    pub fn wait_next_tick(&mut self) -> Result<i64, CycleError> {
        let now = Instant::now();
        if now >= self.next_deadline {
            // Overrun: start the next cycle immediately, re-anchor cadence.
            self.next_deadline = now + self.period;
            return Ok(0);
        }
        std::thread::sleep(self.next_deadline - now);
        let latency = Instant::now().saturating_duration_since(self.next_deadline);
        self.next_deadline += self.period;
        Ok(latency.as_nanos() as i64)
    }
}

/// Absolute-deadline scheduler backed by `clock_nanosleep(TIMER_ABSTIME)`
/// on `CLOCK_MONOTONIC` for drift-free pacing.
#[cfg(feature = "rt")]
pub struct TickScheduler {
    period_ns: i64,
    next_wake: nix::sys::time::TimeSpec,
}

#[cfg(feature = "rt")]
impl TickScheduler {
    pub fn start(period: Duration) -> Self {
        use nix::time::{ClockId, clock_gettime};
        let now = clock_gettime(ClockId::CLOCK_MONOTONIC)
            .unwrap_or_else(|_| nix::sys::time::TimeSpec::new(0, 0));
        let period_ns = period.as_nanos() as i64;
        Self {
            period_ns,
            next_wake: timespec_add_ns(now, period_ns),
        }
    }

    pub fn wait_next_tick(&mut self) -> Result<i64, CycleError> {
        use nix::time::{ClockId, ClockNanosleepFlags, clock_gettime, clock_nanosleep};

        let clock = ClockId::CLOCK_MONOTONIC;
        let now = clock_gettime(clock)
            .map_err(|e| CycleError::RtSetup(format!("clock_gettime: {e}")))?;
        if timespec_diff_ns(&now, &self.next_wake) >= 0 {
            // Overrun: re-anchor, no catch-up.
            self.next_wake = timespec_add_ns(now, self.period_ns);
            return Ok(0);
        }
        let _ = clock_nanosleep(clock, ClockNanosleepFlags::TIMER_ABSTIME, &self.next_wake);
        let woke = clock_gettime(clock)
            .map_err(|e| CycleError::RtSetup(format!("clock_gettime: {e}")))?;
        let latency = timespec_diff_ns(&woke, &self.next_wake).max(0);
        self.next_wake = timespec_add_ns(self.next_wake, self.period_ns);
        Ok(latency)
    }
}

/// Add nanoseconds to a TimeSpec.
#[cfg(feature = "rt")]
fn timespec_add_ns(ts: nix::sys::time::TimeSpec, ns: i64) -> nix::sys::time::TimeSpec {
    use nix::sys::time::TimeSpec;
    let mut secs = ts.tv_sec();
    let mut nanos = ts.tv_nsec() + ns;
    while nanos >= 1_000_000_000 {
        secs += 1;
        nanos -= 1_000_000_000;
    }
    while nanos < 0 {
        secs -= 1;
        nanos += 1_000_000_000;
    }
    TimeSpec::new(secs, nanos)
}

/// Compute the difference (a - b) in nanoseconds.
#[cfg(feature = "rt")]
fn timespec_diff_ns(a: &nix::sys::time::TimeSpec, b: &nix::sys::time::TimeSpec) -> i64 {
    (a.tv_sec() - b.tv_sec()) * 1_000_000_000 + (a.tv_nsec() - b.tv_nsec())
}

// ─── Control Loop ───────────────────────────────────────────────────

/// Control loop lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Not yet started.
    Idle,
    /// In the cycle loop.
    Running,
    /// Stopped on fatal device error or external cancellation.
    Stopped,
}

/// When to relay the mapped pose to the manipulator side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RelayMode {
    /// Submit every tick.
    #[default]
    Continuous,
    /// Submit only while the external trigger flag is set
    /// (operator-held button).
    Triggered,
}

/// Immutable loop parameters.
#[derive(Debug, Clone)]
pub struct LoopOptions {
    /// Cycle period (default ~1 ms).
    pub period: Duration,
    /// Haptic device workspace bounds [m].
    pub device_bounds: WorkspaceBounds,
    /// Manipulator workspace bounds [mm].
    pub arm_bounds: WorkspaceBounds,
    /// Speed attached to relayed motion commands.
    pub relay_speed: f64,
}

/// The fixed-period teleoperation loop.
///
/// Owns the device handle, the cadence, and the most recent force.
pub struct ControlLoop {
    device: Box<dyn HapticDevice>,
    field: ForceField,
    options: LoopOptions,
    relay: Option<(RelayTarget, RelayMode)>,
    trigger: Arc<AtomicBool>,
    state: LoopState,
    stats: CycleStats,
    last_force: Vec3,
}

impl ControlLoop {
    pub fn new(device: Box<dyn HapticDevice>, field: ForceField, options: LoopOptions) -> Self {
        Self {
            device,
            field,
            options,
            relay: None,
            trigger: Arc::new(AtomicBool::new(false)),
            state: LoopState::Idle,
            stats: CycleStats::new(),
            last_force: Vec3::ZERO,
        }
    }

    /// Attach the manipulator relay.
    pub fn attach_relay(&mut self, target: RelayTarget, mode: RelayMode) {
        self.relay = Some((target, mode));
    }

    /// Flag observed by [`RelayMode::Triggered`]; wire it to whatever input
    /// source acts as the operator-held button.
    pub fn trigger_handle(&self) -> Arc<AtomicBool> {
        self.trigger.clone()
    }

    #[inline]
    pub fn state(&self) -> LoopState {
        self.state
    }

    #[inline]
    pub fn stats(&self) -> &CycleStats {
        &self.stats
    }

    /// Wake the device and run the cycle loop until `running` clears or a
    /// fatal device error occurs. The device handle is released on every
    /// exit path.
    pub fn run(&mut self, running: &AtomicBool) -> Result<(), CycleError> {
        let result = self.run_inner(running);
        self.state = LoopState::Stopped;
        self.device.close();
        result
    }

    fn run_inner(&mut self, running: &AtomicBool) -> Result<(), CycleError> {
        let info = self.device.wakeup()?;
        info!(device_id = %info.device_id, "haptic device awake");

        self.state = LoopState::Running;
        let period_ns = self.options.period.as_nanos() as i64;
        let mut scheduler = TickScheduler::start(self.options.period);

        while running.load(Ordering::Relaxed) {
            let cycle_start = Instant::now();

            // Single bidirectional exchange: deliver last tick's force,
            // receive the new sample.
            let sample = match self.device.exchange(self.last_force) {
                Ok(s) => s,
                Err(e) if e.is_fatal() => {
                    error!("device exchange failed: {e}");
                    return Err(e.into());
                }
                Err(e) => {
                    warn!("transient device error, skipping tick: {e}");
                    let latency = scheduler.wait_next_tick()?;
                    self.stats
                        .record(cycle_start.elapsed().as_nanos() as i64, latency);
                    continue;
                }
            };

            self.last_force = self.field.evaluate(sample.position, sample.velocity);

            if self.relay_due() {
                self.relay_position(sample.position);
            }

            let duration_ns = cycle_start.elapsed().as_nanos() as i64;
            if duration_ns > period_ns {
                self.stats.overruns += 1;
            }
            let latency = scheduler.wait_next_tick()?;
            self.stats.record(duration_ns, latency);
        }

        info!("stop requested, leaving cycle loop");
        Ok(())
    }

    fn relay_due(&self) -> bool {
        match &self.relay {
            None => false,
            Some((_, RelayMode::Continuous)) => true,
            Some((_, RelayMode::Triggered)) => self.trigger.load(Ordering::Relaxed),
        }
    }

    /// Map the device position into the manipulator workspace and submit
    /// it. Failures are non-fatal: the tick simply skips the relay step.
    fn relay_position(&mut self, position: Vec3) {
        let mapped = self
            .options
            .device_bounds
            .map(position, &self.options.arm_bounds);
        let mut cmd = MotionCommand::to_position(mapped);
        cmd.speed = self.options.relay_speed;

        let Some((target, _)) = self.relay.as_mut() else {
            return;
        };
        match target.submit(&cmd) {
            Ok(()) => {
                self.stats.relayed += 1;
                debug!(
                    "relayed pose x={:.1} y={:.1} z={:.1}",
                    mapped.x, mapped.y, mapped.z
                );
            }
            Err(e) => {
                self.stats.relay_failures += 1;
                warn!("relay submit failed: {e}");
            }
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::force::Fixture;
    use crate::relay::WaypointWriter;
    use crate::sim::SimDevice;
    use tele_common::haptic::DeviceSample;
    use tele_common::workspace::AxisBounds;

    fn test_options(period_us: u64) -> LoopOptions {
        LoopOptions {
            period: Duration::from_micros(period_us),
            device_bounds: WorkspaceBounds::new(
                AxisBounds::new(-0.2, 0.2),
                AxisBounds::new(-0.2, 0.2),
                AxisBounds::new(0.0, 0.2),
            ),
            arm_bounds: WorkspaceBounds::new(
                AxisBounds::new(250.0, 300.0),
                AxisBounds::new(0.0, 50.0),
                AxisBounds::new(100.0, 150.0),
            ),
            relay_speed: 50.0,
        }
    }

    #[test]
    fn cycle_stats_basic() {
        let mut stats = CycleStats::new();
        assert_eq!(stats.avg_cycle_ns(), 0);

        stats.record(500_000, 1_000);
        assert_eq!(stats.cycle_count, 1);
        assert_eq!(stats.min_cycle_ns, 500_000);
        assert_eq!(stats.max_cycle_ns, 500_000);
        assert_eq!(stats.max_latency_ns, 1_000);

        stats.record(600_000, 500);
        assert_eq!(stats.min_cycle_ns, 500_000);
        assert_eq!(stats.max_cycle_ns, 600_000);
        assert_eq!(stats.max_latency_ns, 1_000);
        assert_eq!(stats.avg_cycle_ns(), 550_000);
    }

    #[test]
    fn rt_setup_without_rt_feature_is_noop() {
        #[cfg(not(feature = "rt"))]
        {
            assert!(rt_setup(0, 80).is_ok());
        }
    }

    #[cfg(not(feature = "rt"))]
    #[test]
    fn scheduler_does_not_catch_up_after_overrun() {
        let mut sched = TickScheduler::start(Duration::from_millis(5));
        // Simulate a body that blows well past the deadline.
        std::thread::sleep(Duration::from_millis(20));
        let t = Instant::now();
        sched.wait_next_tick().unwrap();
        // Overrun tick returns immediately instead of burning the backlog.
        assert!(t.elapsed() < Duration::from_millis(3));
        // Cadence re-anchored: the following tick waits a full-ish period.
        let t = Instant::now();
        sched.wait_next_tick().unwrap();
        assert!(t.elapsed() >= Duration::from_millis(2));
    }

    #[test]
    fn loop_stops_cleanly_on_disconnect() {
        let samples = vec![DeviceSample::default(); 3];
        let device = SimDevice::scripted(samples);
        let forces = device.force_log();
        let closed = device.closed_flag();

        let field = ForceField::from_fixtures(
            &[Fixture::SphereWell {
                center: Vec3::new(0.0, -0.14, 0.2),
                radius: 0.1,
                stiffness: 200.0,
            }],
            0.0,
        )
        .unwrap();

        let mut cl = ControlLoop::new(Box::new(device), field, test_options(100));
        let running = AtomicBool::new(true);
        let err = cl.run(&running).unwrap_err();
        assert!(matches!(err, CycleError::Device(_)));
        assert_eq!(cl.state(), LoopState::Stopped);
        assert!(closed.load(Ordering::Relaxed), "handle must be released");

        // 3 good exchanges plus the failing one; the very first delivered
        // the zero force.
        let log = forces.lock();
        assert_eq!(log.len(), 4);
        assert_eq!(log[0], Vec3::ZERO);
        assert_eq!(cl.stats().cycle_count, 3);
    }

    #[test]
    fn continuous_relay_writes_mapped_waypoint() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("waypoint.json");

        // Device parked at the mapping midpoint.
        let sample = DeviceSample {
            position: Vec3::new(0.0, 0.0, 0.1),
            velocity: Vec3::ZERO,
        };
        let device = SimDevice::scripted(vec![sample; 2]);

        let mut cl = ControlLoop::new(
            Box::new(device),
            ForceField::new(0.0),
            test_options(100),
        );
        cl.attach_relay(
            RelayTarget::File(WaypointWriter::new(&path)),
            RelayMode::Continuous,
        );

        let running = AtomicBool::new(true);
        let _ = cl.run(&running);
        assert_eq!(cl.stats().relayed, 2);

        let content = std::fs::read_to_string(&path).unwrap();
        let v: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(v["x"], 275);
        assert_eq!(v["y"], 25);
        assert_eq!(v["z"], 125);
    }

    #[test]
    fn triggered_relay_is_inert_without_trigger() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("waypoint.json");

        let device = SimDevice::scripted(vec![DeviceSample::default(); 3]);
        let mut cl = ControlLoop::new(
            Box::new(device),
            ForceField::new(0.0),
            test_options(100),
        );
        cl.attach_relay(
            RelayTarget::File(WaypointWriter::new(&path)),
            RelayMode::Triggered,
        );

        let running = AtomicBool::new(true);
        let _ = cl.run(&running);
        assert_eq!(cl.stats().relayed, 0);
        assert!(!path.exists());
    }
}
