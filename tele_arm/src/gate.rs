//! Safety gate around every manipulator motion command.
//!
//! The gate owns the single authoritative "safe to command motion" view
//! for one manipulator connection. Callers share it behind a mutex; the
//! whole check-state → recover → dispatch sequence runs under that lock so
//! two connections can never race into conflicting recovery/dispatch
//! sequences.
//!
//! Fault handling is drop-and-report: when a dispatch finds the
//! manipulator in an error state, the recovery sequence runs and the
//! triggering command is refused, never retried.

use std::time::{Duration, Instant};
use tele_common::arm::{ArmDriver, ArmError, ArmState, MotionOutcome};
use tele_common::math::Vec3;
use tele_common::pose::{MotionCommand, Pose};
use tracing::{debug, error, info, warn};

/// Gate tuning knobs.
#[derive(Debug, Clone)]
pub struct GateSettings {
    /// Minimum spacing between accepted motion commands. Arrivals inside
    /// the window are dropped silently.
    pub min_command_interval: Duration,
    /// Base unit for recovery settle pauses (the sequence sleeps small
    /// multiples of this). Zero disables settling — tests only.
    pub settle_unit: Duration,
    /// Pose commanded by [`SafetyGate::reset_to_safe`].
    pub safe_pose: MotionCommand,
}

impl Default for GateSettings {
    fn default() -> Self {
        Self {
            min_command_interval: Duration::from_secs(2),
            settle_unit: Duration::from_millis(100),
            safe_pose: MotionCommand {
                pose: Pose::at(Vec3::new(250.0, 0.0, 150.0)),
                speed: 50.0,
            },
        }
    }
}

/// What happened to a submitted motion command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchResult {
    /// The command reached the driver (or was refused after recovery);
    /// see the outcome.
    Dispatched(MotionOutcome),
    /// Dropped by rate limiting. No reply is owed for these.
    Throttled,
}

/// State machine wrapping every manipulator motion command.
pub struct SafetyGate {
    arm: Box<dyn ArmDriver>,
    settings: GateSettings,
    last_accepted: Option<Instant>,
}

impl SafetyGate {
    pub fn new(arm: Box<dyn ArmDriver>, settings: GateSettings) -> Self {
        Self {
            arm,
            settings,
            last_accepted: None,
        }
    }

    /// Connect and bring the manipulator into position-control mode.
    pub fn init(&mut self) -> Result<(), ArmError> {
        self.arm.connect()?;
        self.arm.motion_enable(true)?;
        self.arm.set_mode(0)?;
        self.arm.set_state(0)?;
        self.settle(10);
        info!("manipulator enabled, position-control mode");
        Ok(())
    }

    /// Dispatch one motion command through the full guard sequence:
    /// throttle → state check (recovery on fault) → driver dispatch.
    ///
    /// `set_position` waits for motion completion, so this call can block
    /// for seconds.
    pub fn dispatch(&mut self, cmd: &MotionCommand) -> Result<DispatchResult, ArmError> {
        if let Some(last) = self.last_accepted {
            if last.elapsed() < self.settings.min_command_interval {
                debug!("throttling: command inside the minimum interval, dropped");
                return Ok(DispatchResult::Throttled);
            }
        }

        let state = match self.arm.get_state() {
            Ok(s) => s,
            Err(e) => return Err(self.recover_after(e)),
        };
        if state.is_fault() {
            let (error_code, warn_code) = match self.arm.get_err_warn_code() {
                Ok(codes) => codes,
                Err(e) => return Err(self.recover_after(e)),
            };
            warn!(
                "manipulator fault: state={state}, error={error_code}, warn={warn_code}; \
                 recovering and dropping the command"
            );
            self.recover()?;
            return Ok(DispatchResult::Dispatched(MotionOutcome::Fault {
                state,
                error_code,
            }));
        }

        self.last_accepted = Some(Instant::now());
        match self.arm.set_position(cmd, true) {
            Ok(0) => Ok(DispatchResult::Dispatched(MotionOutcome::Success)),
            Ok(code) => {
                // Warning, not a fault: motion may have partially
                // completed. Reported upward, no recovery.
                let codes = self.arm.get_err_warn_code().unwrap_or((0, 0));
                warn!(
                    "set_position returned {code} (error={}, warn={})",
                    codes.0, codes.1
                );
                Ok(DispatchResult::Dispatched(MotionOutcome::Warning(code)))
            }
            Err(e) => Err(self.recover_after(e)),
        }
    }

    /// Recover (if faulted) and move to the configured safe pose.
    ///
    /// Returns a human-readable status string.
    pub fn reset_to_safe(&mut self) -> Result<String, ArmError> {
        let state = match self.arm.get_state() {
            Ok(s) => s,
            Err(e) => return Err(self.recover_after(e)),
        };
        if state.is_fault() {
            let (error_code, _) = self.arm.get_err_warn_code().unwrap_or((0, 0));
            info!("reset: clearing fault state {state} (code {error_code})");
            self.recover()?;
        }

        let safe_pose = self.settings.safe_pose;
        match self.arm.set_position(&safe_pose, true) {
            Ok(0) => Ok("Arm reset successful".to_string()),
            Ok(code) => Ok(format!("Reset completed with warning code: {code}")),
            Err(e) => Err(self.recover_after(e)),
        }
    }

    /// Human-readable status: reported state plus any non-zero codes.
    pub fn status(&mut self) -> Result<String, ArmError> {
        let state = self.arm.get_state()?;
        let (error_code, warn_code) = self.arm.get_err_warn_code()?;

        let mut status = format!("State: {state}");
        if error_code != 0 {
            status.push_str(&format!("\nError Code: {error_code}"));
        }
        if warn_code != 0 {
            status.push_str(&format!("\nWarning Code: {warn_code}"));
        }
        Ok(status)
    }

    /// Current reported state.
    pub fn state(&mut self) -> Result<ArmState, ArmError> {
        self.arm.get_state()
    }

    /// The recovery sequence: clear error, clear warning, re-enable
    /// motion, position-control mode, state ready — each step given time
    /// to settle before the next.
    pub fn recover(&mut self) -> Result<(), ArmError> {
        info!("recovery: clearing errors and re-enabling motion");
        self.arm.clean_error()?;
        self.settle(5);
        self.arm.clean_warn()?;
        self.settle(1);
        self.arm.motion_enable(true)?;
        self.settle(2);
        self.arm.set_mode(0)?;
        self.settle(1);
        self.arm.set_state(0)?;
        self.settle(5);
        Ok(())
    }

    /// Driver call blew up (not a bad return code): log, recover, hand the
    /// original error back to the caller.
    fn recover_after(&mut self, e: ArmError) -> ArmError {
        error!("driver call failed: {e}; running recovery");
        if let Err(re) = self.recover() {
            error!("recovery failed: {re}");
        }
        e
    }

    fn settle(&self, units: u32) {
        let pause = self.settings.settle_unit * units;
        if !pause.is_zero() {
            std::thread::sleep(pause);
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
