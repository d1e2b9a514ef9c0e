//! Simulated manipulator driver.
//!
//! Stands in for the vendor controller during tests and `--driver
//! simulation` runs. Records every call in order so tests can assert the
//! exact guard/recovery sequence.

use parking_lot::Mutex;
use std::sync::Arc;
use tele_common::arm::{ArmDriver, ArmError, ArmState};
use tele_common::math::Vec3;
use tele_common::pose::{MotionCommand, Pose};

/// Simulated manipulator with a recorded call log.
pub struct SimArm {
    state: ArmState,
    error_code: i32,
    warn_code: i32,
    set_position_code: i32,
    set_position_failure: Option<String>,
    pose: Pose,
    calls: Arc<Mutex<Vec<String>>>,
}

impl SimArm {
    /// Healthy arm in Ready state.
    pub fn new() -> Self {
        Self {
            state: ArmState::Ready,
            error_code: 0,
            warn_code: 0,
            set_position_code: 0,
            set_position_failure: None,
            pose: Pose::at(Vec3::new(250.0, 0.0, 150.0)),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Arm starting in a fault state with the given error code.
    pub fn faulted(state: ArmState, error_code: i32) -> Self {
        let mut arm = Self::new();
        arm.state = state;
        arm.error_code = error_code;
        arm
    }

    /// Make `set_position` return this code instead of 0.
    pub fn with_return_code(mut self, code: i32) -> Self {
        self.set_position_code = code;
        self
    }

    /// Set the reported warning code.
    pub fn with_warn_code(mut self, code: i32) -> Self {
        self.warn_code = code;
        self
    }

    /// Make `set_position` fail at the driver level.
    pub fn failing_set_position(mut self, reason: &str) -> Self {
        self.set_position_failure = Some(reason.to_string());
        self
    }

    /// Shared handle to the recorded call sequence.
    pub fn call_log(&self) -> Arc<Mutex<Vec<String>>> {
        self.calls.clone()
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().push(call.into());
    }
}

impl Default for SimArm {
    fn default() -> Self {
        Self::new()
    }
}

impl ArmDriver for SimArm {
    fn connect(&mut self) -> Result<(), ArmError> {
        self.record("connect");
        Ok(())
    }

    fn motion_enable(&mut self, enable: bool) -> Result<(), ArmError> {
        self.record(format!("motion_enable({enable})"));
        Ok(())
    }

    fn set_mode(&mut self, mode: i32) -> Result<(), ArmError> {
        self.record(format!("set_mode({mode})"));
        Ok(())
    }

    fn set_state(&mut self, state: i32) -> Result<(), ArmError> {
        self.record(format!("set_state({state})"));
        if state == 0 {
            // Commanding ready clears a fault, like the real controller
            // at the end of the recovery sequence.
            self.state = ArmState::Ready;
        }
        Ok(())
    }

    fn set_position(&mut self, cmd: &MotionCommand, _wait: bool) -> Result<i32, ArmError> {
        self.record(format!(
            "set_position({}, {}, {})",
            cmd.pose.position.x, cmd.pose.position.y, cmd.pose.position.z
        ));
        if let Some(reason) = &self.set_position_failure {
            return Err(ArmError::Driver(reason.clone()));
        }
        self.pose = cmd.pose;
        Ok(self.set_position_code)
    }

    fn get_position(&mut self) -> Result<Pose, ArmError> {
        self.record("get_position");
        Ok(self.pose)
    }

    fn get_state(&mut self) -> Result<ArmState, ArmError> {
        self.record("get_state");
        Ok(self.state)
    }

    fn get_err_warn_code(&mut self) -> Result<(i32, i32), ArmError> {
        self.record("get_err_warn_code");
        Ok((self.error_code, self.warn_code))
    }

    fn clean_error(&mut self) -> Result<(), ArmError> {
        self.record("clean_error");
        self.error_code = 0;
        Ok(())
    }

    fn clean_warn(&mut self) -> Result<(), ArmError> {
        self.record("clean_warn");
        self.warn_code = 0;
        Ok(())
    }

    fn reset(&mut self, _wait: bool) -> Result<(), ArmError> {
        self.record("reset");
        self.state = ArmState::Ready;
        self.error_code = 0;
        self.warn_code = 0;
        Ok(())
    }
}
