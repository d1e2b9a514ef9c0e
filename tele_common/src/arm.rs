//! Manipulator driver contract, reported states, and motion outcomes.
//!
//! [`ArmState`] mirrors the manipulator's own state reporting — the bridge
//! interprets these states, it never invents them. [`MotionOutcome`] is the
//! result type for a guarded dispatch: success, warning return code, or a
//! fault that triggered recovery.

use crate::pose::{MotionCommand, Pose};
use std::fmt;
use thiserror::Error;

/// Error types for manipulator driver calls.
///
/// These are transport/driver-level failures, distinct from the fault
/// *states* the manipulator reports through [`ArmState`].
#[derive(Debug, Clone, Error)]
pub enum ArmError {
    /// Could not reach the controller.
    #[error("manipulator connection failed: {0}")]
    Connection(String),

    /// A driver call failed outright (not a non-zero return code).
    #[error("manipulator driver error: {0}")]
    Driver(String),
}

/// Manipulator-reported state.
///
/// Raw codes follow the vendor controller: 1 ready, 2 paused, 3 stopped on
/// error, 4 stopped on collision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ArmState {
    /// Ready to accept motion.
    Ready = 1,
    /// Paused by the operator or controller.
    Paused = 2,
    /// Stopped on a controller-detected error.
    ErrorStopped = 3,
    /// Stopped on a collision.
    ErrorCollision = 4,
}

impl ArmState {
    /// Convert from the raw controller code. Returns `None` for codes the
    /// bridge does not interpret.
    #[inline]
    pub const fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(Self::Ready),
            2 => Some(Self::Paused),
            3 => Some(Self::ErrorStopped),
            4 => Some(Self::ErrorCollision),
            _ => None,
        }
    }

    /// Whether this state blocks motion until recovery runs.
    #[inline]
    pub const fn is_fault(&self) -> bool {
        matches!(self, Self::ErrorStopped | Self::ErrorCollision)
    }
}

impl fmt::Display for ArmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Ready => "Ready",
            Self::Paused => "Paused",
            Self::ErrorStopped => "Error (stopped)",
            Self::ErrorCollision => "Error (collision)",
        };
        f.write_str(s)
    }
}

/// Outcome of one guarded motion dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionOutcome {
    /// Motion completed, return code 0.
    Success,
    /// Non-zero return code; motion may have partially completed.
    /// Reported, never escalated to recovery.
    Warning(i32),
    /// The manipulator was faulted; recovery ran and the command was
    /// dropped.
    Fault {
        state: ArmState,
        error_code: i32,
    },
}

impl MotionOutcome {
    #[inline]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// Interface for manipulator drivers.
///
/// `set_position` with `wait = true` blocks for the physical motion — may
/// be seconds. Callers must tolerate the long synchronous call; no
/// cancellation is propagated into an in-flight motion.
pub trait ArmDriver: Send {
    /// Establish the controller connection.
    fn connect(&mut self) -> Result<(), ArmError>;

    /// Enable or disable motion.
    fn motion_enable(&mut self, enable: bool) -> Result<(), ArmError>;

    /// Set control mode (0 = position control).
    fn set_mode(&mut self, mode: i32) -> Result<(), ArmError>;

    /// Set controller state (0 = ready).
    fn set_state(&mut self, state: i32) -> Result<(), ArmError>;

    /// Command an absolute pose. Returns the controller return code
    /// (0 = success, non-zero = warning).
    fn set_position(&mut self, cmd: &MotionCommand, wait: bool) -> Result<i32, ArmError>;

    /// Read the current Cartesian pose.
    fn get_position(&mut self) -> Result<Pose, ArmError>;

    /// Read the reported state.
    fn get_state(&mut self) -> Result<ArmState, ArmError>;

    /// Read the `(error_code, warn_code)` pair.
    fn get_err_warn_code(&mut self) -> Result<(i32, i32), ArmError>;

    /// Clear the error flag.
    fn clean_error(&mut self) -> Result<(), ArmError>;

    /// Clear the warning flag.
    fn clean_warn(&mut self) -> Result<(), ArmError>;

    /// Controller-level reset.
    fn reset(&mut self, wait: bool) -> Result<(), ArmError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_codes_roundtrip() {
        for (code, state) in [
            (1, ArmState::Ready),
            (2, ArmState::Paused),
            (3, ArmState::ErrorStopped),
            (4, ArmState::ErrorCollision),
        ] {
            assert_eq!(ArmState::from_code(code), Some(state));
        }
        assert_eq!(ArmState::from_code(0), None);
        assert_eq!(ArmState::from_code(22), None);
    }

    #[test]
    fn fault_states() {
        assert!(!ArmState::Ready.is_fault());
        assert!(!ArmState::Paused.is_fault());
        assert!(ArmState::ErrorStopped.is_fault());
        assert!(ArmState::ErrorCollision.is_fault());
    }

    #[test]
    fn state_display_matches_status_text() {
        assert_eq!(ArmState::Ready.to_string(), "Ready");
        assert_eq!(ArmState::ErrorCollision.to_string(), "Error (collision)");
    }

    #[test]
    fn outcome_success_check() {
        assert!(MotionOutcome::Success.is_success());
        assert!(!MotionOutcome::Warning(9).is_success());
        assert!(
            !MotionOutcome::Fault {
                state: ArmState::ErrorStopped,
                error_code: 35,
            }
            .is_success()
        );
    }
}
