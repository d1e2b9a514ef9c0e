//! Cartesian pose and motion command types.

use crate::math::Vec3;
use serde::{Deserialize, Serialize};

/// Default tool orientation: gripper pointing straight down.
pub const DEFAULT_ROLL: f64 = 180.0;
/// Default pitch [deg].
pub const DEFAULT_PITCH: f64 = 0.0;
/// Default yaw [deg].
pub const DEFAULT_YAW: f64 = 0.0;
/// Default motion speed [manipulator units/s].
pub const DEFAULT_SPEED: f64 = 100.0;

/// A Cartesian pose: position plus roll/pitch/yaw in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub position: Vec3,
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
}

impl Pose {
    /// Pose at `position` with the default tool orientation.
    pub const fn at(position: Vec3) -> Self {
        Self {
            position,
            roll: DEFAULT_ROLL,
            pitch: DEFAULT_PITCH,
            yaw: DEFAULT_YAW,
        }
    }
}

/// A target pose plus speed, consumed exactly once per successful dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotionCommand {
    pub pose: Pose,
    pub speed: f64,
}

impl MotionCommand {
    /// Command to `position` with default orientation and speed.
    pub const fn to_position(position: Vec3) -> Self {
        Self {
            pose: Pose::at(position),
            speed: DEFAULT_SPEED,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_orientation() {
        let cmd = MotionCommand::to_position(Vec3::new(250.0, 0.0, 150.0));
        assert_eq!(cmd.pose.roll, 180.0);
        assert_eq!(cmd.pose.pitch, 0.0);
        assert_eq!(cmd.pose.yaw, 0.0);
        assert_eq!(cmd.speed, 100.0);
    }
}
