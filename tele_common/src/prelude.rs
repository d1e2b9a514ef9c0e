//! Common re-exports for convenience.

pub use crate::arm::{ArmDriver, ArmError, ArmState, MotionOutcome};
pub use crate::config::{ConfigError, ConfigLoader, LogLevel, SharedConfig};
pub use crate::haptic::{DeviceError, DeviceInfo, DeviceSample, HapticDevice};
pub use crate::math::Vec3;
pub use crate::pose::{MotionCommand, Pose};
pub use crate::protocol::{ChannelMessage, MotionRequest, ProtocolError, Reply};
pub use crate::workspace::{AxisBounds, WorkspaceBounds};
