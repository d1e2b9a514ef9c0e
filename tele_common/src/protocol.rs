//! JSON wire protocol for the command channel.
//!
//! One UTF-8 JSON object per line. Recognized request shapes, tried in
//! order (reset and status checks take precedence over motion, matching the
//! receiver's dispatch order):
//!
//! - Reset: `{"reset": true}`
//! - Status query: `{"status": true}`
//! - Motion: `{"x": N, "y": N, "z": N}` with optional `roll` (180),
//!   `pitch` (0), `yaw` (0), and `speed` (100)
//!
//! Replies are `{"status": "..."}` on success/info and `{"error": "..."}`
//! on decode or dispatch failure.

use crate::math::Vec3;
use crate::pose::{
    DEFAULT_PITCH, DEFAULT_ROLL, DEFAULT_SPEED, DEFAULT_YAW, MotionCommand, Pose,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Wire protocol decode/encode errors.
#[derive(Debug, Clone, Error)]
pub enum ProtocolError {
    /// Payload is not valid JSON or matches no recognized shape.
    #[error("invalid JSON")]
    Malformed,

    /// Serialization failed (should not happen for well-formed values).
    #[error("encode failed: {0}")]
    Encode(String),
}

fn default_roll() -> f64 {
    DEFAULT_ROLL
}

fn default_pitch() -> f64 {
    DEFAULT_PITCH
}

fn default_yaw() -> f64 {
    DEFAULT_YAW
}

fn default_speed() -> f64 {
    DEFAULT_SPEED
}

/// Motion request body. `x`, `y`, `z` are required; orientation and speed
/// fall back to the documented defaults.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotionRequest {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    #[serde(default = "default_roll")]
    pub roll: f64,
    #[serde(default = "default_pitch")]
    pub pitch: f64,
    #[serde(default = "default_yaw")]
    pub yaw: f64,
    #[serde(default = "default_speed")]
    pub speed: f64,
}

impl MotionRequest {
    /// Build the wire request for a motion command.
    pub fn from_command(cmd: &MotionCommand) -> Self {
        Self {
            x: cmd.pose.position.x,
            y: cmd.pose.position.y,
            z: cmd.pose.position.z,
            roll: cmd.pose.roll,
            pitch: cmd.pose.pitch,
            yaw: cmd.pose.yaw,
            speed: cmd.speed,
        }
    }

    /// Resolve into a [`MotionCommand`] (defaults already applied).
    pub fn command(&self) -> MotionCommand {
        MotionCommand {
            pose: Pose {
                position: Vec3::new(self.x, self.y, self.z),
                roll: self.roll,
                pitch: self.pitch,
                yaw: self.yaw,
            },
            speed: self.speed,
        }
    }
}

/// A decoded channel request.
///
/// Untagged: variant order is the dispatch precedence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChannelMessage {
    /// `{"reset": true}` — recover and move to the safe pose.
    Reset { reset: bool },
    /// `{"status": true}` — query manipulator status.
    StatusQuery { status: bool },
    /// Target pose for the manipulator.
    Motion(MotionRequest),
}

impl ChannelMessage {
    /// Decode one message line.
    pub fn from_line(line: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(line.trim()).map_err(|_| ProtocolError::Malformed)
    }

    /// Encode as a newline-terminated JSON line.
    pub fn to_line(&self) -> Result<String, ProtocolError> {
        let mut s =
            serde_json::to_string(self).map_err(|e| ProtocolError::Encode(e.to_string()))?;
        s.push('\n');
        Ok(s)
    }
}

/// Reply sent back for every non-throttled request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Reply {
    Status { status: String },
    Error { error: String },
}

impl Reply {
    pub fn status(msg: impl Into<String>) -> Self {
        Self::Status { status: msg.into() }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self::Error { error: msg.into() }
    }

    /// Encode as a newline-terminated JSON line.
    pub fn to_line(&self) -> Result<String, ProtocolError> {
        let mut s =
            serde_json::to_string(self).map_err(|e| ProtocolError::Encode(e.to_string()))?;
        s.push('\n');
        Ok(s)
    }

    /// Decode one reply line.
    pub fn from_line(line: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(line.trim()).map_err(|_| ProtocolError::Malformed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn motion_with_defaults() {
        let msg = ChannelMessage::from_line(r#"{"x":260,"y":10,"z":120}"#).unwrap();
        let ChannelMessage::Motion(req) = msg else {
            panic!("expected motion");
        };
        assert_eq!(req.x, 260.0);
        assert_eq!(req.roll, 180.0);
        assert_eq!(req.pitch, 0.0);
        assert_eq!(req.yaw, 0.0);
        assert_eq!(req.speed, 100.0);
    }

    #[test]
    fn motion_with_explicit_fields() {
        let msg =
            ChannelMessage::from_line(r#"{"x":1,"y":2,"z":3,"roll":90,"pitch":5,"yaw":45,"speed":30}"#)
                .unwrap();
        let ChannelMessage::Motion(req) = msg else {
            panic!("expected motion");
        };
        let cmd = req.command();
        assert_eq!(cmd.pose.roll, 90.0);
        assert_eq!(cmd.pose.yaw, 45.0);
        assert_eq!(cmd.speed, 30.0);
    }

    #[test]
    fn motion_missing_axis_is_malformed() {
        assert!(ChannelMessage::from_line(r#"{"x":1,"y":2}"#).is_err());
    }

    #[test]
    fn reset_and_status_take_precedence() {
        assert_eq!(
            ChannelMessage::from_line(r#"{"reset":true}"#).unwrap(),
            ChannelMessage::Reset { reset: true }
        );
        assert_eq!(
            ChannelMessage::from_line(r#"{"status":true}"#).unwrap(),
            ChannelMessage::StatusQuery { status: true }
        );
    }

    #[test]
    fn garbage_is_malformed() {
        assert!(ChannelMessage::from_line("not json").is_err());
        assert!(ChannelMessage::from_line("").is_err());
        assert!(ChannelMessage::from_line(r#"{"speed":50}"#).is_err());
    }

    #[test]
    fn line_roundtrip() {
        let cmd = MotionCommand::to_position(Vec3::new(260.0, 10.0, 120.0));
        let line = ChannelMessage::Motion(MotionRequest::from_command(&cmd))
            .to_line()
            .unwrap();
        assert!(line.ends_with('\n'));
        let back = ChannelMessage::from_line(&line).unwrap();
        let ChannelMessage::Motion(req) = back else {
            panic!("expected motion");
        };
        assert_eq!(req.command(), cmd);
    }

    #[test]
    fn reply_shapes() {
        let ok = Reply::status("moved").to_line().unwrap();
        assert_eq!(ok.trim(), r#"{"status":"moved"}"#);
        let err = Reply::error("invalid JSON").to_line().unwrap();
        assert_eq!(err.trim(), r#"{"error":"invalid JSON"}"#);
        assert_eq!(Reply::from_line(&ok).unwrap(), Reply::status("moved"));
    }
}
