//! Relay server configuration.
//!
//! ```toml
//! [shared]
//! service_name = "tele-arm-lab-01"
//!
//! [server]
//! host = "0.0.0.0"
//! port = 5005
//!
//! [arm]
//! ip = "192.168.1.188"
//!
//! [gate]
//! min_command_interval_ms = 2000
//! settle_unit_ms = 100
//!
//! [safe_pose]
//! x = 250.0
//! y = 0.0
//! z = 150.0
//! speed = 50.0
//!
//! [poller]
//! file = "haply_to_xarm.json"
//! interval_ms = 1000
//! speed = 50.0
//! ```

use crate::gate::GateSettings;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tele_common::config::{ConfigError, LogLevel, SharedConfig};
use tele_common::math::Vec3;
use tele_common::pose::{DEFAULT_PITCH, DEFAULT_ROLL, DEFAULT_YAW, MotionCommand, Pose};

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5005
}

fn default_arm_ip() -> String {
    "192.168.1.188".to_string()
}

fn default_min_interval_ms() -> u64 {
    2000
}

fn default_settle_unit_ms() -> u64 {
    100
}

fn default_safe_x() -> f64 {
    250.0
}

fn default_safe_z() -> f64 {
    150.0
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

fn default_safe_speed() -> f64 {
    50.0
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_poll_speed() -> f64 {
    50.0
}

/// Listener endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Manipulator controller endpoint (used by vendor drivers; the
/// simulation driver ignores it).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArmSection {
    #[serde(default = "default_arm_ip")]
    pub ip: String,
}

impl Default for ArmSection {
    fn default() -> Self {
        Self {
            ip: default_arm_ip(),
        }
    }
}

/// Safety gate tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateSection {
    /// Throttle window between accepted motion commands [ms].
    #[serde(default = "default_min_interval_ms")]
    pub min_command_interval_ms: u64,
    /// Base recovery settle pause [ms].
    #[serde(default = "default_settle_unit_ms")]
    pub settle_unit_ms: u64,
}

impl Default for GateSection {
    fn default() -> Self {
        Self {
            min_command_interval_ms: default_min_interval_ms(),
            settle_unit_ms: default_settle_unit_ms(),
        }
    }
}

/// Safe pose for reset commands.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafePoseSection {
    #[serde(default = "default_safe_x")]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default = "default_safe_z")]
    pub z: f64,
    #[serde(default = "default_roll")]
    pub roll: f64,
    #[serde(default = "default_pitch")]
    pub pitch: f64,
    #[serde(default = "default_yaw")]
    pub yaw: f64,
    #[serde(default = "default_safe_speed")]
    pub speed: f64,
}

impl Default for SafePoseSection {
    fn default() -> Self {
        Self {
            x: default_safe_x(),
            y: 0.0,
            z: default_safe_z(),
            roll: DEFAULT_ROLL,
            pitch: DEFAULT_PITCH,
            yaw: DEFAULT_YAW,
            speed: default_safe_speed(),
        }
    }
}

/// Waypoint poller section. Absent → no poller thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollerSection {
    pub file: PathBuf,
    #[serde(default = "default_poll_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_poll_speed")]
    pub speed: f64,
}

/// Full relay server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArmConfig {
    pub shared: SharedConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub arm: ArmSection,
    #[serde(default)]
    pub gate: GateSection,
    #[serde(default)]
    pub safe_pose: SafePoseSection,
    #[serde(default)]
    pub poller: Option<PollerSection>,
}

impl ArmConfig {
    /// Semantic validation after parse.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;

        if self.server.host.is_empty() {
            return Err(ConfigError::ValidationError(
                "server.host cannot be empty".to_string(),
            ));
        }
        if !self.safe_pose.speed.is_finite() || self.safe_pose.speed <= 0.0 {
            return Err(ConfigError::ValidationError(
                "safe_pose.speed must be positive".to_string(),
            ));
        }
        if let Some(poller) = &self.poller {
            if poller.interval_ms == 0 {
                return Err(ConfigError::ValidationError(
                    "poller.interval_ms must be positive".to_string(),
                ));
            }
            if !poller.speed.is_finite() || poller.speed <= 0.0 {
                return Err(ConfigError::ValidationError(
                    "poller.speed must be positive".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// `host:port` for the listener.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Build the gate settings from the config sections.
    pub fn gate_settings(&self) -> GateSettings {
        GateSettings {
            min_command_interval: Duration::from_millis(self.gate.min_command_interval_ms),
            settle_unit: Duration::from_millis(self.gate.settle_unit_ms),
            safe_pose: MotionCommand {
                pose: Pose {
                    position: Vec3::new(self.safe_pose.x, self.safe_pose.y, self.safe_pose.z),
                    roll: self.safe_pose.roll,
                    pitch: self.safe_pose.pitch,
                    yaw: self.safe_pose.yaw,
                },
                speed: self.safe_pose.speed,
            },
        }
    }

    /// Built-in configuration for driverless demo runs.
    pub fn simulation_default() -> Self {
        Self {
            shared: SharedConfig {
                log_level: LogLevel::Info,
                service_name: "tele-arm-sim".to_string(),
            },
            server: ServerConfig::default(),
            arm: ArmSection::default(),
            gate: GateSection::default(),
            safe_pose: SafePoseSection::default(),
            poller: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tele_common::config::ConfigLoader;

    #[test]
    fn simulation_default_is_valid() {
        ArmConfig::simulation_default().validate().unwrap();
    }

    #[test]
    fn minimal_toml_gets_defaults() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "[shared]\nservice_name = \"arm-test\"").unwrap();
        let cfg = ArmConfig::load(f.path()).unwrap();
        cfg.validate().unwrap();
        assert_eq!(cfg.listen_addr(), "0.0.0.0:5005");
        assert_eq!(cfg.gate.min_command_interval_ms, 2000);
        let settings = cfg.gate_settings();
        assert_eq!(settings.safe_pose.pose.position, Vec3::new(250.0, 0.0, 150.0));
        assert_eq!(settings.safe_pose.pose.roll, 180.0);
        assert!(cfg.poller.is_none());
    }

    #[test]
    fn poller_section_parses() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            f,
            "[shared]\nservice_name = \"arm-test\"\n\n[poller]\nfile = \"wp.json\"\ninterval_ms = 500"
        )
        .unwrap();
        let cfg = ArmConfig::load(f.path()).unwrap();
        cfg.validate().unwrap();
        let poller = cfg.poller.unwrap();
        assert_eq!(poller.interval_ms, 500);
        assert_eq!(poller.speed, 50.0);
    }

    #[test]
    fn zero_poll_interval_rejected() {
        let mut cfg = ArmConfig::simulation_default();
        cfg.poller = Some(PollerSection {
            file: PathBuf::from("wp.json"),
            interval_ms: 0,
            speed: 50.0,
        });
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn nonpositive_safe_speed_rejected() {
        let mut cfg = ArmConfig::simulation_default();
        cfg.safe_pose.speed = 0.0;
        assert!(cfg.validate().is_err());
    }
}
