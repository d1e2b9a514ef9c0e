//! Haptic console configuration.
//!
//! Loaded from a single TOML file via the shared [`ConfigLoader`] and
//! validated before anything touches the device.
//!
//! ```toml
//! [shared]
//! service_name = "tele-haptic-lab-01"
//!
//! [cycle]
//! period_us = 1000
//! damping = 2.0
//!
//! [mapping.device]
//! x = { min = -0.2, max = 0.2 }
//! y = { min = -0.2, max = 0.2 }
//! z = { min = 0.0, max = 0.2 }
//!
//! [mapping.arm]
//! x = { min = 250.0, max = 300.0 }
//! y = { min = 0.0, max = 50.0 }
//! z = { min = 100.0, max = 150.0 }
//!
//! [[fixtures]]
//! kind = "sphere_barrier"
//! center = { x = 0.0, y = -0.14, z = 0.2 }
//! radius = 0.08
//! stiffness = 100.0
//!
//! [relay]
//! mode = "triggered"
//! target = "tcp"
//! addr = "10.3.36.6:5005"
//! speed = 50.0
//! ```

use crate::cycle::RelayMode;
use crate::force::{Fixture, MAX_FIXTURES};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tele_common::config::{ConfigError, LogLevel, SharedConfig};
use tele_common::math::Vec3;
use tele_common::workspace::{AxisBounds, WorkspaceBounds};

/// Default cycle period: 1 kHz.
pub const DEFAULT_PERIOD_US: u64 = 1000;

fn default_period_us() -> u64 {
    DEFAULT_PERIOD_US
}

fn default_addr() -> String {
    "127.0.0.1:5005".to_string()
}

fn default_waypoint_file() -> PathBuf {
    PathBuf::from("haply_to_xarm.json")
}

fn default_relay_speed() -> f64 {
    50.0
}

/// Cycle timing and damping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleConfig {
    /// Loop period [µs].
    #[serde(default = "default_period_us")]
    pub period_us: u64,
    /// Velocity damping coefficient (0 disables).
    #[serde(default)]
    pub damping: f64,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            period_us: DEFAULT_PERIOD_US,
            damping: 0.0,
        }
    }
}

/// Device and manipulator workspace bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingConfig {
    /// Haptic device workspace [m].
    pub device: WorkspaceBounds,
    /// Manipulator workspace [mm].
    pub arm: WorkspaceBounds,
}

/// Transport carrying the mapped pose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelayTargetKind {
    /// Command channel over TCP.
    Tcp,
    /// Waypoint hand-off file.
    File,
}

/// Relay section. Absent → the loop renders forces only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelaySection {
    #[serde(default)]
    pub mode: RelayMode,
    pub target: RelayTargetKind,
    /// Receiver address for `target = "tcp"`.
    #[serde(default = "default_addr")]
    pub addr: String,
    /// Keep one connection open instead of reconnecting per message.
    #[serde(default)]
    pub persistent: bool,
    /// Hand-off path for `target = "file"`.
    #[serde(default = "default_waypoint_file")]
    pub waypoint_file: PathBuf,
    /// Speed attached to relayed motion commands.
    #[serde(default = "default_relay_speed")]
    pub speed: f64,
}

/// Full haptic console configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HapticConfig {
    pub shared: SharedConfig,
    #[serde(default)]
    pub cycle: CycleConfig,
    pub mapping: MappingConfig,
    #[serde(default)]
    pub fixtures: Vec<Fixture>,
    #[serde(default)]
    pub relay: Option<RelaySection>,
}

impl HapticConfig {
    /// Semantic validation after parse.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;

        if self.cycle.period_us == 0 {
            return Err(ConfigError::ValidationError(
                "cycle.period_us must be positive".to_string(),
            ));
        }
        if !self.cycle.damping.is_finite() || self.cycle.damping < 0.0 {
            return Err(ConfigError::ValidationError(
                "cycle.damping must be finite and non-negative".to_string(),
            ));
        }

        self.mapping.device.validate("mapping.device")?;
        self.mapping.arm.validate("mapping.arm")?;

        if self.fixtures.len() > MAX_FIXTURES {
            return Err(ConfigError::ValidationError(format!(
                "at most {MAX_FIXTURES} fixtures supported, got {}",
                self.fixtures.len()
            )));
        }
        for (i, fixture) in self.fixtures.iter().enumerate() {
            validate_fixture(i, fixture)?;
        }

        if let Some(relay) = &self.relay {
            if !relay.speed.is_finite() || relay.speed <= 0.0 {
                return Err(ConfigError::ValidationError(
                    "relay.speed must be positive".to_string(),
                ));
            }
            if relay.target == RelayTargetKind::Tcp && relay.addr.is_empty() {
                return Err(ConfigError::ValidationError(
                    "relay.addr cannot be empty for tcp target".to_string(),
                ));
            }
        }

        Ok(())
    }

    /// Built-in configuration for driverless demo runs: a sphere barrier
    /// at the workspace center, no relay.
    pub fn simulation_default() -> Self {
        Self {
            shared: SharedConfig {
                log_level: LogLevel::Info,
                service_name: "tele-haptic-sim".to_string(),
            },
            cycle: CycleConfig::default(),
            mapping: MappingConfig {
                device: WorkspaceBounds::new(
                    AxisBounds::new(-0.2, 0.2),
                    AxisBounds::new(-0.2, 0.2),
                    AxisBounds::new(0.0, 0.2),
                ),
                arm: WorkspaceBounds::new(
                    AxisBounds::new(250.0, 300.0),
                    AxisBounds::new(0.0, 50.0),
                    AxisBounds::new(100.0, 150.0),
                ),
            },
            fixtures: vec![Fixture::SphereBarrier {
                center: Vec3::new(0.0, -0.14, 0.2),
                radius: 0.08,
                stiffness: 100.0,
            }],
            relay: None,
        }
    }
}

fn finite(v: f64) -> bool {
    v.is_finite()
}

fn validate_fixture(index: usize, fixture: &Fixture) -> Result<(), ConfigError> {
    let bad = |what: &str| {
        Err(ConfigError::ValidationError(format!(
            "fixtures[{index}]: {what}"
        )))
    };
    match *fixture {
        Fixture::SphereBarrier {
            center,
            radius,
            stiffness,
        }
        | Fixture::SphereWell {
            center,
            radius,
            stiffness,
        } => {
            if !(finite(center.x) && finite(center.y) && finite(center.z)) {
                return bad("center must be finite");
            }
            if !finite(radius) || radius < 0.0 {
                return bad("radius must be finite and non-negative");
            }
            if !finite(stiffness) || stiffness < 0.0 {
                return bad("stiffness must be finite and non-negative");
            }
        }
        Fixture::BoxContainment {
            center,
            half_extents,
            stiffness,
        } => {
            if !(finite(center.x) && finite(center.y) && finite(center.z)) {
                return bad("center must be finite");
            }
            if !(finite(half_extents.x) && finite(half_extents.y) && finite(half_extents.z)) {
                return bad("half_extents must be finite");
            }
            if half_extents.x < 0.0 || half_extents.y < 0.0 || half_extents.z < 0.0 {
                return bad("half_extents must be non-negative");
            }
            if !finite(stiffness) || stiffness < 0.0 {
                return bad("stiffness must be finite and non-negative");
            }
        }
    }
    Ok(())
}
