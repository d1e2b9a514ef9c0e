//! Workspace bounds and the device→manipulator coordinate mapper.
//!
//! Maps a point from one axis-aligned workspace region into another:
//! per-axis clamp to the source range, then linear rescale into the target
//! range. Total function — a degenerate source axis (`min == max`) maps
//! every input to the target minimum instead of dividing by zero.

use crate::config::ConfigError;
use crate::math::Vec3;
use serde::{Deserialize, Serialize};

/// Reachable range of one spatial axis.
///
/// Invariant: `min <= max`. Enforced by [`AxisBounds::validate`] at config
/// load; `min == max` is a valid degenerate range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisBounds {
    pub min: f64,
    pub max: f64,
}

impl AxisBounds {
    #[inline]
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Clamp `value` into this range, then rescale into `target`.
    ///
    /// A degenerate source range maps every input to `target.min`.
    #[inline]
    pub fn map_to(&self, value: f64, target: &AxisBounds) -> f64 {
        let span = self.max - self.min;
        if span == 0.0 {
            return target.min;
        }
        let clamped = value.clamp(self.min, self.max);
        target.min + (clamped - self.min) * (target.max - target.min) / span
    }

    /// Check the `min <= max` invariant.
    pub fn validate(&self, axis: &str) -> Result<(), ConfigError> {
        if !(self.min <= self.max) {
            return Err(ConfigError::ValidationError(format!(
                "axis {axis}: min ({}) must not exceed max ({})",
                self.min, self.max
            )));
        }
        Ok(())
    }
}

/// Axis-aligned 3-D workspace region.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceBounds {
    pub x: AxisBounds,
    pub y: AxisBounds,
    pub z: AxisBounds,
}

impl WorkspaceBounds {
    pub const fn new(x: AxisBounds, y: AxisBounds, z: AxisBounds) -> Self {
        Self { x, y, z }
    }

    /// Map `point` from this workspace into `target`, per-axis.
    #[inline]
    pub fn map(&self, point: Vec3, target: &WorkspaceBounds) -> Vec3 {
        Vec3::new(
            self.x.map_to(point.x, &target.x),
            self.y.map_to(point.y, &target.y),
            self.z.map_to(point.z, &target.z),
        )
    }

    pub fn validate(&self, name: &str) -> Result<(), ConfigError> {
        self.x.validate(&format!("{name}.x"))?;
        self.y.validate(&format!("{name}.y"))?;
        self.z.validate(&format!("{name}.z"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device_bounds() -> WorkspaceBounds {
        WorkspaceBounds::new(
            AxisBounds::new(-0.2, 0.2),
            AxisBounds::new(-0.2, 0.2),
            AxisBounds::new(0.0, 0.2),
        )
    }

    fn arm_bounds() -> WorkspaceBounds {
        WorkspaceBounds::new(
            AxisBounds::new(250.0, 300.0),
            AxisBounds::new(0.0, 50.0),
            AxisBounds::new(100.0, 150.0),
        )
    }

    #[test]
    fn midpoint_maps_to_midpoint() {
        let mapped = device_bounds().map(Vec3::new(0.0, 0.0, 0.1), &arm_bounds());
        assert_eq!(mapped, Vec3::new(275.0, 25.0, 125.0));
    }

    #[test]
    fn endpoints_map_exactly() {
        let d = device_bounds();
        let a = arm_bounds();
        let lo = d.map(Vec3::new(-0.2, -0.2, 0.0), &a);
        let hi = d.map(Vec3::new(0.2, 0.2, 0.2), &a);
        assert_eq!(lo, Vec3::new(250.0, 0.0, 100.0));
        assert_eq!(hi, Vec3::new(300.0, 50.0, 150.0));
    }

    #[test]
    fn out_of_range_input_is_clamped() {
        let d = device_bounds();
        let a = arm_bounds();
        let below = d.map(Vec3::new(-10.0, -10.0, -10.0), &a);
        let above = d.map(Vec3::new(10.0, 10.0, 10.0), &a);
        assert_eq!(below, Vec3::new(250.0, 0.0, 100.0));
        assert_eq!(above, Vec3::new(300.0, 50.0, 150.0));
    }

    #[test]
    fn output_always_within_target() {
        let d = device_bounds();
        let a = arm_bounds();
        for i in -30..30 {
            let p = Vec3::new(i as f64 * 0.03, i as f64 * -0.07, i as f64 * 0.05);
            let m = d.map(p, &a);
            assert!(m.x >= a.x.min && m.x <= a.x.max);
            assert!(m.y >= a.y.min && m.y <= a.y.max);
            assert!(m.z >= a.z.min && m.z <= a.z.max);
        }
    }

    #[test]
    fn degenerate_source_axis_yields_target_min() {
        let src = AxisBounds::new(0.5, 0.5);
        let dst = AxisBounds::new(100.0, 200.0);
        assert_eq!(src.map_to(0.5, &dst), 100.0);
        assert_eq!(src.map_to(99.0, &dst), 100.0);
    }

    #[test]
    fn inverted_bounds_rejected() {
        let b = AxisBounds::new(1.0, -1.0);
        assert!(b.validate("x").is_err());
    }

    #[test]
    fn nan_bound_rejected() {
        let b = AxisBounds::new(f64::NAN, 1.0);
        assert!(b.validate("x").is_err());
    }
}
