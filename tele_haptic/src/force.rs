//! Virtual fixtures and the force-field engine.
//!
//! Each fixture kind is a pure function from the current end-effector
//! position to a restoring force; the engine sums all configured fixtures
//! plus velocity damping per tick. No fixture observes another's output,
//! so summation order is irrelevant.
//!
//! All functions are total over real-valued inputs. A zero or near-zero
//! radius/half-extent is a valid degenerate configuration: the epsilon
//! guard sits on the distance in the divisor, never on the radius.

use serde::{Deserialize, Serialize};
use tele_common::math::Vec3;
use thiserror::Error;

/// Maximum fixtures evaluated per tick (fixed capacity, no allocation in
/// the control loop).
pub const MAX_FIXTURES: usize = 8;

/// Small constant added to the distance before dividing, so the direction
/// stays finite arbitrarily close to a fixture center.
pub const DIRECTION_EPS: f64 = 1e-6;

/// Fallback direction used when the position coincides with a fixture
/// center and the outward direction is undefined.
pub const DEFAULT_FALLBACK_DIRECTION: Vec3 = Vec3::new(1.0, 0.0, 0.0);

/// Attempted to configure more than [`MAX_FIXTURES`] fixtures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("fixture limit exceeded (max {MAX_FIXTURES})")]
pub struct FixtureOverflow;

/// A virtual fixture: a programmatically rendered force field.
///
/// Constructed once from configuration, read-only thereafter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Fixture {
    /// Forbidden sphere: interior is pushed out.
    SphereBarrier {
        center: Vec3,
        radius: f64,
        stiffness: f64,
    },
    /// Containment well: positions outside the sphere are pulled back in.
    SphereWell {
        center: Vec3,
        radius: f64,
        stiffness: f64,
    },
    /// Axis-aligned containment box: each violated axis is pushed back
    /// independently.
    BoxContainment {
        center: Vec3,
        half_extents: Vec3,
        stiffness: f64,
    },
}

/// Direction from `center` toward `position`, epsilon-guarded.
///
/// Returns `fallback` when the offset is too small to normalize.
#[inline]
fn guarded_direction(offset: Vec3, distance: f64, fallback: Vec3) -> Vec3 {
    if distance <= DIRECTION_EPS {
        fallback
    } else {
        offset.scale(1.0 / (distance + DIRECTION_EPS))
    }
}

fn sphere_barrier_with(
    center: Vec3,
    radius: f64,
    position: Vec3,
    stiffness: f64,
    fallback: Vec3,
) -> Vec3 {
    let offset = position - center;
    let distance = offset.norm();
    if distance >= radius {
        return Vec3::ZERO;
    }
    guarded_direction(offset, distance, fallback).scale(stiffness * (radius - distance))
}

fn sphere_well_with(
    center: Vec3,
    radius: f64,
    position: Vec3,
    stiffness: f64,
    fallback: Vec3,
) -> Vec3 {
    let offset = position - center;
    let distance = offset.norm();
    if distance <= radius {
        return Vec3::ZERO;
    }
    // radius - distance is negative here, so the force points inward.
    guarded_direction(offset, distance, fallback).scale(stiffness * (radius - distance))
}

/// Outward push for positions inside the sphere; zero outside.
///
/// At the exact center the direction falls back to
/// [`DEFAULT_FALLBACK_DIRECTION`] and the magnitude is `stiffness * radius`.
pub fn sphere_barrier_force(center: Vec3, radius: f64, position: Vec3, stiffness: f64) -> Vec3 {
    sphere_barrier_with(center, radius, position, stiffness, DEFAULT_FALLBACK_DIRECTION)
}

/// Inward pull for positions outside the sphere; zero inside.
pub fn sphere_well_force(center: Vec3, radius: f64, position: Vec3, stiffness: f64) -> Vec3 {
    sphere_well_with(center, radius, position, stiffness, DEFAULT_FALLBACK_DIRECTION)
}

/// Per-axis push back toward an axis-aligned box; zero inside.
///
/// Axes are independent: a diagonal escape receives force on each violated
/// axis only.
pub fn box_containment_force(
    center: Vec3,
    half_extents: Vec3,
    position: Vec3,
    stiffness: f64,
) -> Vec3 {
    let min = center - half_extents;
    let max = center + half_extents;
    let axis = |p: f64, lo: f64, hi: f64| {
        if p < lo {
            (lo - p) * stiffness
        } else if p > hi {
            (hi - p) * stiffness
        } else {
            0.0
        }
    };
    Vec3::new(
        axis(position.x, min.x, max.x),
        axis(position.y, min.y, max.y),
        axis(position.z, min.z, max.z),
    )
}

/// Viscous damping: `-coefficient * velocity`, component-wise.
pub fn damping_force(velocity: Vec3, coefficient: f64) -> Vec3 {
    velocity.scale(-coefficient)
}

/// The composed force field evaluated every control-loop tick.
///
/// Owns no mutable state: a pure transform over immutable configuration
/// and the per-call position/velocity.
#[derive(Debug, Clone)]
pub struct ForceField {
    fixtures: heapless::Vec<Fixture, MAX_FIXTURES>,
    damping: f64,
    fallback: Vec3,
}

impl ForceField {
    /// Empty field with the given damping coefficient.
    pub fn new(damping: f64) -> Self {
        Self {
            fixtures: heapless::Vec::new(),
            damping,
            fallback: DEFAULT_FALLBACK_DIRECTION,
        }
    }

    /// Override the center-coincidence fallback direction.
    pub fn with_fallback(mut self, fallback: Vec3) -> Self {
        self.fallback = fallback;
        self
    }

    /// Add a fixture.
    pub fn push(&mut self, fixture: Fixture) -> Result<(), FixtureOverflow> {
        self.fixtures.push(fixture).map_err(|_| FixtureOverflow)
    }

    /// Build from a configured fixture list.
    pub fn from_fixtures(
        fixtures: &[Fixture],
        damping: f64,
    ) -> Result<Self, FixtureOverflow> {
        let mut field = Self::new(damping);
        for f in fixtures {
            field.push(*f)?;
        }
        Ok(field)
    }

    #[inline]
    pub fn fixture_count(&self) -> usize {
        self.fixtures.len()
    }

    /// Vector sum of all fixture forces plus damping.
    pub fn evaluate(&self, position: Vec3, velocity: Vec3) -> Vec3 {
        let mut total = damping_force(velocity, self.damping);
        for fixture in &self.fixtures {
            total += match *fixture {
                Fixture::SphereBarrier {
                    center,
                    radius,
                    stiffness,
                } => sphere_barrier_with(center, radius, position, stiffness, self.fallback),
                Fixture::SphereWell {
                    center,
                    radius,
                    stiffness,
                } => sphere_well_with(center, radius, position, stiffness, self.fallback),
                Fixture::BoxContainment {
                    center,
                    half_extents,
                    stiffness,
                } => box_containment_force(center, half_extents, position, stiffness),
            };
        }
        total
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
