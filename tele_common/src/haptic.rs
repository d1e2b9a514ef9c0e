//! Haptic device driver contract.
//!
//! The vendor driver exposes a single bidirectional exchange: write the
//! force computed last tick, read back the current end-effector position
//! and velocity. Implementations are pluggable (serial hardware,
//! simulation) behind the [`HapticDevice`] trait.

use crate::math::Vec3;
use thiserror::Error;

/// Error types for haptic device operations.
#[derive(Debug, Clone, Error)]
pub enum DeviceError {
    /// No device found during discovery.
    #[error("no haptic device detected")]
    NoneDetected,

    /// Stream open or handshake failed.
    #[error("device open failed: {0}")]
    OpenFailed(String),

    /// The device stopped responding; fatal to the control loop.
    #[error("device disconnected: {0}")]
    Disconnected(String),

    /// Transient exchange error on an otherwise healthy stream.
    #[error("device exchange error: {0}")]
    Exchange(String),
}

impl DeviceError {
    /// Whether the control loop must stop and release the device.
    #[inline]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Disconnected(_))
    }
}

/// Identity reported by the device on wakeup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Vendor-assigned device identifier.
    pub device_id: String,
    /// Firmware version string, when the device reports one.
    pub firmware: Option<String>,
}

/// One position/velocity sample from the device.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DeviceSample {
    /// End-effector position [m], device frame.
    pub position: Vec3,
    /// End-effector velocity [m/s], device frame.
    pub velocity: Vec3,
}

/// Interface for haptic device drivers.
///
/// # Lifecycle
///
/// 1. `wakeup()` — once, before the control loop starts
/// 2. `exchange()` — every loop tick
/// 3. `close()` — when the loop stops, including on fatal error
pub trait HapticDevice: Send {
    /// Wake the device and read its identity.
    fn wakeup(&mut self) -> Result<DeviceInfo, DeviceError>;

    /// Deliver `force` to the actuators and read the next sample.
    ///
    /// The force applied here is the one computed on the previous tick;
    /// the returned sample feeds this tick's force computation.
    fn exchange(&mut self, force: Vec3) -> Result<DeviceSample, DeviceError>;

    /// Release the device handle. Idempotent.
    fn close(&mut self);
}

/// Factory function type for creating device instances from a discovered id.
pub type DeviceFactory = fn(&str) -> Result<Box<dyn HapticDevice>, DeviceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_disconnect_is_fatal() {
        assert!(DeviceError::Disconnected("usb gone".into()).is_fatal());
        assert!(!DeviceError::Exchange("crc".into()).is_fatal());
        assert!(!DeviceError::NoneDetected.is_fatal());
    }

    #[test]
    fn error_display() {
        let e = DeviceError::OpenFailed("port busy".into());
        assert!(e.to_string().contains("port busy"));
    }
}
