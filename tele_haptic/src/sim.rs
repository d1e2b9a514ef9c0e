//! Simulated haptic device.
//!
//! Stands in for the vendor serial driver during tests and `--driver
//! simulation` runs. Either holds a fixed pose forever or plays back a
//! scripted sample sequence and then reports a disconnect.

use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tele_common::haptic::{DeviceError, DeviceInfo, DeviceSample, HapticDevice};
use tele_common::math::Vec3;

/// Device id reported by the simulation.
pub const SIM_DEVICE_ID: &str = "sim-inverse-0";

/// List simulated device ids (discovery stand-in).
pub fn detect_devices() -> Vec<String> {
    vec![SIM_DEVICE_ID.to_string()]
}

enum Script {
    /// Report this sample forever.
    Hold(DeviceSample),
    /// Play back samples, then disconnect.
    Sequence(Vec<DeviceSample>),
}

/// Simulated haptic device with a force log for assertions.
pub struct SimDevice {
    script: Script,
    cursor: usize,
    forces: Arc<Mutex<Vec<Vec3>>>,
    closed: Arc<AtomicBool>,
}

impl SimDevice {
    /// Device parked at `position` with zero velocity.
    pub fn holding(position: Vec3) -> Self {
        Self::with_script(Script::Hold(DeviceSample {
            position,
            velocity: Vec3::ZERO,
        }))
    }

    /// Device that yields `samples` in order, then disconnects.
    pub fn scripted(samples: Vec<DeviceSample>) -> Self {
        Self::with_script(Script::Sequence(samples))
    }

    fn with_script(script: Script) -> Self {
        Self {
            script,
            cursor: 0,
            forces: Arc::new(Mutex::new(Vec::new())),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Every force the loop delivered, in exchange order.
    pub fn force_log(&self) -> Arc<Mutex<Vec<Vec3>>> {
        self.forces.clone()
    }

    /// Set once `close()` runs.
    pub fn closed_flag(&self) -> Arc<AtomicBool> {
        self.closed.clone()
    }
}

impl HapticDevice for SimDevice {
    fn wakeup(&mut self) -> Result<DeviceInfo, DeviceError> {
        Ok(DeviceInfo {
            device_id: SIM_DEVICE_ID.to_string(),
            firmware: Some("simulated".to_string()),
        })
    }

    fn exchange(&mut self, force: Vec3) -> Result<DeviceSample, DeviceError> {
        self.forces.lock().push(force);
        match &self.script {
            Script::Hold(sample) => Ok(*sample),
            Script::Sequence(samples) => {
                let sample = samples.get(self.cursor).copied().ok_or_else(|| {
                    DeviceError::Disconnected("scripted sequence exhausted".to_string())
                })?;
                self.cursor += 1;
                Ok(sample)
            }
        }
    }

    fn close(&mut self) {
        self.closed.store(true, Ordering::Relaxed);
    }
}
