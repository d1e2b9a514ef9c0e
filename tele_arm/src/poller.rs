//! Waypoint file watcher.
//!
//! Checks the hand-off file at a fixed interval and treats a
//! modification-time change as a new command: parse `{"x","y","z"}`
//! (manipulator units) and dispatch through the shared gate. Read or
//! parse failures are logged and the poller stays alive; it is otherwise
//! inert.

use crate::gate::{DispatchResult, SafetyGate};
use parking_lot::Mutex;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime};
use tele_common::arm::MotionOutcome;
use tele_common::math::Vec3;
use tele_common::pose::MotionCommand;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
enum WaypointError {
    #[error("read failed: {0}")]
    Read(String),
    #[error("parse failed: {0}")]
    Parse(String),
}

/// On-disk waypoint document, integer manipulator units.
#[derive(Debug, Clone, Copy, Deserialize)]
struct WaypointFile {
    x: i64,
    y: i64,
    z: i64,
}

/// Polls the waypoint file and drives the gate on changes.
pub struct WaypointPoller {
    path: PathBuf,
    interval: Duration,
    speed: f64,
    gate: Arc<Mutex<SafetyGate>>,
}

impl WaypointPoller {
    pub fn new(
        path: impl AsRef<Path>,
        interval: Duration,
        speed: f64,
        gate: Arc<Mutex<SafetyGate>>,
    ) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            interval,
            speed,
            gate,
        }
    }

    /// Poll until `running` clears.
    pub fn run(&self, running: &AtomicBool) {
        info!("watching {} for waypoint updates", self.path.display());
        let mut last_mtime = None;
        while running.load(Ordering::Relaxed) {
            self.poll_once(&mut last_mtime);
            std::thread::sleep(self.interval);
        }
    }

    /// One poll step. A missing file is not an error — the poller waits
    /// for it to appear.
    fn poll_once(&self, last_mtime: &mut Option<SystemTime>) {
        let Ok(meta) = std::fs::metadata(&self.path) else {
            return;
        };
        let Ok(mtime) = meta.modified() else {
            return;
        };
        if !last_mtime.is_none_or(|t| mtime > t) {
            return;
        }
        *last_mtime = Some(mtime);

        let cmd = match self.read_waypoint() {
            Ok(cmd) => cmd,
            Err(e) => {
                warn!("waypoint {}: {e}", self.path.display());
                return;
            }
        };
        info!(
            "waypoint update: x={}, y={}, z={}",
            cmd.pose.position.x, cmd.pose.position.y, cmd.pose.position.z
        );
        match self.gate.lock().dispatch(&cmd) {
            Ok(DispatchResult::Dispatched(MotionOutcome::Success)) => {
                debug!("waypoint motion complete")
            }
            Ok(DispatchResult::Dispatched(outcome)) => {
                warn!("waypoint motion outcome: {outcome:?}")
            }
            Ok(DispatchResult::Throttled) => debug!("waypoint throttled"),
            Err(e) => warn!("waypoint dispatch failed: {e}"),
        }
    }

    fn read_waypoint(&self) -> Result<MotionCommand, WaypointError> {
        let content = std::fs::read_to_string(&self.path)
            .map_err(|e| WaypointError::Read(e.to_string()))?;
        let wp: WaypointFile =
            serde_json::from_str(&content).map_err(|e| WaypointError::Parse(e.to_string()))?;
        let mut cmd =
            MotionCommand::to_position(Vec3::new(wp.x as f64, wp.y as f64, wp.z as f64));
        cmd.speed = self.speed;
        Ok(cmd)
    }
}
