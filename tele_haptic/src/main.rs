//! # Teleop Haptic Console
//!
//! Operator-side bridge binary: polls the haptic end-effector at a fixed
//! cadence, renders virtual-fixture forces back to the operator, and
//! optionally relays the mapped pose to the manipulator-side server.
//!
//! ```bash
//! # Run against a config with the simulation driver
//! tele_haptic --config config/haptic.toml
//!
//! # Verbose logging, JSON output
//! tele_haptic -v --json
//! ```

use clap::Parser;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tele_common::config::{ConfigError, ConfigLoader};
use tele_common::haptic::HapticDevice;
use tele_common::math::Vec3;
use tele_haptic::config::{HapticConfig, RelayTargetKind};
use tele_haptic::cycle::{ControlLoop, LoopOptions, rt_setup};
use tele_haptic::force::ForceField;
use tele_haptic::relay::{CommandSender, RelayTarget, WaypointWriter};
use tele_haptic::sim::{self, SimDevice};
use tracing::{Level, error, info, warn};
use tracing_subscriber::EnvFilter;

/// Teleop Haptic Console — force rendering and manipulator relay
#[derive(Parser, Debug)]
#[command(name = "tele_haptic")]
#[command(version)]
#[command(about = "Operator-side haptic control loop with virtual fixtures")]
struct Args {
    /// Path to configuration TOML.
    #[arg(short, long, default_value = "config/haptic.toml")]
    config: PathBuf,

    /// Haptic driver to use ("simulation" is the only built-in).
    #[arg(long, default_value = "simulation")]
    driver: String,

    /// CPU core to pin the RT thread to (rt feature only).
    #[arg(long, default_value_t = 1)]
    cpu_core: usize,

    /// SCHED_FIFO priority (rt feature only).
    #[arg(long, default_value_t = 80)]
    rt_priority: i32,

    /// Enable verbose logging (DEBUG level).
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format.
    #[arg(long)]
    json: bool,
}

fn main() {
    let args = Args::parse();
    setup_tracing(&args);

    info!("Teleop Haptic Console v{} starting...", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(&args) {
        error!("FATAL: {e}");
        process::exit(1);
    }

    info!("Teleop Haptic Console shutdown complete");
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = match HapticConfig::load(&args.config) {
        Ok(c) => c,
        Err(ConfigError::FileNotFound) => {
            warn!(
                "No config at {}; using built-in simulation defaults",
                args.config.display()
            );
            HapticConfig::simulation_default()
        }
        Err(e) => return Err(Box::new(e)),
    };
    config.validate()?;
    info!(
        "Config OK: period={}µs, fixtures={}, damping={}",
        config.cycle.period_us,
        config.fixtures.len(),
        config.cycle.damping,
    );

    // RT setup (mlockall, affinity, scheduler). No-ops without `rt`.
    rt_setup(args.cpu_core, args.rt_priority)?;

    let device: Box<dyn HapticDevice> = match args.driver.as_str() {
        "simulation" => {
            let ids = sim::detect_devices();
            info!("Detected devices: {ids:?}");
            // Park the simulated end-effector at the device workspace center.
            let d = &config.mapping.device;
            let center = Vec3::new(
                (d.x.min + d.x.max) / 2.0,
                (d.y.min + d.y.max) / 2.0,
                (d.z.min + d.z.max) / 2.0,
            );
            Box::new(SimDevice::holding(center))
        }
        other => {
            return Err(format!(
                "unknown haptic driver '{other}' (vendor drivers plug in via the HapticDevice trait)"
            )
            .into());
        }
    };

    let field = ForceField::from_fixtures(&config.fixtures, config.cycle.damping)?;
    let options = LoopOptions {
        period: std::time::Duration::from_micros(config.cycle.period_us),
        device_bounds: config.mapping.device,
        arm_bounds: config.mapping.arm,
        relay_speed: config.relay.as_ref().map_or(50.0, |r| r.speed),
    };

    let mut control = ControlLoop::new(device, field, options);
    if let Some(relay) = &config.relay {
        let target = match relay.target {
            RelayTargetKind::Tcp => {
                info!("Relaying to {} (persistent={})", relay.addr, relay.persistent);
                RelayTarget::Tcp(CommandSender::new(relay.addr.clone(), relay.persistent))
            }
            RelayTargetKind::File => {
                info!("Relaying via waypoint file {}", relay.waypoint_file.display());
                RelayTarget::File(WaypointWriter::new(&relay.waypoint_file))
            }
        };
        control.attach_relay(target, relay.mode);
    }

    // Graceful shutdown between cycles.
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        r.store(false, Ordering::SeqCst);
    })?;

    info!("Entering control loop");
    let result = control.run(&running);

    let stats = control.stats();
    info!(
        "Loop finished: cycles={}, overruns={}, avg={}µs, relayed={}, relay_failures={}",
        stats.cycle_count,
        stats.overruns,
        stats.avg_cycle_ns() / 1000,
        stats.relayed,
        stats.relay_failures,
    );

    result.map_err(|e| Box::new(e) as Box<dyn std::error::Error>)
}

/// Setup tracing subscriber based on CLI arguments.
fn setup_tracing(args: &Args) {
    let level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .compact()
            .init();
    }
}
