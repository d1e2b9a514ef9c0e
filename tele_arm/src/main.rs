//! # Teleop Arm Server
//!
//! Manipulator-side bridge binary: accepts motion/control messages over
//! the command channel, guards every motion behind the safety gate, and
//! optionally polls a waypoint hand-off file.
//!
//! ```bash
//! # Run with the simulation driver
//! tele_arm --config config/arm.toml
//!
//! # Verbose logging, JSON output
//! tele_arm -v --json
//! ```

use clap::Parser;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tele_arm::config::ArmConfig;
use tele_arm::gate::SafetyGate;
use tele_arm::poller::WaypointPoller;
use tele_arm::server::RelayServer;
use tele_arm::sim::SimArm;
use tele_common::arm::ArmDriver;
use tele_common::config::{ConfigError, ConfigLoader};
use tracing::{Level, error, info, warn};
use tracing_subscriber::EnvFilter;

/// Teleop Arm Server — safety-gated manipulator command relay
#[derive(Parser, Debug)]
#[command(name = "tele_arm")]
#[command(version)]
#[command(about = "Manipulator-side relay server with fault recovery and throttling")]
struct Args {
    /// Path to configuration TOML.
    #[arg(short, long, default_value = "config/arm.toml")]
    config: PathBuf,

    /// Manipulator driver to use ("simulation" is the only built-in).
    #[arg(long, default_value = "simulation")]
    driver: String,

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

    info!("Teleop Arm Server v{} starting...", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(&args) {
        error!("FATAL: {e}");
        process::exit(1);
    }

    info!("Teleop Arm Server shutdown complete");
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = match ArmConfig::load(&args.config) {
        Ok(c) => c,
        Err(ConfigError::FileNotFound) => {
            warn!(
                "No config at {}; using built-in simulation defaults",
                args.config.display()
            );
            ArmConfig::simulation_default()
        }
        Err(e) => return Err(Box::new(e)),
    };
    config.validate()?;
    info!(
        "Config OK: listen={}, throttle={}ms",
        config.listen_addr(),
        config.gate.min_command_interval_ms,
    );

    let arm: Box<dyn ArmDriver> = match args.driver.as_str() {
        "simulation" => {
            info!("Simulating manipulator (configured controller: {})", config.arm.ip);
            Box::new(SimArm::new())
        }
        other => {
            return Err(format!(
                "unknown arm driver '{other}' (vendor drivers plug in via the ArmDriver trait)"
            )
            .into());
        }
    };

    // Bring the manipulator up before accepting any commands.
    let mut gate = SafetyGate::new(arm, config.gate_settings());
    gate.init()?;
    let gate = Arc::new(Mutex::new(gate));

    // Graceful shutdown: the accept loop and the poller observe the flag.
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        r.store(false, Ordering::SeqCst);
    })?;

    // Optional waypoint poller on its own thread.
    let poller_handle = config.poller.as_ref().map(|section| {
        let poller = WaypointPoller::new(
            &section.file,
            Duration::from_millis(section.interval_ms),
            section.speed,
            gate.clone(),
        );
        let flag = running.clone();
        std::thread::spawn(move || poller.run(&flag))
    });

    let server = RelayServer::bind(&config.listen_addr(), gate)?;
    server.run(running);

    if let Some(handle) = poller_handle {
        let _ = handle.join();
    }

    Ok(())
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
