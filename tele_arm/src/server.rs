//! TCP receiver for the command channel.
//!
//! The accept loop polls with a short timeout so it can observe the
//! shutdown flag between attempts. Each accepted connection gets its own
//! worker thread whose lifetime is tied to the connection; workers share
//! only the gate behind its mutex. Malformed payloads get an error reply
//! and the connection stays open; an empty read ends the worker.
//!
//! Every request yields exactly one reply line — except throttled motion
//! commands, which are dropped silently by design.

use crate::gate::{DispatchResult, SafetyGate};
use parking_lot::Mutex;
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tele_common::arm::MotionOutcome;
use tele_common::protocol::{ChannelMessage, Reply};
use tracing::{info, warn};

/// Accept-poll spacing; bounds how long shutdown can go unnoticed.
const ACCEPT_POLL: Duration = Duration::from_millis(50);

/// Worker read timeout; lets an idle connection observe shutdown.
const READ_POLL: Duration = Duration::from_millis(500);

/// Command channel receiver.
pub struct RelayServer {
    listener: TcpListener,
    gate: Arc<Mutex<SafetyGate>>,
}

impl RelayServer {
    /// Bind the listener. The socket is non-blocking so the accept loop
    /// can poll the shutdown flag.
    pub fn bind(addr: &str, gate: Arc<Mutex<SafetyGate>>) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        Ok(Self { listener, gate })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept loop. Returns once `running` clears and all workers have
    /// drained.
    pub fn run(&self, running: Arc<AtomicBool>) {
        match self.listener.local_addr() {
            Ok(addr) => info!("listening on {addr}"),
            Err(e) => warn!("listening (local_addr unavailable: {e})"),
        }

        let mut workers: Vec<JoinHandle<()>> = Vec::new();
        while running.load(Ordering::Relaxed) {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    let gate = self.gate.clone();
                    let flag = running.clone();
                    workers.push(thread::spawn(move || {
                        handle_connection(stream, peer, gate, flag)
                    }));
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => thread::sleep(ACCEPT_POLL),
                Err(e) => {
                    warn!("accept failed: {e}");
                    thread::sleep(ACCEPT_POLL);
                }
            }
            workers.retain(|w| !w.is_finished());
        }

        if !workers.is_empty() {
            info!("shutdown: draining {} open connection(s)", workers.len());
        }
        for worker in workers {
            let _ = worker.join();
        }
    }
}

fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    gate: Arc<Mutex<SafetyGate>>,
    running: Arc<AtomicBool>,
) {
    info!("connection from {peer}");
    if let Err(e) = serve_connection(stream, &gate, &running) {
        warn!("connection {peer}: {e}");
    }
    info!("connection from {peer} closed");
}

fn serve_connection(
    stream: TcpStream,
    gate: &Mutex<SafetyGate>,
    running: &AtomicBool,
) -> std::io::Result<()> {
    // The accepted socket must block with a bounded read timeout so the
    // worker can notice shutdown without dropping the connection.
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(READ_POLL))?;

    let mut writer = stream.try_clone()?;
    let mut reader = BufReader::new(stream);
    let mut line = String::new();

    loop {
        match reader.read_line(&mut line) {
            // Peer closed the connection.
            Ok(0) => break,
            Ok(_) => {
                if !line.trim().is_empty() {
                    if let Some(reply) = dispatch_line(&line, gate) {
                        match reply.to_line() {
                            Ok(encoded) => writer.write_all(encoded.as_bytes())?,
                            Err(e) => warn!("reply encode failed: {e}"),
                        }
                    }
                }
                line.clear();
            }
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                // Idle poll tick; a partial line (if any) stays buffered.
                if !running.load(Ordering::Relaxed) {
                    break;
                }
            }
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Decode one request line and run it through the gate.
///
/// `None` means no reply is owed (throttled motion).
fn dispatch_line(line: &str, gate: &Mutex<SafetyGate>) -> Option<Reply> {
    let msg = match ChannelMessage::from_line(line) {
        Ok(msg) => msg,
        Err(_) => {
            warn!("undecodable payload: {:?}", line.trim());
            return Some(Reply::error("invalid JSON"));
        }
    };

    match msg {
        ChannelMessage::Reset { reset: true } => match gate.lock().reset_to_safe() {
            Ok(status) => Some(Reply::status(status)),
            Err(e) => Some(Reply::error(format!("Reset failed: {e}"))),
        },
        ChannelMessage::StatusQuery { status: true } => match gate.lock().status() {
            Ok(status) => Some(Reply::status(status)),
            Err(e) => Some(Reply::error(format!("Status unavailable: {e}"))),
        },
        ChannelMessage::Motion(req) => {
            let cmd = req.command();
            match gate.lock().dispatch(&cmd) {
                Ok(DispatchResult::Throttled) => None,
                Ok(DispatchResult::Dispatched(MotionOutcome::Success)) => Some(Reply::status(
                    format!("Moved to position: x={}, y={}, z={}", req.x, req.y, req.z),
                )),
                Ok(DispatchResult::Dispatched(MotionOutcome::Warning(code))) => Some(
                    Reply::status(format!("Motion completed with warning code: {code}")),
                ),
                Ok(DispatchResult::Dispatched(MotionOutcome::Fault { state, error_code })) => {
                    Some(Reply::error(format!(
                        "Arm was in error state {state} (code {error_code}); \
                         recovered, command dropped"
                    )))
                }
                Err(e) => Some(Reply::error(format!("Motion failed: {e}"))),
            }
        }
        // Falsy reset/status flags match the shape but carry no request.
        ChannelMessage::Reset { reset: false } | ChannelMessage::StatusQuery { status: false } => {
            Some(Reply::error("unknown command"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::GateSettings;
    use crate::sim::SimArm;
    use tele_common::arm::ArmState;

    fn test_gate(arm: SimArm) -> Arc<Mutex<SafetyGate>> {
        let settings = GateSettings {
            min_command_interval: Duration::ZERO,
            settle_unit: Duration::ZERO,
            ..Default::default()
        };
        Arc::new(Mutex::new(SafetyGate::new(Box::new(arm), settings)))
    }

    #[test]
    fn malformed_line_gets_error_reply() {
        let gate = test_gate(SimArm::new());
        let reply = dispatch_line("not json\n", &gate).unwrap();
        assert_eq!(reply, Reply::error("invalid JSON"));
    }

    #[test]
    fn motion_line_gets_coordinate_reply() {
        let gate = test_gate(SimArm::new());
        let reply = dispatch_line(r#"{"x":260,"y":10,"z":120}"#, &gate).unwrap();
        let Reply::Status { status } = reply else {
            panic!("expected status reply");
        };
        assert!(status.contains("x=260"));
        assert!(status.contains("y=10"));
        assert!(status.contains("z=120"));
    }

    #[test]
    fn fault_motion_gets_error_reply_mentioning_state() {
        let gate = test_gate(SimArm::faulted(ArmState::ErrorCollision, 31));
        let reply = dispatch_line(r#"{"x":260,"y":10,"z":120}"#, &gate).unwrap();
        let Reply::Error { error } = reply else {
            panic!("expected error reply");
        };
        assert!(error.contains("Error (collision)"));
        assert!(error.contains("31"));
    }

    #[test]
    fn falsy_flags_are_unknown_commands() {
        let gate = test_gate(SimArm::new());
        assert_eq!(
            dispatch_line(r#"{"reset":false}"#, &gate).unwrap(),
            Reply::error("unknown command")
        );
        assert_eq!(
            dispatch_line(r#"{"status":false}"#, &gate).unwrap(),
            Reply::error("unknown command")
        );
    }

    #[test]
    fn status_query_reports_state() {
        let gate = test_gate(SimArm::new());
        assert_eq!(
            dispatch_line(r#"{"status":true}"#, &gate).unwrap(),
            Reply::status("State: Ready")
        );
    }
}
