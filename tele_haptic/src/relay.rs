//! Command channel client and waypoint file writer.
//!
//! Both transports carry the mapped target pose to the manipulator side.
//! Submission failures are reported to the caller and are never fatal to
//! the control loop — the tick simply skips the relay step.

use serde_json::json;
use std::io::Write;
use std::net::TcpStream;
use std::path::{Path, PathBuf};
use tele_common::math::Vec3;
use tele_common::pose::MotionCommand;
use tele_common::protocol::{ChannelMessage, MotionRequest, ProtocolError};
use thiserror::Error;
use tracing::debug;

/// Errors from relay submission. All transient from the loop's view.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("relay connect failed: {0}")]
    Connect(String),

    #[error("relay write failed: {0}")]
    Write(String),

    #[error("waypoint write failed: {0}")]
    Waypoint(String),

    #[error(transparent)]
    Encode(#[from] ProtocolError),
}

/// TCP client side of the command channel.
///
/// One newline-terminated JSON message per submission. With `persistent`
/// the stream is kept open and re-established after a failure; otherwise
/// each message opens a fresh connection.
pub struct CommandSender {
    addr: String,
    persistent: bool,
    stream: Option<TcpStream>,
}

impl CommandSender {
    pub fn new(addr: impl Into<String>, persistent: bool) -> Self {
        Self {
            addr: addr.into(),
            persistent,
            stream: None,
        }
    }

    /// Submit a motion command.
    pub fn send(&mut self, cmd: &MotionCommand) -> Result<(), RelayError> {
        let line = ChannelMessage::Motion(MotionRequest::from_command(cmd)).to_line()?;
        self.send_line(&line)
    }

    /// Ask the receiver to recover and move to its safe pose.
    pub fn send_reset(&mut self) -> Result<(), RelayError> {
        let line = ChannelMessage::Reset { reset: true }.to_line()?;
        self.send_line(&line)
    }

    fn send_line(&mut self, line: &str) -> Result<(), RelayError> {
        if !self.persistent {
            let mut stream = TcpStream::connect(&self.addr)
                .map_err(|e| RelayError::Connect(format!("{}: {e}", self.addr)))?;
            stream
                .write_all(line.as_bytes())
                .map_err(|e| RelayError::Write(e.to_string()))?;
            return Ok(());
        }

        if self.stream.is_none() {
            debug!("opening persistent relay connection to {}", self.addr);
            self.stream = Some(
                TcpStream::connect(&self.addr)
                    .map_err(|e| RelayError::Connect(format!("{}: {e}", self.addr)))?,
            );
        }
        // Invariant: stream is Some here.
        let result = self
            .stream
            .as_mut()
            .map(|s| s.write_all(line.as_bytes()))
            .unwrap_or(Ok(()));
        if let Err(e) = result {
            // Drop the broken stream; the next send reconnects.
            self.stream = None;
            return Err(RelayError::Write(e.to_string()));
        }
        Ok(())
    }
}

/// Atomic writer for the waypoint hand-off file.
///
/// Writes `{"x": int, "y": int, "z": int}` in manipulator units; the
/// manipulator-side poller treats an mtime change as a new command.
pub struct WaypointWriter {
    path: PathBuf,
}

impl WaypointWriter {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Write the mapped position, rounded to integer units. The temp-file
    /// rename keeps the poller from ever seeing a half-written document.
    pub fn write(&self, position: Vec3) -> Result<(), RelayError> {
        let doc = json!({
            "x": position.x.round() as i64,
            "y": position.y.round() as i64,
            "z": position.z.round() as i64,
        });
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, doc.to_string())
            .map_err(|e| RelayError::Waypoint(e.to_string()))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| RelayError::Waypoint(e.to_string()))
    }
}

/// Where the control loop sends the mapped pose.
pub enum RelayTarget {
    /// Directly over the command channel.
    Tcp(CommandSender),
    /// Through the waypoint hand-off file.
    File(WaypointWriter),
}

impl RelayTarget {
    /// Submit one motion command.
    pub fn submit(&mut self, cmd: &MotionCommand) -> Result<(), RelayError> {
        match self {
            Self::Tcp(sender) => sender.send(cmd),
            Self::File(writer) => writer.write(cmd.pose.position),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader};
    use std::net::TcpListener;

    #[test]
    fn sender_writes_one_json_line() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut line = String::new();
            BufReader::new(stream).read_line(&mut line).unwrap();
            line
        });

        let mut sender = CommandSender::new(addr.to_string(), false);
        let cmd = MotionCommand::to_position(Vec3::new(260.0, 10.0, 120.0));
        sender.send(&cmd).unwrap();

        let line = handle.join().unwrap();
        let msg = ChannelMessage::from_line(&line).unwrap();
        let ChannelMessage::Motion(req) = msg else {
            panic!("expected motion");
        };
        assert_eq!((req.x, req.y, req.z), (260.0, 10.0, 120.0));
    }

    #[test]
    fn sender_reports_refused_connection() {
        // Port 1 is essentially guaranteed closed.
        let mut sender = CommandSender::new("127.0.0.1:1", false);
        let cmd = MotionCommand::to_position(Vec3::ZERO);
        assert!(matches!(sender.send(&cmd), Err(RelayError::Connect(_))));
    }

    #[test]
    fn persistent_sender_reuses_stream() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream);
            let mut lines = Vec::new();
            for _ in 0..2 {
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                lines.push(line);
            }
            lines
        });

        let mut sender = CommandSender::new(addr.to_string(), true);
        sender
            .send(&MotionCommand::to_position(Vec3::new(1.0, 2.0, 3.0)))
            .unwrap();
        sender.send_reset().unwrap();

        let lines = handle.join().unwrap();
        assert!(matches!(
            ChannelMessage::from_line(&lines[0]).unwrap(),
            ChannelMessage::Motion(_)
        ));
        assert_eq!(
            ChannelMessage::from_line(&lines[1]).unwrap(),
            ChannelMessage::Reset { reset: true }
        );
    }

    #[test]
    fn waypoint_file_holds_rounded_ints() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wp.json");
        let writer = WaypointWriter::new(&path);
        writer.write(Vec3::new(274.6, 25.2, 125.0)).unwrap();

        let v: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(v["x"], 275);
        assert_eq!(v["y"], 25);
        assert_eq!(v["z"], 125);
        assert!(!path.with_extension("tmp").exists());
    }
}
