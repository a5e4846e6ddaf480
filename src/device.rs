//! Device sessions: one persistent TCP connection per sensor unit.
//!
//! Each session owns a socket to one device, runs a background read loop
//! for the process lifetime, and exposes a single-byte command send. The
//! read loop frames lines, parses them, and publishes updates into the
//! shared state. A read or write failure terminates that session only;
//! the other device and the operator flow keep going.

use std::fmt;
use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use log::{debug, info, warn};

use crate::errors::{LoggerError, Result};
use crate::protocol::{parse_line, Command, LineFramer, Message};
use crate::state::{AngleSample, SharedState};

/// Bounded poll interval for socket reads, so the cooperative `running`
/// flag can interrupt a session whose device went silent.
const READ_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// The two sensor units, each its own TCP endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceIdentity {
    Thoracic,
    Lumbar,
}

impl DeviceIdentity {
    /// Slot index into per-device arrays in the shared state.
    pub fn index(self) -> usize {
        match self {
            DeviceIdentity::Thoracic => 0,
            DeviceIdentity::Lumbar => 1,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            DeviceIdentity::Thoracic => "Thoracic",
            DeviceIdentity::Lumbar => "Lumbar",
        }
    }

    /// Upper-zone angle limit used for calibration error diagnostics.
    pub fn upper_limit(self) -> f64 {
        match self {
            DeviceIdentity::Thoracic => 98.0,
            DeviceIdentity::Lumbar => 100.0,
        }
    }

    /// Lower-zone limit, piecewise around the measured angle: the firmware
    /// complains against whichever threshold the reading overshot.
    pub fn lower_limit(self, measured: f64) -> f64 {
        match self {
            DeviceIdentity::Thoracic => {
                if measured > 110.0 {
                    110.0
                } else {
                    88.0
                }
            }
            DeviceIdentity::Lumbar => {
                if measured > 90.0 {
                    90.0
                } else {
                    69.0
                }
            }
        }
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A live session to one device.
pub struct DeviceSession {
    identity: DeviceIdentity,
    writer: Mutex<TcpStream>,
    alive: Arc<AtomicBool>,
}

impl DeviceSession {
    /// Connect to the device and spawn the background read loop.
    ///
    /// A failed connect here is fatal to the run; there is no retry.
    pub fn connect(
        identity: DeviceIdentity,
        addr: &str,
        state: Arc<SharedState>,
        connect_timeout: Duration,
    ) -> Result<Self> {
        info!("connecting to {} device at {}", identity, addr);
        let stream = connect_with_timeout(identity, addr, connect_timeout)?;
        stream.set_read_timeout(Some(READ_POLL_INTERVAL))?;
        info!("connected to {} device", identity);

        let alive = Arc::new(AtomicBool::new(true));
        let reader = stream.try_clone()?;
        let thread_alive = Arc::clone(&alive);
        thread::Builder::new()
            .name(format!("{}-reader", identity.label().to_ascii_lowercase()))
            .spawn(move || read_loop(identity, reader, state, thread_alive))?;

        Ok(Self {
            identity,
            writer: Mutex::new(stream),
            alive,
        })
    }

    pub fn identity(&self) -> DeviceIdentity {
        self.identity
    }

    /// Whether the connection is still presumed usable.
    pub fn is_connected(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Write a single command byte to the device.
    ///
    /// A write failure marks the connection dead and later sends become
    /// no-ops; there is no retry.
    pub fn send(&self, cmd: Command) {
        if !self.is_connected() {
            debug!("{}: dropping {:?}, connection is down", self.identity, cmd);
            return;
        }
        let mut writer = self.writer.lock().unwrap();
        if let Err(e) = writer
            .write_all(&[cmd.byte()])
            .and_then(|()| writer.flush())
        {
            warn!("{}: failed to send {:?}: {}", self.identity, cmd, e);
            self.alive.store(false, Ordering::SeqCst);
        } else {
            debug!("{}: sent {:?}", self.identity, cmd);
        }
    }
}

fn connect_with_timeout(
    identity: DeviceIdentity,
    addr: &str,
    timeout: Duration,
) -> Result<TcpStream> {
    let connect_err = |source: io::Error| LoggerError::Connect {
        device: identity.label(),
        addr: addr.to_string(),
        source,
    };

    let candidates = addr.to_socket_addrs().map_err(&connect_err)?;
    let mut last_err = None;
    for candidate in candidates {
        match TcpStream::connect_timeout(&candidate, timeout) {
            Ok(stream) => return Ok(stream),
            Err(e) => last_err = Some(e),
        }
    }
    Err(connect_err(last_err.unwrap_or_else(|| {
        io::Error::new(io::ErrorKind::AddrNotAvailable, "no addresses resolved")
    })))
}

/// Blocking read loop for one device, run on its own thread.
///
/// Exits on peer close, on a hard read error, or when `running` clears.
/// Timeout reads just re-check the flag. Generic over the reader for
/// testability.
fn read_loop<R: Read>(
    identity: DeviceIdentity,
    mut reader: R,
    state: Arc<SharedState>,
    alive: Arc<AtomicBool>,
) {
    let mut framer = LineFramer::new();
    let mut buf = [0u8; 1024];
    while state.running() {
        match reader.read(&mut buf) {
            Ok(0) => {
                warn!("{} closed the connection", identity);
                break;
            }
            Ok(n) => {
                for line in framer.push(&buf[..n]) {
                    if line.trim().is_empty() {
                        continue;
                    }
                    dispatch(identity, &line, &state);
                }
            }
            Err(e)
                if e.kind() == io::ErrorKind::WouldBlock
                    || e.kind() == io::ErrorKind::TimedOut
                    || e.kind() == io::ErrorKind::Interrupted =>
            {
                continue;
            }
            Err(e) => {
                warn!("{} read failed: {}", identity, e);
                break;
            }
        }
    }
    alive.store(false, Ordering::SeqCst);
    debug!("{} session ended", identity);
}

/// Apply one framed line to the shared state.
fn dispatch(identity: DeviceIdentity, line: &str, state: &SharedState) {
    match parse_line(line) {
        Message::Sample {
            channel,
            sagittal,
            coronal,
        } => {
            state.record_sample(channel, AngleSample { sagittal, coronal });
        }
        Message::Reference { sagittal, coronal } => {
            debug!(
                "{} reference angles: sagittal {:.2}, coronal {:.2}",
                identity, sagittal, coronal
            );
            state.record_reference(identity, AngleSample { sagittal, coronal });
        }
        Message::Status { name, value } => {
            debug!("{} status: {} {:?}", identity, name, value);
            state.apply_status(identity, &name, value);
        }
        Message::Unrecognized => {
            debug!("{}: ignoring unrecognized line {:?}", identity, line);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ZoneDiagnostic;
    use std::io::Cursor;

    fn run_script(identity: DeviceIdentity, script: &str) -> Arc<SharedState> {
        let state = Arc::new(SharedState::new());
        let alive = Arc::new(AtomicBool::new(true));
        // Cursor yields the script then Ok(0), which ends the loop.
        read_loop(
            identity,
            Cursor::new(script.as_bytes().to_vec()),
            Arc::clone(&state),
            Arc::clone(&alive),
        );
        assert!(!alive.load(Ordering::SeqCst));
        state
    }

    #[test]
    fn read_loop_applies_samples_statuses_and_references() {
        let script = "T:10.0,-1.0\nSTATUS:POSISI_SALAH_ATAS:100\nSTATUS:SIAP_REFERENSI\nREF:5.0,0.5\nnot a message\n";
        let state = run_script(DeviceIdentity::Thoracic, script);

        let sample = state.latest_sample(DeviceIdentity::Thoracic).unwrap();
        assert_eq!(sample.sagittal, 10.0);

        // Last status wins: ready overrides the earlier misalignment.
        assert!(state.is_ready(DeviceIdentity::Thoracic));
        let diags = state.diagnostics()[DeviceIdentity::Thoracic.index()];
        assert_eq!(diags.upper, ZoneDiagnostic::Ready);

        let reference = state.reference(DeviceIdentity::Thoracic).unwrap();
        assert_eq!(reference.coronal, 0.5);
    }

    #[test]
    fn sample_channel_follows_prefix_tag_not_session_identity() {
        // A T-tagged line arriving on the lumbar socket still updates the
        // thoracic channel pair.
        let state = run_script(DeviceIdentity::Lumbar, "T:7.0,8.0\n");
        assert!(state.latest_sample(DeviceIdentity::Thoracic).is_some());
        assert!(state.latest_sample(DeviceIdentity::Lumbar).is_none());
    }

    #[test]
    fn reference_and_status_follow_session_identity() {
        let state = run_script(DeviceIdentity::Lumbar, "REF:1.0,2.0\nSTATUS:SIAP_REFERENSI\n");
        assert!(state.reference(DeviceIdentity::Lumbar).is_some());
        assert!(state.reference(DeviceIdentity::Thoracic).is_none());
        assert!(state.is_ready(DeviceIdentity::Lumbar));
    }

    #[test]
    fn read_loop_stops_when_running_clears() {
        let state = Arc::new(SharedState::new());
        state.set_running(false);
        let alive = Arc::new(AtomicBool::new(true));
        // Loop head sees the cleared flag and never reads.
        read_loop(
            DeviceIdentity::Thoracic,
            Cursor::new(b"T:1,2\n".to_vec()),
            Arc::clone(&state),
            Arc::clone(&alive),
        );
        assert!(state.latest_sample(DeviceIdentity::Thoracic).is_none());
    }

    #[test]
    fn device_limits() {
        assert_eq!(DeviceIdentity::Thoracic.upper_limit(), 98.0);
        assert_eq!(DeviceIdentity::Lumbar.upper_limit(), 100.0);
        assert_eq!(DeviceIdentity::Thoracic.lower_limit(115.0), 110.0);
        assert_eq!(DeviceIdentity::Thoracic.lower_limit(90.0), 88.0);
        assert_eq!(DeviceIdentity::Lumbar.lower_limit(95.0), 90.0);
        assert_eq!(DeviceIdentity::Lumbar.lower_limit(50.0), 69.0);
    }
}
