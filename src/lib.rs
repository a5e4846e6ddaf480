//! Dual posture-sensor TCP logger.
//!
//! Connects to two networked posture sensor units (thoracic and lumbar)
//! over persistent TCP connections, guides the operator through a
//! calibration handshake, then captures baseline-relative angle samples at
//! 1 Hz into a CSV log.
//!
//! # Session flow
//!
//! 1. Both device sessions connect at startup; a failed connect is fatal.
//! 2. The calibration coordinator signals both devices, watches per-device
//!    readiness, and auto-confirms once both report ready. The devices then
//!    send their baseline reference angles.
//! 3. The sampling session captures one four-channel snapshot per elapsed
//!    second until the operator pauses (save) or quits (discard).
//!
//! All cross-thread communication goes through [`state::SharedState`];
//! device sessions never coordinate with each other directly.

pub mod calibration;
pub mod console;
pub mod device;
pub mod errors;
pub mod logging;
pub mod protocol;
pub mod sampling;
pub mod state;
pub mod storage;

pub use calibration::{CalibrationCoordinator, CalibrationOutcome};
pub use console::OperatorCommand;
pub use device::{DeviceIdentity, DeviceSession};
pub use errors::{LoggerError, Result};
pub use protocol::{Command, LineFramer, Message};
pub use sampling::{LogEntry, SampleLog, SamplingEnd, SamplingSession};
pub use state::{AngleSample, DeviceDiagnostics, SharedState, ZoneDiagnostic};
