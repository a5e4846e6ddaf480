//! Wire protocol for the posture sensor units.
//!
//! The devices speak a line-oriented ASCII protocol over TCP, newline
//! terminated:
//!
//! - `T:<sagittal>,<coronal>` / `L:<sagittal>,<coronal>` — angle sample.
//!   The prefix letter is a channel tag; it names the body segment the
//!   sample belongs to, independent of which socket it arrived on.
//! - `STATUS:<name>` or `STATUS:<name>:<value>` — calibration status.
//! - `REF:<sagittal>,<coronal>` — reference angles, sent after confirm.
//!
//! Host to device control is single ASCII command bytes, see [`Command`].

use crate::device::DeviceIdentity;

/// Single-byte commands accepted by the sensor firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Begin the calibration wall test.
    Calibrate,
    /// Confirm readiness; the device replies with its reference angles.
    Confirm,
    /// Pause or abort the current activity.
    Pause,
    /// Begin streaming angle samples.
    StartSampling,
}

impl Command {
    pub fn byte(self) -> u8 {
        match self {
            Command::Calibrate => b'C',
            Command::Confirm => b'Y',
            Command::Pause => b'P',
            Command::StartSampling => b'S',
        }
    }
}

/// One parsed device-to-host line.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Calibration status report, optionally carrying a measured angle.
    Status { name: String, value: Option<f64> },
    /// Angle sample for the tagged channel.
    Sample {
        channel: DeviceIdentity,
        sagittal: f64,
        coronal: f64,
    },
    /// Baseline reference angles captured by the device after confirm.
    Reference { sagittal: f64, coronal: f64 },
    /// Anything else, including recognized tags with malformed numeric
    /// payloads. Ignored by the session, never an error.
    Unrecognized,
}

/// Splits a raw byte stream into newline-terminated records.
///
/// Chunk boundaries may fall anywhere, so the trailing incomplete fragment
/// is carried over to the next call. A trailing `\r` is stripped from each
/// record.
#[derive(Debug, Default)]
pub struct LineFramer {
    carry: Vec<u8>,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every complete line it finishes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.carry.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.carry.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.carry.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            lines.push(String::from_utf8_lossy(&line).into_owned());
        }
        lines
    }
}

/// Classify one decoded line.
pub fn parse_line(line: &str) -> Message {
    let line = line.trim();

    if let Some(rest) = line.strip_prefix("STATUS:") {
        let mut parts = rest.splitn(2, ':');
        let name = parts.next().unwrap_or_default().trim();
        if name.is_empty() {
            return Message::Unrecognized;
        }
        let value = match parts.next() {
            None => None,
            Some(raw) => match raw.trim().parse::<f64>() {
                Ok(v) => Some(v),
                Err(_) => return Message::Unrecognized,
            },
        };
        return Message::Status {
            name: name.to_string(),
            value,
        };
    }

    let Some((prefix, rest)) = line.split_once(':') else {
        return Message::Unrecognized;
    };
    match prefix {
        "T" | "L" => {
            let channel = if prefix == "T" {
                DeviceIdentity::Thoracic
            } else {
                DeviceIdentity::Lumbar
            };
            match parse_pair(rest) {
                Some((sagittal, coronal)) => Message::Sample {
                    channel,
                    sagittal,
                    coronal,
                },
                None => Message::Unrecognized,
            }
        }
        "REF" => match parse_pair(rest) {
            Some((sagittal, coronal)) => Message::Reference { sagittal, coronal },
            None => Message::Unrecognized,
        },
        _ => Message::Unrecognized,
    }
}

fn parse_pair(body: &str) -> Option<(f64, f64)> {
    let (first, second) = body.split_once(',')?;
    let first = first.trim().parse().ok()?;
    let second = second.trim().parse().ok()?;
    Some((first, second))
}
