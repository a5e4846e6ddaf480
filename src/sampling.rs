//! Sampling session: 1 Hz capture of baseline-relative angle snapshots.
//!
//! Runs after a successful calibration. Each tick takes the latest
//! four-channel snapshot from the shared state, provided every channel has
//! been populated at least once, and appends one log entry per elapsed
//! wall-clock second. The operator pauses (and saves) with `p` or quits
//! without saving with `q`.

use std::sync::mpsc::{Receiver, TryRecvError};
use std::thread;
use std::time::{Duration, Instant};

use log::info;

use crate::console::{self, OperatorCommand};
use crate::device::DeviceSession;
use crate::protocol::Command;
use crate::state::{AngleSample, SharedState};

/// Command-poll granularity inside the capture loop. The log itself only
/// advances once per elapsed second.
const TICK: Duration = Duration::from_millis(100);

/// One captured row: whole seconds since sampling start plus the four
/// baseline-relative angles as reported by the devices.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogEntry {
    pub elapsed_s: u64,
    pub thoracic: AngleSample,
    pub lumbar: AngleSample,
}

/// In-memory ordered sample log for one run.
#[derive(Debug, Default)]
pub struct SampleLog {
    entries: Vec<LogEntry>,
}

impl SampleLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one entry if a full snapshot is available and `elapsed_s`
    /// advanced past the last logged second. Keeps elapsed seconds strictly
    /// increasing regardless of message arrival jitter.
    pub fn capture(&mut self, state: &SharedState, elapsed_s: u64) -> Option<LogEntry> {
        if self
            .entries
            .last()
            .is_some_and(|last| last.elapsed_s >= elapsed_s)
        {
            return None;
        }
        let (thoracic, lumbar) = state.snapshot()?;
        let entry = LogEntry {
            elapsed_s,
            thoracic,
            lumbar,
        };
        self.entries.push(entry);
        Some(entry)
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// How the capture loop ended; decides whether the caller persists the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplingEnd {
    /// Operator paused; the log should be saved.
    Paused,
    /// Operator quit; the log is discarded.
    Quit,
}

pub struct SamplingSession<'a> {
    state: &'a SharedState,
    devices: [&'a DeviceSession; 2],
}

impl<'a> SamplingSession<'a> {
    pub fn new(state: &'a SharedState, devices: [&'a DeviceSession; 2]) -> Self {
        Self { state, devices }
    }

    /// Signal both devices to stream and capture until the operator stops.
    pub fn run(&self, commands: &Receiver<OperatorCommand>) -> (SampleLog, SamplingEnd) {
        self.state.set_sampling(true);
        self.broadcast(Command::StartSampling);

        console::print_separator();
        println!("SAMPLING STARTED");
        println!("Press [p] to pause and save, [q] to quit without saving.");
        console::print_separator();
        println!(
            "{:<10} | {:<10} | {:<10} | {:<10} | {:<10}",
            "time (s)", "t_sag", "t_cor", "l_sag", "l_cor"
        );
        println!("{}", "-".repeat(70));

        let start = Instant::now();
        let mut log = SampleLog::new();

        loop {
            match commands.try_recv() {
                Ok(OperatorCommand::Pause) => {
                    info!("sampling paused by operator");
                    self.broadcast(Command::Pause);
                    self.state.set_sampling(false);
                    println!("\nSampling stopped. Saving data...");
                    return (log, SamplingEnd::Paused);
                }
                Ok(OperatorCommand::Quit) | Err(TryRecvError::Disconnected) => {
                    info!("sampling quit by operator");
                    self.broadcast(Command::Pause);
                    self.state.set_sampling(false);
                    self.state.set_running(false);
                    return (log, SamplingEnd::Quit);
                }
                Ok(_) | Err(TryRecvError::Empty) => {}
            }
            if !self.state.running() {
                self.broadcast(Command::Pause);
                self.state.set_sampling(false);
                return (log, SamplingEnd::Quit);
            }

            if let Some(entry) = log.capture(self.state, start.elapsed().as_secs()) {
                println!(
                    "{:<10} | {:<10.2} | {:<10.2} | {:<10.2} | {:<10.2}",
                    entry.elapsed_s,
                    entry.thoracic.sagittal,
                    entry.thoracic.coronal,
                    entry.lumbar.sagittal,
                    entry.lumbar.coronal
                );
            }

            thread::sleep(TICK);
        }
    }

    fn broadcast(&self, cmd: Command) {
        for device in self.devices {
            device.send(cmd);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceIdentity;

    fn sample(v: f64) -> AngleSample {
        AngleSample {
            sagittal: v,
            coronal: -v,
        }
    }

    #[test]
    fn capture_waits_until_all_four_channels_are_populated() {
        let state = SharedState::new();
        let mut log = SampleLog::new();

        assert!(log.capture(&state, 0).is_none());
        state.record_sample(DeviceIdentity::Thoracic, sample(1.0));
        assert!(log.capture(&state, 0).is_none());

        state.record_sample(DeviceIdentity::Lumbar, sample(2.0));
        let entry = log.capture(&state, 0).unwrap();
        assert_eq!(entry.elapsed_s, 0);
        assert_eq!(entry.lumbar.sagittal, 2.0);
    }

    #[test]
    fn elapsed_seconds_are_strictly_increasing() {
        let state = SharedState::new();
        state.record_sample(DeviceIdentity::Thoracic, sample(1.0));
        state.record_sample(DeviceIdentity::Lumbar, sample(2.0));

        let mut log = SampleLog::new();
        assert!(log.capture(&state, 0).is_some());
        // Same second again: no duplicate row.
        assert!(log.capture(&state, 0).is_none());
        assert!(log.capture(&state, 1).is_some());
        // Time cannot step backwards in the log.
        assert!(log.capture(&state, 1).is_none());
        assert!(log.capture(&state, 3).is_some());

        let seconds: Vec<u64> = log.entries().iter().map(|e| e.elapsed_s).collect();
        assert_eq!(seconds, vec![0, 1, 3]);
    }

    #[test]
    fn capture_takes_the_latest_snapshot() {
        let state = SharedState::new();
        state.record_sample(DeviceIdentity::Thoracic, sample(1.0));
        state.record_sample(DeviceIdentity::Lumbar, sample(1.0));

        let mut log = SampleLog::new();
        log.capture(&state, 0).unwrap();

        state.record_sample(DeviceIdentity::Thoracic, sample(9.0));
        let entry = log.capture(&state, 1).unwrap();
        assert_eq!(entry.thoracic.sagittal, 9.0);
        assert_eq!(entry.lumbar.sagittal, 1.0);
    }
}
