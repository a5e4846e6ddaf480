//! Calibration coordinator: drives the two-phase handshake across both
//! devices.
//!
//! One pass per attempt: the operator starts calibration, both devices get
//! the calibrate command, and the coordinator watches the shared readiness
//! state, re-rendering the diagnostic table about once a second. When both
//! devices report ready it auto-confirms, waits a short grace period for
//! the reference angles, and returns. Quit aborts with a pause command to
//! both devices.

use std::sync::mpsc::{Receiver, TryRecvError};
use std::thread;
use std::time::Duration;

use log::{info, warn};

use crate::console::{self, OperatorCommand};
use crate::device::{DeviceIdentity, DeviceSession};
use crate::errors::LoggerError;
use crate::protocol::Command;
use crate::state::SharedState;

/// How long to wait for reference angles after the confirm command.
const REFERENCE_GRACE: Duration = Duration::from_millis(1500);
/// Fallback refresh interval for the diagnostic display while polling.
const POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationOutcome {
    /// Both devices confirmed ready; references may have been captured.
    Completed,
    /// The operator quit, or the command stream went away.
    Aborted,
}

pub struct CalibrationCoordinator<'a> {
    state: &'a SharedState,
    devices: [&'a DeviceSession; 2],
}

impl<'a> CalibrationCoordinator<'a> {
    pub fn new(state: &'a SharedState, devices: [&'a DeviceSession; 2]) -> Self {
        Self { state, devices }
    }

    /// Block on operator input until calibration completes or the operator
    /// quits.
    pub fn run(&self, commands: &Receiver<OperatorCommand>) -> CalibrationOutcome {
        console::print_separator();
        println!("Calibrate before sampling. Press [c] to start calibration, [q] to quit.");
        console::print_separator();

        loop {
            let cmd = match commands.recv() {
                Ok(cmd) => cmd,
                Err(_) => return self.abort(),
            };
            match cmd {
                OperatorCommand::Calibrate => {
                    if let Some(down) = self
                        .devices
                        .iter()
                        .find(|device| !device.is_connected())
                    {
                        let err = LoggerError::Disconnected {
                            device: down.identity().label(),
                        };
                        warn!("cannot calibrate: {}", err);
                        println!("Both devices must be connected. Try again.");
                        continue;
                    }
                    return self.attempt(commands);
                }
                OperatorCommand::Quit => return self.abort(),
                _ => println!("Invalid command. Press [c] to calibrate or [q] to quit."),
            }
        }
    }

    /// One calibration attempt: reset, signal both devices, poll until both
    /// are ready or the operator quits.
    fn attempt(&self, commands: &Receiver<OperatorCommand>) -> CalibrationOutcome {
        self.state.set_calibrating(true);
        self.state.reset_calibration();

        info!("sending calibration command to both devices");
        println!("\nCalibration started. Perform the wall test now.");
        println!("Monitoring status; confirmation is sent automatically when both devices are ready.");
        self.broadcast(Command::Calibrate);

        loop {
            match commands.try_recv() {
                Ok(OperatorCommand::Quit) | Err(TryRecvError::Disconnected) => {
                    info!("calibration aborted by operator");
                    self.broadcast(Command::Pause);
                    self.state.set_calibrating(false);
                    return self.abort();
                }
                Ok(_) | Err(TryRecvError::Empty) => {}
            }
            if !self.state.running() {
                self.broadcast(Command::Pause);
                self.state.set_calibrating(false);
                return CalibrationOutcome::Aborted;
            }

            console::render_diagnostics(&self.state.diagnostics());

            if self.state.both_ready() {
                println!("\nBoth devices READY. Sending confirmation automatically.");
                self.broadcast(Command::Confirm);
                self.state.set_calibrating(false);

                info!("waiting for reference angles");
                thread::sleep(REFERENCE_GRACE);
                for device in [DeviceIdentity::Thoracic, DeviceIdentity::Lumbar] {
                    if let Some(reference) = self.state.reference(device) {
                        println!(
                            "[{} reference] sagittal: {:.2}, coronal: {:.2}",
                            device, reference.sagittal, reference.coronal
                        );
                    }
                }
                return CalibrationOutcome::Completed;
            }

            // Wake early on a status change; refresh at least once a second.
            self.state.wait_for_change(POLL_INTERVAL);
        }
    }

    fn abort(&self) -> CalibrationOutcome {
        self.state.set_running(false);
        CalibrationOutcome::Aborted
    }

    fn broadcast(&self, cmd: Command) {
        for device in self.devices {
            device.send(cmd);
        }
    }
}
