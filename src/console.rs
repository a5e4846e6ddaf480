//! Operator console: the stdin command stream and diagnostic rendering.

use std::io::{self, BufRead};
use std::sync::mpsc::{self, Receiver};
use std::thread;

use log::warn;

use crate::device::DeviceIdentity;
use crate::state::DeviceDiagnostics;

/// Interactive line commands accepted from the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorCommand {
    /// `c` — start calibration.
    Calibrate,
    /// `s` — start sampling.
    StartSampling,
    /// `p` — pause sampling and save.
    Pause,
    /// `q` — quit without saving.
    Quit,
}

pub fn parse_command(input: &str) -> Option<OperatorCommand> {
    match input.trim().to_ascii_lowercase().as_str() {
        "c" => Some(OperatorCommand::Calibrate),
        "s" => Some(OperatorCommand::StartSampling),
        "p" => Some(OperatorCommand::Pause),
        "q" => Some(OperatorCommand::Quit),
        _ => None,
    }
}

/// Spawn the stdin listener thread feeding operator commands into a channel.
///
/// Unrecognized input re-prompts without a state change. EOF (Ctrl+D) and
/// read errors are reported as quit.
pub fn spawn_stdin_listener() -> Receiver<OperatorCommand> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(line) => match parse_command(&line) {
                    Some(cmd) => {
                        if tx.send(cmd).is_err() {
                            return;
                        }
                    }
                    None => {
                        if !line.trim().is_empty() {
                            println!(
                                "Unrecognized command {:?}. Use [c]alibrate, [s]ample, [p]ause, [q]uit.",
                                line.trim()
                            );
                        }
                    }
                },
                Err(e) => {
                    warn!("stdin read failed: {}", e);
                    break;
                }
            }
        }
        // Input stream closed; treat as quit.
        let _ = tx.send(OperatorCommand::Quit);
    });
    rx
}

pub fn print_separator() {
    println!("{}", "=".repeat(70));
}

/// Human-readable per-device, per-zone calibration table.
pub fn render_diagnostics(diagnostics: &[DeviceDiagnostics; 2]) {
    print_separator();
    for device in [DeviceIdentity::Thoracic, DeviceIdentity::Lumbar] {
        let d = diagnostics[device.index()];
        println!(
            "{:<8} : upper: {:<25} | lower: {:<25}",
            device.label(),
            d.upper.to_string(),
            d.lower.to_string()
        );
    }
    print_separator();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_commands_case_insensitively() {
        assert_eq!(parse_command("c"), Some(OperatorCommand::Calibrate));
        assert_eq!(parse_command(" S "), Some(OperatorCommand::StartSampling));
        assert_eq!(parse_command("P\n"), Some(OperatorCommand::Pause));
        assert_eq!(parse_command("q"), Some(OperatorCommand::Quit));
    }

    #[test]
    fn rejects_everything_else() {
        assert_eq!(parse_command(""), None);
        assert_eq!(parse_command("start"), None);
        assert_eq!(parse_command("cc"), None);
    }
}
