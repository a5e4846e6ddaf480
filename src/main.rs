use std::path::PathBuf;
use std::process::exit;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use posture_logger::calibration::{CalibrationCoordinator, CalibrationOutcome};
use posture_logger::console::{self, OperatorCommand};
use posture_logger::device::{DeviceIdentity, DeviceSession};
use posture_logger::sampling::{SamplingEnd, SamplingSession};
use posture_logger::state::SharedState;
use posture_logger::{logging, storage};

#[derive(Parser, Debug)]
#[command(
    name = "posture-logger",
    about = "Log posture sensor angles from two TCP devices with guided calibration"
)]
struct Args {
    /// Thoracic sensor endpoint (host:port)
    #[arg(long, default_value = "10.134.179.112:8001")]
    thoracic: String,
    /// Lumbar sensor endpoint (host:port)
    #[arg(long, default_value = "10.134.179.36:8002")]
    lumbar: String,
    /// Directory for the CSV output
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,
    /// Initial TCP connect timeout in seconds
    #[arg(long, default_value = "5")]
    connect_timeout: u64,
}

fn main() {
    logging::init();
    if let Err(e) = run() {
        eprintln!("Error: {e:#}");
        exit(1);
    }
}

fn run() -> Result<()> {
    let args = Args::parse();
    println!("--- Dual Posture Logger (TCP) ---");

    let state = Arc::new(SharedState::new());
    let connect_timeout = Duration::from_secs(args.connect_timeout);

    // A connect failure at startup is fatal, before any session starts.
    let thoracic = DeviceSession::connect(
        DeviceIdentity::Thoracic,
        &args.thoracic,
        Arc::clone(&state),
        connect_timeout,
    )
    .context("check that the thoracic unit is powered and the address is right")?;
    let lumbar = DeviceSession::connect(
        DeviceIdentity::Lumbar,
        &args.lumbar,
        Arc::clone(&state),
        connect_timeout,
    )
    .context("check that the lumbar unit is powered and the address is right")?;

    let commands = console::spawn_stdin_listener();

    let coordinator = CalibrationCoordinator::new(&state, [&thoracic, &lumbar]);
    if coordinator.run(&commands) == CalibrationOutcome::Aborted {
        println!("Exiting without sampling.");
        return Ok(());
    }

    console::print_separator();
    println!("Calibration complete. Press [s] to start sampling, [q] to quit.");
    console::print_separator();
    loop {
        match commands.recv() {
            Ok(OperatorCommand::StartSampling) => break,
            Ok(OperatorCommand::Quit) | Err(_) => {
                state.set_running(false);
                println!("Exiting without sampling.");
                return Ok(());
            }
            Ok(_) => println!("Invalid command. Press [s] to start or [q] to quit."),
        }
    }

    let session = SamplingSession::new(&state, [&thoracic, &lumbar]);
    let (log, end) = session.run(&commands);

    match end {
        SamplingEnd::Paused => {
            if log.is_empty() {
                println!("No data to save.");
            } else {
                // A save failure is reported but the process still exits cleanly.
                match storage::save_csv(&log, &args.output_dir) {
                    Ok(path) => println!("Saved {} rows to {}", log.len(), path.display()),
                    Err(e) => eprintln!("Failed to save CSV: {e}"),
                }
            }
        }
        SamplingEnd::Quit => println!("Exiting without saving."),
    }

    state.set_running(false);
    info!("shutting down");
    println!("Closing connections. Bye.");
    Ok(())
}
