//! Shared session state, written by the device sessions and read by the
//! calibration coordinator and the sampling session.
//!
//! Writer roles per field:
//! - device sessions: angles, references, readiness, zone diagnostics
//!   (via [`SharedState::apply_status`]);
//! - calibration coordinator: `calibrating` flag and diagnostic resets;
//! - sampling session / operator handler: `sampling` and `running` flags.
//!
//! Readers tolerate slightly stale values; consistency is re-established on
//! the next poll tick. Status updates notify a condition variable so the
//! coordinator can wake on change instead of busy-polling.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::Duration;

use crate::device::DeviceIdentity;

/// One sagittal/coronal angle pair, in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AngleSample {
    pub sagittal: f64,
    pub coronal: f64,
}

/// Calibration state of one zone (upper or lower) of one device.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum ZoneDiagnostic {
    /// No status received for this zone since the last reset.
    #[default]
    Waiting,
    /// Provisionally fine: the device complained about the other zone only.
    Ok,
    /// Device reported ready-for-reference.
    Ready,
    /// Misaligned, with the signed deviation from the zone limit in degrees.
    Error(f64),
}

impl fmt::Display for ZoneDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ZoneDiagnostic::Waiting => write!(f, "waiting..."),
            ZoneDiagnostic::Ok => write!(f, "OK"),
            ZoneDiagnostic::Ready => write!(f, "READY"),
            ZoneDiagnostic::Error(e) => write!(f, "WRONG (error {e:+.2}\u{b0})"),
        }
    }
}

/// Upper/lower zone diagnostics for one device.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DeviceDiagnostics {
    pub upper: ZoneDiagnostic,
    pub lower: ZoneDiagnostic,
}

#[derive(Debug, Default)]
struct Inner {
    angles: [Option<AngleSample>; 2],
    references: [Option<AngleSample>; 2],
    ready: [bool; 2],
    diagnostics: [DeviceDiagnostics; 2],
}

/// The single source of truth shared across all session threads.
pub struct SharedState {
    running: AtomicBool,
    calibrating: AtomicBool,
    sampling: AtomicBool,
    inner: Mutex<Inner>,
    changed: Condvar,
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedState {
    pub fn new() -> Self {
        Self {
            running: AtomicBool::new(true),
            calibrating: AtomicBool::new(false),
            sampling: AtomicBool::new(false),
            inner: Mutex::new(Inner::default()),
            changed: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap()
    }

    // ------------------------------------------------------------------
    // Control flags
    // ------------------------------------------------------------------

    pub fn running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn set_running(&self, value: bool) {
        self.running.store(value, Ordering::SeqCst);
        // Wake anyone parked on the condvar so the flag is observed promptly.
        let _guard = self.lock();
        self.changed.notify_all();
    }

    pub fn calibrating(&self) -> bool {
        self.calibrating.load(Ordering::SeqCst)
    }

    pub fn set_calibrating(&self, value: bool) {
        self.calibrating.store(value, Ordering::SeqCst);
    }

    pub fn sampling(&self) -> bool {
        self.sampling.load(Ordering::SeqCst)
    }

    pub fn set_sampling(&self, value: bool) {
        self.sampling.store(value, Ordering::SeqCst);
    }

    // ------------------------------------------------------------------
    // Angles and references (device session writers)
    // ------------------------------------------------------------------

    /// Overwrite the latest sample for the tagged channel. Last write wins.
    pub fn record_sample(&self, channel: DeviceIdentity, sample: AngleSample) {
        self.lock().angles[channel.index()] = Some(sample);
    }

    /// Latest sample for one device, if any arrived yet.
    pub fn latest_sample(&self, device: DeviceIdentity) -> Option<AngleSample> {
        self.lock().angles[device.index()]
    }

    /// A full four-channel snapshot, available once both devices have
    /// reported at least one sample.
    pub fn snapshot(&self) -> Option<(AngleSample, AngleSample)> {
        let inner = self.lock();
        Some((
            inner.angles[DeviceIdentity::Thoracic.index()]?,
            inner.angles[DeviceIdentity::Lumbar.index()]?,
        ))
    }

    /// Set the baseline reference for a device. A repeated reference line is
    /// treated as re-issuance and overwrites.
    pub fn record_reference(&self, device: DeviceIdentity, sample: AngleSample) {
        let mut inner = self.lock();
        inner.references[device.index()] = Some(sample);
        self.changed.notify_all();
    }

    pub fn reference(&self, device: DeviceIdentity) -> Option<AngleSample> {
        self.lock().references[device.index()]
    }

    // ------------------------------------------------------------------
    // Calibration diagnostics
    // ------------------------------------------------------------------

    /// Apply one calibration status message from a device.
    ///
    /// Transitions per status name:
    /// - `POSISI_SALAH_ATAS` (upper misaligned, value `v`): upper becomes
    ///   `Error(v - upper_limit)`; a still-waiting lower zone is marked OK
    ///   since the device only complains about one zone at a time; readiness
    ///   cleared.
    /// - `POSISI_SALAH_BAWAH` (lower misaligned, value `v`): symmetric, with
    ///   the piecewise lower limit; readiness cleared.
    /// - `SIAP_REFERENSI`: both zones `Ready`, readiness set.
    /// - `OK` (confirm acknowledgment) and anything else: no-op.
    ///
    /// Diagnostics are sticky between messages until [`reset_calibration`]
    /// starts the next attempt.
    ///
    /// [`reset_calibration`]: SharedState::reset_calibration
    pub fn apply_status(&self, device: DeviceIdentity, name: &str, value: Option<f64>) {
        let mut inner = self.lock();
        let slot = device.index();
        match name {
            "POSISI_SALAH_ATAS" => {
                if let Some(v) = value {
                    inner.diagnostics[slot].upper = ZoneDiagnostic::Error(v - device.upper_limit());
                }
                if inner.diagnostics[slot].lower == ZoneDiagnostic::Waiting {
                    inner.diagnostics[slot].lower = ZoneDiagnostic::Ok;
                }
                inner.ready[slot] = false;
            }
            "POSISI_SALAH_BAWAH" => {
                if inner.diagnostics[slot].upper == ZoneDiagnostic::Waiting {
                    inner.diagnostics[slot].upper = ZoneDiagnostic::Ok;
                }
                if let Some(v) = value {
                    inner.diagnostics[slot].lower =
                        ZoneDiagnostic::Error(v - device.lower_limit(v));
                }
                inner.ready[slot] = false;
            }
            "SIAP_REFERENSI" => {
                inner.diagnostics[slot].upper = ZoneDiagnostic::Ready;
                inner.diagnostics[slot].lower = ZoneDiagnostic::Ready;
                inner.ready[slot] = true;
            }
            _ => return,
        }
        self.changed.notify_all();
    }

    /// Reset every zone diagnostic and readiness flag for both devices in
    /// one step. Called once per calibration attempt.
    pub fn reset_calibration(&self) {
        let mut inner = self.lock();
        inner.diagnostics = [DeviceDiagnostics::default(); 2];
        inner.ready = [false; 2];
        self.changed.notify_all();
    }

    pub fn is_ready(&self, device: DeviceIdentity) -> bool {
        self.lock().ready[device.index()]
    }

    pub fn both_ready(&self) -> bool {
        let inner = self.lock();
        inner.ready.iter().all(|&r| r)
    }

    /// Copy of the current diagnostics, indexed by [`DeviceIdentity::index`].
    pub fn diagnostics(&self) -> [DeviceDiagnostics; 2] {
        self.lock().diagnostics
    }

    /// Park until a status/reference update arrives or `timeout` passes.
    pub fn wait_for_change(&self, timeout: Duration) {
        let guard = self.lock();
        let _ = self.changed.wait_timeout(guard, timeout).unwrap();
    }
}
