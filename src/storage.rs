//! CSV sink for the captured sample log.
//!
//! One file per successful run, written in full at session end when the
//! operator ends sampling via the pause path.

use std::path::{Path, PathBuf};

use log::info;

use crate::errors::Result;
use crate::sampling::SampleLog;

pub const CSV_HEADER: [&str; 5] = [
    "waktu (s)",
    "thoracic_sagital_diff",
    "thoracic_coronal_diff",
    "lumbar_sagital_diff",
    "lumbar_coronal_diff",
];

/// Write the log to `posture_data_<YYYYMMDD_HHMMSS>.csv` under `dir`.
/// Returns the path of the file written.
pub fn save_csv(log: &SampleLog, dir: &Path) -> Result<PathBuf> {
    let file_name = format!(
        "posture_data_{}.csv",
        chrono::Local::now().format("%Y%m%d_%H%M%S")
    );
    let path = dir.join(file_name);

    let mut writer = csv::Writer::from_path(&path)?;
    writer.write_record(CSV_HEADER)?;
    for entry in log.entries() {
        writer.write_record(&[
            entry.elapsed_s.to_string(),
            entry.thoracic.sagittal.to_string(),
            entry.thoracic.coronal.to_string(),
            entry.lumbar.sagittal.to_string(),
            entry.lumbar.coronal.to_string(),
        ])?;
    }
    writer.flush()?;

    info!("wrote {} rows to {}", log.len(), path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceIdentity;
    use crate::state::{AngleSample, SharedState};

    #[test]
    fn writes_header_and_one_row_per_entry() {
        let state = SharedState::new();
        state.record_sample(
            DeviceIdentity::Thoracic,
            AngleSample {
                sagittal: 1.5,
                coronal: -0.5,
            },
        );
        state.record_sample(
            DeviceIdentity::Lumbar,
            AngleSample {
                sagittal: 2.0,
                coronal: 0.25,
            },
        );

        let mut log = SampleLog::new();
        log.capture(&state, 0).unwrap();
        log.capture(&state, 1).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = save_csv(&log, dir.path()).unwrap();
        assert!(path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("posture_data_"));

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines[0],
            "waktu (s),thoracic_sagital_diff,thoracic_coronal_diff,lumbar_sagital_diff,lumbar_coronal_diff"
        );
        assert_eq!(lines[1], "0,1.5,-0.5,2,0.25");
        assert_eq!(lines[2], "1,1.5,-0.5,2,0.25");
    }

    #[test]
    fn empty_log_still_writes_header_only() {
        let log = SampleLog::new();
        let dir = tempfile::tempdir().unwrap();
        let path = save_csv(&log, dir.path()).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 1);
    }
}
