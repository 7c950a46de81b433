use std::fs;
use std::path::{Path, PathBuf};

use crate::models::error::CaptureError;
use crate::models::recording_result::RecordingSummary;

/// Sidecar location for `recording_path`: the extension is replaced, so
/// `capture.wav` becomes `capture.summary.json`.
pub fn summary_path(recording_path: &Path) -> PathBuf {
    recording_path.with_extension("summary.json")
}

/// Write a recording summary as a JSON sidecar file.
pub fn write_summary(summary: &RecordingSummary, recording_path: &Path) -> Result<PathBuf, CaptureError> {
    let path = summary_path(recording_path);
    let json = serde_json::to_string_pretty(summary)
        .map_err(|e| CaptureError::StorageError(format!("failed to serialize summary: {}", e)))?;
    fs::write(&path, json).map_err(|e| CaptureError::StorageError(format!("failed to write summary: {}", e)))?;
    log::debug!("Wrote recording summary to {}", path.display());
    Ok(path)
}

/// Read a recording summary back from its JSON sidecar file.
pub fn read_summary(recording_path: &Path) -> Result<RecordingSummary, CaptureError> {
    let path = summary_path(recording_path);
    let json = fs::read_to_string(&path)
        .map_err(|e| CaptureError::StorageError(format!("failed to read summary: {}", e)))?;
    serde_json::from_str(&json).map_err(|e| CaptureError::StorageError(format!("failed to parse summary: {}", e)))
}
