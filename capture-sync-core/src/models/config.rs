use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::audio_models::CaptureMode;
use super::error::CaptureError;

/// Configuration for a capture session.
///
/// Every field has a default, so a JSON document only needs the keys it
/// wants to override.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfiguration {
    /// Audio source the device should open (default: loopback).
    pub capture_mode: CaptureMode,

    /// Sleep between device polls on the audio thread (default: 10 ms).
    pub poll_interval_ms: u64,

    /// How far the clock may fall behind wall-clock time while the device
    /// yields nothing before virtual silence is substituted (default: 30 ms).
    pub silence_gap_threshold_ms: u64,

    /// Buffers dropped right after unmute or resume (default: 2).
    pub unmute_discard_buffers: u32,

    /// Video frames buffered between capture callback and sink (default: 3).
    pub frame_queue_capacity: usize,

    /// When set, `stop` writes a `.summary.json` sidecar next to this path.
    pub summary_path: Option<PathBuf>,
}

impl CaptureConfiguration {
    pub fn validate(&self) -> Result<(), String> {
        if self.poll_interval_ms == 0 || self.poll_interval_ms > 1000 {
            return Err(format!("poll interval out of range: {} ms", self.poll_interval_ms));
        }
        if self.silence_gap_threshold_ms < self.poll_interval_ms {
            return Err(format!(
                "silence gap threshold ({} ms) shorter than poll interval ({} ms)",
                self.silence_gap_threshold_ms, self.poll_interval_ms
            ));
        }
        if self.frame_queue_capacity == 0 || self.frame_queue_capacity > 64 {
            return Err(format!("unsupported frame queue capacity: {}", self.frame_queue_capacity));
        }
        if self.unmute_discard_buffers > 100 {
            return Err(format!("unmute discard count too large: {}", self.unmute_discard_buffers));
        }
        Ok(())
    }

    /// Parse and validate a JSON configuration document.
    pub fn from_json(json: &str) -> Result<Self, CaptureError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| CaptureError::ConfigurationFailed(format!("invalid configuration: {}", e)))?;
        config.validate().map_err(CaptureError::ConfigurationFailed)?;
        Ok(config)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn silence_gap_threshold(&self) -> Duration {
        Duration::from_millis(self.silence_gap_threshold_ms)
    }
}

impl Default for CaptureConfiguration {
    fn default() -> Self {
        Self {
            capture_mode: CaptureMode::Loopback,
            poll_interval_ms: 10,
            silence_gap_threshold_ms: 30,
            unmute_discard_buffers: 2,
            frame_queue_capacity: 3,
            summary_path: None,
        }
    }
}
