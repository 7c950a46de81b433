use serde::{Deserialize, Serialize};

use super::audio_models::AudioLoopStats;
use super::video_models::DispatcherStats;
use crate::timing::media_clock::MediaTime;

/// Report produced when a capture session stops.
///
/// Serializable for the JSON sidecar written next to a recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingSummary {
    pub id: String,
    pub started_at: String,
    pub duration_ticks: i64,
    pub duration_secs: f64,
    pub sample_rate: u32,
    pub audio: AudioLoopStats,
    pub video: DispatcherStats,
}

impl RecordingSummary {
    pub fn new(
        started_at: chrono::DateTime<chrono::Utc>,
        duration: MediaTime,
        sample_rate: u32,
        audio: AudioLoopStats,
        video: DispatcherStats,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            started_at: started_at.to_rfc3339(),
            duration_ticks: duration.ticks(),
            duration_secs: duration.as_secs_f64(),
            sample_rate,
            audio,
            video,
        }
    }

    pub fn duration(&self) -> MediaTime {
        MediaTime::from_ticks(self.duration_ticks)
    }
}
