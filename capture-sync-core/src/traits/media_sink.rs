use crate::models::error::CaptureError;
use crate::models::video_models::TextureHandle;
use crate::timing::media_clock::MediaTime;

/// Downstream encoder/writer.
///
/// Audio writes arrive on the audio capture thread and frame writes on the
/// dispatcher thread, possibly at the same time, so implementations must be
/// `Sync`. A failed write is logged and counted by the caller; capture keeps
/// going.
pub trait MediaSink: Send + Sync {
    /// Write one interleaved PCM buffer of `frame_count` frames.
    fn write_audio_sample(&self, data: &[u8], frame_count: u32, timestamp: MediaTime) -> Result<(), CaptureError>;

    /// Write one video frame.
    fn write_frame(&self, texture: &TextureHandle, timestamp: MediaTime) -> Result<(), CaptureError>;

    /// Flush and close the output. Called once, after both producers stopped.
    fn finalize(&self) -> Result<(), CaptureError>;
}
