use std::sync::Arc;

use crate::models::error::CaptureError;
use crate::models::video_models::CapturedFrame;

/// Callback invoked by a video source for every captured frame.
///
/// Fires on a platform thread that must not be held up; implementations
/// behind it do at most an O(1) queue push.
pub type FrameCallback = Arc<dyn Fn(CapturedFrame) + Send + Sync + 'static>;

/// Interface for platform screen/window capture sources.
pub trait VideoSource: Send {
    /// Begin delivering frames to `on_frame`.
    fn start(&mut self, on_frame: FrameCallback) -> Result<(), CaptureError>;

    /// Stop delivering frames. No callback may fire after this returns.
    fn stop(&mut self) -> Result<(), CaptureError>;
}
