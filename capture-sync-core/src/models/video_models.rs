use std::any::Any;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::timing::media_clock::MediaTime;

/// Opaque GPU texture handle with shared ownership.
///
/// The core never looks inside; sinks downcast to their platform type.
pub type TextureHandle = Arc<dyn Any + Send + Sync>;

/// A frame as delivered by a video source's capture callback.
#[derive(Clone)]
pub struct CapturedFrame {
    pub texture: TextureHandle,
    /// Timestamp from the platform, if it supplied one. Only used for
    /// diagnostics; the media clock is the authority.
    pub platform_timestamp: Option<MediaTime>,
}

impl CapturedFrame {
    pub fn new(texture: TextureHandle) -> Self {
        Self {
            texture,
            platform_timestamp: None,
        }
    }
}

impl fmt::Debug for CapturedFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapturedFrame")
            .field("platform_timestamp", &self.platform_timestamp)
            .finish_non_exhaustive()
    }
}

/// A frame waiting in the dispatcher queue.
#[derive(Clone)]
pub struct QueuedFrame {
    pub texture: TextureHandle,
    pub timestamp: MediaTime,
}

impl fmt::Debug for QueuedFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueuedFrame")
            .field("timestamp", &self.timestamp)
            .finish_non_exhaustive()
    }
}

/// Emitted on the dispatcher thread after each frame write, and on the
/// submitting thread for each frame refused because the queue was full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameEvent {
    pub timestamp: MediaTime,
    /// Whether the sink accepted the frame. False for failed writes and
    /// dropped frames.
    pub written: bool,
    /// Frames waiting in the queue when the event was raised.
    pub queue_depth: usize,
    /// Frames refused so far because the queue was full.
    pub dropped_total: u64,
}

/// Counters kept by the frame dispatcher.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatcherStats {
    pub submitted: u64,
    pub written: u64,
    pub dropped: u64,
    pub paused: u64,
    pub discarded_on_stop: u64,
    pub write_errors: u64,
}
