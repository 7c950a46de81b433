//! # capture-sync-core
//!
//! Platform-agnostic core for synchronized audio/video capture.
//!
//! One sample-driven media clock is advanced only by the audio capture
//! thread; video frames are stamped from it as they arrive and handed to a
//! single sink through a bounded queue. Platform backends (Windows WASAPI)
//! implement the `AudioDevice` / `VideoSource` traits and plug into the
//! generic `CaptureSession`.
//!
//! ## Architecture
//!
//! ```text
//! capture-sync-core (this crate)
//! ├── timing/       ← MediaTime, MediaClock (ClockWriter / ClockReader), SilenceFiller
//! ├── capture/      ← AudioCaptureLoop, FrameDispatcher, worker lifecycle
//! ├── processing/   ← FrameQueue, WAV header generation
//! ├── events/       ← CallbackRegistry, CallbackHandle
//! ├── session/      ← CaptureSession, SessionStateMachine, PlatformRuntime
//! ├── sink/         ← WavFileSink, CallbackSink
//! ├── storage/      ← recording summary sidecar
//! ├── traits/       ← AudioDevice, VideoSource, MediaSink, PlatformSubsystem
//! └── models/       ← CaptureError, CaptureState, CaptureConfiguration, etc.
//! ```

pub mod capture;
pub mod events;
pub mod models;
pub mod processing;
pub mod session;
pub mod sink;
pub mod storage;
pub mod timing;
pub mod traits;

#[cfg(test)]
mod test_support;

// Re-export key types at crate root for convenience.
pub use capture::audio_capture_loop::AudioCaptureLoop;
pub use capture::frame_dispatcher::FrameDispatcher;
pub use events::callback_registry::{CallbackHandle, CallbackRegistry};
pub use models::audio_models::{AudioBufferFlags, AudioEvent, AudioFormat, AudioLoopStats, AudioPacket, CaptureMode};
pub use models::config::CaptureConfiguration;
pub use models::error::CaptureError;
pub use models::recording_result::RecordingSummary;
pub use models::state::CaptureState;
pub use models::video_models::{CapturedFrame, DispatcherStats, FrameEvent, TextureHandle};
pub use processing::frame_queue::FrameQueue;
pub use session::capture_session::CaptureSession;
pub use session::runtime::{PlatformRuntime, RuntimeGuard};
pub use session::state_machine::SessionStateMachine;
pub use sink::callback::CallbackSink;
pub use sink::wav_file::WavFileSink;
pub use timing::media_clock::{ClockReader, ClockWriter, MediaClock, MediaTime, TimeSource, TICKS_PER_SECOND};
pub use timing::silence::SilenceFiller;
pub use traits::audio_device::AudioDevice;
pub use traits::media_sink::MediaSink;
pub use traits::platform_subsystem::{NoopSubsystem, PlatformSubsystem};
pub use traits::video_source::{FrameCallback, VideoSource};
