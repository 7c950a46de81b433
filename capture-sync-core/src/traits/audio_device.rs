use crate::models::audio_models::{AudioFormat, AudioPacket, CaptureMode};
use crate::models::error::CaptureError;

/// Interface for platform audio capture devices.
///
/// Implemented by:
/// - `WasapiAudioDevice` (Windows, loopback or microphone)
///
/// `initialize` and `start` run on the caller's thread; everything after
/// that runs on the audio capture thread the device is moved onto.
pub trait AudioDevice: Send {
    /// Open the endpoint for `mode`.
    fn initialize(&mut self, mode: CaptureMode) -> Result<(), CaptureError>;

    /// Start the device stream.
    fn start(&mut self) -> Result<(), CaptureError>;

    /// Stop the device stream. Safe to call more than once.
    fn stop(&mut self);

    /// Format of the packets returned by `read_samples`.
    fn format(&self) -> AudioFormat;

    /// Read the next available packet, or `None` when nothing is queued.
    ///
    /// Must not block for longer than a device poll.
    fn read_samples(&mut self) -> Result<Option<AudioPacket>, CaptureError>;

    /// Hand back the device buffer for the packet just read.
    fn release_buffer(&mut self, frames_read: u32) -> Result<(), CaptureError>;
}
