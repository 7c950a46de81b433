use serde::{Deserialize, Serialize};

use crate::timing::media_clock::MediaTime;

/// Which endpoint an audio device captures from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureMode {
    /// The system's render mix, captured as an input.
    Loopback,
    Microphone,
}

/// PCM format reported by an audio device.
///
/// The core only relies on `sample_rate`; channels and bit depth size the
/// synthesized silence buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
}

impl AudioFormat {
    /// Bytes per interleaved frame.
    pub fn block_align(&self) -> usize {
        self.channels as usize * self.bits_per_sample as usize / 8
    }

    pub fn bytes_for_frames(&self, frames: u32) -> usize {
        frames as usize * self.block_align()
    }
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            channels: 2,
            bits_per_sample: 32,
        }
    }
}

/// Per-packet flags reported by the device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AudioBufferFlags {
    /// The device marked this packet as silence; its bytes are not meaningful.
    pub silent: bool,
    /// The device dropped data before this packet.
    pub discontinuity: bool,
}

/// One packet read from an audio device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioPacket {
    pub data: Vec<u8>,
    pub frame_count: u32,
    pub flags: AudioBufferFlags,
    pub device_position: u64,
}

/// Emitted once per buffer handed to the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioEvent {
    pub timestamp: MediaTime,
    pub frame_count: u32,
    /// Zero-filled rather than device data (mute, silent flag, or virtual frames).
    pub silent: bool,
}

/// Counters kept by the audio capture thread.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioLoopStats {
    pub packets_read: u64,
    pub device_frames: u64,
    pub virtual_frames: u64,
    pub buffers_emitted: u64,
    pub silent_buffers: u64,
    pub discarded_buffers: u64,
    pub read_errors: u64,
    pub write_errors: u64,
}
