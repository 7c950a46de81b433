//! Fakes shared by the unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::models::audio_models::{AudioBufferFlags, AudioFormat, AudioPacket, CaptureMode};
use crate::models::error::CaptureError;
use crate::models::video_models::{CapturedFrame, TextureHandle};
use crate::timing::media_clock::MediaTime;
use crate::traits::audio_device::AudioDevice;
use crate::traits::media_sink::MediaSink;
use crate::traits::video_source::{FrameCallback, VideoSource};

/// Poll `condition` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    condition()
}

pub fn packet(frames: u32, format: &AudioFormat, fill: u8) -> AudioPacket {
    AudioPacket {
        data: vec![fill; format.bytes_for_frames(frames)],
        frame_count: frames,
        flags: AudioBufferFlags::default(),
        device_position: 0,
    }
}

/// What the fake device returns on one `read_samples` call.
pub enum Read {
    Packet(AudioPacket),
    Empty,
    Fail,
}

/// Observable side of a [`FakeDevice`].
#[derive(Default)]
pub struct DeviceProbe {
    pub script: Mutex<VecDeque<Read>>,
    pub reads: AtomicUsize,
    pub released_frames: AtomicUsize,
    pub initialized_mode: Mutex<Option<CaptureMode>>,
    pub started: AtomicBool,
    pub stopped: AtomicBool,
}

impl DeviceProbe {
    pub fn push(&self, read: Read) {
        self.script.lock().push_back(read);
    }

    pub fn script_drained(&self) -> bool {
        self.script.lock().is_empty()
    }
}

/// Scripted audio device. Returns `Empty` once the script runs out.
pub struct FakeDevice {
    pub format: AudioFormat,
    pub probe: Arc<DeviceProbe>,
    pub fail_initialize: bool,
    pub fail_start: bool,
}

impl FakeDevice {
    pub fn new(format: AudioFormat) -> (Self, Arc<DeviceProbe>) {
        let probe = Arc::new(DeviceProbe::default());
        (
            Self {
                format,
                probe: Arc::clone(&probe),
                fail_initialize: false,
                fail_start: false,
            },
            probe,
        )
    }
}

impl AudioDevice for FakeDevice {
    fn initialize(&mut self, mode: CaptureMode) -> Result<(), CaptureError> {
        if self.fail_initialize {
            return Err(CaptureError::DeviceNotAvailable);
        }
        *self.probe.initialized_mode.lock() = Some(mode);
        Ok(())
    }

    fn start(&mut self) -> Result<(), CaptureError> {
        if self.fail_start {
            return Err(CaptureError::DeviceStartFailed("fake device refused".into()));
        }
        self.probe.started.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&mut self) {
        self.probe.stopped.store(true, Ordering::SeqCst);
    }

    fn format(&self) -> AudioFormat {
        self.format
    }

    fn read_samples(&mut self) -> Result<Option<AudioPacket>, CaptureError> {
        self.probe.reads.fetch_add(1, Ordering::SeqCst);
        match self.probe.script.lock().pop_front() {
            Some(Read::Packet(packet)) => Ok(Some(packet)),
            Some(Read::Fail) => Err(CaptureError::ReadFailed("fake glitch".into())),
            Some(Read::Empty) | None => Ok(None),
        }
    }

    fn release_buffer(&mut self, frames_read: u32) -> Result<(), CaptureError> {
        self.probe.released_frames.fetch_add(frames_read as usize, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioWrite {
    pub len: usize,
    pub frames: u32,
    pub timestamp: MediaTime,
    pub all_zero: bool,
    pub first_byte: u8,
}

/// Sink that records every call. Frame writes can be held at a gate.
#[derive(Default)]
pub struct RecordingSink {
    pub audio: Mutex<Vec<AudioWrite>>,
    pub frames: Mutex<Vec<(usize, MediaTime)>>,
    pub finalized: AtomicUsize,
    pub fail_audio: AtomicBool,
    pub fail_frames: AtomicBool,
    pub frame_writes_entered: AtomicUsize,
    gate_closed: Mutex<bool>,
    gate: Condvar,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Block frame writes until `open_gate`.
    pub fn close_gate(&self) {
        *self.gate_closed.lock() = true;
    }

    pub fn open_gate(&self) {
        *self.gate_closed.lock() = false;
        self.gate.notify_all();
    }

    pub fn frame_ids(&self) -> Vec<usize> {
        self.frames.lock().iter().map(|(id, _)| *id).collect()
    }

    pub fn audio_writes(&self) -> Vec<AudioWrite> {
        self.audio.lock().clone()
    }
}

impl MediaSink for RecordingSink {
    fn write_audio_sample(&self, data: &[u8], frame_count: u32, timestamp: MediaTime) -> Result<(), CaptureError> {
        if self.fail_audio.load(Ordering::SeqCst) {
            return Err(CaptureError::WriteFailed("fake audio write".into()));
        }
        self.audio.lock().push(AudioWrite {
            len: data.len(),
            frames: frame_count,
            timestamp,
            all_zero: data.iter().all(|b| *b == 0),
            first_byte: data.first().copied().unwrap_or(0),
        });
        Ok(())
    }

    fn write_frame(&self, texture: &TextureHandle, timestamp: MediaTime) -> Result<(), CaptureError> {
        self.frame_writes_entered.fetch_add(1, Ordering::SeqCst);
        {
            let mut closed = self.gate_closed.lock();
            while *closed {
                self.gate.wait(&mut closed);
            }
        }
        if self.fail_frames.load(Ordering::SeqCst) {
            return Err(CaptureError::WriteFailed("fake frame write".into()));
        }
        let id = (**texture).downcast_ref::<usize>().copied().unwrap_or(usize::MAX);
        self.frames.lock().push((id, timestamp));
        Ok(())
    }

    fn finalize(&self) -> Result<(), CaptureError> {
        self.finalized.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub fn texture(id: usize) -> TextureHandle {
    Arc::new(id)
}

/// Video source whose callback the test drives by hand.
#[derive(Default)]
pub struct FakeVideoSource {
    pub callback: Arc<Mutex<Option<FrameCallback>>>,
    pub fail_start: bool,
    pub stopped: Arc<AtomicBool>,
}

impl FakeVideoSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver a frame as the platform would. False if not started.
    pub fn emit(callback: &Mutex<Option<FrameCallback>>, id: usize) -> bool {
        let cb = callback.lock().clone();
        match cb {
            Some(cb) => {
                cb(CapturedFrame::new(texture(id)));
                true
            }
            None => false,
        }
    }
}

impl VideoSource for FakeVideoSource {
    fn start(&mut self, on_frame: FrameCallback) -> Result<(), CaptureError> {
        if self.fail_start {
            return Err(CaptureError::DeviceStartFailed("fake video source refused".into()));
        }
        *self.callback.lock() = Some(on_frame);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), CaptureError> {
        self.callback.lock().take();
        self.stopped.store(true, Ordering::SeqCst);
        Ok(())
    }
}
