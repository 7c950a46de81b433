//! Dedicated audio capture thread.
//!
//! Sequence per poll:
//! 1. Read the next packet from the device.
//! 2. Packet available: advance the clock by its frame count, zero the
//!    payload if the device flagged it silent or the loop is muted, and
//!    write it to the sink. Packets are drained back to back.
//! 3. Nothing available: substitute virtual silence if the clock has fallen
//!    behind wall-clock time (see [`SilenceFiller`]), then sleep one poll
//!    interval.
//!
//! Mute and pause never stop the device or the clock. Mute writes zeros in
//! place of real data; pause writes nothing. Leaving either state discards
//! the next few device buffers (stale data the device queued meanwhile) and
//! stamps the next written buffer with wall-clock-derived time. Virtual
//! silence written after the gate reopens cancels any pending discard.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::capture::lifecycle::{WorkerLifecycle, WorkerState};
use crate::events::callback_registry::CallbackRegistry;
use crate::models::audio_models::{AudioEvent, AudioFormat, AudioLoopStats, AudioPacket, CaptureMode};
use crate::models::config::CaptureConfiguration;
use crate::models::error::CaptureError;
use crate::timing::media_clock::{ClockReader, ClockWriter, MediaTime};
use crate::timing::silence::SilenceFiller;
use crate::traits::audio_device::AudioDevice;
use crate::traits::media_sink::MediaSink;

/// Settings the capture thread needs, copied out of `CaptureConfiguration`.
#[derive(Debug, Clone, Copy)]
struct LoopSettings {
    mode: CaptureMode,
    poll_interval: Duration,
    silence_gap_threshold: Duration,
    unmute_discard_buffers: u32,
}

impl From<&CaptureConfiguration> for LoopSettings {
    fn from(config: &CaptureConfiguration) -> Self {
        Self {
            mode: config.capture_mode,
            poll_interval: config.poll_interval(),
            silence_gap_threshold: config.silence_gap_threshold(),
            unmute_discard_buffers: config.unmute_discard_buffers,
        }
    }
}

#[derive(Default)]
struct Counters {
    packets_read: AtomicU64,
    device_frames: AtomicU64,
    virtual_frames: AtomicU64,
    buffers_emitted: AtomicU64,
    silent_buffers: AtomicU64,
    discarded_buffers: AtomicU64,
    read_errors: AtomicU64,
    write_errors: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
    }

    fn snapshot(&self) -> AudioLoopStats {
        AudioLoopStats {
            packets_read: self.packets_read.load(Ordering::Relaxed),
            device_frames: self.device_frames.load(Ordering::Relaxed),
            virtual_frames: self.virtual_frames.load(Ordering::Relaxed),
            buffers_emitted: self.buffers_emitted.load(Ordering::Relaxed),
            silent_buffers: self.silent_buffers.load(Ordering::Relaxed),
            discarded_buffers: self.discarded_buffers.load(Ordering::Relaxed),
            read_errors: self.read_errors.load(Ordering::Relaxed),
            write_errors: self.write_errors.load(Ordering::Relaxed),
        }
    }
}

struct Shared {
    lifecycle: WorkerLifecycle,
    enabled: AtomicBool,
    paused: AtomicBool,
    counters: Counters,
}

type WorkerResult = (Box<dyn AudioDevice>, ClockWriter);
type WorkerHandle = thread::JoinHandle<Option<WorkerResult>>;
type Spawner = fn(CaptureWorker) -> Result<WorkerHandle, (io::Error, Option<CaptureWorker>)>;

/// Run `worker` on a new "audio-capture" thread. On failure the worker is
/// handed back so its device and clock can be recovered.
fn spawn_capture_thread(worker: CaptureWorker) -> Result<WorkerHandle, (io::Error, Option<CaptureWorker>)> {
    let slot = Arc::new(Mutex::new(Some(worker)));
    let handoff = Arc::clone(&slot);
    let spawned = thread::Builder::new().name("audio-capture".into()).spawn(move || {
        let worker = handoff.lock().take();
        worker.map(CaptureWorker::run)
    });
    match spawned {
        Ok(handle) => Ok(handle),
        Err(e) => {
            let worker = slot.lock().take();
            Err((e, worker))
        }
    }
}

/// Owns the audio device and the clock's write capability while capturing.
///
/// Single use: NotStarted → Running → Stopped. `stop` joins the thread and
/// takes the clock writer back so the session can reset the timeline.
pub struct AudioCaptureLoop {
    settings: LoopSettings,
    device: Mutex<Option<Box<dyn AudioDevice>>>,
    clock: Mutex<Option<ClockWriter>>,
    reader: ClockReader,
    sink: Arc<dyn MediaSink>,
    events: CallbackRegistry<AudioEvent>,
    shared: Arc<Shared>,
    worker: Mutex<Option<WorkerHandle>>,
    format: Mutex<Option<AudioFormat>>,
    last_error: Mutex<Option<CaptureError>>,
}

impl AudioCaptureLoop {
    pub fn new(
        config: &CaptureConfiguration,
        device: Box<dyn AudioDevice>,
        clock: ClockWriter,
        sink: Arc<dyn MediaSink>,
        events: CallbackRegistry<AudioEvent>,
    ) -> Self {
        let reader = clock.reader();
        Self {
            settings: LoopSettings::from(config),
            device: Mutex::new(Some(device)),
            clock: Mutex::new(Some(clock)),
            reader,
            sink,
            events,
            shared: Arc::new(Shared {
                lifecycle: WorkerLifecycle::new(),
                enabled: AtomicBool::new(true),
                paused: AtomicBool::new(false),
                counters: Counters::default(),
            }),
            worker: Mutex::new(None),
            format: Mutex::new(None),
            last_error: Mutex::new(None),
        }
    }

    /// Open and start the device, start the clock, spawn the capture thread.
    ///
    /// Device and thread failures are returned here and leave no thread
    /// running. The loop cannot be restarted after a failed start.
    pub fn start(&self) -> Result<(), CaptureError> {
        self.start_with(spawn_capture_thread)
    }

    fn start_with(&self, spawn: Spawner) -> Result<(), CaptureError> {
        if !self.shared.lifecycle.try_start() {
            let err = CaptureError::AlreadyRunning("audio capture loop");
            *self.last_error.lock() = Some(err.clone());
            return Err(err);
        }

        match self.launch(spawn) {
            Ok(format) => {
                log::info!(
                    "Audio capture started: {:?} {} Hz, {} ch, {} bit",
                    self.settings.mode,
                    format.sample_rate,
                    format.channels,
                    format.bits_per_sample
                );
                Ok(())
            }
            Err(e) => {
                self.shared.lifecycle.begin_stop();
                log::error!("Audio capture failed to start: {}", e);
                *self.last_error.lock() = Some(e.clone());
                Err(e)
            }
        }
    }

    fn launch(&self, spawn: Spawner) -> Result<AudioFormat, CaptureError> {
        let mut device = self.device.lock().take().ok_or(CaptureError::DeviceNotAvailable)?;

        device.initialize(self.settings.mode)?;
        device.start()?;

        let format = device.format();
        if format.sample_rate == 0 || format.block_align() == 0 {
            device.stop();
            return Err(CaptureError::ConfigurationFailed(format!(
                "device reported unusable format: {:?}",
                format
            )));
        }

        let clock = match self.clock.lock().take() {
            Some(clock) => clock,
            None => {
                device.stop();
                return Err(CaptureError::Unknown("clock writer already taken".into()));
            }
        };
        clock.set_sample_rate(format.sample_rate);
        let start_reference = MediaTime::ZERO;
        if !clock.start(start_reference) {
            log::warn!("Media clock was already running when audio capture started");
        }
        *self.format.lock() = Some(format);

        let worker = CaptureWorker {
            device,
            clock,
            shared: Arc::clone(&self.shared),
            sink: Arc::clone(&self.sink),
            events: self.events.clone(),
            settings: self.settings,
            format,
            filler: SilenceFiller::new(
                format.sample_rate,
                self.settings.poll_interval,
                self.settings.silence_gap_threshold,
            ),
            started_at: Instant::now(),
            start_reference,
            was_gated: false,
            discard_remaining: 0,
            resync_pending: false,
            last_end: start_reference,
        };

        let handle = match spawn(worker) {
            Ok(handle) => handle,
            Err((e, worker)) => {
                if let Some(worker) = worker {
                    *self.clock.lock() = Some(worker.abandon());
                }
                return Err(CaptureError::ThreadSpawnFailed(format!("audio capture: {}", e)));
            }
        };

        *self.worker.lock() = Some(handle);
        if !self.shared.lifecycle.is_running() {
            self.join_worker();
        }
        Ok(format)
    }

    /// Signal the capture thread and join it. Idempotent.
    pub fn stop(&self) {
        if !self.shared.lifecycle.begin_stop() {
            return;
        }
        self.join_worker();
        log::info!("Audio capture stopped: {:?}", self.stats());
    }

    /// Mute (`false`) or unmute (`true`) without stopping capture.
    pub fn set_enabled(&self, enabled: bool) {
        let was = self.shared.enabled.swap(enabled, Ordering::AcqRel);
        if was != enabled {
            log::debug!("Audio capture {}", if enabled { "unmuted" } else { "muted" });
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.shared.enabled.load(Ordering::Acquire)
    }

    /// While paused the clock keeps running but nothing reaches the sink.
    pub fn set_paused(&self, paused: bool) {
        self.shared.paused.store(paused, Ordering::Release);
    }

    pub fn is_paused(&self) -> bool {
        self.shared.paused.load(Ordering::Acquire)
    }

    pub fn state(&self) -> WorkerState {
        self.shared.lifecycle.state()
    }

    pub fn stats(&self) -> AudioLoopStats {
        self.shared.counters.snapshot()
    }

    /// Format negotiated with the device, once started.
    pub fn format(&self) -> Option<AudioFormat> {
        *self.format.lock()
    }

    pub fn last_error(&self) -> Option<CaptureError> {
        self.last_error.lock().clone()
    }

    pub fn clock(&self) -> ClockReader {
        self.reader.clone()
    }

    /// Reset the timeline. Only possible before start or after stop, while
    /// this loop holds the clock writer.
    pub fn reset_clock(&self) -> bool {
        match self.clock.lock().as_ref() {
            Some(clock) => {
                clock.reset();
                true
            }
            None => false,
        }
    }

    fn join_worker(&self) {
        let handle = self.worker.lock().take();
        let Some(handle) = handle else {
            return;
        };
        if handle.thread().id() == thread::current().id() {
            // Stopped from an audio subscriber; the loop exits once it returns.
            log::debug!("Audio capture stopped from its own thread, not joining");
            return;
        }
        match handle.join() {
            Ok(Some((device, clock))) => {
                *self.clock.lock() = Some(clock);
                drop(device);
            }
            Ok(None) => {}
            Err(_) => log::error!("Audio capture thread panicked"),
        }
    }
}

impl Drop for AudioCaptureLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

/// State owned by the capture thread.
struct CaptureWorker {
    device: Box<dyn AudioDevice>,
    clock: ClockWriter,
    shared: Arc<Shared>,
    sink: Arc<dyn MediaSink>,
    events: CallbackRegistry<AudioEvent>,
    settings: LoopSettings,
    format: AudioFormat,
    filler: SilenceFiller,
    started_at: Instant,
    start_reference: MediaTime,
    was_gated: bool,
    discard_remaining: u32,
    resync_pending: bool,
    last_end: MediaTime,
}

impl CaptureWorker {
    fn run(mut self) -> WorkerResult {
        while self.shared.lifecycle.is_running() {
            let muted = !self.shared.enabled.load(Ordering::Acquire);
            let paused = self.shared.paused.load(Ordering::Acquire);
            self.track_gate(muted || paused);

            match self.device.read_samples() {
                Ok(Some(packet)) if packet.frame_count > 0 => self.handle_packet(packet, muted, paused),
                Ok(Some(_)) => {
                    self.release(0);
                    self.idle(paused);
                }
                Ok(None) => self.idle(paused),
                Err(e) => {
                    Counters::bump(&self.shared.counters.read_errors, 1);
                    log::warn!("Audio read failed: {}", e);
                    thread::sleep(self.settings.poll_interval);
                }
            }
        }

        self.device.stop();
        (self.device, self.clock)
    }

    fn handle_packet(&mut self, packet: AudioPacket, muted: bool, paused: bool) {
        let frames = packet.frame_count;
        Counters::bump(&self.shared.counters.packets_read, 1);
        Counters::bump(&self.shared.counters.device_frames, frames as u64);

        let timestamp = self.clock.current_time();
        self.clock.advance(frames as u64);
        self.release(frames);

        if paused {
            return;
        }
        if self.discard_remaining > 0 {
            self.discard_remaining -= 1;
            Counters::bump(&self.shared.counters.discarded_buffers, 1);
            return;
        }

        if muted || packet.flags.silent {
            let zeros = vec![0u8; packet.data.len()];
            self.emit(&zeros, frames, timestamp, true);
        } else {
            self.emit(&packet.data, frames, timestamp, false);
        }
    }

    fn release(&mut self, frames: u32) {
        if let Err(e) = self.device.release_buffer(frames) {
            Counters::bump(&self.shared.counters.read_errors, 1);
            log::warn!("Failed to release audio buffer: {}", e);
        }
    }

    /// Nothing to read this poll.
    fn idle(&mut self, paused: bool) {
        self.fill_silence(paused);
        thread::sleep(self.settings.poll_interval);
    }

    /// Stop the device and rewind the clock when the thread never ran.
    fn abandon(mut self) -> ClockWriter {
        self.device.stop();
        self.clock.reset();
        self.clock
    }

    /// Arm discard + resync on the gated → open edge.
    fn track_gate(&mut self, gated: bool) {
        if self.was_gated && !gated {
            self.discard_remaining = self.settings.unmute_discard_buffers;
            self.resync_pending = true;
            log::debug!(
                "Audio gate reopened, discarding {} buffers and resyncing",
                self.discard_remaining
            );
        }
        self.was_gated = gated;
    }

    fn fill_silence(&mut self, paused: bool) {
        let chunks = self
            .filler
            .chunks_to_substitute(self.started_at.elapsed(), self.clock.accumulated_samples());
        if chunks == 0 {
            return;
        }

        let frames = self.filler.frames_per_poll();
        let zeros = vec![0u8; self.format.bytes_for_frames(frames)];
        for _ in 0..chunks {
            let timestamp = self.clock.current_time();
            self.clock.advance(frames as u64);
            Counters::bump(&self.shared.counters.virtual_frames, frames as u64);
            if !paused {
                self.emit(&zeros, frames, timestamp, true);
            }
        }

        // The device went quiet, so nothing stale is left to discard.
        if !paused && self.discard_remaining > 0 {
            log::debug!("Virtual silence written, cancelling {} pending discards", self.discard_remaining);
            self.discard_remaining = 0;
        }
    }

    fn emit(&mut self, data: &[u8], frames: u32, clock_time: MediaTime, silent: bool) {
        let mut timestamp = clock_time;
        if self.resync_pending {
            self.resync_pending = false;
            timestamp = self.start_reference + MediaTime::from_duration(self.started_at.elapsed());
            log::debug!("Audio resynced to wall clock at {} (clock {})", timestamp, clock_time);
        }
        let timestamp = timestamp.max(self.last_end);

        match self.sink.write_audio_sample(data, frames, timestamp) {
            Ok(()) => {
                Counters::bump(&self.shared.counters.buffers_emitted, 1);
                if silent {
                    Counters::bump(&self.shared.counters.silent_buffers, 1);
                }
            }
            Err(e) => {
                Counters::bump(&self.shared.counters.write_errors, 1);
                log::warn!("Failed to write audio at {}: {}", timestamp, e);
            }
        }

        self.last_end = timestamp + MediaTime::from_samples(frames as u64, self.format.sample_rate);
        self.events.invoke(&AudioEvent {
            timestamp,
            frame_count: frames,
            silent,
        });
    }
}
