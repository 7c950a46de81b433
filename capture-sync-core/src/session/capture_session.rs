use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::capture::audio_capture_loop::AudioCaptureLoop;
use crate::capture::frame_dispatcher::FrameDispatcher;
use crate::events::callback_registry::{CallbackHandle, CallbackRegistry};
use crate::models::audio_models::{AudioEvent, AudioLoopStats};
use crate::models::config::CaptureConfiguration;
use crate::models::error::CaptureError;
use crate::models::recording_result::RecordingSummary;
use crate::models::state::CaptureState;
use crate::models::video_models::{DispatcherStats, FrameEvent};
use crate::session::runtime::{PlatformRuntime, RuntimeGuard};
use crate::session::state_machine::SessionStateMachine;
use crate::storage::summary;
use crate::timing::media_clock::{ClockReader, ClockWriter, MediaClock, TimeSource};
use crate::traits::audio_device::AudioDevice;
use crate::traits::media_sink::MediaSink;
use crate::traits::video_source::{FrameCallback, VideoSource};

/// Sample rate the clock is created with. The audio loop replaces it with
/// the device's rate before the clock starts.
const DEFAULT_SAMPLE_RATE: u32 = 48000;

/// Everything built by `initialize` and torn down by `stop` / `fail`.
struct Pipeline {
    audio: AudioCaptureLoop,
    dispatcher: Arc<FrameDispatcher>,
    _runtime: RuntimeGuard,
}

impl Pipeline {
    fn shut_down<V: VideoSource>(&self, video: &Mutex<V>) {
        if let Err(e) = video.lock().stop() {
            log::warn!("Video source stop failed: {}", e);
        }
        self.dispatcher.stop();
        self.audio.stop();
    }
}

/// Composition root: one audio device, one video source, one sink, driven
/// through the session state machine.
///
/// ```text
/// [AudioDevice] → AudioCaptureLoop ──(clock writer)──┐
///                        │                            │ ClockReader
///                        └──────→ [MediaSink] ←── FrameDispatcher ← [VideoSource]
/// ```
///
/// All control methods take `&self`, so a session can be shared between
/// control threads behind an `Arc`. Control operations are serialized;
/// state reads are lock-free. State events are published after the
/// operation that caused them has returned its locks.
pub struct CaptureSession<V: VideoSource> {
    config: CaptureConfiguration,
    runtime: PlatformRuntime,
    state: SessionStateMachine,
    control: Mutex<()>,
    video: Mutex<V>,
    sink: Arc<dyn MediaSink>,
    pending: Mutex<Option<(Box<dyn AudioDevice>, ClockWriter)>>,
    pipeline: Mutex<Option<Pipeline>>,
    clock: ClockReader,
    audio_enabled: AtomicBool,
    started_at: Mutex<Option<DateTime<Utc>>>,
    last_error: Mutex<Option<CaptureError>>,
    state_events: CallbackRegistry<CaptureState>,
    audio_events: CallbackRegistry<AudioEvent>,
    frame_events: CallbackRegistry<FrameEvent>,
}

impl<V: VideoSource> CaptureSession<V> {
    pub fn new(
        config: CaptureConfiguration,
        runtime: PlatformRuntime,
        audio_device: Box<dyn AudioDevice>,
        video_source: V,
        sink: Arc<dyn MediaSink>,
    ) -> Self {
        let (writer, reader) = MediaClock::new(DEFAULT_SAMPLE_RATE);
        Self {
            config,
            runtime,
            state: SessionStateMachine::new(),
            control: Mutex::new(()),
            video: Mutex::new(video_source),
            sink,
            pending: Mutex::new(Some((audio_device, writer))),
            pipeline: Mutex::new(None),
            clock: reader,
            audio_enabled: AtomicBool::new(true),
            started_at: Mutex::new(None),
            last_error: Mutex::new(None),
            state_events: CallbackRegistry::new(),
            audio_events: CallbackRegistry::new(),
            frame_events: CallbackRegistry::new(),
        }
    }

    pub fn state(&self) -> CaptureState {
        self.state.current()
    }

    pub fn configuration(&self) -> &CaptureConfiguration {
        &self.config
    }

    /// Read access to the recording timeline.
    pub fn clock(&self) -> ClockReader {
        self.clock.clone()
    }

    /// The error that moved the session to Failed, if any.
    pub fn last_error(&self) -> Option<CaptureError> {
        self.last_error.lock().clone()
    }

    /// Created → Initialized. Validates configuration, acquires the platform
    /// runtime and builds the capture pipeline without starting anything.
    pub fn initialize(&self) -> Result<(), CaptureError> {
        self.run_control(CaptureState::Initialized, || self.initialize_locked())
    }

    fn initialize_locked(&self) -> Result<(), CaptureError> {
        self.require(CaptureState::Initialized)?;

        if let Err(reason) = self.config.validate() {
            return Err(self.fail_locked(CaptureError::ConfigurationFailed(reason)));
        }
        let guard = match self.runtime.acquire() {
            Ok(guard) => guard,
            Err(e) => return Err(self.fail_locked(e)),
        };
        let pending = self.pending.lock().take();
        let Some((device, writer)) = pending else {
            return Err(self.fail_locked(CaptureError::DeviceNotAvailable));
        };

        let audio = AudioCaptureLoop::new(
            &self.config,
            device,
            writer,
            Arc::clone(&self.sink),
            self.audio_events.clone(),
        );
        audio.set_enabled(self.audio_enabled.load(Ordering::Acquire));
        let time_source: Arc<dyn TimeSource> = Arc::new(self.clock.clone());
        let dispatcher = Arc::new(FrameDispatcher::new(
            self.config.frame_queue_capacity,
            time_source,
            Arc::clone(&self.sink),
            self.frame_events.clone(),
        ));

        *self.pipeline.lock() = Some(Pipeline {
            audio,
            dispatcher,
            _runtime: guard,
        });
        self.state.transition_or_err(CaptureState::Initialized)?;
        log::info!("Capture session initialized ({:?})", self.config.capture_mode);
        Ok(())
    }

    /// Initialized → Active. Starts the audio loop, the dispatcher and then
    /// the video source. Any failure stops what already started, moves the
    /// session to Failed and returns the error.
    pub fn start(&self) -> Result<(), CaptureError> {
        self.run_control(CaptureState::Active, || self.start_locked())
    }

    fn start_locked(&self) -> Result<(), CaptureError> {
        self.require(CaptureState::Active)?;

        let started = match self.pipeline.lock().as_ref() {
            Some(pipeline) => pipeline
                .audio
                .start()
                .and_then(|()| pipeline.dispatcher.start())
                .map(|()| Arc::clone(&pipeline.dispatcher)),
            None => Err(CaptureError::Unknown("pipeline missing".into())),
        };
        let dispatcher = match started {
            Ok(dispatcher) => dispatcher,
            Err(e) => return Err(self.fail_locked(e)),
        };

        let on_frame: FrameCallback = Arc::new(move |frame| {
            dispatcher.submit(frame);
        });
        let video_started = self.video.lock().start(on_frame);
        if let Err(e) = video_started {
            return Err(self.fail_locked(e));
        }

        *self.started_at.lock() = Some(Utc::now());
        self.state.transition_or_err(CaptureState::Active)?;
        log::info!("Capture session started");
        Ok(())
    }

    /// Active → Paused. The clock keeps running; nothing reaches the sink.
    pub fn pause(&self) -> Result<(), CaptureError> {
        self.run_control(CaptureState::Paused, || self.set_gate(CaptureState::Paused, true))
    }

    /// Paused → Active.
    pub fn resume(&self) -> Result<(), CaptureError> {
        self.run_control(CaptureState::Active, || self.set_gate(CaptureState::Active, false))
    }

    fn set_gate(&self, target: CaptureState, paused: bool) -> Result<(), CaptureError> {
        self.require(target)?;
        if let Some(pipeline) = self.pipeline.lock().as_ref() {
            pipeline.audio.set_paused(paused);
            pipeline.dispatcher.set_paused(paused);
        }
        self.state.transition_or_err(target)?;
        log::info!("Capture session {}", if paused { "paused" } else { "resumed" });
        Ok(())
    }

    /// Mute (`false`) or unmute (`true`) audio. Muted audio is written as
    /// silence so the timeline has no gap. False once the session ended.
    pub fn set_audio_enabled(&self, enabled: bool) -> bool {
        let _control = self.control.lock();
        if self.state.is_terminal() {
            return false;
        }
        self.audio_enabled.store(enabled, Ordering::Release);
        if let Some(pipeline) = self.pipeline.lock().as_ref() {
            pipeline.audio.set_enabled(enabled);
        }
        true
    }

    pub fn is_audio_enabled(&self) -> bool {
        self.audio_enabled.load(Ordering::Acquire)
    }

    /// Active/Paused → Stopped.
    ///
    /// Stops the video source, the dispatcher and the audio loop in that
    /// order, finalizes the sink and reports the recording. A second `stop`,
    /// or `stop` after a failure, returns `Ok(None)`. Stopping a session that
    /// never started is an error.
    ///
    /// The worker threads are joined after the control lock is released, so
    /// subscribers running on them may call back into the session.
    pub fn stop(&self) -> Result<Option<RecordingSummary>, CaptureError> {
        let pipeline = {
            let _control = self.control.lock();
            if self.state.is_terminal() {
                return Ok(None);
            }
            self.state.transition_or_err(CaptureState::Stopped)?;
            self.pipeline.lock().take()
        };
        let Some(pipeline) = pipeline else {
            return Err(CaptureError::Unknown("pipeline missing".into()));
        };

        let result = self.finish_recording(pipeline);
        self.state_events.invoke(&CaptureState::Stopped);
        result.map(Some)
    }

    fn finish_recording(&self, pipeline: Pipeline) -> Result<RecordingSummary, CaptureError> {
        pipeline.shut_down(&self.video);

        let duration = self.clock.current_time();
        let report = RecordingSummary::new(
            self.started_at.lock().unwrap_or_else(Utc::now),
            duration,
            self.clock.sample_rate(),
            pipeline.audio.stats(),
            pipeline.dispatcher.stats(),
        );
        pipeline.audio.reset_clock();

        let finalized = self.sink.finalize();
        if let Some(path) = &self.config.summary_path {
            if let Err(e) = summary::write_summary(&report, path) {
                log::warn!("Failed to write recording summary: {}", e);
            }
        }
        log::info!(
            "Capture session stopped after {} ({} audio buffers, {} frames written, {} dropped)",
            duration,
            report.audio.buffers_emitted,
            report.video.written,
            report.video.dropped
        );
        drop(pipeline);

        finalized?;
        Ok(report)
    }

    /// Any non-terminal state → Failed. Tears the pipeline down without
    /// finalizing the sink. False if the session had already ended.
    ///
    /// May be called from a subscriber callback.
    pub fn fail(&self, error: CaptureError) -> bool {
        let failed = {
            let _control = self.control.lock();
            if self.state.is_terminal() {
                false
            } else {
                self.fail_locked(error);
                self.state.current() == CaptureState::Failed
            }
        };
        if failed {
            self.retire_pipeline();
            self.state_events.invoke(&CaptureState::Failed);
        }
        failed
    }

    /// Move to Failed. Must hold the control lock; the caller tears the
    /// pipeline down with `retire_pipeline` once the lock is released.
    /// Returns `error` for the caller to propagate.
    fn fail_locked(&self, error: CaptureError) -> CaptureError {
        log::error!("Capture session failed: {}", error);
        *self.last_error.lock() = Some(error.clone());
        if !self.state.try_transition_to(CaptureState::Failed) {
            log::warn!("Could not move {:?} session to Failed", self.state.current());
        }
        error
    }

    /// Shut down and drop the pipeline of a failed session.
    fn retire_pipeline(&self) {
        let pipeline = self.pipeline.lock().take();
        if let Some(pipeline) = pipeline {
            pipeline.shut_down(&self.video);
            pipeline.audio.reset_clock();
        }
    }

    /// Error unless the current state may move to `target`.
    fn require(&self, target: CaptureState) -> Result<(), CaptureError> {
        let from = self.state.current();
        if from.can_transition_to(target) {
            Ok(())
        } else {
            Err(CaptureError::InvalidTransition { from, to: target })
        }
    }

    /// Run a control operation under the control lock. Once the lock is
    /// released, tear down a pipeline the operation failed and publish the
    /// state it reached (or Failed).
    fn run_control<F>(&self, reached: CaptureState, op: F) -> Result<(), CaptureError>
    where
        F: FnOnce() -> Result<(), CaptureError>,
    {
        let (before, result, after) = {
            let _control = self.control.lock();
            let before = self.state.current();
            let result = op();
            (before, result, self.state.current())
        };
        match &result {
            Ok(()) => self.state_events.invoke(&reached),
            Err(_) if before != CaptureState::Failed && after == CaptureState::Failed => {
                self.retire_pipeline();
                self.state_events.invoke(&CaptureState::Failed)
            }
            Err(_) => {}
        }
        result
    }

    pub fn audio_stats(&self) -> Option<AudioLoopStats> {
        self.pipeline.lock().as_ref().map(|p| p.audio.stats())
    }

    pub fn video_stats(&self) -> Option<DispatcherStats> {
        self.pipeline.lock().as_ref().map(|p| p.dispatcher.stats())
    }

    /// Subscribe to state changes.
    pub fn subscribe_state<F>(&self, callback: F) -> CallbackHandle
    where
        F: Fn(&CaptureState) + Send + Sync + 'static,
    {
        self.state_events.register(callback)
    }

    /// Subscribe to audio buffers handed to the sink. Runs on the audio
    /// capture thread.
    pub fn subscribe_audio<F>(&self, callback: F) -> CallbackHandle
    where
        F: Fn(&AudioEvent) + Send + Sync + 'static,
    {
        self.audio_events.register(callback)
    }

    /// Subscribe to frame writes. Runs on the dispatch thread.
    pub fn subscribe_frames<F>(&self, callback: F) -> CallbackHandle
    where
        F: Fn(&FrameEvent) + Send + Sync + 'static,
    {
        self.frame_events.register(callback)
    }
}

impl<V: VideoSource> Drop for CaptureSession<V> {
    fn drop(&mut self) {
        if self.state.current().is_capturing() {
            log::warn!("Capture session dropped while capturing, stopping");
            if let Err(e) = self.stop() {
                log::error!("Stop on drop failed: {}", e);
            }
        }
        self.state_events.clear();
        self.audio_events.clear();
        self.frame_events.clear();
    }
}
