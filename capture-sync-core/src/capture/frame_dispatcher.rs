//! Producer/consumer hand-off for captured video frames.
//!
//! ```text
//! [platform capture callback] --submit()--> [FrameQueue] --dispatch thread--> [MediaSink::write_frame]
//! ```
//!
//! The callback side never waits: it takes a timestamp from the read-only
//! clock, pushes under the queue lock, and returns. When the queue is full
//! the new frame is dropped and counted. The dispatch thread sleeps on a
//! condition variable, pops one frame at a time and writes it with the lock
//! released.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use parking_lot::{Condvar, Mutex};

use crate::capture::lifecycle::{WorkerLifecycle, WorkerState};
use crate::events::callback_registry::CallbackRegistry;
use crate::models::error::CaptureError;
use crate::models::video_models::{CapturedFrame, DispatcherStats, FrameEvent, QueuedFrame};
use crate::processing::frame_queue::FrameQueue;
use crate::timing::media_clock::{MediaTime, TimeSource};
use crate::traits::media_sink::MediaSink;

struct QueueState {
    frames: FrameQueue<QueuedFrame>,
    accepting: bool,
    paused: bool,
    shutdown: bool,
    last_timestamp: Option<MediaTime>,
}

#[derive(Default)]
struct Counters {
    submitted: AtomicU64,
    written: AtomicU64,
    paused: AtomicU64,
    discarded_on_stop: AtomicU64,
    write_errors: AtomicU64,
}

struct Shared {
    queue: Mutex<QueueState>,
    available: Condvar,
    counters: Counters,
}

enum Submit {
    Queued,
    Rejected,
    Paused,
    Dropped {
        timestamp: MediaTime,
        queue_depth: usize,
        dropped_total: u64,
    },
}

/// Bounded frame queue plus its dedicated consumer thread.
///
/// Single use: NotStarted → Processing → Stopped.
pub struct FrameDispatcher {
    shared: Arc<Shared>,
    lifecycle: WorkerLifecycle,
    clock: Arc<dyn TimeSource>,
    sink: Arc<dyn MediaSink>,
    events: CallbackRegistry<FrameEvent>,
    worker: Mutex<Option<thread::JoinHandle<()>>>,
}

impl FrameDispatcher {
    pub fn new(
        capacity: usize,
        clock: Arc<dyn TimeSource>,
        sink: Arc<dyn MediaSink>,
        events: CallbackRegistry<FrameEvent>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                queue: Mutex::new(QueueState {
                    frames: FrameQueue::new(capacity),
                    accepting: false,
                    paused: false,
                    shutdown: false,
                    last_timestamp: None,
                }),
                available: Condvar::new(),
                counters: Counters::default(),
            }),
            lifecycle: WorkerLifecycle::new(),
            clock,
            sink,
            events,
            worker: Mutex::new(None),
        }
    }

    /// Spawn the dispatch thread and begin accepting frames.
    pub fn start(&self) -> Result<(), CaptureError> {
        if !self.lifecycle.try_start() {
            return Err(CaptureError::AlreadyRunning("frame dispatcher"));
        }

        {
            let mut queue = self.shared.queue.lock();
            if !queue.shutdown {
                queue.accepting = true;
            }
        }

        let shared = Arc::clone(&self.shared);
        let sink = Arc::clone(&self.sink);
        let events = self.events.clone();
        let spawned = thread::Builder::new()
            .name("frame-dispatch".into())
            .spawn(move || dispatch_loop(&shared, sink.as_ref(), &events));

        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                self.lifecycle.begin_stop();
                self.shared.queue.lock().accepting = false;
                log::error!("Failed to spawn frame dispatch thread: {}", e);
                return Err(CaptureError::ThreadSpawnFailed(format!("frame dispatch: {}", e)));
            }
        };

        *self.worker.lock() = Some(handle);
        // A concurrent stop may have run before the handle was stored.
        if !self.lifecycle.is_running() {
            self.join_worker();
        }

        log::debug!("Frame dispatcher started (capacity {})", self.capacity());
        Ok(())
    }

    /// Queue a frame from the capture callback. Never blocks on the consumer.
    ///
    /// Returns whether the frame was queued. A frame refused because the
    /// queue is full raises a `FrameEvent` on the calling thread.
    pub fn submit(&self, frame: CapturedFrame) -> bool {
        let now = self.clock.current_time();
        if let Some(platform) = frame.platform_timestamp {
            log::trace!("Frame at clock {} (platform {})", now, platform);
        }

        let outcome = {
            let mut queue = self.shared.queue.lock();
            if !queue.accepting {
                Submit::Rejected
            } else if queue.paused {
                Submit::Paused
            } else {
                let timestamp = match queue.last_timestamp {
                    Some(last) if now <= last => last + MediaTime::from_ticks(1),
                    _ => now,
                };
                let queued = QueuedFrame {
                    texture: frame.texture,
                    timestamp,
                };
                match queue.frames.push(queued) {
                    Ok(()) => {
                        queue.last_timestamp = Some(timestamp);
                        Submit::Queued
                    }
                    Err(_) => Submit::Dropped {
                        timestamp,
                        queue_depth: queue.frames.len(),
                        dropped_total: queue.frames.dropped(),
                    },
                }
            }
        };

        match outcome {
            Submit::Queued => {
                self.shared.counters.submitted.fetch_add(1, Ordering::Relaxed);
                self.shared.available.notify_one();
                true
            }
            Submit::Dropped {
                timestamp,
                queue_depth,
                dropped_total,
            } => {
                self.shared.counters.submitted.fetch_add(1, Ordering::Relaxed);
                log::debug!("Frame queue full, dropped frame at {}", timestamp);
                self.events.invoke(&FrameEvent {
                    timestamp,
                    written: false,
                    queue_depth,
                    dropped_total,
                });
                false
            }
            Submit::Paused => {
                self.shared.counters.submitted.fetch_add(1, Ordering::Relaxed);
                self.shared.counters.paused.fetch_add(1, Ordering::Relaxed);
                false
            }
            Submit::Rejected => false,
        }
    }

    /// While paused, submitted frames are refused and counted as paused.
    pub fn set_paused(&self, paused: bool) {
        self.shared.queue.lock().paused = paused;
    }

    /// Stop accepting frames and join the dispatch thread.
    ///
    /// A write already in progress finishes; frames still queued are
    /// discarded. Idempotent and safe to call from several threads.
    pub fn stop(&self) {
        if !self.lifecycle.begin_stop() {
            return;
        }

        let leftover = {
            let mut queue = self.shared.queue.lock();
            queue.shutdown = true;
            queue.accepting = false;
            queue.frames.take_all()
        };
        self.shared.available.notify_all();

        if !leftover.is_empty() {
            log::debug!("Discarding {} queued frames on stop", leftover.len());
            self.shared
                .counters
                .discarded_on_stop
                .fetch_add(leftover.len() as u64, Ordering::Relaxed);
        }
        drop(leftover);

        self.join_worker();
        log::debug!("Frame dispatcher stopped: {:?}", self.stats());
    }

    pub fn state(&self) -> WorkerState {
        self.lifecycle.state()
    }

    pub fn capacity(&self) -> usize {
        self.shared.queue.lock().frames.capacity()
    }

    pub fn queue_len(&self) -> usize {
        self.shared.queue.lock().frames.len()
    }

    pub fn dropped_frames(&self) -> u64 {
        self.shared.queue.lock().frames.dropped()
    }

    pub fn stats(&self) -> DispatcherStats {
        let counters = &self.shared.counters;
        DispatcherStats {
            submitted: counters.submitted.load(Ordering::Relaxed),
            written: counters.written.load(Ordering::Relaxed),
            dropped: self.dropped_frames(),
            paused: counters.paused.load(Ordering::Relaxed),
            discarded_on_stop: counters.discarded_on_stop.load(Ordering::Relaxed),
            write_errors: counters.write_errors.load(Ordering::Relaxed),
        }
    }

    fn join_worker(&self) {
        let Some(handle) = self.worker.lock().take() else {
            return;
        };
        if handle.thread().id() == thread::current().id() {
            // Stopped from a frame subscriber; the loop exits once it returns.
            log::debug!("Frame dispatcher stopped from its own thread, not joining");
            return;
        }
        if handle.join().is_err() {
            log::error!("Frame dispatch thread panicked");
        }
    }
}

impl Drop for FrameDispatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

fn dispatch_loop(shared: &Shared, sink: &dyn MediaSink, events: &CallbackRegistry<FrameEvent>) {
    loop {
        let (frame, queue_depth, dropped_total) = {
            let mut queue = shared.queue.lock();
            while queue.frames.is_empty() && !queue.shutdown {
                shared.available.wait(&mut queue);
            }
            if queue.shutdown {
                break;
            }
            match queue.frames.pop() {
                Some(frame) => (frame, queue.frames.len(), queue.frames.dropped()),
                None => continue,
            }
        };

        let written = match sink.write_frame(&frame.texture, frame.timestamp) {
            Ok(()) => {
                shared.counters.written.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(e) => {
                shared.counters.write_errors.fetch_add(1, Ordering::Relaxed);
                log::warn!("Failed to write frame at {}: {}", frame.timestamp, e);
                false
            }
        };

        events.invoke(&FrameEvent {
            timestamp: frame.timestamp,
            written,
            queue_depth,
            dropped_total,
        });
    }
}
