//! Sample-driven media clock.
//!
//! The recording timeline is derived from how many audio frames the capture
//! thread has pushed through, not from polling the wall clock. Wall-clock
//! timing drifts against the audio device and compresses the recorded
//! timeline; counting samples cannot.
//!
//! The clock is split into two capabilities:
//! - [`ClockWriter`]: `start` / `advance` / `reset`. Not `Clone`, so exactly
//!   one owner (the audio capture thread) can move time forward.
//! - [`ClockReader`]: read-only, cheap to clone, handed to any thread that
//!   needs timestamps.

use std::fmt;
use std::ops::{Add, Sub};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// 100-nanosecond ticks per second.
pub const TICKS_PER_SECOND: i64 = 10_000_000;

/// Position on the recording timeline, in 100 ns ticks since recording start.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MediaTime(i64);

impl MediaTime {
    pub const ZERO: MediaTime = MediaTime(0);

    pub const fn from_ticks(ticks: i64) -> Self {
        Self(ticks)
    }

    pub const fn ticks(self) -> i64 {
        self.0
    }

    pub fn from_duration(duration: Duration) -> Self {
        Self((duration.as_nanos() / 100).min(i64::MAX as u128) as i64)
    }

    /// Duration of `samples` frames at `sample_rate` Hz, truncated to whole ticks.
    pub fn from_samples(samples: u64, sample_rate: u32) -> Self {
        if sample_rate == 0 {
            return Self::ZERO;
        }
        let ticks = samples as u128 * TICKS_PER_SECOND as u128 / sample_rate as u128;
        Self(ticks.min(i64::MAX as u128) as i64)
    }

    /// Negative times clamp to zero.
    pub fn as_duration(self) -> Duration {
        Duration::from_nanos(self.0.max(0) as u64 * 100)
    }

    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / TICKS_PER_SECOND as f64
    }
}

impl Add for MediaTime {
    type Output = MediaTime;

    fn add(self, rhs: MediaTime) -> MediaTime {
        MediaTime(self.0.saturating_add(rhs.0))
    }
}

impl Sub for MediaTime {
    type Output = MediaTime;

    fn sub(self, rhs: MediaTime) -> MediaTime {
        MediaTime(self.0.saturating_sub(rhs.0))
    }
}

impl fmt::Display for MediaTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4}s", self.as_secs_f64())
    }
}

/// Read-only access to a recording timeline.
pub trait TimeSource: Send + Sync {
    /// Current position on the timeline. Never moves time forward.
    fn current_time(&self) -> MediaTime;

    fn is_running(&self) -> bool;
}

#[derive(Debug)]
struct ClockState {
    sample_rate: u32,
    start_time: MediaTime,
    accumulated_samples: u64,
    running: bool,
}

impl ClockState {
    fn current_time(&self) -> MediaTime {
        self.start_time + MediaTime::from_samples(self.accumulated_samples, self.sample_rate)
    }
}

/// Constructor for a writer/reader pair sharing one timeline.
pub struct MediaClock;

impl MediaClock {
    /// Create a stopped clock for audio at `sample_rate` Hz.
    pub fn new(sample_rate: u32) -> (ClockWriter, ClockReader) {
        let state = Arc::new(Mutex::new(ClockState {
            sample_rate,
            start_time: MediaTime::ZERO,
            accumulated_samples: 0,
            running: false,
        }));
        (
            ClockWriter {
                state: Arc::clone(&state),
            },
            ClockReader { state },
        )
    }
}

/// The write capability. Owned by the audio producer.
#[derive(Debug)]
pub struct ClockWriter {
    state: Arc<Mutex<ClockState>>,
}

impl ClockWriter {
    /// Start the clock at `start_reference`. Returns false if already running.
    pub fn start(&self, start_reference: MediaTime) -> bool {
        let mut state = self.state.lock();
        if state.running {
            return false;
        }
        state.start_time = start_reference;
        state.running = true;
        true
    }

    /// Change the sample rate. Only allowed while stopped, since it would
    /// rescale time already on the timeline.
    pub fn set_sample_rate(&self, sample_rate: u32) -> bool {
        let mut state = self.state.lock();
        if state.running || sample_rate == 0 {
            return false;
        }
        state.sample_rate = sample_rate;
        true
    }

    /// Add `num_samples` frames to the timeline.
    pub fn advance(&self, num_samples: u64) {
        let mut state = self.state.lock();
        state.accumulated_samples = state.accumulated_samples.saturating_add(num_samples);
    }

    /// Clear accumulated samples and the running flag.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.accumulated_samples = 0;
        state.start_time = MediaTime::ZERO;
        state.running = false;
    }

    pub fn current_time(&self) -> MediaTime {
        self.state.lock().current_time()
    }

    pub fn accumulated_samples(&self) -> u64 {
        self.state.lock().accumulated_samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.state.lock().sample_rate
    }

    /// A new read-only handle onto this timeline.
    pub fn reader(&self) -> ClockReader {
        ClockReader {
            state: Arc::clone(&self.state),
        }
    }
}

/// The read capability. Clone freely.
#[derive(Debug, Clone)]
pub struct ClockReader {
    state: Arc<Mutex<ClockState>>,
}

impl ClockReader {
    pub fn sample_rate(&self) -> u32 {
        self.state.lock().sample_rate
    }

    pub fn accumulated_samples(&self) -> u64 {
        self.state.lock().accumulated_samples
    }
}

impl TimeSource for ClockReader {
    fn current_time(&self) -> MediaTime {
        self.state.lock().current_time()
    }

    fn is_running(&self) -> bool {
        self.state.lock().running
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::thread;

    #[test]
    fn hundred_ten_ms_buffers_make_one_second() {
        let (writer, reader) = MediaClock::new(48000);
        assert!(writer.start(MediaTime::ZERO));

        for _ in 0..100 {
            writer.advance(480);
        }

        let ticks = reader.current_time().ticks();
        assert!((ticks - 10_000_000).abs() <= 10, "got {ticks}");
    }

    #[test]
    fn rate_fidelity_across_common_rates() {
        for &(rate, frames, repeats) in &[(44100u32, 441u64, 300u64), (48000, 1024, 77), (16000, 160, 1000)] {
            let (writer, reader) = MediaClock::new(rate);
            writer.start(MediaTime::ZERO);
            for _ in 0..repeats {
                writer.advance(frames);
            }
            let expected = (repeats * frames) as f64 * 1e7 / rate as f64;
            let actual = reader.current_time().ticks() as f64;
            assert!((actual - expected).abs() <= 1.0, "rate {rate}: {actual} vs {expected}");
        }
    }

    #[test]
    fn start_is_guarded() {
        let (writer, reader) = MediaClock::new(48000);
        assert!(!reader.is_running());
        assert!(writer.start(MediaTime::from_ticks(500)));
        assert!(!writer.start(MediaTime::from_ticks(9_999)));
        assert!(reader.is_running());
        assert_eq!(reader.current_time(), MediaTime::from_ticks(500));
    }

    #[test]
    fn sample_rate_fixed_while_running() {
        let (writer, reader) = MediaClock::new(48000);
        assert!(writer.set_sample_rate(44100));
        assert!(!writer.set_sample_rate(0));
        writer.start(MediaTime::ZERO);
        assert!(!writer.set_sample_rate(16000));
        assert_eq!(reader.sample_rate(), 44100);
    }

    #[test]
    fn reset_clears_timeline() {
        let (writer, reader) = MediaClock::new(48000);
        writer.start(MediaTime::ZERO);
        writer.advance(48000);
        writer.reset();

        assert!(!reader.is_running());
        assert_eq!(reader.accumulated_samples(), 0);
        assert_eq!(reader.current_time(), MediaTime::ZERO);
        assert!(writer.start(MediaTime::ZERO));
    }

    #[test]
    fn reads_never_advance() {
        let (writer, reader) = MediaClock::new(48000);
        writer.start(MediaTime::ZERO);
        writer.advance(4800);
        let first = reader.current_time();
        for _ in 0..1000 {
            assert_eq!(reader.current_time(), first);
        }
    }

    #[test]
    fn concurrent_readers_see_non_decreasing_time() {
        let (writer, reader) = MediaClock::new(48000);
        writer.start(MediaTime::ZERO);

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let reader = reader.clone();
                thread::spawn(move || {
                    let mut last = MediaTime::ZERO;
                    for _ in 0..10_000 {
                        let now = reader.current_time();
                        assert!(now >= last);
                        last = now;
                    }
                })
            })
            .collect();

        for n in 0..10_000u64 {
            writer.advance(n % 7);
        }
        for handle in readers {
            handle.join().unwrap();
        }
    }

    #[test]
    fn media_time_conversions() {
        let one_and_half = MediaTime::from_duration(Duration::from_millis(1500));
        assert_eq!(one_and_half.ticks(), 15_000_000);
        assert_eq!(one_and_half.as_duration(), Duration::from_millis(1500));
        assert_relative_eq!(one_and_half.as_secs_f64(), 1.5);
        assert_eq!(MediaTime::from_samples(480, 48000).ticks(), 100_000);
        assert_eq!(MediaTime::from_samples(480, 0), MediaTime::ZERO);
        assert_eq!(MediaTime::from_ticks(-5).as_duration(), Duration::ZERO);
    }

    #[test]
    fn large_sample_counts_do_not_overflow() {
        let (writer, reader) = MediaClock::new(192_000);
        writer.start(MediaTime::ZERO);
        // ~24 hours at 192 kHz
        writer.advance(192_000 * 86_400);
        assert_eq!(reader.current_time().ticks(), 86_400 * TICKS_PER_SECOND);
    }
}
