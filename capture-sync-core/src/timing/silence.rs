use std::time::Duration;

/// Decides how many virtual frames to substitute when the device is quiet.
///
/// Loopback endpoints deliver no packets at all while nothing is playing.
/// The clock must keep moving anyway, so when a poll comes back empty and the
/// clock has fallen at least `gap_threshold` behind wall-clock time, whole
/// poll-interval chunks of silence are substituted until the lag is back
/// under the threshold. Lag below the threshold is ordinary packet jitter and
/// is left alone so real packets arriving late are not double counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SilenceFiller {
    sample_rate: u32,
    frames_per_poll: u32,
    gap_threshold_frames: u64,
}

impl SilenceFiller {
    pub fn new(sample_rate: u32, poll_interval: Duration, gap_threshold: Duration) -> Self {
        let frames_per_poll = frames_in(sample_rate, poll_interval).max(1);
        let gap_threshold_frames = frames_in(sample_rate, gap_threshold).max(frames_per_poll as u64);
        Self {
            sample_rate,
            frames_per_poll: frames_per_poll as u32,
            gap_threshold_frames,
        }
    }

    /// Size of one virtual silence chunk.
    pub fn frames_per_poll(&self) -> u32 {
        self.frames_per_poll
    }

    /// Frames wall-clock time says should have been captured by now.
    pub fn expected_frames(&self, wall_elapsed: Duration) -> u64 {
        frames_in(self.sample_rate, wall_elapsed)
    }

    /// Number of `frames_per_poll` chunks to substitute after an empty poll.
    pub fn chunks_to_substitute(&self, wall_elapsed: Duration, clock_frames: u64) -> u32 {
        let lag = self.expected_frames(wall_elapsed).saturating_sub(clock_frames);
        if lag < self.gap_threshold_frames {
            return 0;
        }
        let chunks = (lag - self.gap_threshold_frames) / self.frames_per_poll as u64 + 1;
        chunks.min(u32::MAX as u64) as u32
    }
}

fn frames_in(sample_rate: u32, duration: Duration) -> u64 {
    (duration.as_nanos() * sample_rate as u128 / 1_000_000_000) as u64
}
