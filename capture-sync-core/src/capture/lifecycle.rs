use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle of a single-use worker thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WorkerState {
    NotStarted = 0,
    Running = 1,
    Stopped = 2,
}

/// Atomic NotStarted → Running → Stopped guard shared by the capture loops.
///
/// Only one caller wins `try_start`, and only one caller observes the
/// Running → Stopped edge in `begin_stop`, so concurrent `stop` calls
/// join the worker at most once.
#[derive(Debug)]
pub struct WorkerLifecycle(AtomicU8);

impl WorkerLifecycle {
    pub fn new() -> Self {
        Self(AtomicU8::new(WorkerState::NotStarted as u8))
    }

    pub fn try_start(&self) -> bool {
        self.0
            .compare_exchange(
                WorkerState::NotStarted as u8,
                WorkerState::Running as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Move to Stopped. True only for the caller that left Running.
    pub fn begin_stop(&self) -> bool {
        self.0.swap(WorkerState::Stopped as u8, Ordering::AcqRel) == WorkerState::Running as u8
    }

    pub fn state(&self) -> WorkerState {
        match self.0.load(Ordering::Acquire) {
            0 => WorkerState::NotStarted,
            1 => WorkerState::Running,
            _ => WorkerState::Stopped,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state() == WorkerState::Running
    }
}

impl Default for WorkerLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn single_use() {
        let lifecycle = WorkerLifecycle::new();
        assert!(lifecycle.try_start());
        assert!(!lifecycle.try_start());
        assert!(lifecycle.begin_stop());
        assert!(!lifecycle.begin_stop());
        assert!(!lifecycle.try_start());
        assert_eq!(lifecycle.state(), WorkerState::Stopped);
    }

    #[test]
    fn stop_before_start_blocks_start() {
        let lifecycle = WorkerLifecycle::new();
        assert!(!lifecycle.begin_stop());
        assert!(!lifecycle.try_start());
    }

    #[test]
    fn exactly_one_concurrent_stopper_wins() {
        let lifecycle = Arc::new(WorkerLifecycle::new());
        lifecycle.try_start();
        let winners = Arc::new(AtomicUsize::new(0));

        let threads: Vec<_> = (0..8)
            .map(|_| {
                let lifecycle = Arc::clone(&lifecycle);
                let winners = Arc::clone(&winners);
                thread::spawn(move || {
                    if lifecycle.begin_stop() {
                        winners.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(winners.load(Ordering::SeqCst), 1);
    }
}
