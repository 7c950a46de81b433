use std::sync::Arc;

use parking_lot::Mutex;

use crate::models::error::CaptureError;
use crate::traits::platform_subsystem::PlatformSubsystem;

/// Reference-counted ownership of a process-wide media subsystem.
///
/// Created once by the host and handed to every session. The subsystem is
/// initialized when the first [`RuntimeGuard`] is acquired and shut down when
/// the last one is dropped.
#[derive(Clone)]
pub struct PlatformRuntime {
    inner: Arc<RuntimeInner>,
}

struct RuntimeInner {
    subsystem: Arc<dyn PlatformSubsystem>,
    refs: Mutex<usize>,
}

impl PlatformRuntime {
    pub fn new(subsystem: Arc<dyn PlatformSubsystem>) -> Self {
        Self {
            inner: Arc::new(RuntimeInner {
                subsystem,
                refs: Mutex::new(0),
            }),
        }
    }

    /// Take a reference, initializing the subsystem on the 0 → 1 edge.
    ///
    /// If initialization fails the count stays at zero and the error is
    /// returned.
    pub fn acquire(&self) -> Result<RuntimeGuard, CaptureError> {
        let mut refs = self.inner.refs.lock();
        if *refs == 0 {
            self.inner.subsystem.initialize()?;
            log::info!("Platform subsystem '{}' initialized", self.inner.subsystem.name());
        }
        *refs += 1;
        Ok(RuntimeGuard {
            inner: Arc::clone(&self.inner),
        })
    }

    pub fn ref_count(&self) -> usize {
        *self.inner.refs.lock()
    }

    pub fn subsystem_name(&self) -> String {
        self.inner.subsystem.name().to_string()
    }
}

/// Keeps the platform subsystem alive. Release by dropping.
#[must_use = "the subsystem shuts down when the last guard is dropped"]
pub struct RuntimeGuard {
    inner: Arc<RuntimeInner>,
}

impl Drop for RuntimeGuard {
    fn drop(&mut self) {
        let mut refs = self.inner.refs.lock();
        *refs = refs.saturating_sub(1);
        if *refs == 0 {
            self.inner.subsystem.shutdown();
            log::info!("Platform subsystem '{}' shut down", self.inner.subsystem.name());
        }
    }
}
