use parking_lot::Mutex;
use windows::Win32::System::Com::{CoDecrementMTAUsage, CoIncrementMTAUsage, CO_MTA_USAGE_COOKIE};

use capture_sync_core::models::error::CaptureError;
use capture_sync_core::traits::platform_subsystem::PlatformSubsystem;

struct MtaCookie(CO_MTA_USAGE_COOKIE);

// SAFETY: the cookie is an opaque token; CoDecrementMTAUsage accepts it on any thread.
unsafe impl Send for MtaCookie {}

/// Keeps the COM multithreaded apartment alive while any session holds the
/// platform runtime. Threads that never call `CoInitializeEx` (such as the
/// core's capture threads) join the MTA implicitly while it exists.
#[derive(Default)]
pub struct ComSubsystem {
    cookie: Mutex<Option<MtaCookie>>,
}

impl ComSubsystem {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PlatformSubsystem for ComSubsystem {
    fn initialize(&self) -> Result<(), CaptureError> {
        let mut cookie = self.cookie.lock();
        if cookie.is_some() {
            return Ok(());
        }
        let token = unsafe { CoIncrementMTAUsage() }
            .map_err(|e| CaptureError::ConfigurationFailed(format!("CoIncrementMTAUsage failed: {}", e)))?;
        *cookie = Some(MtaCookie(token));
        Ok(())
    }

    fn shutdown(&self) {
        if let Some(MtaCookie(token)) = self.cookie.lock().take() {
            if let Err(e) = unsafe { CoDecrementMTAUsage(token) } {
                log::warn!("CoDecrementMTAUsage failed: {}", e);
            }
        }
    }

    fn name(&self) -> &str {
        "com-mta"
    }
}
