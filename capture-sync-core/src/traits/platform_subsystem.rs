use crate::models::error::CaptureError;

/// A process-wide OS media subsystem (COM, Media Foundation, ...).
///
/// `PlatformRuntime` calls `initialize` when the first guard is acquired and
/// `shutdown` when the last one is released.
pub trait PlatformSubsystem: Send + Sync {
    fn initialize(&self) -> Result<(), CaptureError>;

    fn shutdown(&self);

    fn name(&self) -> &str;
}

/// Subsystem for platforms that need no process-wide setup.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSubsystem;

impl PlatformSubsystem for NoopSubsystem {
    fn initialize(&self) -> Result<(), CaptureError> {
        Ok(())
    }

    fn shutdown(&self) {}

    fn name(&self) -> &str {
        "noop"
    }
}
