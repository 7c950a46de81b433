use thiserror::Error;

use super::state::CaptureState;

/// Errors surfaced by the capture synchronization core.
///
/// Per-iteration failures inside the capture threads are logged and counted
/// rather than returned; these variants reach callers only from operations
/// that establish or tear down the pipeline.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("device not available")]
    DeviceNotAvailable,

    #[error("device start failed: {0}")]
    DeviceStartFailed(String),

    #[error("failed to spawn thread: {0}")]
    ThreadSpawnFailed(String),

    #[error("{0} already running")]
    AlreadyRunning(&'static str),

    #[error("illegal state transition: {from:?} -> {to:?}")]
    InvalidTransition { from: CaptureState, to: CaptureState },

    #[error("configuration failed: {0}")]
    ConfigurationFailed(String),

    #[error("read failed: {0}")]
    ReadFailed(String),

    #[error("write failed: {0}")]
    WriteFailed(String),

    #[error("storage error: {0}")]
    StorageError(String),

    #[error("sink already finalized")]
    SinkFinalized,

    #[error("unknown error: {0}")]
    Unknown(String),
}

impl CaptureError {
    /// Stable diagnostic code for logs and host applications.
    pub fn code(&self) -> &'static str {
        match self {
            Self::DeviceNotAvailable => "device_not_available",
            Self::DeviceStartFailed(_) => "device_start_failed",
            Self::ThreadSpawnFailed(_) => "thread_spawn_failed",
            Self::AlreadyRunning(_) => "already_running",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::ConfigurationFailed(_) => "configuration_failed",
            Self::ReadFailed(_) => "read_failed",
            Self::WriteFailed(_) => "write_failed",
            Self::StorageError(_) => "storage_error",
            Self::SinkFinalized => "sink_finalized",
            Self::Unknown(_) => "unknown",
        }
    }

    /// Whether this error prevents the pipeline from being established.
    pub fn is_fatal_to_start(&self) -> bool {
        matches!(
            self,
            Self::DeviceNotAvailable
                | Self::DeviceStartFailed(_)
                | Self::ThreadSpawnFailed(_)
                | Self::AlreadyRunning(_)
                | Self::InvalidTransition { .. }
                | Self::ConfigurationFailed(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(CaptureError::DeviceNotAvailable.code(), "device_not_available");
        assert_eq!(
            CaptureError::InvalidTransition {
                from: CaptureState::Stopped,
                to: CaptureState::Active,
            }
            .code(),
            "invalid_transition"
        );
    }

    #[test]
    fn transient_errors_are_not_fatal() {
        assert!(!CaptureError::ReadFailed("glitch".into()).is_fatal_to_start());
        assert!(!CaptureError::WriteFailed("disk".into()).is_fatal_to_start());
        assert!(CaptureError::DeviceStartFailed("busy".into()).is_fatal_to_start());
    }

    #[test]
    fn display_includes_states() {
        let err = CaptureError::InvalidTransition {
            from: CaptureState::Created,
            to: CaptureState::Active,
        };
        assert_eq!(err.to_string(), "illegal state transition: Created -> Active");
    }
}
