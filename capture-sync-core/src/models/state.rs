use serde::{Deserialize, Serialize};

/// Capture session lifecycle state.
///
/// State transitions:
/// ```text
/// created → initialized → active ↔ paused
///    ↓           ↓          ↓        ↓
///  failed      failed    stopped / failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum CaptureState {
    Created = 0,
    Initialized = 1,
    Active = 2,
    Paused = 3,
    Stopped = 4,
    Failed = 5,
}

impl CaptureState {
    /// Decode the atomic representation. Unknown values map to `Failed`.
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Created,
            1 => Self::Initialized,
            2 => Self::Active,
            3 => Self::Paused,
            4 => Self::Stopped,
            _ => Self::Failed,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped | Self::Failed)
    }

    pub fn is_capturing(&self) -> bool {
        matches!(self, Self::Active | Self::Paused)
    }

    /// The fixed transition table.
    pub fn can_transition_to(&self, target: CaptureState) -> bool {
        use CaptureState::*;
        matches!(
            (self, target),
            (Created, Initialized)
                | (Created, Failed)
                | (Initialized, Active)
                | (Initialized, Failed)
                | (Active, Paused)
                | (Active, Stopped)
                | (Active, Failed)
                | (Paused, Active)
                | (Paused, Stopped)
                | (Paused, Failed)
        )
    }

    pub fn all() -> [CaptureState; 6] {
        [
            Self::Created,
            Self::Initialized,
            Self::Active,
            Self::Paused,
            Self::Stopped,
            Self::Failed,
        ]
    }
}
