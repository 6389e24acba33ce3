//! Error taxonomy for the recording workflow.

use thiserror::Error;

use super::controller::SessionMode;

/// Errors raised by the recording controller and the audio service behind it.
///
/// `InvalidTransition` never leaves the controller: it is logged and the
/// request is treated as a no-op.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RecorderError {
    #[error("microphone permission denied")]
    PermissionDenied,

    #[error("audio device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("cannot {operation} while {mode}")]
    InvalidTransition {
        operation: &'static str,
        mode: SessionMode,
    },

    #[error("recording storage failed: {0}")]
    Storage(String),
}

impl RecorderError {
    /// Whether the error should be shown to the user rather than swallowed.
    pub fn is_user_visible(&self) -> bool {
        !matches!(self, Self::InvalidTransition { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_transition_message() {
        let err = RecorderError::InvalidTransition {
            operation: "pause",
            mode: SessionMode::Idle,
        };
        assert_eq!(err.to_string(), "cannot pause while idle");
        assert!(!err.is_user_visible());
    }

    #[test]
    fn test_surfaced_errors_are_user_visible() {
        assert!(RecorderError::PermissionDenied.is_user_visible());
        assert!(RecorderError::DeviceUnavailable("no input".into()).is_user_visible());
        assert!(RecorderError::Storage("disk full".into()).is_user_visible());
    }
}
