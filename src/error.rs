//! Device error taxonomy
//!
//! Controllers report failures with these variants; the layout pipeline logs
//! them and keeps going, so nothing here is fatal on its own.

use thiserror::Error;

/// What kind of device a lookup was for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    Display,
    AudioOutput,
    AudioInput,
}

impl std::fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Display => "display",
            Self::AudioOutput => "audio output",
            Self::AudioInput => "audio input",
        })
    }
}

/// Failure of a single device operation
#[derive(Debug, Error)]
pub enum DeviceError {
    /// The logical or physical name has no match in the latest device snapshot
    #[error("{kind} '{name}' not found")]
    NotFound { kind: DeviceKind, name: String },

    /// The external command could not be run or exited nonzero
    #[error("`{command}` failed: {message}")]
    CommandFailed { command: String, message: String },

    /// The external command exceeded its time budget and was killed
    #[error("`{command}` timed out after {secs} seconds")]
    Timeout { command: String, secs: u64 },
}

impl DeviceError {
    pub(crate) fn not_found(kind: DeviceKind, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
        }
    }

    /// True for both nonzero exits and timeouts
    #[must_use]
    pub fn is_command_failure(&self) -> bool {
        matches!(self, Self::CommandFailed { .. } | Self::Timeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_counts_as_command_failure() {
        let err = DeviceError::Timeout {
            command: "xrandr --query".to_string(),
            secs: 30,
        };
        assert!(err.is_command_failure());
        assert_eq!(err.to_string(), "`xrandr --query` timed out after 30 seconds");
    }

    #[test]
    fn not_found_names_the_device_kind() {
        let err = DeviceError::not_found(DeviceKind::AudioOutput, "hdmi");
        assert!(!err.is_command_failure());
        assert_eq!(err.to_string(), "audio output 'hdmi' not found");
    }
}
