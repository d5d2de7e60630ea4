//! # Error Types
//!
//! Custom error types for XBox Stage using `thiserror`.

use thiserror::Error;

use crate::stage::ConnectionState;

/// Main error type for XBox Stage
#[derive(Debug, Error)]
pub enum StageError {
    /// Device discovery or enumeration failed
    #[error("Connection error on axis {axis}: {reason}")]
    Connection { axis: String, reason: String },

    /// Device settings did not initialize within the bounded wait
    #[error("Axis {axis} settings not initialized within {timeout_ms} ms")]
    InitializationTimeout { axis: String, timeout_ms: u64 },

    /// Homing did not complete within the caller-supplied bound
    #[error("Axis {axis} homing not complete within {timeout_ms} ms")]
    HomingTimeout { axis: String, timeout_ms: u64 },

    /// Command issued in a state that forbids it
    #[error("Axis {axis} cannot {command} while {state:?}")]
    InvalidState {
        axis: String,
        command: &'static str,
        state: ConnectionState,
    },

    /// Transport-level failure while talking to the stage
    #[error("Device error on axis {axis}: {reason}")]
    Device { axis: String, reason: String },

    /// No gamepad found on the system
    #[error("No gamepad found: {0}")]
    GamepadNotFound(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// Settings could not be encoded
    #[error("Settings encode error: {0}")]
    SettingsEncode(#[from] toml::ser::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StageError {
    /// Returns true for errors that leave the axis faulted and need a
    /// disconnect before the next connect.
    #[must_use]
    pub fn is_fault(&self) -> bool {
        matches!(
            self,
            StageError::InitializationTimeout { .. }
                | StageError::HomingTimeout { .. }
                | StageError::Device { .. }
        )
    }
}

/// Result type alias for XBox Stage
pub type Result<T> = std::result::Result<T, StageError>;
