//! # Stage Module
//!
//! Lifecycle and motion of the two linear-stage axes.
//!
//! This module handles:
//! - The motion driver interface and a simulated driver
//! - The per-axis connection state machine
//! - Mapping normalized stick input to continuous-move intents
//! - The connection manager exposed to the control surface

pub mod axis;
pub mod dispatcher;
pub mod driver;
pub mod manager;
pub mod simulated;

use std::fmt;

pub use axis::AxisConnection;
pub use dispatcher::MotionDispatcher;
pub use driver::{DeviceHandle, DriverError, MotionDriver};
pub use manager::{StageCommand, StageController, StageStatus};
pub use simulated::SimulatedDriver;

/// Serial number of one physical axis. Supplied by configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AxisId(String);

impl AxisId {
    pub fn new(serial: impl Into<String>) -> Self {
        Self(serial.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AxisId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AxisId {
    fn from(serial: &str) -> Self {
        Self::new(serial)
    }
}

/// Connection state of one axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Ready,
    Moving,
    Faulted,
}

impl ConnectionState {
    /// Motion and home commands are accepted only in these states.
    #[must_use]
    pub fn accepts_motion(self) -> bool {
        matches!(self, ConnectionState::Ready | ConnectionState::Moving)
    }
}

/// Direction of a continuous move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotorDirection {
    Forward,
    Reverse,
}

impl MotorDirection {
    /// Direction for a signed stick component; `None` at exactly zero.
    #[must_use]
    pub fn from_component(value: f64) -> Option<Self> {
        if value > 0.0 {
            Some(MotorDirection::Forward)
        } else if value < 0.0 {
            Some(MotorDirection::Reverse)
        } else {
            None
        }
    }

    /// +1.0 for forward, -1.0 for reverse.
    #[must_use]
    pub fn sign(self) -> f64 {
        match self {
            MotorDirection::Forward => 1.0,
            MotorDirection::Reverse => -1.0,
        }
    }
}
