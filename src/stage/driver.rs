//! Trait abstraction for the stage motion controller to enable testing

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use super::{AxisId, MotorDirection};

/// Opaque handle to one connected axis, issued by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceHandle(pub u64);

/// Errors reported by a motion driver.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DriverError {
    /// No device with the requested serial number
    #[error("device {0} not found")]
    NotFound(String),

    /// Bounded wait elapsed
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// Transport-level failure
    #[error("transport failure: {0}")]
    Transport(String),
}

/// Operations consumed from the stage motion controller.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MotionDriver: Send + Sync {
    /// Discover and open the axis with the given serial number
    async fn connect(&self, axis: &AxisId) -> Result<DeviceHandle, DriverError>;

    /// True once the device has loaded its settings
    fn is_settings_initialized(&self, handle: DeviceHandle) -> bool;

    /// Block until settings are loaded, or `timeout` elapses
    async fn wait_for_settings_initialized(
        &self,
        handle: DeviceHandle,
        timeout: Duration,
    ) -> Result<(), DriverError>;

    /// Start the device status poll at `period`
    async fn start_polling(&self, handle: DeviceHandle, period: Duration);

    /// Stop the device status poll
    async fn stop_polling(&self, handle: DeviceHandle);

    /// Move until stopped
    async fn move_continuous(
        &self,
        handle: DeviceHandle,
        direction: MotorDirection,
    ) -> Result<(), DriverError>;

    /// Stop any motion, waiting at most `timeout`
    async fn stop(&self, handle: DeviceHandle, timeout: Duration) -> Result<(), DriverError>;

    /// Drive to the reference position, waiting at most `timeout`
    async fn home(&self, handle: DeviceHandle, timeout: Duration) -> Result<(), DriverError>;

    /// Release the device
    async fn disconnect(&self, handle: DeviceHandle) -> Result<(), DriverError>;

    /// Last position reported by the device poll
    fn position(&self, handle: DeviceHandle) -> f64;
}
