//! # Axis Connection Module
//!
//! State machine wrapping the lifecycle of one physical stage axis.
//!
//! ## States
//!
//! | From | Command | To |
//! |------|---------|----|
//! | Disconnected | connect | Connecting, then Ready |
//! | Connecting | settings timeout | Faulted |
//! | Ready / Moving | start_move | Moving |
//! | Moving | stop | Ready |
//! | Ready / Moving | home | Ready, or Faulted on timeout |
//! | any | disconnect | Disconnected |
//!
//! Commands issued in a state that forbids them return
//! [`StageError::InvalidState`] without touching the device. Device
//! failures during a move leave the axis `Faulted` until it is
//! disconnected. Disconnect never fails.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::driver::{DeviceHandle, DriverError, MotionDriver};
use super::{AxisId, ConnectionState, MotorDirection};
use crate::config::StageConfig;
use crate::error::{Result, StageError};

/// Timing bounds applied by an [`AxisConnection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxisTiming {
    /// Bound on the wait for device settings after connecting.
    pub settings_timeout: Duration,
    /// Device status poll period started once the axis is ready.
    pub poll_period: Duration,
    /// Bound passed to the driver when stopping a move.
    pub stop_timeout: Duration,
}

impl Default for AxisTiming {
    fn default() -> Self {
        Self {
            settings_timeout: Duration::from_millis(5000),
            poll_period: Duration::from_millis(250),
            stop_timeout: Duration::from_millis(6000),
        }
    }
}

impl AxisTiming {
    #[must_use]
    pub fn from_config(config: &StageConfig) -> Self {
        Self {
            settings_timeout: Duration::from_millis(config.settings_timeout_ms),
            poll_period: Duration::from_millis(config.poll_period_ms),
            stop_timeout: Duration::from_millis(config.stop_timeout_ms),
        }
    }
}

/// One physical axis and its connection state.
pub struct AxisConnection {
    id: AxisId,
    driver: Arc<dyn MotionDriver>,
    timing: AxisTiming,
    state: ConnectionState,
    handle: Option<DeviceHandle>,
    direction: Option<MotorDirection>,
    last_known_position: f64,
    initialized: bool,
}

impl std::fmt::Debug for AxisConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AxisConnection")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("handle", &self.handle)
            .field("last_known_position", &self.last_known_position)
            .finish_non_exhaustive()
    }
}

impl AxisConnection {
    /// Creates a disconnected axis.
    pub fn new(id: AxisId, driver: Arc<dyn MotionDriver>, timing: AxisTiming) -> Self {
        Self {
            id,
            driver,
            timing,
            state: ConnectionState::Disconnected,
            handle: None,
            direction: None,
            last_known_position: 0.0,
            initialized: false,
        }
    }

    #[must_use]
    pub fn id(&self) -> &AxisId {
        &self.id
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Direction of the active continuous move, if any.
    #[must_use]
    pub fn direction(&self) -> Option<MotorDirection> {
        self.direction
    }

    #[must_use]
    pub fn last_known_position(&self) -> f64 {
        self.last_known_position
    }

    /// True once the axis has reached `Ready` since its last connect.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Discovers the device, waits for its settings and starts polling.
    ///
    /// # Errors
    ///
    /// - `InvalidState` unless the axis is `Disconnected`
    /// - `Connection` if discovery fails; the axis stays `Disconnected`
    /// - `InitializationTimeout` if settings do not load within the bound;
    ///   the axis is left `Faulted`
    pub async fn connect(&mut self) -> Result<()> {
        if self.state != ConnectionState::Disconnected {
            return Err(self.reject("connect"));
        }

        self.state = ConnectionState::Connecting;
        info!("Connecting axis {}", self.id);

        let handle = match self.driver.connect(&self.id).await {
            Ok(handle) => handle,
            Err(e) => {
                self.state = ConnectionState::Disconnected;
                return Err(StageError::Connection {
                    axis: self.id.to_string(),
                    reason: e.to_string(),
                });
            }
        };
        self.handle = Some(handle);

        if !self.driver.is_settings_initialized(handle) {
            let bound = self.timing.settings_timeout;
            let waited = tokio::time::timeout(
                bound,
                self.driver.wait_for_settings_initialized(handle, bound),
            )
            .await;

            match waited {
                Ok(Ok(())) => {}
                Ok(Err(DriverError::Timeout(_))) | Err(_) => {
                    self.state = ConnectionState::Faulted;
                    return Err(StageError::InitializationTimeout {
                        axis: self.id.to_string(),
                        timeout_ms: millis(bound),
                    });
                }
                Ok(Err(e)) => return Err(self.fault(e)),
            }
        }

        self.driver.start_polling(handle, self.timing.poll_period).await;
        self.last_known_position = self.driver.position(handle);
        self.state = ConnectionState::Ready;
        self.initialized = true;
        info!("Axis {} ready at position {:.3}", self.id, self.last_known_position);
        Ok(())
    }

    /// Starts, or re-aims, a continuous move.
    ///
    /// Re-issuing the active direction is accepted without a device call.
    pub async fn start_move(&mut self, direction: MotorDirection) -> Result<()> {
        let handle = self.motion_handle("start_move")?;

        if self.state == ConnectionState::Moving && self.direction == Some(direction) {
            return Ok(());
        }

        if let Err(e) = self.driver.move_continuous(handle, direction).await {
            return Err(self.fault(e));
        }

        debug!("Axis {} moving {:?}", self.id, direction);
        self.state = ConnectionState::Moving;
        self.direction = Some(direction);
        Ok(())
    }

    /// Stops a continuous move. A no-op when already `Ready`.
    pub async fn stop(&mut self) -> Result<()> {
        let handle = self.motion_handle("stop")?;

        if self.state == ConnectionState::Ready {
            return Ok(());
        }

        if let Err(e) = self.driver.stop(handle, self.timing.stop_timeout).await {
            return Err(self.fault(e));
        }

        debug!("Axis {} stopped", self.id);
        self.state = ConnectionState::Ready;
        self.direction = None;
        self.refresh_position();
        Ok(())
    }

    /// Homes the axis, waiting at most `timeout`.
    ///
    /// # Errors
    ///
    /// - `InvalidState` unless the axis is `Ready` or `Moving`
    /// - `HomingTimeout` if homing does not finish in time; the axis is left
    ///   `Faulted`
    pub async fn home(&mut self, timeout: Duration) -> Result<()> {
        let handle = self.motion_handle("home")?;
        info!("Homing axis {} (timeout {} ms)", self.id, millis(timeout));

        let homed = tokio::time::timeout(timeout, self.driver.home(handle, timeout)).await;
        match homed {
            Ok(Ok(())) => {
                self.state = ConnectionState::Ready;
                self.direction = None;
                self.refresh_position();
                info!("Axis {} homed", self.id);
                Ok(())
            }
            Ok(Err(DriverError::Timeout(_))) | Err(_) => {
                self.state = ConnectionState::Faulted;
                self.direction = None;
                Err(StageError::HomingTimeout {
                    axis: self.id.to_string(),
                    timeout_ms: millis(timeout),
                })
            }
            Ok(Err(e)) => Err(self.fault(e)),
        }
    }

    /// Releases the device from any state and ends `Disconnected`.
    ///
    /// Errors reported while tearing down are logged, not returned.
    pub async fn disconnect(&mut self) {
        if self.state == ConnectionState::Disconnected {
            return;
        }

        if let Some(handle) = self.handle.take() {
            if self.state == ConnectionState::Moving {
                if let Err(e) = self.driver.stop(handle, self.timing.stop_timeout).await {
                    warn!("Axis {}: stop during disconnect failed: {}", self.id, e);
                }
            }
            self.driver.stop_polling(handle).await;
            if let Err(e) = self.driver.disconnect(handle).await {
                warn!("Axis {}: release failed: {}", self.id, e);
            }
        }

        self.state = ConnectionState::Disconnected;
        self.direction = None;
        self.initialized = false;
        info!("Axis {} disconnected", self.id);
    }

    /// Reads the device position into `last_known_position`.
    pub fn refresh_position(&mut self) {
        if let Some(handle) = self.handle {
            self.last_known_position = self.driver.position(handle);
        }
    }

    fn motion_handle(&self, command: &'static str) -> Result<DeviceHandle> {
        match self.handle {
            Some(handle) if self.state.accepts_motion() => Ok(handle),
            _ => Err(self.reject(command)),
        }
    }

    fn reject(&self, command: &'static str) -> StageError {
        StageError::InvalidState {
            axis: self.id.to_string(),
            command,
            state: self.state,
        }
    }

    fn fault(&mut self, error: DriverError) -> StageError {
        warn!("Axis {} faulted: {}", self.id, error);
        self.state = ConnectionState::Faulted;
        self.direction = None;
        StageError::Device {
            axis: self.id.to_string(),
            reason: error.to_string(),
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
