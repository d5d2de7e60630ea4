//! # Simulated Stage Driver
//!
//! A [`MotionDriver`] that models long-travel stage axes in memory.
//!
//! Axes must be registered by serial number before they can be connected,
//! the same way simulated devices are registered with the vendor device
//! manager. Each connected axis:
//!
//! - reports settings initialized `settings_delay` after connecting,
//! - moves at `velocity` units/s while a continuous move is active,
//! - homes at `home_velocity` units/s towards position 0,
//! - keeps its position across disconnect and reconnect.
//!
//! Timing uses `tokio::time`, so tests can run it under paused time.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info};

use super::driver::{DeviceHandle, DriverError, MotionDriver};
use super::{AxisId, MotorDirection};
use crate::config::SimulationConfig;

#[derive(Debug)]
struct SimAxis {
    serial: String,
    connected_at: Instant,
    position: f64,
    motion: Option<(MotorDirection, Instant)>,
    poll_period: Option<Duration>,
}

impl SimAxis {
    /// Folds any active motion into `position` and restarts the motion clock.
    fn settle(&mut self, velocity: f64) {
        if let Some((direction, since)) = self.motion {
            let now = Instant::now();
            self.position += direction.sign() * velocity * (now - since).as_secs_f64();
            self.motion = Some((direction, now));
        }
    }

    fn position_at(&self, velocity: f64) -> f64 {
        match self.motion {
            Some((direction, since)) => {
                self.position + direction.sign() * velocity * since.elapsed().as_secs_f64()
            }
            None => self.position,
        }
    }
}

/// In-memory two-axis stage.
///
/// # Examples
///
/// ```
/// use xbox_stage::config::SimulationConfig;
/// use xbox_stage::stage::{AxisId, MotionDriver, SimulatedDriver};
///
/// # tokio_test::block_on(async {
/// let driver = SimulatedDriver::new(&SimulationConfig::default());
/// driver.register(AxisId::from("45000001"));
///
/// let handle = driver.connect(&AxisId::from("45000001")).await?;
/// assert_eq!(driver.position(handle), 0.0);
/// # Ok::<(), xbox_stage::stage::DriverError>(())
/// # }).unwrap();
/// ```
#[derive(Debug)]
pub struct SimulatedDriver {
    settings_delay: Duration,
    velocity: f64,
    home_velocity: f64,
    registered: Mutex<HashMap<String, f64>>,
    axes: Mutex<HashMap<u64, SimAxis>>,
    next_handle: AtomicU64,
}

impl SimulatedDriver {
    #[must_use]
    pub fn new(config: &SimulationConfig) -> Self {
        Self {
            settings_delay: Duration::from_millis(config.settings_delay_ms),
            velocity: config.velocity,
            home_velocity: config.home_velocity,
            registered: Mutex::new(HashMap::new()),
            axes: Mutex::new(HashMap::new()),
            next_handle: AtomicU64::new(1),
        }
    }

    /// Makes `axis` discoverable by [`MotionDriver::connect`].
    pub fn register(&self, axis: AxisId) {
        self.register_at(axis, 0.0);
    }

    /// Registers `axis` resting at `position`.
    pub fn register_at(&self, axis: AxisId, position: f64) {
        info!("Registered simulated axis {} at {:.3}", axis, position);
        self.lock_registered().insert(axis.as_str().to_string(), position);
    }

    /// Moves a connected axis to `position` instantly.
    pub fn set_position(&self, handle: DeviceHandle, position: f64) {
        if let Some(axis) = self.lock_axes().get_mut(&handle.0) {
            axis.position = position;
            if axis.motion.is_some() {
                axis.motion = axis.motion.map(|(d, _)| (d, Instant::now()));
            }
        }
    }

    /// Poll period of a connected axis, if polling is active.
    #[must_use]
    pub fn poll_period(&self, handle: DeviceHandle) -> Option<Duration> {
        self.lock_axes().get(&handle.0).and_then(|a| a.poll_period)
    }

    /// Number of connected axes.
    #[must_use]
    pub fn connected_count(&self) -> usize {
        self.lock_axes().len()
    }

    fn lock_registered(&self) -> std::sync::MutexGuard<'_, HashMap<String, f64>> {
        self.registered.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_axes(&self) -> std::sync::MutexGuard<'_, HashMap<u64, SimAxis>> {
        self.axes.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn unknown(handle: DeviceHandle) -> DriverError {
        DriverError::Transport(format!("unknown device handle {}", handle.0))
    }
}

#[async_trait]
impl MotionDriver for SimulatedDriver {
    async fn connect(&self, axis: &AxisId) -> Result<DeviceHandle, DriverError> {
        let Some(resting) = self.lock_registered().get(axis.as_str()).copied() else {
            return Err(DriverError::NotFound(axis.to_string()));
        };

        let mut axes = self.lock_axes();
        if axes.values().any(|a| a.serial == axis.as_str()) {
            return Err(DriverError::Transport(format!("{} is already open", axis)));
        }

        let handle = DeviceHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        axes.insert(
            handle.0,
            SimAxis {
                serial: axis.to_string(),
                connected_at: Instant::now(),
                position: resting,
                motion: None,
                poll_period: None,
            },
        );
        debug!("Simulated axis {} opened as handle {}", axis, handle.0);
        Ok(handle)
    }

    fn is_settings_initialized(&self, handle: DeviceHandle) -> bool {
        self.lock_axes()
            .get(&handle.0)
            .map(|a| a.connected_at.elapsed() >= self.settings_delay)
            .unwrap_or(false)
    }

    async fn wait_for_settings_initialized(
        &self,
        handle: DeviceHandle,
        timeout: Duration,
    ) -> Result<(), DriverError> {
        let remaining = {
            let axes = self.lock_axes();
            let axis = axes.get(&handle.0).ok_or_else(|| Self::unknown(handle))?;
            self.settings_delay.saturating_sub(axis.connected_at.elapsed())
        };

        if remaining > timeout {
            sleep(timeout).await;
            return Err(DriverError::Timeout(timeout));
        }
        sleep(remaining).await;
        Ok(())
    }

    async fn start_polling(&self, handle: DeviceHandle, period: Duration) {
        if let Some(axis) = self.lock_axes().get_mut(&handle.0) {
            axis.poll_period = Some(period);
        }
    }

    async fn stop_polling(&self, handle: DeviceHandle) {
        if let Some(axis) = self.lock_axes().get_mut(&handle.0) {
            axis.poll_period = None;
        }
    }

    async fn move_continuous(
        &self,
        handle: DeviceHandle,
        direction: MotorDirection,
    ) -> Result<(), DriverError> {
        let mut axes = self.lock_axes();
        let axis = axes.get_mut(&handle.0).ok_or_else(|| Self::unknown(handle))?;
        axis.settle(self.velocity);
        axis.motion = Some((direction, Instant::now()));
        Ok(())
    }

    async fn stop(&self, handle: DeviceHandle, _timeout: Duration) -> Result<(), DriverError> {
        let mut axes = self.lock_axes();
        let axis = axes.get_mut(&handle.0).ok_or_else(|| Self::unknown(handle))?;
        axis.settle(self.velocity);
        axis.motion = None;
        Ok(())
    }

    async fn home(&self, handle: DeviceHandle, timeout: Duration) -> Result<(), DriverError> {
        let travel = {
            let mut axes = self.lock_axes();
            let axis = axes.get_mut(&handle.0).ok_or_else(|| Self::unknown(handle))?;
            axis.settle(self.velocity);
            axis.motion = None;
            axis.position.abs()
        };

        let duration = if self.home_velocity > 0.0 {
            Duration::try_from_secs_f64(travel / self.home_velocity).unwrap_or(Duration::MAX)
        } else {
            Duration::MAX
        };

        if duration > timeout {
            sleep(timeout).await;
            return Err(DriverError::Timeout(timeout));
        }
        sleep(duration).await;

        if let Some(axis) = self.lock_axes().get_mut(&handle.0) {
            axis.position = 0.0;
        }
        Ok(())
    }

    async fn disconnect(&self, handle: DeviceHandle) -> Result<(), DriverError> {
        let removed = self.lock_axes().remove(&handle.0);
        match removed {
            Some(axis) => {
                let position = axis.position_at(self.velocity);
                self.lock_registered().insert(axis.serial.clone(), position);
                debug!("Simulated axis {} closed at {:.3}", axis.serial, position);
                Ok(())
            }
            None => Err(Self::unknown(handle)),
        }
    }

    fn position(&self, handle: DeviceHandle) -> f64 {
        self.lock_axes()
            .get(&handle.0)
            .map(|a| a.position_at(self.velocity))
            .unwrap_or(0.0)
    }
}
