//! # Stage Controller Module
//!
//! Connection manager for the X and Y axes.
//!
//! The [`StageController`] is the single owner of both [`AxisConnection`]s.
//! Each axis sits behind its own async mutex so that the polling loop
//! (`start_move`/`stop`) and the control surface (`connect`, `disconnect`,
//! `home`) never mutate an axis concurrently. The polling loop only ever
//! `try_lock`s: an axis busy with a bounded foreground wait is skipped for
//! that tick instead of stalling the loop.
//!
//! Observers subscribe to a [`StageStatus`] watch channel carrying the axis
//! positions and the `stage_initialized` flag.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use super::axis::{AxisConnection, AxisTiming};
use super::dispatcher::MotionDispatcher;
use super::driver::MotionDriver;
use super::{AxisId, ConnectionState};
use crate::config::StageConfig;
use crate::controller::deadzone::NormalizedInput;
use crate::error::Result;

/// Snapshot published to observers after every state change.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StageStatus {
    pub position_x: f64,
    pub position_y: f64,
    /// Both axes have reached `Ready` since they were last connected.
    pub stage_initialized: bool,
    pub x_state: ConnectionState,
    pub y_state: ConnectionState,
}

/// Commands accepted from the control surface or button bindings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageCommand {
    Connect,
    Disconnect,
    Home,
}

/// Owner of the two stage axes.
pub struct StageController {
    axis_x: Mutex<AxisConnection>,
    axis_y: Mutex<AxisConnection>,
    homing_timeout: Duration,
    status_tx: watch::Sender<StageStatus>,
}

impl std::fmt::Debug for StageController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageController")
            .field("status", &*self.status_tx.borrow())
            .field("homing_timeout", &self.homing_timeout)
            .finish_non_exhaustive()
    }
}

impl StageController {
    /// Creates a controller with both axes disconnected.
    pub fn new(config: &StageConfig, driver: Arc<dyn MotionDriver>) -> Self {
        let timing = AxisTiming::from_config(config);
        let (status_tx, _) = watch::channel(StageStatus::default());

        Self {
            axis_x: Mutex::new(AxisConnection::new(
                AxisId::new(config.x_axis_id.clone()),
                driver.clone(),
                timing,
            )),
            axis_y: Mutex::new(AxisConnection::new(
                AxisId::new(config.y_axis_id.clone()),
                driver,
                timing,
            )),
            homing_timeout: Duration::from_millis(config.homing_timeout_ms),
            status_tx,
        }
    }

    /// Receiver for status updates.
    pub fn subscribe(&self) -> watch::Receiver<StageStatus> {
        self.status_tx.subscribe()
    }

    /// Latest published status.
    #[must_use]
    pub fn status(&self) -> StageStatus {
        *self.status_tx.borrow()
    }

    /// Connects every disconnected axis, X and Y in parallel.
    ///
    /// Axes that are already connected are left alone.
    ///
    /// # Errors
    ///
    /// Returns the first axis error (X before Y). The other axis is still
    /// attempted.
    pub async fn request_connect(&self) -> Result<()> {
        info!("Connect requested");
        let (rx, ry) = tokio::join!(
            connect_if_disconnected(&self.axis_x),
            connect_if_disconnected(&self.axis_y),
        );
        self.publish().await;
        rx.and(ry)
    }

    /// Disconnects both axes. Always ends with both `Disconnected`.
    pub async fn request_disconnect(&self) {
        info!("Disconnect requested");
        tokio::join!(
            async { self.axis_x.lock().await.disconnect().await },
            async { self.axis_y.lock().await.disconnect().await },
        );
        self.publish().await;
    }

    /// Homes both axes in parallel with the configured homing timeout.
    ///
    /// # Errors
    ///
    /// Returns the first axis error (X before Y).
    pub async fn request_home(&self) -> Result<()> {
        info!("Home requested");
        let timeout = self.homing_timeout;
        let (rx, ry) = tokio::join!(
            async { self.axis_x.lock().await.home(timeout).await },
            async { self.axis_y.lock().await.home(timeout).await },
        );
        self.publish().await;
        rx.and(ry)
    }

    /// Runs a command, logging its failure.
    pub async fn execute(&self, command: StageCommand) {
        let outcome = match command {
            StageCommand::Connect => self.request_connect().await,
            StageCommand::Disconnect => {
                self.request_disconnect().await;
                Ok(())
            }
            StageCommand::Home => self.request_home().await,
        };

        match outcome {
            Ok(()) => {}
            Err(e) if e.is_fault() => {
                warn!("{:?} failed: {}; disconnect to clear the fault", command, e)
            }
            Err(e) => warn!("{:?} failed: {}", command, e),
        }
    }

    /// Forwards one tick of stick input to whichever axes are free.
    pub async fn dispatch(&self, dispatcher: &MotionDispatcher, input: &NormalizedInput) {
        match self.axis_x.try_lock() {
            Ok(mut axis) => dispatcher.dispatch_x(input, &mut axis).await,
            Err(_) => debug!("Axis X busy, skipping dispatch"),
        }
        match self.axis_y.try_lock() {
            Ok(mut axis) => dispatcher.dispatch_y(input, &mut axis).await,
            Err(_) => debug!("Axis Y busy, skipping dispatch"),
        }
    }

    /// Re-reads positions of free axes and publishes the status.
    pub fn refresh_status(&self) {
        let mut next = self.status();
        let x = self.axis_x.try_lock().ok().map(|mut axis| {
            axis.refresh_position();
            next.position_x = axis.last_known_position();
            next.x_state = axis.state();
            axis.is_initialized()
        });
        let y = self.axis_y.try_lock().ok().map(|mut axis| {
            axis.refresh_position();
            next.position_y = axis.last_known_position();
            next.y_state = axis.state();
            axis.is_initialized()
        });
        if let (Some(x), Some(y)) = (x, y) {
            next.stage_initialized = x && y;
        }
        self.send(next);
    }

    async fn publish(&self) {
        let x = self.axis_x.lock().await;
        let y = self.axis_y.lock().await;
        self.send(StageStatus {
            position_x: x.last_known_position(),
            position_y: y.last_known_position(),
            stage_initialized: x.is_initialized() && y.is_initialized(),
            x_state: x.state(),
            y_state: y.state(),
        });
    }

    fn send(&self, next: StageStatus) {
        let changed = self.status_tx.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
        if changed {
            debug!("Stage status: {:?}", next);
        }
    }
}

async fn connect_if_disconnected(axis: &Mutex<AxisConnection>) -> Result<()> {
    let mut axis = axis.lock().await;
    if axis.state() != ConnectionState::Disconnected {
        debug!("Axis {} already {:?}", axis.id(), axis.state());
        return Ok(());
    }
    axis.connect().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimulationConfig;
    use crate::error::StageError;
    use crate::stage::{MotorDirection, SimulatedDriver};

    fn stage_config() -> StageConfig {
        StageConfig {
            x_axis_id: "45000001".to_string(),
            y_axis_id: "45000002".to_string(),
            poll_period_ms: 250,
            settings_timeout_ms: 5000,
            homing_timeout_ms: 60000,
            stop_timeout_ms: 6000,
            invert_x: false,
            invert_y: false,
        }
    }

    fn simulated(serials: &[&str]) -> Arc<SimulatedDriver> {
        let driver = Arc::new(SimulatedDriver::new(&SimulationConfig {
            settings_delay_ms: 800,
            velocity: 10.0,
            home_velocity: 10.0,
        }));
        for serial in serials {
            driver.register(AxisId::from(*serial));
        }
        driver
    }

    fn moving_input() -> NormalizedInput {
        NormalizedInput {
            direction_x: 0.6,
            direction_y: -0.8,
            magnitude: 1.0,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_then_disconnect_both_axes() {
        let driver = simulated(&["45000001", "45000002"]);
        let stage = StageController::new(&stage_config(), driver.clone());
        let mut status_rx = stage.subscribe();

        tokio_test::assert_ok!(stage.request_connect().await);
        let status = stage.status();
        assert_eq!(status.x_state, ConnectionState::Ready);
        assert_eq!(status.y_state, ConnectionState::Ready);
        assert!(status.stage_initialized);
        assert!(status_rx.has_changed().unwrap());
        assert!(status_rx.borrow_and_update().stage_initialized);

        stage.request_disconnect().await;
        let status = stage.status();
        assert_eq!(status.x_state, ConnectionState::Disconnected);
        assert_eq!(status.y_state, ConnectionState::Disconnected);
        assert!(!status.stage_initialized);
        assert_eq!(driver.connected_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_axes_connect_in_parallel() {
        let stage = StageController::new(&stage_config(), simulated(&["45000001", "45000002"]));

        let started = tokio::time::Instant::now();
        stage.request_connect().await.unwrap();
        // Both 800 ms settings waits overlap
        assert!(started.elapsed() < Duration::from_millis(1600));
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_connect_failure() {
        let stage = StageController::new(&stage_config(), simulated(&["45000001"]));

        let result = stage.request_connect().await;
        assert!(matches!(result, Err(StageError::Connection { ref axis, .. }) if axis == "45000002"));

        let status = stage.status();
        assert_eq!(status.x_state, ConnectionState::Ready);
        assert_eq!(status.y_state, ConnectionState::Disconnected);
        assert!(!status.stage_initialized);
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_connect_is_harmless() {
        let stage = StageController::new(&stage_config(), simulated(&["45000001", "45000002"]));
        stage.request_connect().await.unwrap();
        tokio_test::assert_ok!(stage.request_connect().await);
        assert!(stage.status().stage_initialized);
    }

    #[tokio::test(start_paused = true)]
    async fn test_home_before_connect_is_rejected() {
        let stage = StageController::new(&stage_config(), simulated(&["45000001", "45000002"]));
        let result = stage.request_home().await;
        assert!(matches!(result, Err(StageError::InvalidState { command: "home", .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispatch_moves_and_refresh_publishes_positions() {
        let stage = StageController::new(&stage_config(), simulated(&["45000001", "45000002"]));
        stage.request_connect().await.unwrap();

        stage.dispatch(&MotionDispatcher::default(), &moving_input()).await;
        tokio::time::advance(Duration::from_secs(2)).await;
        stage.refresh_status();

        let status = stage.status();
        assert_eq!(status.x_state, ConnectionState::Moving);
        assert!((status.position_x - 20.0).abs() < 1e-6);
        assert!((status.position_y + 20.0).abs() < 1e-6);

        tokio_test::assert_ok!(stage.request_home().await);
        let status = stage.status();
        assert_eq!(status.x_state, ConnectionState::Ready);
        assert_eq!(status.position_x, 0.0);
        assert_eq!(status.position_y, 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispatch_skips_busy_axis() {
        let stage = StageController::new(&stage_config(), simulated(&["45000001", "45000002"]));
        stage.request_connect().await.unwrap();

        {
            let _held = stage.axis_x.lock().await;
            stage.dispatch(&MotionDispatcher::default(), &moving_input()).await;
        }

        assert_eq!(stage.axis_x.lock().await.state(), ConnectionState::Ready);
        assert_eq!(stage.axis_y.lock().await.state(), ConnectionState::Moving);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_moves_after_disconnect() {
        let driver = simulated(&["45000001", "45000002"]);
        let stage = Arc::new(StageController::new(&stage_config(), driver.clone()));
        stage.request_connect().await.unwrap();

        let dispatcher = MotionDispatcher::default();
        let mover = {
            let stage = stage.clone();
            tokio::spawn(async move {
                for _ in 0..50 {
                    stage.dispatch(&dispatcher, &moving_input()).await;
                    tokio::task::yield_now().await;
                }
            })
        };
        stage.request_disconnect().await;
        mover.await.unwrap();

        // Later moves were rejected without reopening the device
        assert_eq!(driver.connected_count(), 0);
        let x = stage.axis_x.lock().await;
        assert_eq!(x.state(), ConnectionState::Disconnected);
        assert_eq!(x.direction(), None);
        drop(x);

        let mut y = stage.axis_y.lock().await;
        assert!(y.start_move(MotorDirection::Forward).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_logs_and_continues() {
        let stage = StageController::new(&stage_config(), simulated(&[]));
        stage.execute(StageCommand::Connect).await;
        stage.execute(StageCommand::Home).await;
        stage.execute(StageCommand::Disconnect).await;
        assert_eq!(stage.status().x_state, ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_home_fault_needs_disconnect() {
        let driver = simulated(&["45000002"]);
        // 1000 units at 10 units/s: homing needs 100 s
        driver.register_at(AxisId::from("45000001"), 1000.0);
        let stage = StageController::new(&stage_config(), driver);

        stage.execute(StageCommand::Connect).await;
        stage.execute(StageCommand::Home).await;
        let status = stage.status();
        assert_eq!(status.x_state, ConnectionState::Faulted);
        assert_eq!(status.y_state, ConnectionState::Ready);

        // Connect does not clear the fault
        stage.execute(StageCommand::Connect).await;
        assert_eq!(stage.status().x_state, ConnectionState::Faulted);

        stage.execute(StageCommand::Disconnect).await;
        stage.execute(StageCommand::Connect).await;
        assert_eq!(stage.status().x_state, ConnectionState::Ready);
    }
}
