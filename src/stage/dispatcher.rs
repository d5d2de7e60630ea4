//! # Motion Dispatcher Module
//!
//! Maps a normalized stick vector onto continuous-move intents for the X
//! and Y axes.
//!
//! ## Mapping
//!
//! | Input | Axis command |
//! |-------|--------------|
//! | magnitude 0 | `stop` if the axis is moving |
//! | component > 0 | `start_move(Forward)` |
//! | component < 0 | `start_move(Reverse)` |
//! | component 0 | `stop` if the axis is moving |
//!
//! Each axis's own state machine decides whether a command is accepted.
//! Rejections are expected (e.g. the stick moves before the stage is
//! connected) and are logged, never propagated.

use tracing::{debug, warn};

use super::axis::AxisConnection;
use super::{ConnectionState, MotorDirection};
use crate::controller::deadzone::NormalizedInput;
use crate::error::{Result, StageError};

/// Stateless mapping from stick input to axis commands.
#[derive(Debug, Clone, Copy, Default)]
pub struct MotionDispatcher {
    invert_x: bool,
    invert_y: bool,
}

impl MotionDispatcher {
    /// Creates a dispatcher, optionally reversing either axis.
    #[must_use]
    pub fn new(invert_x: bool, invert_y: bool) -> Self {
        Self { invert_x, invert_y }
    }

    /// Issues this tick's commands to both axes.
    pub async fn dispatch(
        &self,
        input: &NormalizedInput,
        axis_x: &mut AxisConnection,
        axis_y: &mut AxisConnection,
    ) {
        self.dispatch_x(input, axis_x).await;
        self.dispatch_y(input, axis_y).await;
    }

    /// Issues this tick's command to the X axis only.
    pub async fn dispatch_x(&self, input: &NormalizedInput, axis: &mut AxisConnection) {
        let component = oriented(input.direction_x, self.invert_x);
        let outcome = drive(axis, component, input.magnitude).await;
        log_outcome(axis, outcome);
    }

    /// Issues this tick's command to the Y axis only.
    pub async fn dispatch_y(&self, input: &NormalizedInput, axis: &mut AxisConnection) {
        let component = oriented(input.direction_y, self.invert_y);
        let outcome = drive(axis, component, input.magnitude).await;
        log_outcome(axis, outcome);
    }
}

fn oriented(component: f64, invert: bool) -> f64 {
    if invert {
        -component
    } else {
        component
    }
}

async fn drive(axis: &mut AxisConnection, component: f64, magnitude: f64) -> Result<()> {
    let direction = if magnitude == 0.0 {
        None
    } else {
        MotorDirection::from_component(component)
    };

    match direction {
        Some(direction) => axis.start_move(direction).await,
        None if axis.state() == ConnectionState::Moving => axis.stop().await,
        None => Ok(()),
    }
}

fn log_outcome(axis: &AxisConnection, outcome: Result<()>) {
    match outcome {
        Ok(()) => {}
        Err(e @ StageError::InvalidState { .. }) => debug!("Dispatch ignored: {}", e),
        Err(e) => warn!("Dispatch to axis {} failed: {}", axis.id(), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::axis::AxisTiming;
    use crate::stage::driver::{DeviceHandle, MockMotionDriver, MotionDriver};
    use crate::stage::AxisId;
    use std::sync::Arc;

    fn input(direction_x: f64, direction_y: f64, magnitude: f64) -> NormalizedInput {
        NormalizedInput {
            direction_x,
            direction_y,
            magnitude,
        }
    }

    fn axis(serial: &str, driver: Arc<dyn MotionDriver>) -> AxisConnection {
        AxisConnection::new(AxisId::from(serial), driver, AxisTiming::default())
    }

    /// Mock accepting connect and recording move directions by serial.
    fn recording_mock(
        moves: Arc<std::sync::Mutex<Vec<(u64, MotorDirection)>>>,
        stops: Arc<std::sync::Mutex<Vec<u64>>>,
    ) -> MockMotionDriver {
        let mut mock = MockMotionDriver::new();
        mock.expect_connect().returning(|axis| {
            Ok(DeviceHandle(if axis.as_str() == "X" { 1 } else { 2 }))
        });
        mock.expect_is_settings_initialized().return_const(true);
        mock.expect_start_polling().return_const(());
        mock.expect_position().return_const(0.0);
        mock.expect_move_continuous().returning(move |h, d| {
            moves.lock().unwrap().push((h.0, d));
            Ok(())
        });
        mock.expect_stop().returning(move |h, _| {
            stops.lock().unwrap().push(h.0);
            Ok(())
        });
        mock
    }

    #[tokio::test]
    async fn test_disconnected_axes_receive_no_device_calls() {
        let driver: Arc<dyn MotionDriver> = Arc::new(MockMotionDriver::new());
        let mut x = axis("X", driver.clone());
        let mut y = axis("Y", driver);

        MotionDispatcher::default()
            .dispatch(&input(1.0, -1.0, 0.8), &mut x, &mut y)
            .await;

        assert_eq!(x.state(), ConnectionState::Disconnected);
        assert_eq!(y.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_direction_signs() {
        let moves = Arc::new(std::sync::Mutex::new(Vec::new()));
        let stops = Arc::new(std::sync::Mutex::new(Vec::new()));
        let driver: Arc<dyn MotionDriver> = Arc::new(recording_mock(moves.clone(), stops));
        let mut x = axis("X", driver.clone());
        let mut y = axis("Y", driver);
        x.connect().await.unwrap();
        y.connect().await.unwrap();

        let diagonal = std::f64::consts::FRAC_1_SQRT_2;
        MotionDispatcher::default()
            .dispatch(&input(diagonal, -diagonal, 0.5), &mut x, &mut y)
            .await;

        assert_eq!(
            *moves.lock().unwrap(),
            vec![(1, MotorDirection::Forward), (2, MotorDirection::Reverse)]
        );
        assert_eq!(x.state(), ConnectionState::Moving);
        assert_eq!(y.state(), ConnectionState::Moving);
    }

    #[tokio::test]
    async fn test_idle_stick_stops_moving_axes_only() {
        let moves = Arc::new(std::sync::Mutex::new(Vec::new()));
        let stops = Arc::new(std::sync::Mutex::new(Vec::new()));
        let driver: Arc<dyn MotionDriver> =
            Arc::new(recording_mock(moves.clone(), stops.clone()));
        let mut x = axis("X", driver.clone());
        let mut y = axis("Y", driver);
        x.connect().await.unwrap();
        y.connect().await.unwrap();

        let dispatcher = MotionDispatcher::default();
        // Pure X deflection: Y has a zero component and stays ready
        dispatcher.dispatch(&input(1.0, 0.0, 0.3), &mut x, &mut y).await;
        assert_eq!(x.state(), ConnectionState::Moving);
        assert_eq!(y.state(), ConnectionState::Ready);

        dispatcher.dispatch(&NormalizedInput::ZERO, &mut x, &mut y).await;
        assert_eq!(x.state(), ConnectionState::Ready);
        assert_eq!(y.state(), ConnectionState::Ready);
        assert_eq!(*stops.lock().unwrap(), vec![1]);

        // Idle again: nothing to stop
        dispatcher.dispatch(&NormalizedInput::ZERO, &mut x, &mut y).await;
        assert_eq!(stops.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_zero_component_stops_moving_axis() {
        let moves = Arc::new(std::sync::Mutex::new(Vec::new()));
        let stops = Arc::new(std::sync::Mutex::new(Vec::new()));
        let driver: Arc<dyn MotionDriver> =
            Arc::new(recording_mock(moves.clone(), stops.clone()));
        let mut x = axis("X", driver.clone());
        let mut y = axis("Y", driver);
        x.connect().await.unwrap();
        y.connect().await.unwrap();

        let dispatcher = MotionDispatcher::default();
        dispatcher.dispatch(&input(0.6, 0.8, 1.0), &mut x, &mut y).await;
        dispatcher.dispatch(&input(0.0, 1.0, 1.0), &mut x, &mut y).await;

        assert_eq!(x.state(), ConnectionState::Ready);
        assert_eq!(y.state(), ConnectionState::Moving);
        assert_eq!(*stops.lock().unwrap(), vec![1]);
        // Y kept its direction, so only one move was issued for it
        assert_eq!(moves.lock().unwrap().iter().filter(|(h, _)| *h == 2).count(), 1);
    }

    #[tokio::test]
    async fn test_inverted_axes() {
        let moves = Arc::new(std::sync::Mutex::new(Vec::new()));
        let stops = Arc::new(std::sync::Mutex::new(Vec::new()));
        let driver: Arc<dyn MotionDriver> = Arc::new(recording_mock(moves.clone(), stops));
        let mut x = axis("X", driver.clone());
        let mut y = axis("Y", driver);
        x.connect().await.unwrap();
        y.connect().await.unwrap();

        MotionDispatcher::new(true, false)
            .dispatch(&input(0.6, 0.8, 1.0), &mut x, &mut y)
            .await;

        assert_eq!(
            *moves.lock().unwrap(),
            vec![(1, MotorDirection::Reverse), (2, MotorDirection::Forward)]
        );
    }

    #[tokio::test]
    async fn test_one_faulted_axis_does_not_block_the_other() {
        let mut mock = MockMotionDriver::new();
        mock.expect_connect().returning(|axis| {
            Ok(DeviceHandle(if axis.as_str() == "X" { 1 } else { 2 }))
        });
        mock.expect_is_settings_initialized().return_const(true);
        mock.expect_start_polling().return_const(());
        mock.expect_position().return_const(0.0);
        mock.expect_move_continuous().returning(|h, _| {
            if h.0 == 1 {
                Err(crate::stage::DriverError::Transport("stall".to_string()))
            } else {
                Ok(())
            }
        });

        let driver: Arc<dyn MotionDriver> = Arc::new(mock);
        let mut x = axis("X", driver.clone());
        let mut y = axis("Y", driver);
        x.connect().await.unwrap();
        y.connect().await.unwrap();

        MotionDispatcher::default()
            .dispatch(&input(0.6, 0.8, 1.0), &mut x, &mut y)
            .await;

        assert_eq!(x.state(), ConnectionState::Faulted);
        assert_eq!(y.state(), ConnectionState::Moving);
    }
}
