// One-shot motor/encoder calibration run before the control loop starts

use std::thread;
use std::time::Duration;

use tracing::info;

use super::device::{Axis, AxisState, MotorController};
use super::odrive::OdriveError;

/// One step: request a state on an axis, then dwell while the firmware works
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationStep {
    pub axis: Axis,
    pub state: AxisState,
    pub dwell: Duration,
}

const fn step(axis: Axis, state: AxisState, secs: u64) -> CalibrationStep {
    CalibrationStep {
        axis,
        state,
        dwell: Duration::from_secs(secs),
    }
}

/// Motor calibration, encoder offset search, then closed loop; left axis first
pub const CALIBRATION_SEQUENCE: [CalibrationStep; 6] = [
    step(Axis::Left, AxisState::MotorCalibration, 5),
    step(Axis::Left, AxisState::EncoderOffsetCalibration, 10),
    step(Axis::Left, AxisState::ClosedLoopControl, 5),
    step(Axis::Right, AxisState::MotorCalibration, 5),
    step(Axis::Right, AxisState::EncoderOffsetCalibration, 10),
    step(Axis::Right, AxisState::ClosedLoopControl, 5),
];

/// True unless both axes are already running closed loop
pub fn needs_calibration(device: &mut dyn MotorController) -> Result<bool, OdriveError> {
    for axis in Axis::BOTH {
        if device.current_state(axis)? != AxisState::ClosedLoopControl {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Run a calibration sequence, sleeping with `wait` between steps
///
/// Stops at the first failed write; the caller decides whether that is fatal.
pub fn run_sequence(
    device: &mut dyn MotorController,
    steps: &[CalibrationStep],
    mut wait: impl FnMut(Duration),
) -> Result<(), OdriveError> {
    for step in steps {
        info!("Calibration: {} -> {:?}", step.axis, step.state);
        device.set_requested_state(step.axis, step.state)?;
        wait(step.dwell);
    }
    info!("Calibration has been done");
    Ok(())
}

/// Calibrate with real sleeps, if the axes are not already in closed loop
pub fn calibrate(device: &mut dyn MotorController) -> Result<(), OdriveError> {
    if !needs_calibration(device)? {
        info!("Both axes already in closed loop control, skipping calibration");
        return Ok(());
    }
    run_sequence(device, &CALIBRATION_SEQUENCE, thread::sleep)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motor::mock::FakeController;

    #[test]
    fn test_sequence_order_and_total_time() {
        let total: Duration = CALIBRATION_SEQUENCE.iter().map(|s| s.dwell).sum();
        assert_eq!(total, Duration::from_secs(40));
        assert_eq!(CALIBRATION_SEQUENCE[0].axis, Axis::Left);
        assert_eq!(
            CALIBRATION_SEQUENCE[5],
            step(Axis::Right, AxisState::ClosedLoopControl, 5)
        );
    }

    #[test]
    fn test_run_sequence_requests_each_state() {
        let fake = FakeController::new();
        let mut device = fake.clone();
        let mut waited = Vec::new();

        run_sequence(&mut device, &CALIBRATION_SEQUENCE, |d| waited.push(d)).unwrap();

        assert_eq!(waited.len(), 6);
        let state = fake.state();
        assert_eq!(state.requested_states.len(), 6);
        assert_eq!(
            state.requested_states[1],
            (Axis::Left, AxisState::EncoderOffsetCalibration)
        );
        assert_eq!(
            state.current_states,
            [AxisState::ClosedLoopControl, AxisState::ClosedLoopControl]
        );
    }

    #[test]
    fn test_skip_when_closed_loop() {
        let fake = FakeController::new();
        let mut device = fake.clone();
        assert!(needs_calibration(&mut device).unwrap());

        fake.state().current_states = [AxisState::ClosedLoopControl; 2];
        assert!(!needs_calibration(&mut device).unwrap());
        calibrate(&mut device).unwrap();
        assert!(fake.state().requested_states.is_empty());
    }

    #[test]
    fn test_failed_step_aborts() {
        let fake = FakeController::new();
        let mut device = fake.clone();
        fake.disconnect();

        let mut waits = 0;
        let result = run_sequence(&mut device, &CALIBRATION_SEQUENCE, |_| waits += 1);
        assert!(result.is_err());
        assert_eq!(waits, 0);
    }
}
