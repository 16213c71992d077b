// Shapes raw controller fields into the outbound telemetry records
//
// Encoder reads and status reads fail differently on purpose: losing the
// encoders means the link is gone and must be recovered, while a failed status
// read is only logged. The two error types keep the paths from being merged.

use super::device::{Axis, MotorController, Subsystem};
use super::odrive::OdriveError;
use crate::messages::{AxisErrors, EncoderSnapshot, StatusSnapshot};

/// `system_error` value published when the link drops
pub const LINK_FAULT: u64 = 1;

/// Encoder counts could not be read; the link needs recovery
#[derive(Debug, thiserror::Error)]
#[error("encoder read failed: {0}")]
pub struct LinkFailure(#[from] pub OdriveError);

/// Status fields could not be read; non-critical
#[derive(Debug, thiserror::Error)]
#[error("status read failed: {0}")]
pub struct StatusUnavailable(#[from] pub OdriveError);

#[derive(Debug, Default)]
pub struct TelemetryAdapter {
    last_status: StatusSnapshot,
}

impl TelemetryAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shadow counts, with the mirrored left motor flipped to forward-positive
    pub fn read_encoders(
        &self,
        device: &mut dyn MotorController,
    ) -> Result<EncoderSnapshot, LinkFailure> {
        let right = device.shadow_count(Axis::Right)?;
        let left = device.shadow_count(Axis::Left)?.saturating_neg();
        Ok(EncoderSnapshot { left, right })
    }

    /// Full status snapshot
    ///
    /// All-or-nothing: the cached snapshot only changes when every field was read.
    pub fn read_status(
        &mut self,
        device: &mut dyn MotorController,
    ) -> Result<StatusSnapshot, StatusUnavailable> {
        let status = StatusSnapshot {
            system_error: device.system_error()?,
            left: read_axis(device, Axis::Left)?,
            right: read_axis(device, Axis::Right)?,
            bus_voltage: device.bus_voltage()?,
        };
        self.last_status = status;
        Ok(status)
    }

    pub fn last_status(&self) -> StatusSnapshot {
        self.last_status
    }

    /// Link is back; the next published status starts clean
    pub fn clear_fault(&mut self) {
        self.last_status.system_error = 0;
    }

    /// Last known status with the link fault flag raised
    pub fn fault_status(&mut self) -> StatusSnapshot {
        self.last_status.system_error = LINK_FAULT;
        self.last_status
    }
}

fn read_axis(device: &mut dyn MotorController, axis: Axis) -> Result<AxisErrors, OdriveError> {
    Ok(AxisErrors {
        axis: device.axis_error(axis, Subsystem::Axis)?,
        motor: device.axis_error(axis, Subsystem::Motor)?,
        sensorless_estimator: device.axis_error(axis, Subsystem::SensorlessEstimator)?,
        encoder: device.axis_error(axis, Subsystem::Encoder)?,
        controller: device.axis_error(axis, Subsystem::Controller)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motor::mock::FakeController;

    #[test]
    fn test_encoder_sign_convention() {
        let fake = FakeController::new();
        fake.state().shadow_counts = [1200, 1180];
        let mut device = fake.clone();

        let counts = TelemetryAdapter::new().read_encoders(&mut device).unwrap();
        assert_eq!(counts, EncoderSnapshot { left: -1200, right: 1180 });
    }

    #[test]
    fn test_encoder_extreme_count_does_not_overflow() {
        let fake = FakeController::new();
        fake.state().shadow_counts = [i64::MIN, 0];
        let mut device = fake.clone();

        let counts = TelemetryAdapter::new().read_encoders(&mut device).unwrap();
        assert_eq!(counts.left, i64::MAX);
    }

    #[test]
    fn test_encoder_failure_is_link_failure() {
        let fake = FakeController::new();
        fake.disconnect();
        let mut device = fake.clone();

        let err = TelemetryAdapter::new().read_encoders(&mut device).unwrap_err();
        assert!(matches!(err.0, OdriveError::Io(_)));
    }

    #[test]
    fn test_status_fields_by_axis() {
        let fake = FakeController::new();
        {
            let mut state = fake.state();
            state.system_error = 0x2;
            state.axis_errors[0] = [1, 2, 3, 4, 5];
            state.axis_errors[1][3] = 0x100;
            state.bus_voltage = 23.5;
        }
        let mut device = fake.clone();
        let mut telemetry = TelemetryAdapter::new();

        let status = telemetry.read_status(&mut device).unwrap();
        assert_eq!(status.system_error, 0x2);
        assert_eq!(
            status.left,
            AxisErrors {
                axis: 1,
                motor: 2,
                sensorless_estimator: 3,
                encoder: 4,
                controller: 5,
            }
        );
        assert_eq!(status.right.encoder, 0x100);
        assert_eq!(status.bus_voltage, 23.5);
        assert_eq!(telemetry.last_status(), status);
    }

    #[test]
    fn test_failed_status_keeps_previous_snapshot() {
        let fake = FakeController::new();
        let mut device = fake.clone();
        let mut telemetry = TelemetryAdapter::new();

        let before = telemetry.read_status(&mut device).unwrap();
        {
            let mut state = fake.state();
            state.bus_voltage = 11.0;
            state.status_fails = true;
        }
        assert!(telemetry.read_status(&mut device).is_err());
        assert_eq!(telemetry.last_status(), before);
    }

    #[test]
    fn test_fault_status_raises_flag() {
        let fake = FakeController::new();
        let mut device = fake.clone();
        let mut telemetry = TelemetryAdapter::new();
        telemetry.read_status(&mut device).unwrap();

        let fault = telemetry.fault_status();
        assert_eq!(fault.system_error, LINK_FAULT);
        assert_eq!(fault.bus_voltage, 24.0);
    }
}
