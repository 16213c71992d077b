// Differential-drive inverse kinematics
// Converts a planar body velocity (linear, angular) into per-wheel setpoints
// in revolutions per second, as the controller expects them.

use std::f64::consts::PI;

use crate::config::RobotGeometry;

/// Wheel setpoints in revolutions per second
///
/// The left motor is mounted mirrored, so forward motion gives it a negative setpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WheelSetpoint {
    pub left: f64,
    pub right: f64,
}

impl WheelSetpoint {
    pub fn zero() -> Self {
        Self::default()
    }

    /// Wheel speeds with both wheels positive when rolling forward,
    /// matching the encoder telemetry convention
    pub fn forward_positive(&self) -> WheelSetpoint {
        WheelSetpoint {
            left: -self.left,
            right: self.right,
        }
    }
}

/// Convert a body velocity to wheel setpoints
///
/// # Arguments
/// * `linear` - Forward velocity in m/s (positive = forward)
/// * `angular` - Rotational velocity in rad/s (positive = counter-clockwise)
/// * `geometry` - Validated robot geometry
///
/// Each wheel is clamped independently to the geometry's RPM limit.
pub fn convert(linear: f64, angular: f64, geometry: &RobotGeometry) -> WheelSetpoint {
    let circumference = 2.0 * geometry.wheel_radius() * 2.0 * PI;
    let limit = geometry.max_rps();

    let right = (2.0 * linear + angular * geometry.wheelbase()) / circumference;
    let left = -(2.0 * linear - angular * geometry.wheelbase()) / circumference;

    WheelSetpoint {
        left: clamp_speed(left, limit),
        right: clamp_speed(right, limit),
    }
}

/// Saturate to `±limit` keeping the sign
fn clamp_speed(speed: f64, limit: f64) -> f64 {
    if speed.abs() > limit {
        limit * speed.signum()
    } else {
        speed
    }
}
