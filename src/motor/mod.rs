// Motor control module for the ODrive dual-axis controller
//
// Provides:
// - Differential-drive inverse kinematics (body velocity -> wheel setpoints)
// - The device boundary traits and the ODrive ASCII serial implementation
// - Telemetry shaping and the one-shot calibration sequence

pub mod calibration;
mod device;
pub mod kinematics;
pub mod odrive;
pub mod telemetry;

#[cfg(test)]
pub(crate) mod mock;

pub use device::{Axis, AxisState, Discovery, MotorController, Subsystem};
pub use kinematics::{WheelSetpoint, convert};
pub use odrive::{OdriveError, OdriveSerial, SerialDiscovery};
pub use telemetry::TelemetryAdapter;
