// Device boundary: what the driver needs from a dual-axis motor controller
//
// The driver only talks to these traits, so the serial ODrive link and the
// in-memory controller used by tests are interchangeable.

use std::fmt;

use super::odrive::OdriveError;

/// Controller axis. Axis 0 drives the left wheel, axis 1 the right wheel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    Left,
    Right,
}

impl Axis {
    pub const BOTH: [Axis; 2] = [Axis::Left, Axis::Right];

    /// Index used by the controller firmware (`axis0`, `axis1`)
    pub fn index(self) -> u8 {
        match self {
            Axis::Left => 0,
            Axis::Right => 1,
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "axis{}", self.index())
    }
}

/// Error-reporting parts of an axis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subsystem {
    Axis,
    Motor,
    SensorlessEstimator,
    Encoder,
    Controller,
}

impl Subsystem {
    pub const ALL: [Subsystem; 5] = [
        Subsystem::Axis,
        Subsystem::Motor,
        Subsystem::SensorlessEstimator,
        Subsystem::Encoder,
        Subsystem::Controller,
    ];

    /// Property path of the subsystem's error field, relative to the axis
    pub fn error_path(self) -> &'static str {
        match self {
            Subsystem::Axis => "error",
            Subsystem::Motor => "motor.error",
            Subsystem::SensorlessEstimator => "sensorless_estimator.error",
            Subsystem::Encoder => "encoder.error",
            Subsystem::Controller => "controller.error",
        }
    }
}

/// Axis states used by the driver (ODrive numbering)
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisState {
    Undefined = 0,
    Idle = 1,
    MotorCalibration = 4,
    EncoderOffsetCalibration = 7,
    ClosedLoopControl = 8,
}

impl AxisState {
    /// Unknown firmware states collapse to `Undefined`
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            1 => AxisState::Idle,
            4 => AxisState::MotorCalibration,
            7 => AxisState::EncoderOffsetCalibration,
            8 => AxisState::ClosedLoopControl,
            _ => AxisState::Undefined,
        }
    }
}

/// A live connection to the motor controller
///
/// Every call may fail once the device is unplugged or reset; the handle is then
/// useless and gets replaced by a freshly discovered one.
pub trait MotorController: Send {
    /// Set the requested velocity of an axis, in revolutions per second
    fn set_input_vel(&mut self, axis: Axis, rps: f64) -> Result<(), OdriveError>;

    /// Raw encoder count of an axis
    fn shadow_count(&mut self, axis: Axis) -> Result<i64, OdriveError>;

    /// Error code of one axis subsystem
    fn axis_error(&mut self, axis: Axis, subsystem: Subsystem) -> Result<u64, OdriveError>;

    /// Controller-wide error code
    fn system_error(&mut self) -> Result<u64, OdriveError>;

    fn bus_voltage(&mut self) -> Result<f32, OdriveError>;

    fn current_state(&mut self, axis: Axis) -> Result<AxisState, OdriveError>;

    fn set_requested_state(&mut self, axis: Axis, state: AxisState) -> Result<(), OdriveError>;

    /// Ask the controller to reboot; the link drops afterwards
    fn reboot(&mut self) -> Result<(), OdriveError>;
}

/// Locates a controller and opens a fresh handle to it
pub trait Discovery: Send + Sync {
    /// Blocks until a controller answers or the search gives up
    fn find_any(&self) -> Result<Box<dyn MotorController>, OdriveError>;
}
