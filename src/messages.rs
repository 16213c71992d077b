// Message types exchanged over zenoh

use serde::{Deserialize, Serialize};

// Command from teleop/planner -> driver
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VelocityCommand {
    pub linear: f64,  // m/s, positive = forward
    pub angular: f64, // rad/s, positive = counter-clockwise
}

impl VelocityCommand {
    pub fn new(linear: f64, angular: f64) -> Self {
        Self { linear, angular }
    }

    /// NaN or infinite components would poison the setpoint clamp
    pub fn is_finite(&self) -> bool {
        self.linear.is_finite() && self.angular.is_finite()
    }
}

/// Signed encoder shadow counts, forward-positive on both wheels
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncoderSnapshot {
    pub left: i64,
    pub right: i64,
}

/// Error codes of one axis and its subsystems
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AxisErrors {
    pub axis: u64,
    pub motor: u64,
    pub sensorless_estimator: u64,
    pub encoder: u64,
    pub controller: u64,
}

/// Controller health snapshot published every tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub system_error: u64,
    pub left: AxisErrors,
    pub right: AxisErrors,
    pub bus_voltage: f32,
}

/// Driver health published by the runtime
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DriverHealth {
    Ok,
    CmdStale,
    Recovering,
    Lost,
}

/// Outbound telemetry queued by the driver for the transport
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Telemetry {
    Encoders(EncoderSnapshot),
    Status(StatusSnapshot),
}
