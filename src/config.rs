// Timeouts, topics, robot geometry and command-line configuration
use std::time::Duration;

use clap::Parser;

// Default control loop frequency
pub const DEFAULT_LOOP_HZ: u32 = 50;

// Deadman interlock: zero the wheels when no command arrived for this long
pub const DEADMAN_TIMEOUT: Duration = Duration::from_secs(1);

// Cool-down between a link fault and the single rediscovery attempt
pub const RECOVERY_DELAY: Duration = Duration::from_secs(10);

// Geometry defaults
pub const DEFAULT_WHEELBASE: f64 = 0.365; // meters
pub const DEFAULT_WHEEL_RADIUS: f64 = 0.085; // meters
pub const DEFAULT_MAX_RPM: f64 = 260.0;

// Zenoh topic suffixes, appended to the configured prefix
pub const TOPIC_CMD_VEL: &str = "cmd_vel"; // commands
pub const TOPIC_SHADOW_COUNTS: &str = "shadow_counts"; // encoder telemetry
pub const TOPIC_STATUS: &str = "status"; // error/voltage telemetry
pub const TOPIC_HEALTH: &str = "health"; // driver health
pub const TOPIC_REBOOT: &str = "reboot"; // reboot service (queryable)

/// Invalid startup configuration
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("{name} must be a positive finite number, got {value}")]
    NotPositive { name: &'static str, value: f64 },

    #[error("loop frequency must be at least 1 Hz")]
    ZeroFrequency,
}

/// Differential-drive geometry, immutable once validated
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RobotGeometry {
    wheelbase: f64,
    wheel_radius: f64,
    max_rpm: f64,
}

impl RobotGeometry {
    pub fn new(wheelbase: f64, wheel_radius: f64, max_rpm: f64) -> Result<Self, ConfigError> {
        positive("wheelbase", wheelbase)?;
        positive("wheel_radius", wheel_radius)?;
        positive("max_rpm", max_rpm)?;
        Ok(Self {
            wheelbase,
            wheel_radius,
            max_rpm,
        })
    }

    pub fn wheelbase(&self) -> f64 {
        self.wheelbase
    }

    pub fn wheel_radius(&self) -> f64 {
        self.wheel_radius
    }

    /// Per-wheel limit in revolutions per second
    pub fn max_rps(&self) -> f64 {
        self.max_rpm / 60.0
    }
}

impl Default for RobotGeometry {
    fn default() -> Self {
        Self {
            wheelbase: DEFAULT_WHEELBASE,
            wheel_radius: DEFAULT_WHEEL_RADIUS,
            max_rpm: DEFAULT_MAX_RPM,
        }
    }
}

fn positive(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NotPositive { name, value })
    }
}

/// Velocity bridge between zenoh and an ODrive dual-axis motor controller
#[derive(Debug, Clone, Parser)]
#[command(version, about)]
pub struct DriverConfig {
    /// Serial port of the controller (auto-detected over USB when omitted)
    #[arg(long)]
    pub port: Option<String>,

    /// Serial baud rate
    #[arg(long, default_value_t = 115_200)]
    pub baud_rate: u32,

    /// Distance between the wheels in meters
    #[arg(long, default_value_t = DEFAULT_WHEELBASE)]
    pub wheelbase: f64,

    /// Wheel radius in meters
    #[arg(long, default_value_t = DEFAULT_WHEEL_RADIUS)]
    pub wheel_radius: f64,

    /// Wheel speed limit in revolutions per minute
    #[arg(long, default_value_t = DEFAULT_MAX_RPM)]
    pub max_rpm: f64,

    /// Control loop frequency in Hz
    #[arg(long, default_value_t = DEFAULT_LOOP_HZ)]
    pub frequency: u32,

    /// How long device discovery keeps looking before giving up, in milliseconds
    #[arg(long, default_value_t = 10_000)]
    pub discovery_timeout_ms: u64,

    /// Run the motor/encoder calibration sequence before driving
    #[arg(long)]
    pub calibrate: bool,

    /// Key expression prefix for every topic
    #[arg(long, default_value = "odrive")]
    pub prefix: String,
}

impl DriverConfig {
    /// Validated geometry; fails before anything touches hardware
    pub fn geometry(&self) -> Result<RobotGeometry, ConfigError> {
        RobotGeometry::new(self.wheelbase, self.wheel_radius, self.max_rpm)
    }

    pub fn tick_period(&self) -> Result<Duration, ConfigError> {
        if self.frequency == 0 {
            return Err(ConfigError::ZeroFrequency);
        }
        Ok(Duration::from_micros(1_000_000 / u64::from(self.frequency)))
    }

    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_millis(self.discovery_timeout_ms)
    }

    pub fn topic(&self, suffix: &str) -> String {
        format!("{}/{}", self.prefix.trim_end_matches('/'), suffix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_robot() {
        let config = DriverConfig::parse_from(["odrive-zenoh-driver"]);
        let geometry = config.geometry().unwrap();
        assert_eq!(geometry, RobotGeometry::default());
        assert_eq!(config.frequency, 50);
        assert_eq!(config.tick_period().unwrap(), Duration::from_millis(20));
        assert_eq!(config.topic(TOPIC_CMD_VEL), "odrive/cmd_vel");
    }

    #[test]
    fn test_rejects_bad_geometry() {
        assert_eq!(
            RobotGeometry::new(0.0, 0.085, 260.0),
            Err(ConfigError::NotPositive {
                name: "wheelbase",
                value: 0.0
            })
        );
        assert!(RobotGeometry::new(0.365, -0.1, 260.0).is_err());
        assert!(RobotGeometry::new(0.365, 0.085, f64::INFINITY).is_err());
        assert!(RobotGeometry::new(0.365, f64::NAN, 260.0).is_err());
    }

    #[test]
    fn test_cli_overrides() {
        let config = DriverConfig::parse_from([
            "odrive-zenoh-driver",
            "--port",
            "/dev/ttyACM0",
            "--wheelbase",
            "0.5",
            "--max-rpm",
            "0",
            "--prefix",
            "robot/base/",
        ]);
        assert_eq!(config.port.as_deref(), Some("/dev/ttyACM0"));
        assert!(config.geometry().is_err());
        assert_eq!(config.topic(TOPIC_STATUS), "robot/base/status");
    }

    #[test]
    fn test_zero_frequency_rejected() {
        let config = DriverConfig::parse_from(["odrive-zenoh-driver", "--frequency", "0"]);
        assert_eq!(config.tick_period(), Err(ConfigError::ZeroFrequency));
    }
}
