// ODrive ASCII protocol over a serial port
//
// Line-oriented protocol:
//   v <axis> <vel>        set velocity setpoint (turn/s), no reply
//   r <property>          read a property, one reply line
//   w <property> <value>  write a property, no reply
//   sr                    reboot, no reply
// Every line may carry a checksum: `<line>*<xor of all bytes before '*'>`.
//
// Replies carry no request id. A reply that shows up after its read timed out,
// or an error line answering a `w`/`v`, would otherwise be taken as the answer
// to the next query, so input is discarded before every query and the stream is
// drained until quiet after any failed read.

use std::fmt::Display;
use std::io::{ErrorKind, Read, Write};
use std::str::FromStr;
use std::thread;
use std::time::{Duration, Instant};

use serialport::{ClearBuffer, SerialPort, SerialPortType};
use tracing::{debug, info, warn};

use super::device::{Axis, AxisState, Discovery, MotorController, Subsystem};

/// Default serial configuration for ODrive UART/USB-CDC
pub const DEFAULT_BAUDRATE: u32 = 115_200;
pub const DEFAULT_TIMEOUT_MS: u64 = 100;

/// USB identifiers of ODrive v3 boards
pub const ODRIVE_USB_VID: u16 = 0x1209;
pub const ODRIVE_USB_PID: u16 = 0x0D32;

/// Pause between discovery sweeps
const PROBE_INTERVAL: Duration = Duration::from_millis(500);

/// Longest reply line we accept before giving up on the stream
const MAX_LINE: usize = 128;

/// Stale lines dropped at most during one resync
const MAX_STALE_LINES: usize = 16;

/// Error types for ODrive communication
#[derive(Debug, thiserror::Error)]
pub enum OdriveError {
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Timeout waiting for reply to '{command}'")]
    Timeout { command: String },

    #[error("Controller rejected '{command}': {reply}")]
    InvalidProperty { command: String, reply: String },

    #[error("Checksum mismatch in reply '{line}'")]
    ChecksumMismatch { line: String },

    #[error("Invalid reply to '{command}': {reason}")]
    InvalidResponse { command: String, reason: String },

    #[error("No ODrive found within {timeout:?}")]
    NotFound { timeout: Duration },
}

pub type Result<T> = std::result::Result<T, OdriveError>;

/// Byte stream to the controller
pub trait Port: Read + Write + Send {
    /// Drop whatever was received but not read yet
    fn discard_input(&mut self) -> std::io::Result<()>;
}

impl Port for Box<dyn SerialPort> {
    fn discard_input(&mut self) -> std::io::Result<()> {
        self.clear(ClearBuffer::Input).map_err(std::io::Error::from)
    }
}

/// ODrive connection over any byte stream (a serial port in production)
pub struct OdriveSerial<P = Box<dyn SerialPort>> {
    port: P,
    // Set after a failed or unparsable reply; a late line may still be in flight
    desynced: bool,
}

impl OdriveSerial {
    /// Open a connection to the controller
    pub fn open_with_baudrate(port_name: &str, baudrate: u32) -> Result<Self> {
        let port = serialport::new(port_name, baudrate)
            .timeout(Duration::from_millis(DEFAULT_TIMEOUT_MS))
            .open()?;

        Ok(Self::from_port(port))
    }
}

impl<P: Port> OdriveSerial<P> {
    /// Wrap an already open stream
    pub fn from_port(port: P) -> Self {
        Self {
            port,
            desynced: false,
        }
    }

    /// XOR checksum over a command line (excluding the '*' and checksum itself)
    fn checksum(data: &[u8]) -> u8 {
        data.iter().fold(0, |acc, &b| acc ^ b)
    }

    /// Append checksum and line terminator
    fn build_line(command: &str) -> String {
        format!("{}*{}\n", command, Self::checksum(command.as_bytes()))
    }

    /// Strip and verify the optional checksum, then reject error replies
    fn parse_reply(command: &str, line: &str) -> Result<String> {
        let line = line.trim();
        let body = match line.rsplit_once('*') {
            Some((body, cs)) => {
                let expected: u8 = cs.trim().parse().map_err(|_| OdriveError::ChecksumMismatch {
                    line: line.to_string(),
                })?;
                if Self::checksum(body.as_bytes()) != expected {
                    return Err(OdriveError::ChecksumMismatch {
                        line: line.to_string(),
                    });
                }
                body.trim()
            }
            None => line,
        };

        match body {
            "invalid property" | "unknown command" | "invalid command format" => {
                Err(OdriveError::InvalidProperty {
                    command: command.to_string(),
                    reply: body.to_string(),
                })
            }
            "" => Err(OdriveError::InvalidResponse {
                command: command.to_string(),
                reason: "empty reply".to_string(),
            }),
            _ => Ok(body.to_string()),
        }
    }

    /// Send a command that has no reply
    fn send(&mut self, command: &str) -> Result<()> {
        debug!("-> {}", command);
        self.port.write_all(Self::build_line(command).as_bytes())?;
        self.port.flush()?;
        Ok(())
    }

    /// Read one reply line
    fn read_line(&mut self, command: &str) -> Result<String> {
        let mut line = Vec::with_capacity(32);
        let mut byte = [0u8; 1];

        loop {
            match self.port.read(&mut byte) {
                Ok(0) => {
                    return Err(OdriveError::Io(std::io::Error::new(
                        ErrorKind::UnexpectedEof,
                        "serial stream closed",
                    )));
                }
                Ok(_) => {}
                Err(e) if e.kind() == ErrorKind::TimedOut => {
                    return Err(OdriveError::Timeout {
                        command: command.to_string(),
                    });
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(OdriveError::Io(e)),
            }

            match byte[0] {
                b'\n' => break,
                b'\r' => {}
                b => line.push(b),
            }

            if line.len() > MAX_LINE {
                return Err(OdriveError::InvalidResponse {
                    command: command.to_string(),
                    reason: "reply line too long".to_string(),
                });
            }
        }

        String::from_utf8(line).map_err(|_| OdriveError::InvalidResponse {
            command: command.to_string(),
            reason: "reply is not UTF-8".to_string(),
        })
    }

    /// Get the stream back to a state where the next line answers the next query
    fn resync(&mut self) -> Result<()> {
        if self.desynced {
            for _ in 0..MAX_STALE_LINES {
                match self.read_line("resync") {
                    Ok(line) => warn!("Discarding stale reply '{}'", line),
                    Err(OdriveError::Timeout { .. }) => {
                        self.desynced = false;
                        break;
                    }
                    Err(OdriveError::InvalidResponse { .. }) => {}
                    Err(e) => return Err(e),
                }
            }
        }
        self.port.discard_input()?;
        Ok(())
    }

    /// Send a command and wait for its reply
    fn query(&mut self, command: &str) -> Result<String> {
        self.resync()?;
        self.send(command)?;
        let reply = self
            .read_line(command)
            .and_then(|line| {
                debug!("<- {}", line);
                Self::parse_reply(command, &line)
            });
        if reply.is_err() {
            self.desynced = true;
        }
        reply
    }

    /// Read and parse a property
    pub fn read_property<T: FromStr>(&mut self, property: &str) -> Result<T> {
        let command = format!("r {}", property);
        let reply = self.query(&command)?;
        reply.parse().map_err(|_| {
            self.desynced = true;
            OdriveError::InvalidResponse {
                command,
                reason: format!("cannot parse '{}'", reply),
            }
        })
    }

    /// Write a property
    pub fn write_property(&mut self, property: &str, value: impl Display) -> Result<()> {
        self.send(&format!("w {} {}", property, value))
    }
}

impl<P: Port> MotorController for OdriveSerial<P> {
    fn set_input_vel(&mut self, axis: Axis, rps: f64) -> Result<()> {
        self.send(&format!("v {} {:.4}", axis.index(), rps))
    }

    fn shadow_count(&mut self, axis: Axis) -> Result<i64> {
        self.read_property(&format!("{}.encoder.shadow_count", axis))
    }

    fn axis_error(&mut self, axis: Axis, subsystem: Subsystem) -> Result<u64> {
        self.read_property(&format!("{}.{}", axis, subsystem.error_path()))
    }

    fn system_error(&mut self) -> Result<u64> {
        self.read_property("error")
    }

    fn bus_voltage(&mut self) -> Result<f32> {
        self.read_property("vbus_voltage")
    }

    fn current_state(&mut self, axis: Axis) -> Result<AxisState> {
        let raw: u8 = self.read_property(&format!("{}.current_state", axis))?;
        Ok(AxisState::from_raw(raw))
    }

    fn set_requested_state(&mut self, axis: Axis, state: AxisState) -> Result<()> {
        self.write_property(&format!("{}.requested_state", axis), state as u8)
    }

    fn reboot(&mut self) -> Result<()> {
        info!("Sending reboot to controller");
        self.send("sr")
    }
}

/// Finds an ODrive on a fixed port, or on any USB port with the ODrive VID/PID
#[derive(Debug, Clone)]
pub struct SerialDiscovery {
    port: Option<String>,
    baud_rate: u32,
    timeout: Duration,
}

impl SerialDiscovery {
    pub fn new(port: Option<String>, baud_rate: u32, timeout: Duration) -> Self {
        Self {
            port,
            baud_rate,
            timeout,
        }
    }

    fn candidates(&self) -> Vec<String> {
        if let Some(port) = &self.port {
            return vec![port.clone()];
        }

        match serialport::available_ports() {
            Ok(ports) => ports
                .into_iter()
                .filter(|p| {
                    matches!(&p.port_type, SerialPortType::UsbPort(usb)
                        if usb.vid == ODRIVE_USB_VID && usb.pid == ODRIVE_USB_PID)
                })
                .map(|p| p.port_name)
                .collect(),
            Err(e) => {
                debug!("Failed to enumerate serial ports: {}", e);
                Vec::new()
            }
        }
    }

    /// Open a port and make sure an ODrive answers on it
    fn probe(&self, port_name: &str) -> Result<OdriveSerial> {
        let mut odrive = OdriveSerial::open_with_baudrate(port_name, self.baud_rate)?;
        let vbus = odrive.bus_voltage()?;
        info!("ODrive found on {} (vbus {:.1} V)", port_name, vbus);
        Ok(odrive)
    }
}

impl Discovery for SerialDiscovery {
    fn find_any(&self) -> Result<Box<dyn MotorController>> {
        let deadline = Instant::now() + self.timeout;
        info!("Looking for an ODrive...");

        loop {
            for port_name in self.candidates() {
                match self.probe(&port_name) {
                    Ok(odrive) => return Ok(Box::new(odrive)),
                    Err(e) => debug!("No ODrive on {}: {}", port_name, e),
                }
            }

            if Instant::now() >= deadline {
                return Err(OdriveError::NotFound {
                    timeout: self.timeout,
                });
            }
            thread::sleep(PROBE_INTERVAL);
        }
    }
}
