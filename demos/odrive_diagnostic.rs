// ODrive diagnostic: READ-ONLY probe of the controller
//
// Nothing is written to the controller, the wheels will not move.
//
// Usage: cargo run --example odrive_diagnostic -- [port]
// Without a port, USB ports are scanned for an ODrive.

use odrive_zenoh_driver::motor::telemetry::TelemetryAdapter;
use odrive_zenoh_driver::motor::{Axis, Discovery, MotorController, SerialDiscovery};
use odrive_zenoh_driver::motor::odrive::DEFAULT_BAUDRATE;
use std::time::Duration;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("debug".parse().unwrap()),
        )
        .init();

    let port = std::env::args().nth(1);

    println!("ODrive diagnostic (read-only)");
    println!("Port: {}", port.as_deref().unwrap_or("<auto>"));
    println!();

    println!("Step 1: Looking for the controller...");
    let discovery = SerialDiscovery::new(port, DEFAULT_BAUDRATE, Duration::from_secs(5));
    let mut device = match discovery.find_any() {
        Ok(device) => {
            println!("  ✓ Controller responding");
            device
        }
        Err(e) => {
            println!("  ✗ {}", e);
            println!();
            println!("Troubleshooting:");
            println!("  - Check the USB cable and controller power");
            println!("  - Make sure the ASCII protocol is enabled on this interface");
            return Err(e.into());
        }
    };
    println!();

    println!("Step 2: Axis states");
    for axis in Axis::BOTH {
        match device.current_state(axis) {
            Ok(state) => println!("  {}: {:?}", axis, state),
            Err(e) => println!("  {}: ERROR - {}", axis, e),
        }
    }
    println!();

    let mut telemetry = TelemetryAdapter::new();

    println!("Step 3: Encoders (forward-positive)");
    match telemetry.read_encoders(device.as_mut()) {
        Ok(counts) => println!("  left={} right={}", counts.left, counts.right),
        Err(e) => println!("  ERROR - {}", e),
    }
    println!();

    println!("Step 4: Status");
    match telemetry.read_status(device.as_mut()) {
        Ok(status) => {
            println!("  system error: 0x{:X}", status.system_error);
            println!("  left:  {:?}", status.left);
            println!("  right: {:?}", status.right);
            println!("  bus voltage: {:.2} V", status.bus_voltage);
        }
        Err(e) => println!("  ERROR - {}", e),
    }

    Ok(())
}
