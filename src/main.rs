use clap::Parser;
use tracing_subscriber::EnvFilter;

use odrive_zenoh_driver::config::DriverConfig;

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init();

    let config = DriverConfig::parse();

    if let Err(e) = odrive_zenoh_driver::runtime::run(config).await {
        eprintln!("Driver error: {}", e);
        std::process::exit(1);
    }
}
