// Zenoh wiring around the driver service
//
// Three tasks feed the driver: the control loop (fixed-rate tick), the command
// subscriber and the reboot queryable. Driver calls do blocking serial I/O, so
// they run on the blocking pool. A fourth task forwards telemetry to zenoh.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::mpsc;
use tokio::task::{JoinError, spawn_blocking};
use tokio::time::{MissedTickBehavior, interval};
use tracing::{error, info, warn};
use zenoh::pubsub::Publisher;

use crate::config::{
    ConfigError, DEADMAN_TIMEOUT, DriverConfig, TOPIC_CMD_VEL, TOPIC_HEALTH, TOPIC_REBOOT,
    TOPIC_SHADOW_COUNTS, TOPIC_STATUS,
};
use crate::driver::DriverService;
use crate::messages::{DriverHealth, Telemetry, VelocityCommand};
use crate::motor::{Discovery, OdriveError, SerialDiscovery, calibration};

#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Controller error: {0}")]
    Link(#[from] OdriveError),

    #[error("Controller link lost")]
    LinkLost,

    #[error("Transport error: {0}")]
    Transport(#[from] zenoh::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Signal setup failed: {0}")]
    Signal(#[from] std::io::Error),

    #[error("Driver task failed: {0}")]
    Task(#[from] JoinError),
}

async fn publish<T: Serialize>(publisher: &Publisher<'_>, value: &T) -> Result<(), DriverError> {
    let json = serde_json::to_string(value)?;
    publisher.put(json).await?;
    Ok(())
}

/// Resolves on SIGINT, SIGTERM or SIGHUP
async fn shutdown_signal() -> std::io::Result<&'static str> {
    let mut terminate = signal(SignalKind::terminate())?;
    let mut hangup = signal(SignalKind::hangup())?;
    tokio::select! {
        res = tokio::signal::ctrl_c() => res.map(|()| "SIGINT"),
        _ = terminate.recv() => Ok("SIGTERM"),
        _ = hangup.recv() => Ok("SIGHUP"),
    }
}

fn log_signal(res: std::io::Result<&'static str>) {
    match res {
        Ok(name) => warn!("Handle signal {}, shutting down", name),
        Err(e) => error!("Signal handling failed ({}), shutting down", e),
    }
}

pub async fn run(config: DriverConfig) -> Result<(), DriverError> {
    // Fail on bad geometry before touching hardware
    let geometry = config.geometry()?;
    let period = config.tick_period()?;

    let discovery: Arc<dyn Discovery> = Arc::new(SerialDiscovery::new(
        config.port.clone(),
        config.baud_rate,
        config.discovery_timeout(),
    ));
    let finder = discovery.clone();
    let mut device = spawn_blocking(move || finder.find_any()).await??;
    info!("Successfully found controller");

    if config.calibrate {
        device = spawn_blocking(move || {
            calibration::calibrate(&mut *device)?;
            Ok::<_, OdriveError>(device)
        })
        .await??;
    }

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;

    info!("Setting up publishers and subscribers...");
    let subscriber = session.declare_subscriber(config.topic(TOPIC_CMD_VEL)).await?;
    let queryable = session.declare_queryable(config.topic(TOPIC_REBOOT)).await?;
    let pub_counts = session
        .declare_publisher(config.topic(TOPIC_SHADOW_COUNTS))
        .await?;
    let pub_status = session.declare_publisher(config.topic(TOPIC_STATUS)).await?;
    let pub_health = session.declare_publisher(config.topic(TOPIC_HEALTH)).await?;

    let (telemetry_tx, mut telemetry_rx) = mpsc::unbounded_channel();
    let driver = Arc::new(DriverService::new(device, discovery, geometry, telemetry_tx));

    // Telemetry: driver -> zenoh
    let telemetry_task = tokio::spawn(async move {
        while let Some(record) = telemetry_rx.recv().await {
            let result = match record {
                Telemetry::Encoders(counts) => publish(&pub_counts, &counts).await,
                Telemetry::Status(status) => publish(&pub_status, &status).await,
            };
            if let Err(e) = result {
                warn!("Failed to publish telemetry: {}", e);
            }
        }
    });

    // Commands: zenoh -> driver, in arrival order
    let cmd_driver = driver.clone();
    let command_task = tokio::spawn(async move {
        while let Ok(sample) = subscriber.recv_async().await {
            let payload = sample.payload().to_bytes();
            match serde_json::from_slice::<VelocityCommand>(&payload) {
                Ok(cmd) => {
                    let driver = cmd_driver.clone();
                    let received_at = Instant::now();
                    let handled = spawn_blocking(move || driver.on_command(cmd, received_at)).await;
                    if let Err(e) = handled {
                        error!("Command handler failed: {}", e);
                    }
                }
                Err(e) => warn!("Failed to parse command: {}", e),
            }
        }
    });

    // Reboot service: empty request, empty reply
    let reboot_driver = driver.clone();
    let reboot_task = tokio::spawn(async move {
        while let Ok(query) = queryable.recv_async().await {
            let driver = reboot_driver.clone();
            if let Err(e) = spawn_blocking(move || driver.reboot()).await {
                error!("Reboot handler failed: {}", e);
            }
            if let Err(e) = query.reply(query.key_expr().clone(), "").await {
                warn!("Failed to answer reboot request: {}", e);
            }
        }
    });

    let mut tick = interval(period);
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    info!(
        "Driver started: {}Hz loop, {}ms deadman",
        config.frequency,
        DEADMAN_TIMEOUT.as_millis()
    );
    info!("Subscribed to: {}", config.topic(TOPIC_CMD_VEL));
    info!(
        "Publishing to: {}, {}, {}",
        config.topic(TOPIC_SHADOW_COUNTS),
        config.topic(TOPIC_STATUS),
        config.topic(TOPIC_HEALTH)
    );

    let outcome = loop {
        tokio::select! {
            res = &mut shutdown => {
                log_signal(res);
                break Ok(());
            }
            _ = tick.tick() => {}
        }

        // A tick may block for the whole recovery cool-down; stay responsive to signals
        let tick_driver = driver.clone();
        let job = spawn_blocking(move || tick_driver.tick(Instant::now()));
        let health = tokio::select! {
            res = &mut shutdown => {
                log_signal(res);
                break Ok(());
            }
            joined = job => match joined {
                Ok(health) => health,
                Err(e) => break Err(DriverError::Task(e)),
            },
        };

        if let Err(e) = publish(&pub_health, &health).await {
            warn!("Failed to publish health: {}", e);
        }

        if health == DriverHealth::Lost {
            error!("Controller link lost, driver stopping; restart required");
            break Err(DriverError::LinkLost);
        }
    };

    // Final zero write, also wakes a tick stuck in the recovery cool-down
    let stop_driver = driver.clone();
    if let Err(e) = spawn_blocking(move || stop_driver.shutdown()).await {
        error!("Shutdown handler failed: {}", e);
    }

    command_task.abort();
    reboot_task.abort();
    telemetry_task.abort();

    if let Err(e) = session.close().await {
        warn!("Failed to close Zenoh session: {}", e);
    }

    outcome
}
