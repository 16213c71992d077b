// Driver service: owns the controller handle and ties kinematics, deadman,
// telemetry and link recovery together.
//
// Commands and ticks may arrive from different threads. Every access to the
// controller happens under one mutex; the recovery cool-down waits on a condvar
// paired with that mutex, so commands keep flowing (and get dropped) while the
// link is down, and shutdown can cut the cool-down short.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, info, warn};

use crate::config::{RECOVERY_DELAY, RobotGeometry};
use crate::deadman::DeadmanTimer;
use crate::link::{LinkHealthMonitor, LinkState};
use crate::messages::{DriverHealth, Telemetry, VelocityCommand};
use crate::motor::kinematics::{WheelSetpoint, convert};
use crate::motor::telemetry::TelemetryAdapter;
use crate::motor::{Axis, Discovery, MotorController, OdriveError};

/// Everything guarded by the hardware mutex
struct Inner {
    // Some exactly while the link is Connected
    device: Option<Box<dyn MotorController>>,
    link: LinkHealthMonitor,
    deadman: DeadmanTimer,
    telemetry: TelemetryAdapter,
    stale: bool,
    stopped: bool,
}

impl Inner {
    /// Right axis first, then left
    fn write_setpoint(&mut self, setpoint: WheelSetpoint) -> Result<(), OdriveError> {
        let Some(device) = self.device.as_mut() else {
            return Ok(());
        };
        device.set_input_vel(Axis::Right, setpoint.right)?;
        device.set_input_vel(Axis::Left, setpoint.left)
    }

    /// Drop the dead handle; it is never reused
    fn fault(&mut self, err: &OdriveError) {
        if self.link.on_fault(err) {
            self.device = None;
        }
    }

    fn is_live(&self) -> bool {
        !self.stopped && self.link.is_connected()
    }
}

pub struct DriverService {
    geometry: RobotGeometry,
    discovery: Arc<dyn Discovery>,
    telemetry_tx: UnboundedSender<Telemetry>,
    recovery_delay: Duration,
    inner: Mutex<Inner>,
    wake: Condvar,
}

impl DriverService {
    pub fn new(
        device: Box<dyn MotorController>,
        discovery: Arc<dyn Discovery>,
        geometry: RobotGeometry,
        telemetry_tx: UnboundedSender<Telemetry>,
    ) -> Self {
        Self {
            geometry,
            discovery,
            telemetry_tx,
            recovery_delay: RECOVERY_DELAY,
            inner: Mutex::new(Inner {
                device: Some(device),
                link: LinkHealthMonitor::new(),
                deadman: DeadmanTimer::new(Instant::now()),
                telemetry: TelemetryAdapter::new(),
                stale: false,
                stopped: false,
            }),
            wake: Condvar::new(),
        }
    }

    /// Override the cool-down before rediscovery
    pub fn with_recovery_delay(mut self, delay: Duration) -> Self {
        self.recovery_delay = delay;
        self
    }

    // A panic elsewhere must not wedge the safety path
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, record: Telemetry) {
        if self.telemetry_tx.send(record).is_err() {
            debug!("Telemetry receiver closed, dropping record");
        }
    }

    pub fn link_state(&self) -> LinkState {
        self.lock().link.state()
    }

    /// Process an incoming velocity command
    pub fn on_command(&self, cmd: VelocityCommand, now: Instant) {
        if !cmd.is_finite() {
            warn!("Ignoring non-finite command: {:?}", cmd);
            return;
        }

        let mut inner = self.lock();
        inner.deadman.on_command(now);
        if !inner.is_live() {
            debug!("Link {:?}, dropping command {:?}", inner.link.state(), cmd);
            return;
        }

        let setpoint = convert(cmd.linear, cmd.angular, &self.geometry);
        debug!(
            "Command {:?} -> left={:.3} right={:.3} rev/s",
            cmd, setpoint.left, setpoint.right
        );
        if let Err(e) = inner.write_setpoint(setpoint) {
            inner.fault(&e);
        }
    }

    /// One control period: telemetry, then deadman, then recovery if a fault is pending
    pub fn tick(&self, now: Instant) -> DriverHealth {
        let recover = {
            let mut inner = self.lock();
            if inner.stopped {
                return inner.link.health(true);
            }

            if inner.link.is_connected() {
                self.publish_telemetry(&mut inner);
            }

            if inner.link.is_connected() {
                self.check_deadman(&mut inner, now);
            }

            inner.link.begin_recovery()
        };

        if recover {
            self.recover();
        }

        let inner = self.lock();
        inner.link.health(inner.deadman.tick(now))
    }

    fn publish_telemetry(&self, inner: &mut Inner) {
        let Inner {
            device, telemetry, ..
        } = &mut *inner;
        let Some(device) = device.as_deref_mut() else {
            return;
        };

        let encoders = telemetry.read_encoders(device);
        // Status failures are logged only; they never start recovery
        let status = match &encoders {
            Ok(_) => Some(telemetry.read_status(device)),
            Err(_) => None,
        };

        match encoders {
            Ok(counts) => self.emit(Telemetry::Encoders(counts)),
            Err(failure) => {
                inner.fault(&failure.0);
                return;
            }
        }

        match status {
            Some(Ok(status)) => self.emit(Telemetry::Status(status)),
            Some(Err(e)) => warn!("{}", e),
            None => {}
        }
    }

    fn check_deadman(&self, inner: &mut Inner, now: Instant) {
        let stale = inner.deadman.tick(now);
        if stale != inner.stale {
            if stale {
                warn!(
                    "Command stale ({:?} old), stopping robot",
                    inner.deadman.command_age(now)
                );
            } else {
                info!("Commands resumed");
            }
            inner.stale = stale;
        }

        if stale {
            if let Err(e) = inner.write_setpoint(WheelSetpoint::zero()) {
                inner.fault(&e);
            }
        }
    }

    /// Fault record, cool-down, then one rediscovery attempt
    fn recover(&self) {
        let fault = self.lock().telemetry.fault_status();
        self.emit(Telemetry::Status(fault));

        warn!(
            "Waiting {:?} before looking for the controller again",
            self.recovery_delay
        );
        let (inner, _) = self
            .wake
            .wait_timeout_while(self.lock(), self.recovery_delay, |inner| !inner.stopped)
            .unwrap_or_else(PoisonError::into_inner);
        if inner.stopped {
            info!("Shutdown during recovery, not looking for the controller");
            return;
        }
        drop(inner);

        let found = self.discovery.find_any();

        let mut inner = self.lock();
        match found {
            Ok(device) if !inner.stopped => {
                inner.device = Some(device);
                inner.telemetry.clear_fault();
                inner.link.on_rediscovered();
            }
            Ok(_) => info!("Controller found after shutdown, leaving it alone"),
            Err(e) => inner.link.on_rediscovery_failed(&e),
        }
    }

    /// Operator-requested controller reboot
    ///
    /// A controller that takes the reboot leaves the driver inert until restart.
    /// A reboot call that fails means the handle was already dead, and goes
    /// through the regular recovery path instead.
    pub fn reboot(&self) {
        let recover = {
            let mut inner = self.lock();
            if !inner.is_live() {
                warn!("Reboot requested while link is {:?}, ignoring", inner.link.state());
                return;
            }

            error!("Rebooting ODrive!");
            let result = match inner.device.as_mut() {
                Some(device) => device.reboot(),
                None => return,
            };
            match result {
                Ok(()) => {
                    inner.device = None;
                    inner.link.on_reboot_sent();
                    false
                }
                Err(e) => {
                    inner.fault(&e);
                    inner.link.begin_recovery()
                }
            }
        };

        if recover {
            self.recover();
        }
    }

    /// Final stop: zero both wheels if the controller is still reachable
    ///
    /// Never fails; later commands and ticks become no-ops.
    pub fn shutdown(&self) {
        let mut inner = self.lock();
        inner.stopped = true;
        self.wake.notify_all();

        if inner.device.is_none() {
            warn!("No controller connected, skipping final stop");
            return;
        }
        match inner.write_setpoint(WheelSetpoint::zero()) {
            Ok(()) => info!("Motors stopped"),
            Err(e) => warn!("Failed to stop motors on shutdown: {}", e),
        }
    }
}
