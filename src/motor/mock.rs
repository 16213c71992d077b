// In-memory controller for tests, with switchable failures

use std::collections::VecDeque;
use std::io::{Error, ErrorKind};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use super::device::{Axis, AxisState, Discovery, MotorController, Subsystem};
use super::odrive::OdriveError;

#[derive(Debug)]
pub struct FakeState {
    pub connected: bool,
    pub status_fails: bool,
    pub reboot_fails: bool,
    pub setpoints: [f64; 2],
    pub setpoint_writes: usize,
    pub shadow_counts: [i64; 2],
    pub axis_errors: [[u64; 5]; 2],
    pub system_error: u64,
    pub bus_voltage: f32,
    pub current_states: [AxisState; 2],
    pub requested_states: Vec<(Axis, AxisState)>,
    pub reboots: usize,
}

impl Default for FakeState {
    fn default() -> Self {
        Self {
            connected: true,
            status_fails: false,
            reboot_fails: false,
            setpoints: [0.0; 2],
            setpoint_writes: 0,
            shadow_counts: [0; 2],
            axis_errors: [[0; 5]; 2],
            system_error: 0,
            bus_voltage: 24.0,
            current_states: [AxisState::Idle; 2],
            requested_states: Vec::new(),
            reboots: 0,
        }
    }
}

/// Cloning shares the state, so a test keeps a handle after giving one to the driver
#[derive(Debug, Clone, Default)]
pub struct FakeController {
    state: Arc<Mutex<FakeState>>,
}

fn unplugged() -> OdriveError {
    OdriveError::Io(Error::new(ErrorKind::BrokenPipe, "device unplugged"))
}

impl FakeController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn disconnect(&self) {
        self.state().connected = false;
    }

    fn live(&self) -> Result<MutexGuard<'_, FakeState>, OdriveError> {
        let state = self.state();
        if state.connected {
            Ok(state)
        } else {
            Err(unplugged())
        }
    }

    fn status_field(&self) -> Result<MutexGuard<'_, FakeState>, OdriveError> {
        let state = self.live()?;
        if state.status_fails {
            return Err(OdriveError::InvalidProperty {
                command: "r error".to_string(),
                reply: "invalid property".to_string(),
            });
        }
        Ok(state)
    }
}

fn slot(axis: Axis) -> usize {
    usize::from(axis.index())
}

impl MotorController for FakeController {
    fn set_input_vel(&mut self, axis: Axis, rps: f64) -> Result<(), OdriveError> {
        let mut state = self.live()?;
        state.setpoints[slot(axis)] = rps;
        state.setpoint_writes += 1;
        Ok(())
    }

    fn shadow_count(&mut self, axis: Axis) -> Result<i64, OdriveError> {
        Ok(self.live()?.shadow_counts[slot(axis)])
    }

    fn axis_error(&mut self, axis: Axis, subsystem: Subsystem) -> Result<u64, OdriveError> {
        let index = Subsystem::ALL
            .iter()
            .position(|&s| s == subsystem)
            .unwrap_or_default();
        Ok(self.status_field()?.axis_errors[slot(axis)][index])
    }

    fn system_error(&mut self) -> Result<u64, OdriveError> {
        Ok(self.status_field()?.system_error)
    }

    fn bus_voltage(&mut self) -> Result<f32, OdriveError> {
        Ok(self.status_field()?.bus_voltage)
    }

    fn current_state(&mut self, axis: Axis) -> Result<AxisState, OdriveError> {
        Ok(self.live()?.current_states[slot(axis)])
    }

    fn set_requested_state(&mut self, axis: Axis, state: AxisState) -> Result<(), OdriveError> {
        let mut fake = self.live()?;
        fake.requested_states.push((axis, state));
        fake.current_states[slot(axis)] = state;
        Ok(())
    }

    fn reboot(&mut self) -> Result<(), OdriveError> {
        let mut state = self.live()?;
        if state.reboot_fails {
            return Err(unplugged());
        }
        state.reboots += 1;
        state.connected = false;
        Ok(())
    }
}

/// Hands out queued controllers; an empty queue or `None` means nothing was found
#[derive(Debug, Default)]
pub struct FakeDiscovery {
    found: Mutex<VecDeque<Option<FakeController>>>,
    attempts: Mutex<usize>,
}

impl FakeDiscovery {
    pub fn new(found: impl IntoIterator<Item = Option<FakeController>>) -> Self {
        Self {
            found: Mutex::new(found.into_iter().collect()),
            attempts: Mutex::new(0),
        }
    }

    pub fn attempts(&self) -> usize {
        *self.attempts.lock().unwrap()
    }
}

impl Discovery for FakeDiscovery {
    fn find_any(&self) -> Result<Box<dyn MotorController>, OdriveError> {
        *self.attempts.lock().unwrap() += 1;
        match self.found.lock().unwrap().pop_front().flatten() {
            Some(fake) => Ok(Box::new(fake)),
            None => Err(OdriveError::NotFound {
                timeout: Duration::ZERO,
            }),
        }
    }
}
