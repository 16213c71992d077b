// Deadman interlock
// If the command stream stops (teleop crashed, network dropped) the wheels must
// not keep turning at the last setpoint. The driver writes zero setpoints on
// every tick while the last command is older than the timeout.

use std::time::{Duration, Instant};

use crate::config::DEADMAN_TIMEOUT;

#[derive(Debug, Clone)]
pub struct DeadmanTimer {
    last_command: Instant,
    timeout: Duration,
}

impl DeadmanTimer {
    /// Starts armed at `now`; no command is needed for the first second
    pub fn new(now: Instant) -> Self {
        Self {
            last_command: now,
            timeout: DEADMAN_TIMEOUT,
        }
    }

    pub fn on_command(&mut self, now: Instant) {
        self.last_command = now;
    }

    /// True when strictly more than the timeout has passed since the last command
    pub fn tick(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_command) > self.timeout
    }

    pub fn command_age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_command_not_stale() {
        let start = Instant::now();
        let deadman = DeadmanTimer::new(start);
        assert!(!deadman.tick(start));
        assert!(!deadman.tick(start + Duration::from_millis(500)));
    }

    #[test]
    fn test_boundary_is_not_stale() {
        let start = Instant::now();
        let deadman = DeadmanTimer::new(start);
        assert!(!deadman.tick(start + Duration::from_secs(1)));
        assert!(deadman.tick(start + Duration::from_secs(1) + Duration::from_nanos(1)));
    }

    #[test]
    fn test_command_rearms() {
        let start = Instant::now();
        let mut deadman = DeadmanTimer::new(start);
        assert!(deadman.tick(start + Duration::from_secs(3)));

        deadman.on_command(start + Duration::from_secs(3));
        assert!(!deadman.tick(start + Duration::from_millis(3900)));
        assert!(deadman.tick(start + Duration::from_millis(4001)));
        assert_eq!(
            deadman.command_age(start + Duration::from_secs(5)),
            Duration::from_secs(2)
        );
    }

    #[test]
    fn test_clock_before_last_command() {
        // An out-of-order timestamp counts as a fresh command, never as stale
        let start = Instant::now();
        let deadman = DeadmanTimer::new(start + Duration::from_secs(2));
        assert!(!deadman.tick(start));
    }
}
