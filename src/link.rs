// Hardware link health
//
//   Connected --access fails--> Recovering --rediscovered--> Connected
//                                          --not found-----> Lost (terminal)
//   Connected --reboot sent---> Lost
//
// Hardware is only touched while Connected. The recovery itself (fault record,
// cool-down, rediscovery) is driven by the owner of the device handle; this type
// only decides which transitions are legal and makes sure each fault is
// recovered exactly once.

use tracing::{error, info, warn};

use crate::messages::DriverHealth;
use crate::motor::OdriveError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Connected,
    Recovering,
    Lost,
}

#[derive(Debug, Clone)]
pub struct LinkHealthMonitor {
    state: LinkState,
    recovery_claimed: bool,
}

impl Default for LinkHealthMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkHealthMonitor {
    pub fn new() -> Self {
        Self {
            state: LinkState::Connected,
            recovery_claimed: false,
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == LinkState::Connected
    }

    pub fn is_lost(&self) -> bool {
        self.state == LinkState::Lost
    }

    /// Record a failed hardware access
    ///
    /// Returns true on the Connected -> Recovering edge only; faults reported while
    /// already recovering (or lost) are absorbed.
    pub fn on_fault(&mut self, err: &OdriveError) -> bool {
        if self.state != LinkState::Connected {
            return false;
        }
        warn!("Controller link failed ({}), entering recovery", err);
        self.state = LinkState::Recovering;
        self.recovery_claimed = false;
        true
    }

    /// Claim the pending recovery; succeeds once per fault
    pub fn begin_recovery(&mut self) -> bool {
        if self.state == LinkState::Recovering && !self.recovery_claimed {
            self.recovery_claimed = true;
            true
        } else {
            false
        }
    }

    /// A new controller handle was installed
    pub fn on_rediscovered(&mut self) {
        if self.state == LinkState::Recovering {
            info!("Controller found, link restored");
            self.state = LinkState::Connected;
            self.recovery_claimed = false;
        }
    }

    /// The single rediscovery attempt failed
    pub fn on_rediscovery_failed(&mut self, err: &OdriveError) {
        if self.state == LinkState::Recovering {
            error!("Controller has been switched off ({}), link lost", err);
            self.state = LinkState::Lost;
        }
    }

    /// A reboot was accepted by the controller; the link stays down until restart
    pub fn on_reboot_sent(&mut self) {
        if self.state == LinkState::Connected {
            warn!("Controller rebooting, driver is now inert until restarted");
            self.state = LinkState::Lost;
        }
    }

    /// Health as published, given whether the deadman is engaged
    pub fn health(&self, cmd_stale: bool) -> DriverHealth {
        match self.state {
            LinkState::Connected if cmd_stale => DriverHealth::CmdStale,
            LinkState::Connected => DriverHealth::Ok,
            LinkState::Recovering => DriverHealth::Recovering,
            LinkState::Lost => DriverHealth::Lost,
        }
    }
}
