//! Service worker lifecycle state.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::ServiceWorkerError;

/// Service worker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ServiceWorkerState {
    /// Initial state, script parsed.
    #[default]
    Parsed,
    /// Installing (install event).
    Installing,
    /// Installed but waiting for activation.
    Installed,
    /// Activating (activate event).
    Activating,
    /// Active and controlling pages.
    Activated,
    /// Redundant (replaced or install failed).
    Redundant,
}

impl ServiceWorkerState {
    /// Whether fetch, push and notification events are delivered.
    pub fn handles_functional_events(&self) -> bool {
        matches!(self, Self::Activating | Self::Activated)
    }
}

/// Lifecycle of one worker instance.
#[derive(Debug, Clone)]
pub struct Lifecycle {
    state: ServiceWorkerState,
    skip_waiting: bool,
    state_changed_at: Instant,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            state: ServiceWorkerState::Parsed,
            skip_waiting: false,
            state_changed_at: Instant::now(),
        }
    }

    /// Current state.
    pub fn state(&self) -> ServiceWorkerState {
        self.state
    }

    /// When the state last changed.
    pub fn state_changed_at(&self) -> Instant {
        self.state_changed_at
    }

    /// Whether skip-waiting was requested.
    pub fn skip_waiting_requested(&self) -> bool {
        self.skip_waiting
    }

    /// Request activation without waiting for existing clients to close.
    pub fn skip_waiting(&mut self) {
        self.skip_waiting = true;
    }

    /// An installed worker that asked to skip waiting activates right away.
    pub fn should_activate(&self) -> bool {
        self.state == ServiceWorkerState::Installed && self.skip_waiting
    }

    /// Parsed -> Installing.
    pub fn begin_install(&mut self) -> Result<(), ServiceWorkerError> {
        self.transition(ServiceWorkerState::Parsed, ServiceWorkerState::Installing)
    }

    /// Installing -> Installed, or Redundant if install failed.
    pub fn install_complete(&mut self, success: bool) {
        if self.state != ServiceWorkerState::Installing {
            return;
        }
        if success {
            self.set_state(ServiceWorkerState::Installed);
        } else {
            self.set_state(ServiceWorkerState::Redundant);
        }
    }

    /// Installed -> Activating.
    pub fn begin_activate(&mut self) -> Result<(), ServiceWorkerError> {
        self.transition(ServiceWorkerState::Installed, ServiceWorkerState::Activating)
    }

    /// Activating -> Activated.
    pub fn activate_complete(&mut self) {
        if self.state == ServiceWorkerState::Activating {
            self.set_state(ServiceWorkerState::Activated);
        }
    }

    /// Mark the worker as replaced.
    pub fn make_redundant(&mut self) {
        self.set_state(ServiceWorkerState::Redundant);
    }

    fn transition(
        &mut self,
        from: ServiceWorkerState,
        to: ServiceWorkerState,
    ) -> Result<(), ServiceWorkerError> {
        if self.state != from {
            return Err(ServiceWorkerError::State(format!(
                "cannot move to {:?} from {:?}",
                to, self.state
            )));
        }
        self.set_state(to);
        Ok(())
    }

    fn set_state(&mut self, state: ServiceWorkerState) {
        debug!(from = ?self.state, to = ?state, "Service worker state change");
        self.state = state;
        self.state_changed_at = Instant::now();
    }
}
