//! Process lifecycle control events.
//!
//! The control API hands the daemon a single action token. Recognized
//! actions are delivered through [`LifecycleEvents`], a single-fire channel:
//! the first trigger wins and every waiter, including ones that subscribe
//! later, observes that action. Later triggers are ignored and reported as
//! such.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use tokio::sync::watch;

use crate::error::OsdError;

/// System-level action requested by the control API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlAction {
    /// Power the machine off.
    Shutdown,
    /// Restart the machine.
    Reboot,
}

impl ControlAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ControlAction::Shutdown => "shutdown",
            ControlAction::Reboot => "reboot",
        }
    }
}

impl fmt::Display for ControlAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ControlAction {
    type Err = OsdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "shutdown" | "poweroff" => Ok(ControlAction::Shutdown),
            "reboot" => Ok(ControlAction::Reboot),
            other => Err(OsdError::invalid_action(other)),
        }
    }
}

/// Single-fire notification of the process-wide control action.
///
/// Cloning yields another handle to the same channel.
#[derive(Debug, Clone)]
pub struct LifecycleEvents {
    tx: Arc<watch::Sender<Option<ControlAction>>>,
}

impl Default for LifecycleEvents {
    fn default() -> Self {
        Self::new()
    }
}

impl LifecycleEvents {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Fires `action`. Returns false if an action already fired.
    pub fn trigger(&self, action: ControlAction) -> bool {
        let fired = self.tx.send_if_modified(|current| {
            if current.is_none() {
                *current = Some(action);
                true
            } else {
                false
            }
        });

        if fired {
            tracing::info!(action = %action, "Lifecycle action triggered");
        } else {
            tracing::debug!(action = %action, "Lifecycle action already fired, ignoring");
        }
        fired
    }

    /// Returns the fired action, if any.
    pub fn fired(&self) -> Option<ControlAction> {
        *self.tx.borrow()
    }

    /// Waits until an action fires and returns it.
    pub async fn wait(&self) -> ControlAction {
        let mut rx = self.tx.subscribe();
        loop {
            if let Some(action) = *rx.borrow_and_update() {
                return action;
            }
            // `self` keeps the sender alive, so this only returns on change.
            let _ = rx.changed().await;
        }
    }
}
