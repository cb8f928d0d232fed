//! Convergence polling after a configuration change.
//!
//! Two bounded waits run around the network service restart: one for udev
//! to rename NICs to their `en<hwaddr>` names, one for every addressed
//! device to come online. Both poll on a fixed interval until satisfied,
//! cancelled or out of time. A timeout is only reported once the deadline
//! has actually passed; a zero timeout fails before the first probe. Each
//! probe is itself bounded by the deadline, so a host command that never
//! returns is dropped (and its child killed) when the budget runs out.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use osd_common::shell::{IP_CMD, JOURNALCTL_CMD, NETWORKCTL_CMD, UDEVADM_CMD};
use osd_common::{CancellationToken, CommandRunner, OsdError};
use tokio::time::Instant;
use tracing::{debug, info, instrument};

use crate::commands::{
    count_routable_addresses, ip_address_show_args, networkctl_status_args,
    parse_networkctl_status, rename_journal_args, udev_settle_args, udev_trigger_args,
    LinkStatus,
};
use crate::error::{ApplyStage, NetcfgError, NetcfgResult};

/// Default delay between two probes.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Outcome of a single probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollState {
    Satisfied,
    /// Not converged yet; carries what is still missing, for logs.
    Pending(String),
}

/// A fixed point in time after which a wait gives up.
#[derive(Debug, Clone, Copy)]
struct Deadline {
    end: Instant,
    timeout: Duration,
}

impl Deadline {
    fn after(timeout: Duration) -> Self {
        Self {
            end: Instant::now() + timeout,
            timeout,
        }
    }

    fn expired(&self) -> bool {
        Instant::now() >= self.end
    }

    fn exceeded(&self, stage: ApplyStage) -> NetcfgError {
        NetcfgError::Timeout {
            stage,
            timeout: self.timeout,
        }
    }

    /// Runs one probe, giving up when the deadline passes mid-probe.
    async fn bound<F>(&self, stage: ApplyStage, probe: F) -> NetcfgResult<PollState>
    where
        F: Future<Output = Result<PollState, OsdError>>,
    {
        match tokio::time::timeout_at(self.end, probe).await {
            Ok(state) => state.map_err(|e| NetcfgError::stage(stage, e)),
            Err(_) => {
                debug!(stage = %stage, "Probe still running at deadline");
                Err(self.exceeded(stage))
            }
        }
    }
}

/// Polls host state through a [`CommandRunner`].
pub struct ConvergencePoller {
    runner: Arc<dyn CommandRunner>,
    interval: Duration,
}

impl ConvergencePoller {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Waits until the kernel log shows at least one `en<hwaddr>` rename.
    ///
    /// Each probe replays udev add events and waits for the queue to settle
    /// first. Failures of those two commands abort the wait.
    #[instrument(skip(self, cancel))]
    pub async fn wait_for_interface_rename(
        &self,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> NetcfgResult<()> {
        let stage = ApplyStage::RenameWait;
        let deadline = Deadline::after(timeout);

        loop {
            if deadline.expired() {
                return Err(deadline.exceeded(stage));
            }

            match deadline.bound(stage, self.probe_rename(cancel)).await? {
                PollState::Satisfied => {
                    info!("Interface rename observed");
                    return Ok(());
                }
                PollState::Pending(reason) => debug!(reason = %reason, "Waiting for rename"),
            }

            self.idle(stage, cancel).await?;
        }
    }

    /// Waits until every device in `devices` that networkd requires for
    /// online is online with at least one routable address.
    ///
    /// All devices must converge on the same pass. A device whose status
    /// cannot be queried is treated as required and offline.
    #[instrument(skip(self, cancel))]
    pub async fn wait_for_online(
        &self,
        devices: &[String],
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> NetcfgResult<()> {
        let stage = ApplyStage::OnlineWait;
        let deadline = Deadline::after(timeout);

        loop {
            if deadline.expired() {
                return Err(deadline.exceeded(stage));
            }

            match deadline.bound(stage, self.probe_online(devices, cancel)).await? {
                PollState::Satisfied => {
                    info!(devices = devices.len(), "Network online");
                    return Ok(());
                }
                PollState::Pending(reason) => debug!(reason = %reason, "Waiting for network"),
            }

            self.idle(stage, cancel).await?;
        }
    }

    async fn probe_rename(&self, cancel: &CancellationToken) -> Result<PollState, OsdError> {
        self.runner
            .run_or_throw(cancel, UDEVADM_CMD, &udev_trigger_args())
            .await?;
        self.runner
            .run_or_throw(cancel, UDEVADM_CMD, &udev_settle_args())
            .await?;

        let result = self
            .runner
            .run(cancel, JOURNALCTL_CMD, &rename_journal_args())
            .await?;
        if result.success() {
            Ok(PollState::Satisfied)
        } else {
            Ok(PollState::Pending("no rename in kernel log".to_string()))
        }
    }

    async fn probe_online(
        &self,
        devices: &[String],
        cancel: &CancellationToken,
    ) -> Result<PollState, OsdError> {
        for device in devices {
            let status = self
                .runner
                .run(cancel, NETWORKCTL_CMD, &networkctl_status_args(device))
                .await?;
            let link = if status.success() {
                parse_networkctl_status(&status.stdout)
            } else {
                LinkStatus::UNKNOWN
            };

            if !link.required {
                continue;
            }
            if !link.online {
                return Ok(PollState::Pending(format!("{} is not online", device)));
            }

            let addresses = self
                .runner
                .run(cancel, IP_CMD, &ip_address_show_args(device))
                .await?;
            if !addresses.success() || count_routable_addresses(&addresses.stdout) == 0 {
                return Ok(PollState::Pending(format!("{} has no address", device)));
            }
        }
        Ok(PollState::Satisfied)
    }

    async fn idle(&self, stage: ApplyStage, cancel: &CancellationToken) -> NetcfgResult<()> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(NetcfgError::stage(
                stage,
                OsdError::Cancelled {
                    command: stage.to_string(),
                },
            )),
            _ = tokio::time::sleep(self.interval) => Ok(()),
        }
    }
}
