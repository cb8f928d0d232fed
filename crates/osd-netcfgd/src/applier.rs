//! Applies a declarative network configuration to the host.
//!
//! The stages run strictly in order and stop at the first failure:
//!
//! 1. validate the configuration
//! 2. set or reset the hostname
//! 3. write or remove the proxy environment file
//! 4. wipe and regenerate the networkd unit directory
//! 5. write or remove the timesyncd drop-in
//! 6. wait for udev to rename the NICs
//! 7. restart the network service, then the time sync service
//! 8. wait for the network to come online within the remaining budget
//!
//! Nothing is rolled back. A failure after stage 4 leaves the new units on
//! disk, and the next successful apply replaces them.

use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use osd_common::shell::SYSTEMCTL_CMD;
use osd_common::{CancellationToken, CommandRunner, OsdError, OsdResult};
use tokio::time::Instant;
use tracing::{debug, info, instrument};

use crate::commands::restart_unit_args;
use crate::config_file::{DaemonConfig, PathsConfig, ServicesConfig};
use crate::error::{ApplyStage, NetcfgError, NetcfgResult};
use crate::generator::{generate, generate_timesync, UnitFile};
use crate::poller::ConvergencePoller;
use crate::system::{set_hostname, update_proxy_environment};
use crate::types::NetworkConfig;
use crate::validate::validate;

const UNIT_FILE_MODE: u32 = 0o644;
const UNIT_DIR_MODE: u32 = 0o755;

/// Drives one apply at a time; callers serialize concurrent requests.
pub struct NetworkApplier {
    runner: Arc<dyn CommandRunner>,
    poller: ConvergencePoller,
    paths: PathsConfig,
    services: ServicesConfig,
    rename_timeout: Duration,
}

impl NetworkApplier {
    pub fn new(runner: Arc<dyn CommandRunner>, config: &DaemonConfig) -> Self {
        Self {
            poller: ConvergencePoller::new(runner.clone()).with_interval(config.poll_interval()),
            runner,
            paths: config.paths.clone(),
            services: config.services.clone(),
            rename_timeout: config.rename_timeout(),
        }
    }

    /// Applies `cfg`, waiting at most `timeout` overall for the network to
    /// come online.
    ///
    /// The interface rename wait has its own bound; whatever it and the
    /// restarts consume is deducted from the online wait.
    #[instrument(skip_all, fields(timeout = ?timeout))]
    pub async fn apply(
        &self,
        cfg: &NetworkConfig,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> NetcfgResult<()> {
        let started = Instant::now();

        validate(cfg)?;
        let files = generate(cfg);
        let timesync = generate_timesync(cfg.ntp.as_ref());

        let hostname = cfg.hostname();
        set_hostname(self.runner.as_ref(), hostname.as_deref(), cancel)
            .await
            .map_err(|e| NetcfgError::stage(ApplyStage::Hostname, e))?;

        update_proxy_environment(cfg.proxy.as_ref(), &self.paths.proxy_env_file)
            .await
            .map_err(|e| NetcfgError::stage(ApplyStage::Proxy, e))?;

        self.write_network_files(&files)
            .await
            .map_err(|e| NetcfgError::stage(ApplyStage::NetworkFiles, e))?;

        self.write_timesync(timesync.as_deref())
            .await
            .map_err(|e| NetcfgError::stage(ApplyStage::Timesync, e))?;

        self.poller
            .wait_for_interface_rename(self.rename_timeout, cancel)
            .await?;

        self.restart_unit(&self.services.network_unit, cancel)
            .await
            .map_err(|e| NetcfgError::stage(ApplyStage::NetworkRestart, e))?;

        self.restart_unit(&self.services.timesync_unit, cancel)
            .await
            .map_err(|e| NetcfgError::stage(ApplyStage::TimesyncRestart, e))?;

        let remaining = timeout.saturating_sub(started.elapsed());
        self.poller
            .wait_for_online(&cfg.addressed_devices(), remaining, cancel)
            .await?;

        info!(
            files = files.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Network configuration applied"
        );
        Ok(())
    }

    /// Replaces the unit directory with exactly `files`.
    async fn write_network_files(&self, files: &[UnitFile]) -> OsdResult<()> {
        let dir = &self.paths.network_dir;

        match tokio::fs::remove_dir_all(dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(OsdError::io(dir, e)),
        }
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| OsdError::io(dir, e))?;
        set_mode(dir, UNIT_DIR_MODE).await?;

        for file in files {
            let path = dir.join(&file.name);
            tokio::fs::write(&path, &file.contents)
                .await
                .map_err(|e| OsdError::io(&path, e))?;
            set_mode(&path, UNIT_FILE_MODE).await?;
            debug!(file = %file.name, "Unit written");
        }

        info!(dir = %dir.display(), count = files.len(), "Network units generated");
        Ok(())
    }

    async fn write_timesync(&self, contents: Option<&str>) -> OsdResult<()> {
        let path = &self.paths.timesync_file;

        let Some(contents) = contents else {
            return match tokio::fs::remove_file(path).await {
                Ok(()) => {
                    info!(path = %path.display(), "Timesync configuration removed");
                    Ok(())
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(OsdError::io(path, e)),
            };
        };

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| OsdError::io(parent, e))?;
        }
        tokio::fs::write(path, contents)
            .await
            .map_err(|e| OsdError::io(path, e))?;
        set_mode(path, UNIT_FILE_MODE).await?;
        info!(path = %path.display(), "Timesync configuration written");
        Ok(())
    }

    async fn restart_unit(&self, unit: &str, cancel: &CancellationToken) -> OsdResult<()> {
        self.runner
            .run_or_throw(cancel, SYSTEMCTL_CMD, &restart_unit_args(unit))
            .await?;
        info!(unit = %unit, "Service restarted");
        Ok(())
    }
}

async fn set_mode(path: &Path, mode: u32) -> OsdResult<()> {
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
        .await
        .map_err(|e| OsdError::io(path, e))
}
