//! Network configuration engine for the appliance OS.
//!
//! Turns a declarative [`NetworkConfig`] into systemd-networkd units and
//! drives the host until the new configuration is live:
//!
//! - [`validate`]: structural and referential checks, run before any side effect
//! - [`generator`]: pure rendering of `.link`, `.netdev` and `.network` units
//! - [`applier`]: hostname, proxy, unit directory and service restarts
//! - [`poller`]: interface rename and network online convergence waits
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use osd_common::{CancellationToken, SystemRunner};
//! use osd_netcfgd::{DaemonConfig, NetworkApplier};
//!
//! let config = DaemonConfig::load()?;
//! let applier = NetworkApplier::new(Arc::new(SystemRunner::new()), &config);
//! applier
//!     .apply(&network, config.apply_timeout(), &CancellationToken::new())
//!     .await?;
//! ```

pub mod applier;
pub mod commands;
pub mod config_file;
pub mod error;
pub mod generator;
pub mod poller;
pub mod system;
pub mod types;
pub mod validate;

pub use applier::NetworkApplier;
pub use config_file::{load_network_config, DaemonConfig};
pub use error::{ApplyStage, NetcfgError, NetcfgResult, ValidationError};
pub use generator::{generate, generate_timesync, UnitFile};
pub use poller::ConvergencePoller;
pub use types::{
    Bond, BondMode, Dns, Interface, NetworkConfig, Ntp, OnlinePolicy, Proxy, Route, Vlan,
};
pub use validate::validate;
