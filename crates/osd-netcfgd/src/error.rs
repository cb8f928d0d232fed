//! Error types for the network configuration engine.

use std::fmt;
use std::time::Duration;

use osd_common::OsdError;
use thiserror::Error;

/// Result type for network configuration operations.
pub type NetcfgResult<T> = std::result::Result<T, NetcfgError>;

/// Stages of an apply, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ApplyStage {
    Validate,
    Hostname,
    Proxy,
    NetworkFiles,
    Timesync,
    RenameWait,
    NetworkRestart,
    TimesyncRestart,
    OnlineWait,
}

impl ApplyStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplyStage::Validate => "validation",
            ApplyStage::Hostname => "hostname update",
            ApplyStage::Proxy => "proxy environment update",
            ApplyStage::NetworkFiles => "network configuration write",
            ApplyStage::Timesync => "timesync configuration write",
            ApplyStage::RenameWait => "interface rename wait",
            ApplyStage::NetworkRestart => "network service restart",
            ApplyStage::TimesyncRestart => "timesync service restart",
            ApplyStage::OnlineWait => "network online wait",
        }
    }
}

impl fmt::Display for ApplyStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structural or referential problem in a declarative network configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("no network configuration provided")]
    Missing,

    #[error("{kind} name cannot be empty")]
    EmptyName { kind: &'static str },

    #[error("device name {name:?} is used more than once")]
    DuplicateName { name: String },

    #[error("{device}: invalid hardware address {hwaddr:?}")]
    InvalidHwaddr { device: String, hwaddr: String },

    #[error("hardware address {hwaddr:?} is declared by both {first} and {second}")]
    DuplicateHwaddr {
        hwaddr: String,
        first: String,
        second: String,
    },

    #[error("bond {bond} has no members")]
    EmptyBond { bond: String },

    #[error("bond {bond}: member {member:?} does not match any declared interface")]
    UnknownBondMember { bond: String, member: String },

    #[error("member {member:?} is used by both bond {first} and bond {second}")]
    DuplicateBondMember {
        member: String,
        first: String,
        second: String,
    },

    #[error("vlan {vlan}: parent {parent:?} is not a declared interface or bond")]
    UnknownVlanParent { vlan: String, parent: String },

    #[error("{device}: invalid VLAN id {id} (must be 1-4094)")]
    InvalidVlanId { device: String, id: u16 },

    #[error("{device}: invalid MTU {mtu}")]
    InvalidMtu { device: String, mtu: u32 },

    #[error("{device}: invalid address {address:?}")]
    InvalidAddress { device: String, address: String },

    #[error("{device}: invalid route destination {to:?}")]
    InvalidRouteDestination { device: String, to: String },

    #[error("{device}: invalid route gateway {via:?}")]
    InvalidRouteGateway { device: String, via: String },
}

/// Network configuration engine errors.
#[derive(Debug, Error)]
pub enum NetcfgError {
    /// The declarative configuration was rejected before any side effect.
    #[error("Invalid network configuration: {0}")]
    Validation(#[from] ValidationError),

    /// A side-effecting stage failed.
    #[error("{stage} failed: {source}")]
    Stage {
        stage: ApplyStage,
        #[source]
        source: OsdError,
    },

    /// A convergence wait ran out of time.
    #[error("{stage} timed out after {timeout:?}")]
    Timeout { stage: ApplyStage, timeout: Duration },

    /// Daemon or input configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl NetcfgError {
    /// Wraps a host-level failure with the stage it happened in.
    pub fn stage(stage: ApplyStage, source: OsdError) -> Self {
        Self::Stage { stage, source }
    }

    /// The apply stage that produced this error, if any.
    pub fn failed_stage(&self) -> Option<ApplyStage> {
        match self {
            NetcfgError::Validation(_) => Some(ApplyStage::Validate),
            NetcfgError::Stage { stage, .. } | NetcfgError::Timeout { stage, .. } => Some(*stage),
            NetcfgError::Configuration(_) => None,
        }
    }

    /// Returns true for convergence timeouts, as opposed to hard failures.
    pub fn is_timeout(&self) -> bool {
        matches!(self, NetcfgError::Timeout { .. })
    }

    /// Returns true if the apply was aborted through its cancellation token.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, NetcfgError::Stage { source, .. } if source.is_cancelled())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_display() {
        let err = NetcfgError::from(ValidationError::UnknownVlanParent {
            vlan: "mgmt".to_string(),
            parent: "eth9".to_string(),
        });
        assert_eq!(
            err.to_string(),
            "Invalid network configuration: vlan mgmt: parent \"eth9\" is not a declared interface or bond"
        );
        assert_eq!(err.failed_stage(), Some(ApplyStage::Validate));
        assert!(!err.is_timeout());
    }

    #[test]
    fn test_stage_display() {
        let err = NetcfgError::stage(
            ApplyStage::NetworkRestart,
            OsdError::ShellCommandFailed {
                command: "systemctl restart systemd-networkd".to_string(),
                exit_code: 1,
                output: "failed".to_string(),
            },
        );
        assert!(err.to_string().starts_with("network service restart failed: "));
        assert_eq!(err.failed_stage(), Some(ApplyStage::NetworkRestart));
    }

    #[test]
    fn test_timeout_is_distinct() {
        let err = NetcfgError::Timeout {
            stage: ApplyStage::OnlineWait,
            timeout: Duration::from_secs(30),
        };
        assert!(err.is_timeout());
        assert!(!err.is_cancelled());
        assert_eq!(err.to_string(), "network online wait timed out after 30s");
    }

    #[test]
    fn test_cancelled() {
        let err = NetcfgError::stage(
            ApplyStage::RenameWait,
            OsdError::Cancelled {
                command: "udevadm settle".to_string(),
            },
        );
        assert!(err.is_cancelled());
        assert!(!err.is_timeout());
    }

    #[test]
    fn test_stage_order() {
        assert!(ApplyStage::Hostname < ApplyStage::NetworkFiles);
        assert!(ApplyStage::RenameWait < ApplyStage::NetworkRestart);
        assert!(ApplyStage::TimesyncRestart < ApplyStage::OnlineWait);
    }
}
