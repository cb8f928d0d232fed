//! Command arguments and output parsers for the host network tools.

use once_cell::sync::Lazy;
use regex::Regex;

/// Kernel log pattern emitted when udev renames a NIC to `en<hwaddr>`.
pub const RENAME_LOG_PATTERN: &str = "en[[:xdigit:]]{12}: renamed from ";

/// Marker printed by `networkctl status` for an online link.
pub const ONLINE_MARKER: &str = "Online state: online";

/// Marker printed by `networkctl status` for a required link.
pub const REQUIRED_MARKER: &str = "Required For Online: yes";

static IP_ADDRESS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"inet6? (\S+)/\d+").expect("Invalid regex pattern"));

/// Arguments for `udevadm trigger`, replaying add events.
pub fn udev_trigger_args() -> [&'static str; 2] {
    ["trigger", "--action=add"]
}

/// Arguments for `udevadm settle`.
pub fn udev_settle_args() -> [&'static str; 1] {
    ["settle"]
}

/// Arguments for searching the current boot's kernel log for renames.
pub fn rename_journal_args() -> [&'static str; 5] {
    ["-b", "-t", "kernel", "-g", RENAME_LOG_PATTERN]
}

/// Arguments for `networkctl status <device>`.
pub fn networkctl_status_args(device: &str) -> [&str; 2] {
    ["status", device]
}

/// Arguments for `ip address show <device>`.
pub fn ip_address_show_args(device: &str) -> [&str; 3] {
    ["address", "show", device]
}

/// Arguments for `systemctl restart <unit>`.
pub fn restart_unit_args(unit: &str) -> [&str; 2] {
    ["restart", unit]
}

/// Arguments for `hostnamectl set-hostname`; empty resets to the image default.
pub fn set_hostname_args(hostname: &str) -> [&str; 2] {
    ["set-hostname", hostname]
}

/// Link state reported by `networkctl status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkStatus {
    pub online: bool,
    pub required: bool,
}

impl LinkStatus {
    /// State assumed when the status query itself fails.
    pub const UNKNOWN: LinkStatus = LinkStatus {
        online: false,
        required: true,
    };
}

/// Parses `networkctl status` output.
pub fn parse_networkctl_status(output: &str) -> LinkStatus {
    LinkStatus {
        online: output.contains(ONLINE_MARKER),
        required: output.contains(REQUIRED_MARKER),
    }
}

/// Counts the addresses in `ip address show` output, ignoring link-local ones.
pub fn count_routable_addresses(output: &str) -> usize {
    IP_ADDRESS_RE
        .captures_iter(output)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str())
        .filter(|addr| !addr.starts_with("169.254.") && !addr.starts_with("fe80:"))
        .count()
}
