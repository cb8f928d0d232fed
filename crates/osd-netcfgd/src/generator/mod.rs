//! systemd-networkd unit generation.
//!
//! Every interface and bond is modelled as a VLAN-filtering bridge joined by
//! the physical NIC (or the bond) and by one end of a veth pair. The other
//! veth end carries the user-facing addressing, so the bridge topology stays
//! stable while addressing policy changes.
//!
//! Unit text is consumed by systemd-networkd and must stay byte-compatible.
//! Generation is pure: the same [`NetworkConfig`] always yields the same
//! files in the same order.

mod link;
mod netdev;
mod network;

pub use link::generate_link_files;
pub use netdev::generate_netdev_files;
pub use network::{
    addressing_directives, bridge_vlan_directives, generate_network_files,
    network_section_directives, required_for_online_directive, route_directives,
};

use crate::types::{NetworkConfig, Ntp};

/// A named unit file and its contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitFile {
    pub name: String,
    pub contents: String,
}

impl UnitFile {
    pub fn new(name: impl Into<String>, contents: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            contents: contents.into(),
        }
    }
}

/// Generates every unit for `cfg`: `.link` files, then `.netdev` files,
/// then `.network` files.
pub fn generate(cfg: &NetworkConfig) -> Vec<UnitFile> {
    let mut files = generate_link_files(cfg);
    files.extend(generate_netdev_files(cfg));
    files.extend(generate_network_files(cfg));
    files
}

/// Renders the timesyncd drop-in, or `None` when no server is configured.
pub fn generate_timesync(ntp: Option<&Ntp>) -> Option<String> {
    let ntp = ntp.filter(|n| !n.timeservers.is_empty())?;
    Some(format!(
        "[Time]\nFallbackNTP={}\n",
        ntp.timeservers.join(" ")
    ))
}

/// `MTUBytes=` line, or an empty line when the MTU is unset.
fn mtu_line(mtu: Option<u32>) -> String {
    match mtu {
        Some(mtu) if mtu != 0 => format!("MTUBytes={}", mtu),
        _ => String::new(),
    }
}
