//! Declarative network topology model.
//!
//! A [`NetworkConfig`] is built once per apply request and flows read-only
//! through validation and unit generation. Interfaces, bonds and VLANs share
//! one device-name namespace.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Address token requesting DHCPv4.
pub const DHCP4: &str = "dhcp4";

/// Address token requesting DHCPv6.
pub const DHCP6: &str = "dhcp6";

/// Address token requesting SLAAC (router advertisement addressing).
pub const SLAAC: &str = "slaac";

/// Root of the declarative network configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub interfaces: Vec<Interface>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bonds: Vec<Bond>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub vlans: Vec<Vlan>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dns: Option<Dns>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ntp: Option<Ntp>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<Proxy>,
}

impl NetworkConfig {
    /// Names of every interface, bond and VLAN with at least one configured
    /// address, in declaration order.
    pub fn addressed_devices(&self) -> Vec<String> {
        let interfaces = self
            .interfaces
            .iter()
            .filter(|i| !i.addresses.is_empty())
            .map(|i| i.name.clone());
        let bonds = self
            .bonds
            .iter()
            .filter(|b| !b.addresses.is_empty())
            .map(|b| b.name.clone());
        let vlans = self
            .vlans
            .iter()
            .filter(|v| !v.addresses.is_empty())
            .map(|v| v.name.clone());

        interfaces.chain(bonds).chain(vlans).collect()
    }

    /// Fully qualified hostname from the DNS settings, if one is configured.
    pub fn hostname(&self) -> Option<String> {
        self.dns.as_ref().and_then(Dns::fqdn)
    }

    /// VLANs whose parent is `device`.
    pub fn vlans_on<'a>(&'a self, device: &'a str) -> impl Iterator<Item = &'a Vlan> + 'a {
        self.vlans.iter().filter(move |v| v.parent == device)
    }
}

/// A physical network interface.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interface {
    pub name: String,

    /// Permanent hardware address, `aa:bb:cc:dd:ee:ff`.
    pub hwaddr: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtu: Option<u32>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub addresses: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub routes: Vec<Route>,

    /// Native (untagged) VLAN of the bridge port.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vlan: Option<u16>,

    /// Additional tagged VLANs carried by the bridge port.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub vlan_tags: Vec<u16>,

    #[serde(default)]
    pub lldp: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_for_online: Option<OnlinePolicy>,
}

impl Interface {
    pub fn new(name: impl Into<String>, hwaddr: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            hwaddr: hwaddr.into(),
            ..Default::default()
        }
    }

    pub fn with_addresses<I, S>(mut self, addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.addresses = addresses.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_routes(mut self, routes: impl IntoIterator<Item = Route>) -> Self {
        self.routes = routes.into_iter().collect();
        self
    }

    pub fn with_mtu(mut self, mtu: u32) -> Self {
        self.mtu = Some(mtu);
        self
    }

    pub fn with_vlan(mut self, vlan: u16) -> Self {
        self.vlan = Some(vlan);
        self
    }

    pub fn with_vlan_tags(mut self, tags: impl IntoIterator<Item = u16>) -> Self {
        self.vlan_tags = tags.into_iter().collect();
        self
    }

    pub fn with_lldp(mut self, lldp: bool) -> Self {
        self.lldp = lldp;
        self
    }

    pub fn with_required_for_online(mut self, policy: OnlinePolicy) -> Self {
        self.required_for_online = Some(policy);
        self
    }

    /// Kernel name of the underlying NIC after renaming, e.g. `enaabbccddeeff`.
    pub fn physical_name(&self) -> String {
        physical_device_name(&self.hwaddr)
    }
}

/// A bond aggregating several physical interfaces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bond {
    pub name: String,

    /// Hardware address of the bond; defaults to the first member's.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hwaddr: Option<String>,

    /// Hardware addresses of the member interfaces.
    pub members: Vec<String>,

    pub mode: BondMode,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtu: Option<u32>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub addresses: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub routes: Vec<Route>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vlan: Option<u16>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub vlan_tags: Vec<u16>,

    #[serde(default)]
    pub lldp: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_for_online: Option<OnlinePolicy>,
}

impl Bond {
    pub fn new<I, S>(name: impl Into<String>, mode: BondMode, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            hwaddr: None,
            members: members.into_iter().map(Into::into).collect(),
            mode,
            mtu: None,
            addresses: Vec::new(),
            routes: Vec::new(),
            vlan: None,
            vlan_tags: Vec::new(),
            lldp: false,
            required_for_online: None,
        }
    }

    pub fn with_hwaddr(mut self, hwaddr: impl Into<String>) -> Self {
        self.hwaddr = Some(hwaddr.into());
        self
    }

    pub fn with_addresses<I, S>(mut self, addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.addresses = addresses.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_routes(mut self, routes: impl IntoIterator<Item = Route>) -> Self {
        self.routes = routes.into_iter().collect();
        self
    }

    pub fn with_mtu(mut self, mtu: u32) -> Self {
        self.mtu = Some(mtu);
        self
    }

    pub fn with_vlan(mut self, vlan: u16) -> Self {
        self.vlan = Some(vlan);
        self
    }

    pub fn with_vlan_tags(mut self, tags: impl IntoIterator<Item = u16>) -> Self {
        self.vlan_tags = tags.into_iter().collect();
        self
    }

    pub fn with_lldp(mut self, lldp: bool) -> Self {
        self.lldp = lldp;
        self
    }

    pub fn with_required_for_online(mut self, policy: OnlinePolicy) -> Self {
        self.required_for_online = Some(policy);
        self
    }

    /// The configured hardware address, or the first member's.
    pub fn effective_hwaddr(&self) -> Option<&str> {
        match self.hwaddr.as_deref() {
            Some(hwaddr) if !hwaddr.is_empty() => Some(hwaddr),
            _ => self.members.first().map(String::as_str),
        }
    }
}

/// An 802.1Q VLAN device on top of an interface or bond.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vlan {
    pub name: String,

    pub id: u16,

    /// Name of the interface or bond carrying this VLAN.
    pub parent: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtu: Option<u32>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub addresses: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub routes: Vec<Route>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_for_online: Option<OnlinePolicy>,
}

impl Vlan {
    pub fn new(name: impl Into<String>, id: u16, parent: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id,
            parent: parent.into(),
            ..Default::default()
        }
    }

    pub fn with_addresses<I, S>(mut self, addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.addresses = addresses.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_routes(mut self, routes: impl IntoIterator<Item = Route>) -> Self {
        self.routes = routes.into_iter().collect();
        self
    }

    pub fn with_mtu(mut self, mtu: u32) -> Self {
        self.mtu = Some(mtu);
        self
    }

    pub fn with_required_for_online(mut self, policy: OnlinePolicy) -> Self {
        self.required_for_online = Some(policy);
        self
    }
}

/// DNS and hostname settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dns {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub search_domains: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nameservers: Vec<String>,
}

impl Dns {
    /// `hostname.domain`, or just `hostname` without a domain.
    pub fn fqdn(&self) -> Option<String> {
        let hostname = self.hostname.as_deref().filter(|h| !h.is_empty())?;
        match self.domain.as_deref().filter(|d| !d.is_empty()) {
            Some(domain) => Some(format!("{}.{}", hostname, domain)),
            None => Some(hostname.to_string()),
        }
    }
}

/// Time synchronization settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ntp {
    #[serde(default)]
    pub timeservers: Vec<String>,
}

/// HTTP proxy settings exported to the system environment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proxy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_proxy: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub https_proxy: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub no_proxy: Option<String>,
}

/// A static route.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    /// Destination prefix, e.g. `10.0.0.0/8`.
    pub to: String,

    /// Gateway: a literal address, `dhcp4` or `slaac`.
    pub via: String,
}

impl Route {
    pub fn new(to: impl Into<String>, via: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            via: via.into(),
        }
    }

    pub fn gateway(&self) -> Gateway<'_> {
        Gateway::parse(&self.via)
    }
}

/// Required-for-online policy of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnlinePolicy {
    /// The device is not required for the system to be online.
    No,
    /// Any address family counts.
    Any,
    Ipv4,
    Ipv6,
    /// Both families must be configured.
    Both,
}

impl OnlinePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            OnlinePolicy::No => "no",
            OnlinePolicy::Any => "any",
            OnlinePolicy::Ipv4 => "ipv4",
            OnlinePolicy::Ipv6 => "ipv6",
            OnlinePolicy::Both => "both",
        }
    }
}

impl fmt::Display for OnlinePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bonding mode, named as systemd-networkd expects it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BondMode {
    #[serde(rename = "balance-rr")]
    BalanceRr,
    #[serde(rename = "active-backup")]
    ActiveBackup,
    #[serde(rename = "balance-xor")]
    BalanceXor,
    #[serde(rename = "broadcast")]
    Broadcast,
    #[serde(rename = "802.3ad")]
    Lacp,
    #[serde(rename = "balance-tlb")]
    BalanceTlb,
    #[serde(rename = "balance-alb")]
    BalanceAlb,
}

impl BondMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            BondMode::BalanceRr => "balance-rr",
            BondMode::ActiveBackup => "active-backup",
            BondMode::BalanceXor => "balance-xor",
            BondMode::Broadcast => "broadcast",
            BondMode::Lacp => "802.3ad",
            BondMode::BalanceTlb => "balance-tlb",
            BondMode::BalanceAlb => "balance-alb",
        }
    }
}

impl fmt::Display for BondMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classified entry of a device's address list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressToken<'a> {
    Dhcp4,
    Dhcp6,
    Slaac,
    /// A literal `address/prefix`.
    Static(&'a str),
}

impl<'a> AddressToken<'a> {
    pub fn parse(token: &'a str) -> Self {
        match token {
            DHCP4 => AddressToken::Dhcp4,
            DHCP6 => AddressToken::Dhcp6,
            SLAAC => AddressToken::Slaac,
            other => AddressToken::Static(other),
        }
    }
}

/// Classified route gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gateway<'a> {
    /// The gateway handed out by DHCPv4.
    Dhcp4,
    /// The router learned from IPv6 router advertisements.
    Slaac,
    Literal(&'a str),
}

impl<'a> Gateway<'a> {
    pub fn parse(via: &'a str) -> Self {
        match via {
            DHCP4 => Gateway::Dhcp4,
            SLAAC => Gateway::Slaac,
            other => Gateway::Literal(other),
        }
    }
}

/// Renamed kernel device name for a hardware address.
///
/// Colons are stripped and hex digits lowercased, so `AA:BB:CC:DD:EE:FF`
/// and `aa:bb:cc:dd:ee:ff` both map to `enaabbccddeeff`.
pub fn physical_device_name(hwaddr: &str) -> String {
    let stripped: String = hwaddr
        .chars()
        .filter(|c| *c != ':')
        .map(|c| c.to_ascii_lowercase())
        .collect();
    format!("en{}", stripped)
}
