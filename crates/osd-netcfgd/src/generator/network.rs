//! `.network` files attaching addressing and bridge membership.

use std::fmt::Write as _;

use super::UnitFile;
use crate::types::{
    physical_device_name, AddressToken, Gateway, NetworkConfig, OnlinePolicy, Route, Vlan,
};

/// Settings shared by interfaces and bonds for their bridge ports.
struct BridgePort<'a> {
    name: &'a str,
    vlan: Option<u16>,
    vlan_tags: &'a [u16],
}

/// Settings of the user-facing end of a device.
struct UserFacing<'a> {
    name: &'a str,
    addresses: &'a [String],
    routes: &'a [Route],
    required_for_online: Option<OnlinePolicy>,
    /// VLANs carried on top of this device; empty for VLAN devices.
    vlans: Vec<&'a Vlan>,
}

pub fn generate_network_files(cfg: &NetworkConfig) -> Vec<UnitFile> {
    let mut files = Vec::new();

    for iface in &cfg.interfaces {
        let port = BridgePort {
            name: &iface.name,
            vlan: iface.vlan,
            vlan_tags: &iface.vlan_tags,
        };
        let vlan_directives = port_vlans(cfg, &port);

        files.push(user_facing(
            cfg,
            "20",
            UserFacing {
                name: &iface.name,
                addresses: &iface.addresses,
                routes: &iface.routes,
                required_for_online: iface.required_for_online,
                vlans: cfg.vlans_on(&iface.name).collect(),
            },
        ));
        files.push(bridge_veth("20", &iface.name, &vlan_directives));

        let device = iface.physical_name();
        files.push(UnitFile::new(
            format!("20-{}.network", device),
            format!(
                "[Match]\nName={}\n\n[Network]\nLLDP={}\nEmitLLDP={}\nBridge=br{}\n{}",
                device, iface.lldp, iface.lldp, iface.name, vlan_directives
            ),
        ));
        files.push(bridge_device("20", &iface.name));
    }

    for bond in &cfg.bonds {
        let port = BridgePort {
            name: &bond.name,
            vlan: bond.vlan,
            vlan_tags: &bond.vlan_tags,
        };
        let vlan_directives = port_vlans(cfg, &port);

        files.push(user_facing(
            cfg,
            "21",
            UserFacing {
                name: &bond.name,
                addresses: &bond.addresses,
                routes: &bond.routes,
                required_for_online: bond.required_for_online,
                vlans: cfg.vlans_on(&bond.name).collect(),
            },
        ));
        files.push(bridge_veth("21", &bond.name, &vlan_directives));
        files.push(UnitFile::new(
            format!("21-bn{}.network", bond.name),
            format!(
                "[Match]\nName=bn{}\n\n[Network]\nLinkLocalAddressing=no\nConfigureWithoutCarrier=yes\nBridge=br{}\n{}",
                bond.name, bond.name, vlan_directives
            ),
        ));
        files.push(bridge_device("21", &bond.name));

        for (index, member) in bond.members.iter().enumerate() {
            files.push(UnitFile::new(
                format!("21-bn{}-dev{}.network", bond.name, index),
                format!(
                    "[Match]\nName={}\n\n[Network]\nLLDP={}\nEmitLLDP={}\nBond=bn{}\n",
                    physical_device_name(member),
                    bond.lldp,
                    bond.lldp,
                    bond.name
                ),
            ));
        }
    }

    for vlan in &cfg.vlans {
        files.push(user_facing(
            cfg,
            "22",
            UserFacing {
                name: &vlan.name,
                addresses: &vlan.addresses,
                routes: &vlan.routes,
                required_for_online: vlan.required_for_online,
                vlans: Vec::new(),
            },
        ));
    }

    files
}

fn port_vlans(cfg: &NetworkConfig, port: &BridgePort<'_>) -> String {
    bridge_vlan_directives(
        port.vlan,
        port.vlan_tags,
        cfg.vlans_on(port.name).map(|v| v.id),
    )
}

fn user_facing(cfg: &NetworkConfig, prefix: &str, dev: UserFacing<'_>) -> UnitFile {
    let mut contents = format!(
        "[Match]\nName={}\n\n[Link]\n{}\n\n[DHCP]\nClientIdentifier=mac\nRouteMetric=100\nUseMTU=true\n\n[Network]\n{}",
        dev.name,
        required_for_online_directive(dev.addresses, dev.required_for_online),
        network_section_directives(cfg, &dev.vlans),
    );
    contents.push_str(&addressing_directives(dev.addresses));
    contents.push_str(&route_directives(dev.routes));

    UnitFile::new(format!("{}-{}.network", prefix, dev.name), contents)
}

fn bridge_veth(prefix: &str, name: &str, vlan_directives: &str) -> UnitFile {
    UnitFile::new(
        format!("{}-vt{}.network", prefix, name),
        format!(
            "[Match]\nName=vt{}\n\n[Network]\nBridge=br{}\n{}",
            name, name, vlan_directives
        ),
    )
}

fn bridge_device(prefix: &str, name: &str) -> UnitFile {
    UnitFile::new(
        format!("{}-br{}.network", prefix, name),
        format!(
            "[Match]\nName=br{}\n\n[Network]\nLinkLocalAddressing=no\nConfigureWithoutCarrier=yes\n",
            name
        ),
    )
}

/// `[Link]` body for a user-facing device.
///
/// Devices without addresses, or with an explicit `no` policy, are never
/// waited on; otherwise the policy's family defaults to `any`.
pub fn required_for_online_directive(
    addresses: &[String],
    policy: Option<OnlinePolicy>,
) -> String {
    match policy {
        _ if addresses.is_empty() => "RequiredForOnline=no".to_string(),
        Some(OnlinePolicy::No) => "RequiredForOnline=no".to_string(),
        Some(policy) => format!("RequiredForOnline=yes\nRequiredFamilyForOnline={}", policy),
        None => format!(
            "RequiredForOnline=yes\nRequiredFamilyForOnline={}",
            OnlinePolicy::Any
        ),
    }
}

/// `VLAN=`, `Domains=`, `DNS=` and `NTP=` lines of the `[Network]` section.
pub fn network_section_directives(cfg: &NetworkConfig, vlans: &[&Vlan]) -> String {
    let mut out = String::new();

    for vlan in vlans {
        let _ = writeln!(out, "VLAN={}", vlan.name);
    }

    if let Some(dns) = &cfg.dns {
        if !dns.search_domains.is_empty() {
            let _ = writeln!(out, "Domains={}", dns.search_domains.join(" "));
        }
        for ns in &dns.nameservers {
            let _ = writeln!(out, "DNS={}", ns);
        }
    }

    if let Some(ntp) = &cfg.ntp {
        for ts in &ntp.timeservers {
            let _ = writeln!(out, "NTP={}", ts);
        }
    }

    out
}

/// Addressing lines derived from a device's address tokens.
///
/// Static addresses keep their declaration order. `slaac` toggles
/// `IPv6AcceptRA`; `dhcp4`/`dhcp6` select the `DHCP=` mode.
pub fn addressing_directives(addresses: &[String]) -> String {
    let mut out = String::new();
    if addresses.is_empty() {
        out.push_str("LinkLocalAddressing=no\nConfigureWithoutCarrier=yes\n");
    } else {
        out.push_str("LinkLocalAddressing=ipv6\n");
    }

    let (mut dhcp4, mut dhcp6, mut slaac) = (false, false, false);
    for address in addresses {
        match AddressToken::parse(address) {
            AddressToken::Dhcp4 => dhcp4 = true,
            AddressToken::Dhcp6 => dhcp6 = true,
            AddressToken::Slaac => slaac = true,
            AddressToken::Static(literal) => {
                let _ = writeln!(out, "Address={}", literal);
            }
        }
    }

    let _ = writeln!(out, "IPv6AcceptRA={}", slaac);

    match (dhcp4, dhcp6) {
        (true, true) => out.push_str("DHCP=yes\n"),
        (true, false) => out.push_str("DHCP=ipv4\n"),
        (false, true) => out.push_str("DHCP=ipv6\n"),
        (false, false) => {}
    }

    out
}

/// One `[Route]` block per route.
pub fn route_directives(routes: &[Route]) -> String {
    let mut out = String::new();
    for route in routes {
        let gateway = match route.gateway() {
            Gateway::Dhcp4 => "_dhcp4",
            Gateway::Slaac => "_ipv6ra",
            Gateway::Literal(via) => via,
        };
        let _ = write!(
            out,
            "\n[Route]\nGateway={}\nDestination={}\n",
            gateway, route.to
        );
    }
    out
}

/// `[BridgeVLAN]` blocks for a bridge port.
///
/// Carried tags are the native VLAN, the trunk tags and the ids of VLANs
/// stacked on the device, sorted and deduplicated. The native VLAN also
/// gets a PVID/untagged block ahead of the tagged ones.
pub fn bridge_vlan_directives(
    primary: Option<u16>,
    tags: &[u16],
    stacked: impl IntoIterator<Item = u16>,
) -> String {
    let primary = primary.filter(|id| *id != 0);

    let mut all: Vec<u16> = primary
        .into_iter()
        .chain(tags.iter().copied())
        .chain(stacked)
        .collect();
    all.sort_unstable();
    all.dedup();

    let mut out = String::new();
    if all.is_empty() {
        return out;
    }

    if let Some(pvid) = primary {
        let _ = write!(
            out,
            "\n[BridgeVLAN]\nPVID={}\nEgressUntagged={}\n",
            pvid, pvid
        );
    }
    for tag in all {
        let _ = write!(out, "\n[BridgeVLAN]\nVLAN={}\n", tag);
    }
    out
}
