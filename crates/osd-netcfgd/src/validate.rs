//! Validation of declarative network configurations.
//!
//! Runs before any filesystem or service side effect and never mutates its
//! input. The generator relies on these checks: it assumes every bond has
//! members and every VLAN parent exists.

use std::collections::{HashMap, HashSet};
use std::net::IpAddr;

use crate::error::ValidationError;
use crate::types::{AddressToken, Gateway, NetworkConfig, Route};

/// Lowest MTU accepted for any device.
pub const MIN_MTU: u32 = 68;

/// Highest MTU accepted for any device.
pub const MAX_MTU: u32 = 65535;

/// Highest usable 802.1Q VLAN id.
pub const MAX_VLAN_ID: u16 = 4094;

/// Validates `cfg`, returning the first problem found.
pub fn validate(cfg: &NetworkConfig) -> Result<(), ValidationError> {
    validate_names(cfg)?;
    validate_interfaces(cfg)?;
    validate_bonds(cfg)?;
    validate_vlans(cfg)?;
    Ok(())
}

/// Names must be non-empty and unique across interfaces, bonds and VLANs.
fn validate_names(cfg: &NetworkConfig) -> Result<(), ValidationError> {
    let names = cfg
        .interfaces
        .iter()
        .map(|i| ("interface", i.name.as_str()))
        .chain(cfg.bonds.iter().map(|b| ("bond", b.name.as_str())))
        .chain(cfg.vlans.iter().map(|v| ("vlan", v.name.as_str())));

    let mut seen = HashSet::new();
    for (kind, name) in names {
        if name.is_empty() {
            return Err(ValidationError::EmptyName { kind });
        }
        if !seen.insert(name) {
            return Err(ValidationError::DuplicateName {
                name: name.to_string(),
            });
        }
    }
    Ok(())
}

fn validate_interfaces(cfg: &NetworkConfig) -> Result<(), ValidationError> {
    let mut hwaddrs: HashMap<String, &str> = HashMap::new();

    for iface in &cfg.interfaces {
        if !is_valid_hwaddr(&iface.hwaddr) {
            return Err(ValidationError::InvalidHwaddr {
                device: iface.name.clone(),
                hwaddr: iface.hwaddr.clone(),
            });
        }
        if let Some(first) = hwaddrs.insert(iface.hwaddr.to_ascii_lowercase(), &iface.name) {
            return Err(ValidationError::DuplicateHwaddr {
                hwaddr: iface.hwaddr.clone(),
                first: first.to_string(),
                second: iface.name.clone(),
            });
        }

        validate_mtu(&iface.name, iface.mtu)?;
        validate_vlan_tags(&iface.name, iface.vlan, &iface.vlan_tags)?;
        validate_addresses(&iface.name, &iface.addresses)?;
        validate_routes(&iface.name, &iface.routes)?;
    }
    Ok(())
}

fn validate_bonds(cfg: &NetworkConfig) -> Result<(), ValidationError> {
    let declared: HashSet<String> = cfg
        .interfaces
        .iter()
        .map(|i| i.hwaddr.to_ascii_lowercase())
        .collect();
    let mut owners: HashMap<String, &str> = HashMap::new();

    for bond in &cfg.bonds {
        if bond.members.is_empty() {
            return Err(ValidationError::EmptyBond {
                bond: bond.name.clone(),
            });
        }

        for member in &bond.members {
            let key = member.to_ascii_lowercase();
            if !is_valid_hwaddr(member) || !declared.contains(&key) {
                return Err(ValidationError::UnknownBondMember {
                    bond: bond.name.clone(),
                    member: member.clone(),
                });
            }
            if let Some(first) = owners.insert(key, &bond.name) {
                return Err(ValidationError::DuplicateBondMember {
                    member: member.clone(),
                    first: first.to_string(),
                    second: bond.name.clone(),
                });
            }
        }

        if let Some(hwaddr) = bond.hwaddr.as_deref().filter(|h| !h.is_empty()) {
            if !is_valid_hwaddr(hwaddr) {
                return Err(ValidationError::InvalidHwaddr {
                    device: bond.name.clone(),
                    hwaddr: hwaddr.to_string(),
                });
            }
        }

        validate_mtu(&bond.name, bond.mtu)?;
        validate_vlan_tags(&bond.name, bond.vlan, &bond.vlan_tags)?;
        validate_addresses(&bond.name, &bond.addresses)?;
        validate_routes(&bond.name, &bond.routes)?;
    }
    Ok(())
}

fn validate_vlans(cfg: &NetworkConfig) -> Result<(), ValidationError> {
    for vlan in &cfg.vlans {
        let parent_exists = cfg.interfaces.iter().any(|i| i.name == vlan.parent)
            || cfg.bonds.iter().any(|b| b.name == vlan.parent);
        if !parent_exists {
            return Err(ValidationError::UnknownVlanParent {
                vlan: vlan.name.clone(),
                parent: vlan.parent.clone(),
            });
        }

        validate_vlan_id(&vlan.name, vlan.id)?;
        validate_mtu(&vlan.name, vlan.mtu)?;
        validate_addresses(&vlan.name, &vlan.addresses)?;
        validate_routes(&vlan.name, &vlan.routes)?;
    }
    Ok(())
}

fn validate_mtu(device: &str, mtu: Option<u32>) -> Result<(), ValidationError> {
    match mtu {
        Some(mtu) if !(MIN_MTU..=MAX_MTU).contains(&mtu) => Err(ValidationError::InvalidMtu {
            device: device.to_string(),
            mtu,
        }),
        _ => Ok(()),
    }
}

fn validate_vlan_id(device: &str, id: u16) -> Result<(), ValidationError> {
    if id == 0 || id > MAX_VLAN_ID {
        return Err(ValidationError::InvalidVlanId {
            device: device.to_string(),
            id,
        });
    }
    Ok(())
}

fn validate_vlan_tags(device: &str, vlan: Option<u16>, tags: &[u16]) -> Result<(), ValidationError> {
    for id in vlan.iter().chain(tags) {
        validate_vlan_id(device, *id)?;
    }
    Ok(())
}

fn validate_addresses(device: &str, addresses: &[String]) -> Result<(), ValidationError> {
    for address in addresses {
        if let AddressToken::Static(literal) = AddressToken::parse(address) {
            if !is_valid_prefix(literal) {
                return Err(ValidationError::InvalidAddress {
                    device: device.to_string(),
                    address: address.clone(),
                });
            }
        }
    }
    Ok(())
}

fn validate_routes(device: &str, routes: &[Route]) -> Result<(), ValidationError> {
    for route in routes {
        if !is_valid_prefix(&route.to) {
            return Err(ValidationError::InvalidRouteDestination {
                device: device.to_string(),
                to: route.to.clone(),
            });
        }
        if let Gateway::Literal(via) = route.gateway() {
            if via.parse::<IpAddr>().is_err() {
                return Err(ValidationError::InvalidRouteGateway {
                    device: device.to_string(),
                    via: route.via.clone(),
                });
            }
        }
    }
    Ok(())
}

/// Returns true for six colon-separated two-digit hex octets.
pub fn is_valid_hwaddr(hwaddr: &str) -> bool {
    let octets: Vec<&str> = hwaddr.split(':').collect();
    octets.len() == 6
        && octets
            .iter()
            .all(|o| o.len() == 2 && o.chars().all(|c| c.is_ascii_hexdigit()))
}

/// Returns true for `address/prefix` with a prefix length valid for the family.
pub fn is_valid_prefix(value: &str) -> bool {
    let Some((addr, len)) = value.split_once('/') else {
        return false;
    };
    let Ok(len) = len.parse::<u8>() else {
        return false;
    };
    match addr.parse::<IpAddr>() {
        Ok(IpAddr::V4(_)) => len <= 32,
        Ok(IpAddr::V6(_)) => len <= 128,
        Err(_) => false,
    }
}
