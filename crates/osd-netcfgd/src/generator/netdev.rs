//! `.netdev` files creating bridges, veth pairs, bonds and VLANs.

use super::{mtu_line, UnitFile};
use crate::types::NetworkConfig;

pub fn generate_netdev_files(cfg: &NetworkConfig) -> Vec<UnitFile> {
    let mut files = Vec::new();

    for iface in &cfg.interfaces {
        let mtu = mtu_line(iface.mtu);
        files.push(bridge("10", &iface.name, &mtu));
        files.push(veth("10", &iface.name, &iface.hwaddr, &mtu));
    }

    for bond in &cfg.bonds {
        let mtu = mtu_line(bond.mtu);
        files.push(UnitFile::new(
            format!("11-bn{}.netdev", bond.name),
            format!(
                "[NetDev]\nName=bn{}\nKind=bond\n{}\n\n[Bond]\nMode={}\n",
                bond.name, mtu, bond.mode
            ),
        ));
        files.push(bridge("11", &bond.name, &mtu));
        files.push(veth(
            "11",
            &bond.name,
            bond.effective_hwaddr().unwrap_or_default(),
            &mtu,
        ));
    }

    for vlan in &cfg.vlans {
        files.push(UnitFile::new(
            format!("12-{}.netdev", vlan.name),
            format!(
                "[NetDev]\nName={}\nKind=vlan\n{}\n\n[VLAN]\nId={}\n",
                vlan.name,
                mtu_line(vlan.mtu),
                vlan.id
            ),
        ));
    }

    files
}

fn bridge(prefix: &str, name: &str, mtu: &str) -> UnitFile {
    UnitFile::new(
        format!("{}-br{}.netdev", prefix, name),
        format!(
            "[NetDev]\nName=br{}\nKind=bridge\n{}\n\n[Bridge]\nVLANFiltering=true\n",
            name, mtu
        ),
    )
}

/// `name` is the user-facing end; `vt<name>` joins the bridge.
fn veth(prefix: &str, name: &str, hwaddr: &str, mtu: &str) -> UnitFile {
    UnitFile::new(
        format!("{}-{}.netdev", prefix, name),
        format!(
            "[NetDev]\nName={}\nKind=veth\nMACAddress={}\n{}\n\n[Peer]\nName=vt{}\n",
            name, hwaddr, mtu, name
        ),
    )
}
