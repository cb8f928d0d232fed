//! `.link` files pinning physical NICs to `en<hwaddr>` names.

use super::UnitFile;
use crate::types::{physical_device_name, NetworkConfig};

/// One rename rule per interface (`00-`), then one per bond member (`01-`).
pub fn generate_link_files(cfg: &NetworkConfig) -> Vec<UnitFile> {
    let interfaces = cfg
        .interfaces
        .iter()
        .map(|iface| link_file("00", &iface.hwaddr, true));
    let members = cfg
        .bonds
        .iter()
        .flat_map(|bond| bond.members.iter())
        .map(|member| link_file("01", member, false));

    interfaces.chain(members).collect()
}

/// Bond members keep their permanent MAC since the bond may inherit it.
fn link_file(prefix: &str, hwaddr: &str, random_mac: bool) -> UnitFile {
    let device = physical_device_name(hwaddr);
    let mac_policy = if random_mac {
        "MACAddressPolicy=random\n"
    } else {
        ""
    };

    UnitFile::new(
        format!("{}-{}.link", prefix, device),
        format!(
            "[Match]\nPermanentMACAddress={}\n\n[Link]\n{}NamePolicy=\nName={}\n",
            hwaddr, mac_policy, device
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Bond, BondMode, Interface};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_interface_link_file() {
        let cfg = NetworkConfig {
            interfaces: vec![Interface::new("eth0", "aa:bb:cc:dd:ee:ff")],
            ..Default::default()
        };
        assert_eq!(
            generate_link_files(&cfg),
            vec![UnitFile::new(
                "00-enaabbccddeeff.link",
                "[Match]\n\
                 PermanentMACAddress=aa:bb:cc:dd:ee:ff\n\
                 \n\
                 [Link]\n\
                 MACAddressPolicy=random\n\
                 NamePolicy=\n\
                 Name=enaabbccddeeff\n"
            )]
        );
    }

    #[test]
    fn test_bond_member_link_files() {
        let cfg = NetworkConfig {
            bonds: vec![Bond::new(
                "uplink",
                BondMode::ActiveBackup,
                ["AA:00:00:00:00:01", "aa:00:00:00:00:02"],
            )],
            ..Default::default()
        };
        let files = generate_link_files(&cfg);
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].name, "01-enaa0000000001.link");
        assert_eq!(
            files[0].contents,
            "[Match]\nPermanentMACAddress=AA:00:00:00:00:01\n\n[Link]\nNamePolicy=\nName=enaa0000000001\n"
        );
        assert_eq!(files[1].name, "01-enaa0000000002.link");
    }
}
