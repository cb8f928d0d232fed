//! End-to-end apply tests against a temporary root and a scripted host.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use osd_common::testing::ScriptedRunner;
use osd_common::{CancellationToken, ExecResult};
use osd_netcfgd::{
    ApplyStage, DaemonConfig, Dns, Interface, NetcfgError, NetworkApplier, NetworkConfig, Ntp,
    Proxy, Vlan,
};
use pretty_assertions::assert_eq;

const ONLINE: &str = "Online state: online\nRequired For Online: yes";
const ADDRESSED: &str = "    inet 192.0.2.10/24 brd 192.0.2.255 scope global eth0";

fn daemon_config(root: &Path) -> DaemonConfig {
    let mut config = DaemonConfig::default();
    config.paths.network_dir = root.join("network");
    config.paths.timesync_file = root.join("timesyncd.conf.d/osd.conf");
    config.paths.proxy_env_file = root.join("proxy.env");
    config
}

fn network() -> NetworkConfig {
    NetworkConfig {
        interfaces: vec![Interface::new("eth0", "aa:bb:cc:dd:ee:ff").with_addresses(["dhcp4"])],
        vlans: vec![Vlan::new("mgmt", 10, "eth0")],
        dns: Some(Dns {
            hostname: Some("server01".to_string()),
            domain: Some("example.org".to_string()),
            ..Default::default()
        }),
        ntp: Some(Ntp {
            timeservers: vec!["pool.ntp.org".to_string()],
        }),
        ..Default::default()
    }
}

fn online_runner() -> Arc<ScriptedRunner> {
    let runner = Arc::new(ScriptedRunner::new());
    runner
        .on("networkctl status", ExecResult::ok(ONLINE))
        .on("ip address show", ExecResult::ok(ADDRESSED));
    runner
}

fn read_dir(dir: &Path) -> BTreeMap<String, String> {
    std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| {
            let entry = entry.unwrap();
            (
                entry.file_name().to_string_lossy().into_owned(),
                std::fs::read_to_string(entry.path()).unwrap(),
            )
        })
        .collect()
}

#[tokio::test]
async fn test_apply_command_order() {
    let root = tempfile::tempdir().unwrap();
    let runner = online_runner();
    let applier = NetworkApplier::new(runner.clone(), &daemon_config(root.path()));

    applier
        .apply(&network(), Duration::from_secs(30), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        runner.calls(),
        vec![
            "hostnamectl set-hostname server01.example.org",
            "udevadm trigger --action=add",
            "udevadm settle",
            "journalctl -b -t kernel -g \"en[[:xdigit:]]{12}: renamed from \"",
            "systemctl restart systemd-networkd",
            "systemctl restart systemd-timesyncd",
            "networkctl status eth0",
            "ip address show eth0",
        ]
    );

    let files = read_dir(&root.path().join("network"));
    assert_eq!(files.len(), 9);
    assert!(files.contains_key("12-mgmt.netdev"));
    assert!(files.contains_key("22-mgmt.network"));
    assert_eq!(
        std::fs::read_to_string(root.path().join("timesyncd.conf.d/osd.conf")).unwrap(),
        "[Time]\nFallbackNTP=pool.ntp.org\n"
    );
}

#[tokio::test]
async fn test_apply_is_idempotent() {
    let root = tempfile::tempdir().unwrap();
    let applier = NetworkApplier::new(online_runner(), &daemon_config(root.path()));
    let cancel = CancellationToken::new();

    applier
        .apply(&network(), Duration::from_secs(30), &cancel)
        .await
        .unwrap();
    let first = read_dir(&root.path().join("network"));

    applier
        .apply(&network(), Duration::from_secs(30), &cancel)
        .await
        .unwrap();
    let second = read_dir(&root.path().join("network"));

    assert_eq!(first, second);
}

#[tokio::test]
async fn test_apply_replaces_stale_units_and_timesync() {
    let root = tempfile::tempdir().unwrap();
    let applier = NetworkApplier::new(online_runner(), &daemon_config(root.path()));
    let cancel = CancellationToken::new();

    applier
        .apply(&network(), Duration::from_secs(30), &cancel)
        .await
        .unwrap();
    std::fs::write(root.path().join("network/99-stale.network"), "[Match]\n").unwrap();

    let mut reduced = network();
    reduced.vlans.clear();
    reduced.ntp = None;
    applier
        .apply(&reduced, Duration::from_secs(30), &cancel)
        .await
        .unwrap();

    let files = read_dir(&root.path().join("network"));
    assert!(!files.contains_key("99-stale.network"));
    assert!(!files.contains_key("12-mgmt.netdev"));
    assert!(!root.path().join("timesyncd.conf.d/osd.conf").exists());
}

#[tokio::test]
async fn test_apply_writes_and_clears_proxy_file() {
    let root = tempfile::tempdir().unwrap();
    let applier = NetworkApplier::new(online_runner(), &daemon_config(root.path()));
    let cancel = CancellationToken::new();
    let env_file = root.path().join("proxy.env");

    let mut cfg = network();
    cfg.proxy = Some(Proxy {
        https_proxy: Some("http://proxy.example.org:3128".to_string()),
        ..Default::default()
    });
    applier
        .apply(&cfg, Duration::from_secs(30), &cancel)
        .await
        .unwrap();
    assert_eq!(
        std::fs::read_to_string(&env_file).unwrap(),
        "https_proxy=http://proxy.example.org:3128\nHTTPS_PROXY=http://proxy.example.org:3128\n"
    );

    applier
        .apply(&network(), Duration::from_secs(30), &cancel)
        .await
        .unwrap();
    assert!(!env_file.exists());
}

#[tokio::test]
async fn test_apply_resets_hostname_without_dns() {
    let root = tempfile::tempdir().unwrap();
    let runner = online_runner();
    let applier = NetworkApplier::new(runner.clone(), &daemon_config(root.path()));

    let mut cfg = network();
    cfg.dns = None;
    applier
        .apply(&cfg, Duration::from_secs(30), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        runner.calls_matching("hostnamectl"),
        vec!["hostnamectl set-hostname \"\""]
    );
}

#[tokio::test(start_paused = true)]
async fn test_online_timeout_reports_stage() {
    let root = tempfile::tempdir().unwrap();
    let runner = Arc::new(ScriptedRunner::new());
    runner.on(
        "networkctl status",
        ExecResult::ok("Online state: offline\nRequired For Online: yes"),
    );
    let applier = NetworkApplier::new(runner.clone(), &daemon_config(root.path()));

    let err = applier
        .apply(&network(), Duration::from_secs(3), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(err.is_timeout());
    assert_eq!(err.failed_stage(), Some(ApplyStage::OnlineWait));
    // Units stay in place; there is no rollback.
    assert!(root.path().join("network/20-eth0.network").exists());
    assert_eq!(runner.calls_matching("systemctl restart").len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_hung_address_query_bounded_by_apply_timeout() {
    let root = tempfile::tempdir().unwrap();
    let runner = Arc::new(ScriptedRunner::new());
    runner
        .on("networkctl status", ExecResult::ok(ONLINE))
        .hang("ip address show");
    let applier = NetworkApplier::new(runner.clone(), &daemon_config(root.path()));

    let started = tokio::time::Instant::now();
    let err = applier
        .apply(&network(), Duration::from_secs(3), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(err.is_timeout());
    assert_eq!(err.failed_stage(), Some(ApplyStage::OnlineWait));
    assert!(started.elapsed() <= Duration::from_secs(3));
}

#[tokio::test(start_paused = true)]
async fn test_rename_timeout_stops_before_restart() {
    let root = tempfile::tempdir().unwrap();
    let runner = Arc::new(ScriptedRunner::new());
    runner.on("journalctl", ExecResult::failed(1, "-- No entries --"));
    let applier = NetworkApplier::new(runner.clone(), &daemon_config(root.path()));

    let err = applier
        .apply(&network(), Duration::from_secs(30), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        NetcfgError::Timeout {
            stage: ApplyStage::RenameWait,
            ..
        }
    ));
    assert!(runner.calls_matching("systemctl").is_empty());
}

#[tokio::test]
async fn test_cancelled_apply() {
    let root = tempfile::tempdir().unwrap();
    let runner = online_runner();
    let applier = NetworkApplier::new(runner.clone(), &daemon_config(root.path()));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = applier
        .apply(&network(), Duration::from_secs(30), &cancel)
        .await
        .unwrap_err();

    assert!(err.is_cancelled());
    assert_eq!(err.failed_stage(), Some(ApplyStage::Hostname));
    assert!(runner.calls().is_empty());
}
