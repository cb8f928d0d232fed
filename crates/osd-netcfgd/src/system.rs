//! Host-level settings carried by a network configuration: the hostname and
//! the HTTP proxy environment.

use std::path::Path;

use osd_common::shell::HOSTNAMECTL_CMD;
use osd_common::{CancellationToken, CommandRunner, OsdError, OsdResult};
use tracing::{debug, info};

use crate::commands::set_hostname_args;
use crate::types::Proxy;

/// Sets the static hostname, or resets it to the image default when `None`.
pub async fn set_hostname(
    runner: &dyn CommandRunner,
    hostname: Option<&str>,
    cancel: &CancellationToken,
) -> OsdResult<()> {
    let hostname = hostname.unwrap_or_default();
    runner
        .run_or_throw(cancel, HOSTNAMECTL_CMD, &set_hostname_args(hostname))
        .await?;

    if hostname.is_empty() {
        info!("Hostname reset to default");
    } else {
        info!(hostname = %hostname, "Hostname set");
    }
    Ok(())
}

/// Proxy variables and their new values; `None` means unset.
///
/// Each variable is listed in lower and upper case, since tools disagree on
/// which one they read.
pub fn proxy_variables(proxy: Option<&Proxy>) -> Vec<(String, Option<String>)> {
    let values = [
        ("http_proxy", proxy.and_then(|p| p.http_proxy.clone())),
        ("https_proxy", proxy.and_then(|p| p.https_proxy.clone())),
        ("no_proxy", proxy.and_then(|p| p.no_proxy.clone())),
    ];

    values
        .into_iter()
        .flat_map(|(name, value)| {
            let value = value.filter(|v| !v.is_empty());
            [
                (name.to_string(), value.clone()),
                (name.to_ascii_uppercase(), value),
            ]
        })
        .collect()
}

/// Renders the environment file, or `None` when no variable is set.
pub fn render_proxy_environment(proxy: Option<&Proxy>) -> Option<String> {
    let lines: String = proxy_variables(proxy)
        .into_iter()
        .filter_map(|(name, value)| value.map(|v| format!("{}={}\n", name, v)))
        .collect();

    if lines.is_empty() {
        None
    } else {
        Some(lines)
    }
}

/// Writes or removes `env_file`. The process environment is left alone.
pub async fn update_proxy_environment(proxy: Option<&Proxy>, env_file: &Path) -> OsdResult<()> {
    match render_proxy_environment(proxy) {
        Some(contents) => {
            if let Some(parent) = env_file.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| OsdError::io(parent, e))?;
            }
            tokio::fs::write(env_file, contents)
                .await
                .map_err(|e| OsdError::io(env_file, e))?;
            info!(path = %env_file.display(), "Proxy environment written");
        }
        None => match tokio::fs::remove_file(env_file).await {
            Ok(()) => info!(path = %env_file.display(), "Proxy environment removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(OsdError::io(env_file, e)),
        },
    }
    Ok(())
}

/// Sets or clears the proxy variables in this process's environment.
///
/// Only the binary calls this, once per apply and from a single task; the
/// environment is process-global and not synchronized with other threads.
pub fn export_proxy_variables(proxy: Option<&Proxy>) {
    for (name, value) in proxy_variables(proxy) {
        match value {
            Some(value) => std::env::set_var(&name, value),
            None => std::env::remove_var(&name),
        }
    }
    debug!("Process proxy environment updated");
}

#[cfg(test)]
mod tests {
    use super::*;
    use osd_common::testing::ScriptedRunner;
    use osd_common::ExecResult;
    use pretty_assertions::assert_eq;

    fn proxy() -> Proxy {
        Proxy {
            http_proxy: Some("http://proxy.example.org:3128".to_string()),
            https_proxy: None,
            no_proxy: Some("localhost,.example.org".to_string()),
        }
    }

    #[tokio::test]
    async fn test_set_hostname() {
        let runner = ScriptedRunner::new();
        let cancel = CancellationToken::new();
        set_hostname(&runner, Some("server01.example.org"), &cancel)
            .await
            .unwrap();
        set_hostname(&runner, None, &cancel).await.unwrap();

        assert_eq!(
            runner.calls(),
            vec![
                "hostnamectl set-hostname server01.example.org",
                "hostnamectl set-hostname \"\"",
            ]
        );
    }

    #[tokio::test]
    async fn test_set_hostname_failure() {
        let runner = ScriptedRunner::new();
        runner.on("hostnamectl", ExecResult::failed(1, "access denied"));
        let err = set_hostname(&runner, Some("h"), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, OsdError::ShellCommandFailed { exit_code: 1, .. }));
    }

    #[test]
    fn test_proxy_variables_cover_both_cases() {
        let vars = proxy_variables(Some(&proxy()));
        assert_eq!(vars.len(), 6);
        assert!(vars.contains(&(
            "HTTP_PROXY".to_string(),
            Some("http://proxy.example.org:3128".to_string())
        )));
        assert!(vars.contains(&("https_proxy".to_string(), None)));

        assert!(proxy_variables(None).iter().all(|(_, v)| v.is_none()));
    }

    #[test]
    fn test_render_proxy_environment() {
        assert_eq!(
            render_proxy_environment(Some(&proxy())).as_deref(),
            Some(
                "http_proxy=http://proxy.example.org:3128\n\
                 HTTP_PROXY=http://proxy.example.org:3128\n\
                 no_proxy=localhost,.example.org\n\
                 NO_PROXY=localhost,.example.org\n"
            )
        );
        assert_eq!(render_proxy_environment(None), None);
        assert_eq!(render_proxy_environment(Some(&Proxy::default())), None);
    }

    #[tokio::test]
    async fn test_update_writes_file_without_touching_process_env() {
        let dir = tempfile::tempdir().unwrap();
        let env_file = dir.path().join("conf.d/proxy.env");
        let marker = "http://file-only.invalid:3128";
        let cfg = Proxy {
            https_proxy: Some(marker.to_string()),
            ..Default::default()
        };

        update_proxy_environment(Some(&cfg), &env_file).await.unwrap();
        assert_eq!(
            std::fs::read_to_string(&env_file).unwrap(),
            format!("https_proxy={0}\nHTTPS_PROXY={0}\n", marker)
        );
        assert_ne!(std::env::var("https_proxy").ok().as_deref(), Some(marker));
        assert_ne!(std::env::var("HTTPS_PROXY").ok().as_deref(), Some(marker));

        update_proxy_environment(None, &env_file).await.unwrap();
        assert!(!env_file.exists());
        update_proxy_environment(None, &env_file).await.unwrap();
    }
}
