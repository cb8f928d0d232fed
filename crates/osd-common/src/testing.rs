//! Scripted command runner for tests.
//!
//! [`ScriptedRunner`] records every command line it is asked to run and
//! answers from a table of prefix rules. Each rule holds a queue of
//! responses; the last response of a queue repeats forever, so a single
//! `on(...)` call scripts a steady state and several calls script a
//! sequence. Commands that match no rule succeed with empty output.
//! A hanging rule never answers and only returns once cancelled.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::{OsdError, OsdResult};
use crate::shell::{command_line, CommandRunner, ExecResult};

#[derive(Debug, Clone)]
enum Response {
    Exec(ExecResult),
    SpawnError,
    Hang,
}

#[derive(Debug)]
struct Rule {
    prefix: String,
    responses: VecDeque<Response>,
}

/// A [`CommandRunner`] that replays canned results.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `result` for commands whose rendered line starts with `prefix`.
    pub fn on(&self, prefix: &str, result: ExecResult) -> &Self {
        self.push(prefix, Response::Exec(result));
        self
    }

    /// Makes commands starting with `prefix` fail to spawn.
    pub fn fail_spawn(&self, prefix: &str) -> &Self {
        self.push(prefix, Response::SpawnError);
        self
    }

    /// Makes commands starting with `prefix` block until cancelled.
    pub fn hang(&self, prefix: &str) -> &Self {
        self.push(prefix, Response::Hang);
        self
    }

    fn push(&self, prefix: &str, response: Response) {
        let mut rules = self.rules.lock().unwrap_or_else(|e| e.into_inner());
        match rules.iter_mut().find(|r| r.prefix == prefix) {
            Some(rule) => rule.responses.push_back(response),
            None => rules.push(Rule {
                prefix: prefix.to_string(),
                responses: VecDeque::from([response]),
            }),
        }
    }

    /// Returns every command line run so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Returns the command lines starting with `prefix`.
    pub fn calls_matching(&self, prefix: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.starts_with(prefix))
            .collect()
    }

    fn respond(&self, line: &str) -> Response {
        let mut rules = self.rules.lock().unwrap_or_else(|e| e.into_inner());
        // Longest prefix wins so specific rules can override broad ones.
        let rule = rules
            .iter_mut()
            .filter(|r| line.starts_with(&r.prefix))
            .max_by_key(|r| r.prefix.len());

        match rule {
            Some(rule) if rule.responses.len() > 1 => rule
                .responses
                .pop_front()
                .unwrap_or(Response::Exec(ExecResult::ok(""))),
            Some(rule) => rule
                .responses
                .front()
                .cloned()
                .unwrap_or(Response::Exec(ExecResult::ok(""))),
            None => Response::Exec(ExecResult::ok("")),
        }
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(
        &self,
        cancel: &CancellationToken,
        program: &str,
        args: &[&str],
    ) -> OsdResult<ExecResult> {
        let line = command_line(program, args);
        if cancel.is_cancelled() {
            return Err(OsdError::Cancelled { command: line });
        }

        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(line.clone());

        match self.respond(&line) {
            Response::Exec(result) => Ok(result),
            Response::SpawnError => Err(OsdError::ShellExec {
                command: line,
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "scripted spawn failure"),
            }),
            Response::Hang => {
                cancel.cancelled().await;
                Err(OsdError::Cancelled { command: line })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_unmatched_commands_succeed() {
        let runner = ScriptedRunner::new();
        let cancel = CancellationToken::new();
        let result = runner.run(&cancel, "udevadm", &["settle"]).await.unwrap();
        assert!(result.success());
        assert_eq!(runner.calls(), vec!["udevadm settle".to_string()]);
    }

    #[tokio::test]
    async fn test_sequence_then_sticky_last() {
        let runner = ScriptedRunner::new();
        runner
            .on("journalctl", ExecResult::failed(1, ""))
            .on("journalctl", ExecResult::ok("renamed"));
        let cancel = CancellationToken::new();

        let first = runner.run(&cancel, "journalctl", &["-b"]).await.unwrap();
        let second = runner.run(&cancel, "journalctl", &["-b"]).await.unwrap();
        let third = runner.run(&cancel, "journalctl", &["-b"]).await.unwrap();
        assert!(!first.success());
        assert!(second.success());
        assert!(third.success());
    }

    #[tokio::test]
    async fn test_longest_prefix_wins() {
        let runner = ScriptedRunner::new();
        runner
            .on("networkctl", ExecResult::failed(1, "no"))
            .on("networkctl status eth0", ExecResult::ok("Online state: online"));
        let cancel = CancellationToken::new();

        let eth0 = runner
            .run(&cancel, "networkctl", &["status", "eth0"])
            .await
            .unwrap();
        let eth1 = runner
            .run(&cancel, "networkctl", &["status", "eth1"])
            .await
            .unwrap();
        assert!(eth0.success());
        assert!(!eth1.success());
    }

    #[tokio::test]
    async fn test_spawn_failure() {
        let runner = ScriptedRunner::new();
        runner.fail_spawn("systemctl");
        let cancel = CancellationToken::new();
        let result = runner.run(&cancel, "systemctl", &["restart", "x"]).await;
        assert!(matches!(result, Err(OsdError::ShellExec { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hang_until_cancelled() {
        let runner = ScriptedRunner::new();
        runner.hang("udevadm settle");
        let cancel = CancellationToken::new();

        let blocked = tokio::time::timeout(
            Duration::from_secs(60),
            runner.run(&cancel, "udevadm", &["settle"]),
        )
        .await;
        assert!(blocked.is_err());

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });
        let result = runner.run(&cancel, "udevadm", &["settle"]).await;
        assert!(matches!(result, Err(OsdError::Cancelled { .. })));
        assert_eq!(runner.calls_matching("udevadm settle").len(), 2);
    }
}
