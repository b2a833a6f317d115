//! Subagent runner: executes delegate directives as shell commands.
//!
//! Each subagent maps to a command template in the config. The command gets
//! the directive as JSON on stdin, the context payload path in
//! `GATEHOUSE_CONTEXT_PATH`, and reports through the exit-code protocol:
//! 0 with the verdict text on stdout, 2 to block with stderr as the reason,
//! anything else warns. The directive timeout bounds the wait.

use std::collections::BTreeMap;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::config::GateConfig;
use crate::error::RunnerError;
use crate::response::DelegateDirective;

pub struct SubagentRunner {
    commands: BTreeMap<String, String>,
}

impl SubagentRunner {
    pub fn new(config: &GateConfig) -> Self {
        SubagentRunner {
            commands: config.subagents.clone(),
        }
    }

    /// Command template configured for a subagent, if any.
    pub fn command_for(&self, subagent: &str) -> Option<&str> {
        self.commands.get(subagent).map(String::as_str)
    }

    /// Execute the directive and return the subagent's verdict text.
    pub async fn run(&self, directive: &DelegateDirective) -> Result<String, RunnerError> {
        let Some(command) = self.command_for(&directive.subagent) else {
            return Err(RunnerError::NoCommand(directive.subagent.clone()));
        };
        tracing::debug!(
            subagent = %directive.subagent,
            command,
            timeout_secs = directive.timeout_secs,
            "running subagent"
        );

        let input = serde_json::json!({
            "subagent": directive.subagent,
            "context_path": directive.context_path,
        });

        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(command)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(path) = &directive.context_path {
            cmd.env("GATEHOUSE_CONTEXT_PATH", path);
        }
        let mut child = cmd.spawn().map_err(RunnerError::Spawn)?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(input.to_string().as_bytes()).await?;
            // Dropping stdin closes it so the child sees EOF
        }

        let output = tokio::time::timeout(
            Duration::from_secs(directive.timeout_secs),
            child.wait_with_output(),
        )
        .await
        .map_err(|_| RunnerError::Timeout(directive.timeout_secs))??;

        let exit_code = output.status.code().unwrap_or(-1);
        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        tracing::debug!(
            subagent = %directive.subagent,
            exit_code,
            stdout_len = stdout.len(),
            "subagent finished"
        );

        Ok(match exit_code {
            0 => stdout,
            2 => format!("BLOCK: {}", fallback(stderr, "subagent blocked")),
            _ => format!(
                "WARN: {}",
                fallback(stderr, &format!("subagent exited with code {exit_code}"))
            ),
        })
    }
}

fn fallback(text: String, default: &str) -> String {
    if text.is_empty() {
        default.to_string()
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verdict::{parse_subagent_verdict, DelegateMode, Verdict};

    fn runner_with(subagent: &str, command: &str) -> SubagentRunner {
        let mut config = GateConfig::default();
        config
            .subagents
            .insert(subagent.to_string(), command.to_string());
        SubagentRunner::new(&config)
    }

    fn directive(subagent: &str, timeout_secs: u64) -> DelegateDirective {
        DelegateDirective {
            subagent: subagent.to_string(),
            context_path: None,
            mode: DelegateMode::Sync,
            timeout_secs,
        }
    }

    #[tokio::test]
    async fn stdout_of_a_clean_exit_is_the_verdict_text() {
        let runner = runner_with("probe", "echo APPROVED");
        let text = runner.run(&directive("probe", 10)).await.unwrap();
        assert_eq!(text, "APPROVED");
        assert_eq!(parse_subagent_verdict(&text), Verdict::Allow);
    }

    #[tokio::test]
    async fn exit_two_blocks_with_stderr_as_reason() {
        let runner = runner_with("probe", "echo 'context drift' >&2; exit 2");
        let text = runner.run(&directive("probe", 10)).await.unwrap();
        assert_eq!(
            parse_subagent_verdict(&text),
            Verdict::Block("context drift".to_string())
        );
    }

    #[tokio::test]
    async fn other_exit_codes_warn() {
        let runner = runner_with("probe", "exit 3");
        let text = runner.run(&directive("probe", 10)).await.unwrap();
        assert!(matches!(parse_subagent_verdict(&text), Verdict::Warn(_)));
    }

    #[tokio::test]
    async fn directive_json_arrives_on_stdin() {
        let runner = runner_with("probe", "cat");
        let text = runner.run(&directive("probe", 10)).await.unwrap();
        assert!(text.contains("\"subagent\":\"probe\""));
    }

    #[tokio::test]
    async fn slow_subagents_time_out() {
        let runner = runner_with("probe", "sleep 5");
        let err = runner.run(&directive("probe", 1)).await.unwrap_err();
        assert!(matches!(err, RunnerError::Timeout(1)));
    }

    #[tokio::test]
    async fn unconfigured_subagent_is_an_error() {
        let runner = SubagentRunner::new(&GateConfig::default());
        let err = runner.run(&directive("nobody", 10)).await.unwrap_err();
        assert!(matches!(err, RunnerError::NoCommand(name) if name == "nobody"));
    }
}
