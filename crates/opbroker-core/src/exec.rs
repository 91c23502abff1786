//! Subprocess egress: run a command with resolved secrets in its
//! environment.
//!
//! The command is a literal argv vector and is never passed through a
//! shell, so secret content cannot become shell injection. The child
//! inherits the broker's environment with the injected names merged in,
//! and is killed and reaped if it outlives the wall-clock budget.

use serde::{Deserialize, Serialize};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::backend::VaultBackend;
use crate::error::BrokerError;
use crate::resolve::{self, DEFAULT_INTENT};

/// Default wall-clock limit for the child process, in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// One secret to inject: the item to resolve and the environment
/// variable that receives the value.
#[derive(Debug, Clone, Deserialize)]
pub struct EnvSecretSpec {
    pub item: String,
    pub env: String,
    #[serde(default)]
    pub intent: Option<String>,
}

/// Outcome of a subprocess egress call. Carries the injected variable
/// names, never the values.
#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub secrets_injected: Vec<String>,
    pub timed_out: bool,
}

pub async fn run_with_secrets(
    backend: &dyn VaultBackend,
    command: &[String],
    specs: &[EnvSecretSpec],
    vault: &str,
    working_dir: Option<&str>,
    timeout_secs: u64,
) -> Result<RunResult, BrokerError> {
    if command.is_empty() {
        return Err(BrokerError::Validation(
            "command must not be empty".to_string(),
        ));
    }

    // Resolve everything up front: a failed spec aborts before any
    // process is spawned, so no child ever starts with a partial set.
    let mut injected = Vec::with_capacity(specs.len());
    for spec in specs {
        let intent = spec.intent.as_deref().unwrap_or(DEFAULT_INTENT);
        let secret = resolve::resolve(backend, &spec.item, intent, vault).await?;
        injected.push((spec.env.clone(), secret.value));
    }
    let names: Vec<String> = injected.iter().map(|(name, _)| name.clone()).collect();

    let mut cmd = Command::new(&command[0]);
    cmd.args(&command[1..])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    for (name, value) in &injected {
        cmd.env(name, value);
    }
    if let Some(dir) = working_dir {
        cmd.current_dir(dir);
    }

    debug!(command = %command[0], injected = names.len(), "spawning child");

    let mut child = cmd
        .spawn()
        .map_err(|e| BrokerError::Execution(e.to_string()))?;

    // Drain the pipes concurrently with the wait so a chatty child
    // cannot deadlock against a full pipe buffer.
    let mut stdout_pipe = child.stdout.take();
    let mut stderr_pipe = child.stderr.take();
    let stdout_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(pipe) = stdout_pipe.as_mut() {
            let _ = pipe.read_to_end(&mut buf).await;
        }
        buf
    });
    let stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(pipe) = stderr_pipe.as_mut() {
            let _ = pipe.read_to_end(&mut buf).await;
        }
        buf
    });

    let waited = timeout(Duration::from_secs(timeout_secs), child.wait()).await;
    match waited {
        Ok(Ok(status)) => {
            let stdout = stdout_task.await.unwrap_or_default();
            let stderr = stderr_task.await.unwrap_or_default();
            Ok(RunResult {
                exit_code: status.code().unwrap_or(-1),
                stdout: String::from_utf8_lossy(&stdout).to_string(),
                stderr: String::from_utf8_lossy(&stderr).to_string(),
                secrets_injected: names,
                timed_out: false,
            })
        }
        Ok(Err(e)) => {
            stdout_task.abort();
            stderr_task.abort();
            Err(BrokerError::Execution(e.to_string()))
        }
        Err(_) => {
            // Deadline passed: kill and reap so no orphan survives the
            // call. No partial output is salvaged.
            warn!(command = %command[0], timeout_secs, "child timed out, killing");
            if let Err(e) = child.kill().await {
                warn!(error = %e, "failed to kill timed-out child");
            }
            stdout_task.abort();
            stderr_task.abort();
            Ok(RunResult {
                exit_code: -1,
                stdout: String::new(),
                stderr: format!("command timed out after {timeout_secs} seconds"),
                secrets_injected: names,
                timed_out: true,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::testing::FakeBackend;
    use std::time::Instant;

    fn spec(item: &str, env: &str) -> EnvSecretSpec {
        EnvSecretSpec {
            item: item.to_string(),
            env: env.to_string(),
            intent: None,
        }
    }

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn injects_resolved_secrets_into_the_environment() {
        let backend = FakeBackend::new().with_secret("AI", "netbox", "password", "netbox-pass");

        let result = run_with_secrets(
            &backend,
            &argv(&["sh", "-c", "printf %s \"$DB_PASS\""]),
            &[spec("netbox", "DB_PASS")],
            "AI",
            None,
            DEFAULT_TIMEOUT_SECS,
        )
        .await
        .unwrap();

        assert_eq!(result.exit_code, 0);
        assert!(result.stdout.contains("netbox-pass"));
        assert_eq!(result.secrets_injected, ["DB_PASS"]);
        assert!(!result.timed_out);
    }

    #[tokio::test]
    async fn result_never_carries_secret_values() {
        let backend = FakeBackend::new().with_secret("AI", "netbox", "password", "netbox-pass");

        let result = run_with_secrets(
            &backend,
            &argv(&["echo", "hello"]),
            &[spec("netbox", "SECRET_VAR")],
            "AI",
            None,
            DEFAULT_TIMEOUT_SECS,
        )
        .await
        .unwrap();

        let rendered = serde_json::to_string(&result).unwrap();
        assert!(!rendered.contains("netbox-pass"));
        assert!(result.secrets_injected.contains(&"SECRET_VAR".to_string()));
    }

    #[tokio::test]
    async fn timeout_kills_the_child_and_reports_it() {
        let backend = FakeBackend::new();
        let started = Instant::now();

        let result = run_with_secrets(&backend, &argv(&["sleep", "10"]), &[], "AI", None, 1)
            .await
            .unwrap();

        assert_eq!(result.exit_code, -1);
        assert!(result.timed_out);
        assert!(result.stdout.is_empty());
        assert!(result.stderr.contains("timed out"));
        // Bounded by the timeout, not by the command's own runtime.
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn resolution_failure_aborts_before_spawn() {
        let backend = FakeBackend::new();

        let err = run_with_secrets(
            &backend,
            &argv(&["echo", "never-runs"]),
            &[spec("missing-item", "DB_PASS")],
            "AI",
            None,
            DEFAULT_TIMEOUT_SECS,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, BrokerError::Resolution { .. }));
    }

    #[tokio::test]
    async fn spawn_failure_is_an_execution_error() {
        let backend = FakeBackend::new();

        let err = run_with_secrets(
            &backend,
            &argv(&["opbroker-test-no-such-binary"]),
            &[],
            "AI",
            None,
            DEFAULT_TIMEOUT_SECS,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, BrokerError::Execution(_)));
    }

    #[tokio::test]
    async fn empty_command_is_rejected() {
        let backend = FakeBackend::new();
        let err = run_with_secrets(&backend, &[], &[], "AI", None, DEFAULT_TIMEOUT_SECS)
            .await
            .unwrap_err();
        assert!(matches!(err, BrokerError::Validation(_)));
    }

    #[tokio::test]
    async fn inherited_environment_is_preserved() {
        let backend = FakeBackend::new();

        // PATH comes from the broker's own environment, untouched by
        // injection.
        let result = run_with_secrets(
            &backend,
            &argv(&["sh", "-c", "printf %s \"$PATH\""]),
            &[],
            "AI",
            None,
            DEFAULT_TIMEOUT_SECS,
        )
        .await
        .unwrap();

        assert_eq!(result.exit_code, 0);
        assert!(!result.stdout.is_empty());
    }
}
