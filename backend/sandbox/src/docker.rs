//! Docker isolation backend: one ephemeral `docker run --rm` container per
//! command, bounded by memory, CPU, pids and network mode.

use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::executor::{IsolationBackend, SandboxConfig, SandboxResult};
use crate::process::run_captured;

const BACKEND: &str = "docker";
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);
const PIDS_LIMIT: u32 = 256;

/// Exit status docker itself uses when the container could not be created.
const EXIT_CREATE_FAILED: i32 = 125;
/// SIGKILL from the kernel, typically the OOM killer enforcing `--memory`.
const EXIT_KILLED: i32 = 137;

pub struct DockerBackend {
    binary: String,
    pull_missing_image: bool,
}

impl DockerBackend {
    pub fn new(pull_missing_image: bool) -> Self {
        Self { binary: "docker".to_string(), pull_missing_image }
    }

    /// Use a docker-compatible CLI other than `docker` (e.g. `podman`).
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    async fn docker_ok(&self, args: &[&str]) -> bool {
        let fut = Command::new(&self.binary).args(args).output();
        match tokio::time::timeout(PROBE_TIMEOUT, fut).await {
            Ok(Ok(output)) => output.status.success(),
            _ => false,
        }
    }
}

/// Build the full `docker run` argument list (without the binary).
pub fn build_run_args(container_name: &str, command: &str, config: &SandboxConfig) -> Vec<String> {
    let mut args = vec![
        "run".to_string(),
        "--rm".to_string(),
        "--name".to_string(),
        container_name.to_string(),
        "--network".to_string(),
        config.network_mode.docker_arg().to_string(),
        "--memory".to_string(),
        config.memory_limit.clone(),
        // No extra swap beyond the memory ceiling.
        "--memory-swap".to_string(),
        config.memory_limit.clone(),
        "--cpus".to_string(),
        format!("{}", config.cpu_limit),
        "--pids-limit".to_string(),
        PIDS_LIMIT.to_string(),
        "--cap-drop".to_string(),
        "ALL".to_string(),
        "--security-opt".to_string(),
        "no-new-privileges".to_string(),
    ];

    if let Some(mount) = &config.workspace_mount {
        let mode = if mount.read_only { "ro" } else { "rw" };
        args.push("-v".to_string());
        args.push(format!("{}:{}:{mode}", mount.host_path.display(), mount.container_path));
        args.push("-w".to_string());
        args.push(mount.container_path.clone());
    }

    args.push(config.execution_ref.clone());
    args.push("sh".to_string());
    args.push("-c".to_string());
    args.push(command.to_string());
    args
}

#[async_trait]
impl IsolationBackend for DockerBackend {
    fn name(&self) -> &'static str {
        BACKEND
    }

    async fn is_available(&self) -> bool {
        self.docker_ok(&["version", "--format", "{{.Server.Version}}"]).await
    }

    async fn prepare(&self, execution_ref: &str) -> Result<()> {
        if self.docker_ok(&["image", "inspect", execution_ref]).await {
            return Ok(());
        }
        if !self.pull_missing_image {
            bail!("image '{execution_ref}' is not present and pulling is disabled");
        }
        info!(image = %execution_ref, "Pulling sandbox image");
        let output = Command::new(&self.binary)
            .args(["pull", execution_ref])
            .output()
            .await
            .context("Failed to run docker pull")?;
        if !output.status.success() {
            bail!("docker pull failed: {}", String::from_utf8_lossy(&output.stderr).trim());
        }
        Ok(())
    }

    async fn run(&self, command: &str, config: &SandboxConfig) -> SandboxResult {
        let container_name = format!("clawgate-sbx-{}", Uuid::new_v4().simple());
        let args = build_run_args(&container_name, command, config);
        debug!(container = %container_name, image = %config.execution_ref, "Starting sandbox container");

        let mut cmd = Command::new(&self.binary);
        cmd.args(&args);

        let binary = self.binary.clone();
        let name = container_name.clone();
        let captured = run_captured(cmd, config.timeout(), config.max_output_bytes, |_| async move {
            warn!(container = %name, "Sandbox timeout; killing container");
            let _ = Command::new(&binary).args(["kill", &name]).output().await;
        })
        .await;

        let c = match captured {
            Ok(c) => c,
            Err(e) => {
                return SandboxResult::failure(BACKEND, format!("failed to launch docker: {e}"));
            }
        };

        if c.timed_out {
            // --rm does not always fire when the client is killed first.
            let _ = Command::new(&self.binary)
                .args(["rm", "-f", &container_name])
                .output()
                .await;
        }

        let error = if c.timed_out {
            Some(format!("timed out after {} ms", config.timeout_ms))
        } else {
            match c.exit_code {
                0 => None,
                EXIT_CREATE_FAILED => Some(format!(
                    "failed to create sandbox container: {}",
                    c.stderr.trim()
                )),
                EXIT_KILLED => Some("killed by resource limit (exit 137)".to_string()),
                code => Some(format!("command exited with code {code}")),
            }
        };

        SandboxResult {
            success: error.is_none(),
            output: c.combined_output(),
            exit_code: c.exit_code,
            duration_ms: c.duration.as_millis() as u64,
            error,
            timed_out: c.timed_out,
            isolated: true,
            backend: BACKEND.to_string(),
        }
    }
}
