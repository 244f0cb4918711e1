//! Sandbox executor: runs commands through an isolation backend, with a
//! capability probe, idempotent image preparation and an opt-in fallback
//! to direct host execution.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use clawgate_core::NetworkMode;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info, warn};

use crate::direct::{DirectOptions, DirectRunner};
use crate::docker::DockerBackend;

/// Host directory exposed inside the sandbox.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceMount {
    pub host_path: PathBuf,
    #[serde(default = "default_container_path")]
    pub container_path: String,
    #[serde(default)]
    pub read_only: bool,
}

fn default_container_path() -> String {
    "/workspace".to_string()
}

impl WorkspaceMount {
    pub fn read_write(host_path: impl Into<PathBuf>) -> Self {
        Self { host_path: host_path.into(), container_path: default_container_path(), read_only: false }
    }
}

/// Resource and network bounds for one sandboxed execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SandboxConfig {
    /// Image (or other backend-specific reference) to execute in.
    pub execution_ref: String,
    /// Memory ceiling, e.g. "512m".
    pub memory_limit: String,
    /// CPU share in cores.
    pub cpu_limit: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_mount: Option<WorkspaceMount>,
    pub network_mode: NetworkMode,
    pub timeout_ms: u64,
    pub max_output_bytes: usize,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            execution_ref: "clawgate-sandbox:latest".to_string(),
            memory_limit: "512m".to_string(),
            cpu_limit: 0.5,
            workspace_mount: None,
            network_mode: NetworkMode::None,
            timeout_ms: 60_000,
            max_output_bytes: 200_000,
        }
    }
}

impl SandboxConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Outcome of a sandboxed (or fallback) execution. Failures are values,
/// never errors, so callers can narrate them to the user.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SandboxResult {
    pub success: bool,
    /// Captured stdout then stderr; partial on failure.
    pub output: String,
    pub exit_code: i32,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub timed_out: bool,
    /// False when the command ran directly on the host.
    #[serde(default)]
    pub isolated: bool,
    pub backend: String,
}

impl SandboxResult {
    /// A failure that happened before anything was executed.
    pub fn failure(backend: &str, error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: String::new(),
            exit_code: -1,
            duration_ms: 0,
            error: Some(error.into()),
            timed_out: false,
            isolated: false,
            backend: backend.to_string(),
        }
    }
}

/// An isolation mechanism able to run a shell command under a
/// [`SandboxConfig`].
#[async_trait]
pub trait IsolationBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether the backend can be used on this host right now.
    async fn is_available(&self) -> bool;

    /// Make `execution_ref` ready for use (e.g. pull an image).
    async fn prepare(&self, execution_ref: &str) -> Result<()>;

    async fn run(&self, command: &str, config: &SandboxConfig) -> SandboxResult;
}

pub struct SandboxExecutor {
    backend: Arc<dyn IsolationBackend>,
    direct: DirectRunner,
    allow_fallback: bool,
    available: OnceCell<bool>,
    prepared: Mutex<HashSet<String>>,
}

impl SandboxExecutor {
    pub fn new(backend: Arc<dyn IsolationBackend>, allow_fallback: bool) -> Self {
        Self {
            backend,
            direct: DirectRunner::new(),
            allow_fallback,
            available: OnceCell::new(),
            prepared: Mutex::new(HashSet::new()),
        }
    }

    /// Executor backed by the local docker CLI.
    pub fn docker(allow_fallback: bool, pull_missing_image: bool) -> Self {
        Self::new(Arc::new(DockerBackend::new(pull_missing_image)), allow_fallback)
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Capability probe; the first answer is cached for the executor's lifetime.
    pub async fn is_available(&self) -> bool {
        *self
            .available
            .get_or_init(|| async {
                let ok = self.backend.is_available().await;
                info!(backend = self.backend.name(), available = ok, "Probed isolation backend");
                ok
            })
            .await
    }

    /// Prepare the execution environment once per reference. Repeated calls
    /// after a success are no-ops.
    pub async fn ensure_available(&self, execution_ref: &str) -> Result<()> {
        let mut prepared = self.prepared.lock().await;
        if prepared.contains(execution_ref) {
            return Ok(());
        }
        self.backend.prepare(execution_ref).await?;
        prepared.insert(execution_ref.to_string());
        debug!(backend = self.backend.name(), execution_ref, "Execution environment prepared");
        Ok(())
    }

    /// Run `command` in isolation. Never returns an error: every failure is
    /// reported as `success == false`.
    pub async fn run_in_sandbox(&self, command: &str, config: &SandboxConfig) -> SandboxResult {
        if command.trim().is_empty() {
            return SandboxResult::failure(self.backend.name(), "empty command");
        }

        if !self.is_available().await {
            if !self.allow_fallback {
                return SandboxResult::failure(
                    self.backend.name(),
                    format!("isolation backend '{}' is unavailable", self.backend.name()),
                );
            }
            warn!(
                backend = self.backend.name(),
                "Isolation backend unavailable; running command directly on the host"
            );
            let opts = DirectOptions {
                cwd: config.workspace_mount.as_ref().map(|m| m.host_path.clone()),
                timeout: config.timeout(),
                max_output_bytes: config.max_output_bytes,
                env: Vec::new(),
            };
            return self.direct.run(command, &opts).await;
        }

        if let Err(e) = self.ensure_available(&config.execution_ref).await {
            return SandboxResult::failure(
                self.backend.name(),
                format!("failed to prepare '{}': {e:#}", config.execution_ref),
            );
        }

        self.backend.run(command, config).await
    }

    /// Plain subprocess execution for commands that need no isolation.
    pub async fn run_direct(&self, command: &str, opts: &DirectOptions) -> SandboxResult {
        self.direct.run(command, opts).await
    }
}
