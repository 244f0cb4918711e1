//! Direct host execution: `sh -c` in its own process group, for commands
//! that were cleared to run unisolated (or as the sandbox fallback).

use std::path::PathBuf;
use std::time::Duration;

use tokio::process::Command;
use tracing::{info, warn};

use crate::executor::SandboxResult;
use crate::process::run_captured;

const BACKEND: &str = "direct";

#[derive(Debug, Clone)]
pub struct DirectOptions {
    pub cwd: Option<PathBuf>,
    pub timeout: Duration,
    pub max_output_bytes: usize,
    pub env: Vec<(String, String)>,
}

impl Default for DirectOptions {
    fn default() -> Self {
        Self {
            cwd: None,
            timeout: Duration::from_secs(120),
            max_output_bytes: 200_000,
            env: vec![],
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DirectRunner;

impl DirectRunner {
    pub fn new() -> Self {
        Self
    }

    pub async fn run(&self, command: &str, opts: &DirectOptions) -> SandboxResult {
        if command.trim().is_empty() {
            return SandboxResult::failure(BACKEND, "empty command");
        }
        info!("[DirectExec] Running: {:?}", preview(command));

        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command);
        if let Some(cwd) = &opts.cwd {
            cmd.current_dir(cwd);
        }
        for (k, v) in &opts.env {
            cmd.env(k, v);
        }
        own_process_group(&mut cmd);

        let captured = run_captured(cmd, opts.timeout, opts.max_output_bytes, kill_process_group).await;

        match captured {
            Ok(c) => {
                let output = c.combined_output();
                let error = if c.timed_out {
                    Some(format!("timed out after {} ms", opts.timeout.as_millis()))
                } else if c.exit_code != 0 {
                    Some(format!("command exited with code {}", c.exit_code))
                } else {
                    None
                };
                SandboxResult {
                    success: !c.timed_out && c.exit_code == 0,
                    output,
                    exit_code: c.exit_code,
                    duration_ms: c.duration.as_millis() as u64,
                    error,
                    timed_out: c.timed_out,
                    isolated: false,
                    backend: BACKEND.to_string(),
                }
            }
            Err(e) => {
                warn!(error = %e, "[DirectExec] Failed to spawn shell");
                SandboxResult::failure(BACKEND, format!("failed to spawn: {e}"))
            }
        }
    }
}

#[cfg(unix)]
fn own_process_group(cmd: &mut Command) {
    cmd.process_group(0);
}

#[cfg(not(unix))]
fn own_process_group(_cmd: &mut Command) {}

/// The child leads its own group (pgid == pid), so signalling `-pid`
/// reaches grandchildren that would otherwise hold the output pipes open.
async fn kill_process_group(pid: Option<u32>) {
    let Some(pid) = pid else { return };
    if cfg!(unix) {
        let _ = Command::new("kill")
            .args(["-KILL", "--", &format!("-{pid}")])
            .output()
            .await;
    }
}

fn preview(command: &str) -> &str {
    match command.char_indices().nth(80) {
        Some((idx, _)) => &command[..idx],
        None => command,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn successful_command() {
        let result = DirectRunner::new().run("echo hello", &DirectOptions::default()).await;
        assert!(result.success);
        assert_eq!(result.exit_code, 0);
        assert_eq!(result.output.trim(), "hello");
        assert!(!result.isolated);
    }

    #[tokio::test]
    async fn non_zero_exit_is_failure_with_output() {
        let result = DirectRunner::new().run("echo partial; exit 2", &DirectOptions::default()).await;
        assert!(!result.success);
        assert_eq!(result.exit_code, 2);
        assert!(result.output.contains("partial"));
        assert!(result.error.unwrap().contains("code 2"));
    }

    #[tokio::test]
    async fn long_running_command_times_out_near_the_bound() {
        let opts = DirectOptions { timeout: Duration::from_millis(300), ..Default::default() };
        let started = std::time::Instant::now();
        let result = DirectRunner::new().run("echo started; sleep 10; echo never", &opts).await;
        let elapsed = started.elapsed();

        assert!(!result.success);
        assert!(result.timed_out);
        assert!(result.error.as_deref().unwrap_or_default().contains("timed out"));
        assert!(result.output.contains("started"));
        assert!(!result.output.contains("never"));
        assert!(elapsed < Duration::from_secs(3), "took {elapsed:?}");
    }

    #[tokio::test]
    async fn respects_cwd() {
        let dir = std::env::temp_dir();
        let opts = DirectOptions { cwd: Some(dir.clone()), ..Default::default() };
        let result = DirectRunner::new().run("pwd", &opts).await;
        assert!(result.success);
        let reported = std::fs::canonicalize(result.output.trim()).unwrap();
        assert_eq!(reported, std::fs::canonicalize(dir).unwrap());
    }
}
