//! Child-process capture shared by the direct and docker backends:
//! bounded output buffers, wall-clock timeout, forced kill.

use std::future::Future;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::debug;

/// How long to keep draining pipes after the child has been killed.
const PIPE_GRACE: Duration = Duration::from_millis(500);

pub(crate) struct Captured {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub timed_out: bool,
    pub truncated: bool,
    pub duration: Duration,
}

impl Captured {
    /// stdout followed by stderr, with a marker when output was capped.
    pub fn combined_output(&self) -> String {
        let mut out = self.stdout.clone();
        if !self.stderr.is_empty() {
            if !out.is_empty() && !out.ends_with('\n') {
                out.push('\n');
            }
            out.push_str(&self.stderr);
        }
        if self.truncated {
            out.push_str("\n[output truncated]");
        }
        out
    }
}

/// Spawn `cmd`, capture up to `max_output_bytes` of each stream, and enforce
/// `timeout`. On timeout `on_timeout` runs with the child's pid before the
/// child itself is killed, so backends can tear down whatever the child
/// started (a container, a process group).
pub(crate) async fn run_captured<F, Fut>(
    mut cmd: Command,
    timeout: Duration,
    max_output_bytes: usize,
    on_timeout: F,
) -> std::io::Result<Captured>
where
    F: FnOnce(Option<u32>) -> Fut,
    Fut: Future<Output = ()>,
{
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let started = Instant::now();
    let mut child = cmd.spawn()?;
    let pid = child.id();

    let stdout_buf = Arc::new(Mutex::new(Vec::new()));
    let stderr_buf = Arc::new(Mutex::new(Vec::new()));
    let readers = [
        child
            .stdout
            .take()
            .map(|p| tokio::spawn(drain(p, Arc::clone(&stdout_buf), max_output_bytes))),
        child
            .stderr
            .take()
            .map(|p| tokio::spawn(drain(p, Arc::clone(&stderr_buf), max_output_bytes))),
    ];

    let (exit_code, timed_out) = match tokio::time::timeout(timeout, child.wait()).await {
        Ok(Ok(status)) => (status.code().unwrap_or(-1), false),
        Ok(Err(e)) => return Err(e),
        Err(_) => {
            debug!(?pid, timeout_ms = timeout.as_millis() as u64, "Child exceeded timeout; killing");
            on_timeout(pid).await;
            let _ = child.kill().await;
            (-1, true)
        }
    };

    for reader in readers.into_iter().flatten() {
        let mut reader = reader;
        if tokio::time::timeout(PIPE_GRACE, &mut reader).await.is_err() {
            reader.abort();
        }
    }

    let (stdout, out_truncated) = take_buffer(&stdout_buf, max_output_bytes);
    let (stderr, err_truncated) = take_buffer(&stderr_buf, max_output_bytes);

    Ok(Captured {
        stdout,
        stderr,
        exit_code,
        timed_out,
        truncated: out_truncated || err_truncated,
        duration: started.elapsed(),
    })
}

/// Reads a pipe to EOF, keeping at most `cap + 1` bytes so truncation is
/// detectable without buffering unbounded output.
async fn drain<R: AsyncRead + Unpin>(mut pipe: R, buf: Arc<Mutex<Vec<u8>>>, cap: usize) {
    let mut chunk = [0u8; 8192];
    loop {
        match pipe.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let mut b = buf.lock().unwrap_or_else(|e| e.into_inner());
                let room = (cap + 1).saturating_sub(b.len());
                b.extend_from_slice(&chunk[..n.min(room)]);
            }
        }
    }
}

fn take_buffer(buf: &Arc<Mutex<Vec<u8>>>, cap: usize) -> (String, bool) {
    let mut b = buf.lock().unwrap_or_else(|e| e.into_inner());
    let truncated = b.len() > cap;
    b.truncate(cap);
    (String::from_utf8_lossy(&b).into_owned(), truncated)
}
