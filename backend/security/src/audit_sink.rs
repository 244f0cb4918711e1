//! Audit sinks: where chained audit records are persisted.
//!
//! Records are JSON lines grouped by UTC date. The sink never computes or
//! alters checksums; that is the trail's job.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info};

use crate::audit::AuditEvent;

/// Append-only storage for audit records.
pub trait AuditSink: Send + Sync {
    /// Append one serialized record to the log for `date`.
    fn append(&self, date: NaiveDate, line: &str) -> Result<()>;

    /// Delete whole logs dated strictly before `cutoff`. Returns how many
    /// logs were removed.
    fn prune_before(&self, cutoff: NaiveDate) -> Result<usize>;

    /// Every retained record, oldest first.
    fn read_all(&self) -> Result<Vec<AuditEvent>>;

    /// Checksum of the newest retained record, if any.
    fn last_checksum(&self) -> Result<Option<String>> {
        Ok(self.read_all()?.last().map(|e| e.checksum.clone()))
    }
}

// ---------------------------------------------------------------------------
// File sink
// ---------------------------------------------------------------------------

/// Daily `audit-YYYY-MM-DD.jsonl` files in one owner-only directory.
pub struct FileAuditSink {
    dir: PathBuf,
}

impl FileAuditSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn file_for(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(format!("audit-{}.jsonl", date.format("%Y-%m-%d")))
    }

    /// Existing log files with their dates, oldest first.
    pub fn log_files(&self) -> Result<Vec<(NaiveDate, PathBuf)>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.dir)
            .with_context(|| format!("Failed to list audit dir: {}", self.dir.display()))?
        {
            let path = entry?.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else { continue };
            let Some(date) = name
                .strip_prefix("audit-")
                .and_then(|n| n.strip_suffix(".jsonl"))
                .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
            else {
                continue;
            };
            files.push((date, path));
        }
        files.sort_by_key(|(date, _)| *date);
        Ok(files)
    }

    fn ensure_dir(&self) -> Result<()> {
        if self.dir.exists() {
            return Ok(());
        }
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create audit dir: {}", self.dir.display()))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.dir, fs::Permissions::from_mode(0o700))?;
        }
        Ok(())
    }
}

fn parse_lines(path: &Path, raw: &str) -> Result<Vec<AuditEvent>> {
    raw.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line)
                .with_context(|| format!("Malformed audit record at {}:{}", path.display(), i + 1))
        })
        .collect()
}

impl AuditSink for FileAuditSink {
    fn append(&self, date: NaiveDate, line: &str) -> Result<()> {
        self.ensure_dir()?;
        let path = self.file_for(date);
        let mut opts = OpenOptions::new();
        opts.create(true).append(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            opts.mode(0o600);
        }
        let mut file = opts
            .open(&path)
            .with_context(|| format!("Failed to open audit log: {}", path.display()))?;
        // One write per record so a record is never split across appends.
        let mut buf = String::with_capacity(line.len() + 1);
        buf.push_str(line);
        buf.push('\n');
        file.write_all(buf.as_bytes())
            .with_context(|| format!("Failed to append audit log: {}", path.display()))?;
        Ok(())
    }

    fn prune_before(&self, cutoff: NaiveDate) -> Result<usize> {
        let mut removed = 0;
        for (date, path) in self.log_files()? {
            if date < cutoff {
                fs::remove_file(&path)
                    .with_context(|| format!("Failed to delete audit log: {}", path.display()))?;
                debug!(path = %path.display(), "Deleted expired audit log");
                removed += 1;
            }
        }
        if removed > 0 {
            info!(removed, cutoff = %cutoff, "Audit retention sweep");
        }
        Ok(removed)
    }

    fn read_all(&self) -> Result<Vec<AuditEvent>> {
        let mut events = Vec::new();
        for (_, path) in self.log_files()? {
            let raw = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read audit log: {}", path.display()))?;
            events.extend(parse_lines(&path, &raw)?);
        }
        Ok(events)
    }

    fn last_checksum(&self) -> Result<Option<String>> {
        for (_, path) in self.log_files()?.into_iter().rev() {
            let raw = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read audit log: {}", path.display()))?;
            if let Some(line) = raw.lines().rev().find(|l| !l.trim().is_empty()) {
                let event: AuditEvent = serde_json::from_str(line)
                    .with_context(|| format!("Malformed last audit record in {}", path.display()))?;
                return Ok(Some(event.checksum));
            }
        }
        Ok(None)
    }
}

// ---------------------------------------------------------------------------
// Memory sink
// ---------------------------------------------------------------------------

/// In-process sink, for tests and embedders that ship records elsewhere.
#[derive(Default)]
pub struct MemoryAuditSink {
    lines: Mutex<Vec<(NaiveDate, String)>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw stored lines, oldest first.
    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(_, l)| l.clone())
            .collect()
    }
}

impl AuditSink for MemoryAuditSink {
    fn append(&self, date: NaiveDate, line: &str) -> Result<()> {
        self.lines
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((date, line.to_string()));
        Ok(())
    }

    fn prune_before(&self, cutoff: NaiveDate) -> Result<usize> {
        let mut lines = self.lines.lock().unwrap_or_else(|e| e.into_inner());
        let before = lines.len();
        lines.retain(|(date, _)| *date >= cutoff);
        Ok(before - lines.len())
    }

    fn read_all(&self) -> Result<Vec<AuditEvent>> {
        self.lines()
            .iter()
            .map(|l| serde_json::from_str(l).context("Malformed in-memory audit record"))
            .collect()
    }
}
