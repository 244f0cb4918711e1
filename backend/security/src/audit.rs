//! Tamper-evident audit trail.
//!
//! Every record carries `checksum = sha256(previousChecksum ‖ body)` where the
//! body is the record serialized without either checksum field. The chain is
//! seeded from the newest stored record on open, so it survives restarts.
//! Records are written synchronously, one line per event, to daily
//! `audit-YYYY-MM-DD.jsonl` files; logs older than the retention window are
//! deleted whole when the date rolls over.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use clawgate_core::{GateError, RequestSource, Severity};
use clawgate_logging::{sanitize_output, REDACTED};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::sync::{LazyLock, Mutex};
use tracing::{error, warn};

use crate::audit_sink::{AuditSink, FileAuditSink};
use crate::classifier::{ClassificationResult, Verdict};

/// Longest string value kept verbatim in audit args.
pub const MAX_ARG_CHARS: usize = 512;

const SENSITIVE_KEYS: &[&str] = &["password", "secret", "token", "key", "credential"];

static URL_USERINFO_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b([a-z][a-z0-9+.\-]*://)[^/@\s]+@").expect("valid userinfo regex")
});

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventKind {
    CommandAllowed,
    CommandBlocked,
    ApprovalRequired,
    Approved,
    Denied,
    ToolExecution,
    FileAccess,
    NetworkEgress,
    PairingRequested,
    PairingApproved,
    AllowlistChanged,
    SandboxFallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditOutcome {
    Success,
    Failure,
    Pending,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: AuditEventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<RequestSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Value>,
    pub result: AuditOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub previous_checksum: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub checksum: String,
}

impl AuditEvent {
    /// Start a record. Timestamp and checksums are stamped by the trail.
    pub fn new(kind: AuditEventKind, result: AuditOutcome) -> Self {
        Self {
            timestamp: Utc::now(),
            kind,
            session_id: None,
            source: None,
            command: None,
            tool: None,
            args: None,
            result,
            severity: None,
            previous_checksum: String::new(),
            checksum: String::new(),
        }
    }

    pub fn scoped(mut self, scope: &AuditScope) -> Self {
        self.session_id = scope.session_id.clone();
        self.source = scope.source;
        self
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    pub fn with_tool(mut self, tool: impl Into<String>) -> Self {
        self.tool = Some(tool.into());
        self
    }

    /// Attach args; they are redacted before being stored.
    pub fn with_args(mut self, args: Value) -> Self {
        self.args = Some(args);
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }

    fn body(&self) -> String {
        let mut body = self.clone();
        body.previous_checksum.clear();
        body.checksum.clear();
        // Serializing plain data with string keys cannot fail.
        serde_json::to_string(&body).unwrap_or_default()
    }
}

/// Session and origin attached to every record a caller emits.
#[derive(Debug, Clone, Default)]
pub struct AuditScope {
    pub session_id: Option<String>,
    pub source: Option<RequestSource>,
}

impl AuditScope {
    pub fn new(session_id: Option<String>, source: RequestSource) -> Self {
        Self { session_id, source: Some(source) }
    }
}

/// `sha256(previous ‖ body)` as lowercase hex.
pub fn compute_checksum(previous: &str, event: &AuditEvent) -> String {
    let mut hasher = Sha256::new();
    hasher.update(previous.as_bytes());
    hasher.update(event.body().as_bytes());
    hex::encode(hasher.finalize())
}

// ---------------------------------------------------------------------------
// Redaction
// ---------------------------------------------------------------------------

/// Remove `user:pass@` (or a bare token user) from URLs.
pub fn strip_url_credentials(text: &str) -> String {
    URL_USERINFO_RE.replace_all(text, "${1}").into_owned()
}

fn is_sensitive_key(key: &str) -> bool {
    let lower = key.to_ascii_lowercase();
    SENSITIVE_KEYS.iter().any(|k| lower.contains(k))
}

fn redact_string(value: &str) -> String {
    let cleaned = strip_url_credentials(&sanitize_output(value));
    let total = cleaned.chars().count();
    if total <= MAX_ARG_CHARS {
        return cleaned;
    }
    let kept: String = cleaned.chars().take(MAX_ARG_CHARS).collect();
    format!("{kept}…[truncated {} chars]", total - MAX_ARG_CHARS)
}

/// Redact tool args before they reach disk.
pub fn redact_args(args: &Value) -> Value {
    match args {
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (k, v) in map {
                let v = if is_sensitive_key(k) {
                    Value::String(REDACTED.to_string())
                } else {
                    redact_args(v)
                };
                out.insert(k.clone(), v);
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(redact_args).collect()),
        Value::String(s) => Value::String(redact_string(s)),
        other => other.clone(),
    }
}

// ---------------------------------------------------------------------------
// Verification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChainIssue {
    /// Stored checksum does not match the record's content.
    ChecksumMismatch { index: usize, expected: String, actual: String },
    /// Record does not point at its predecessor's checksum.
    BrokenLink { index: usize, expected_previous: String, actual_previous: String },
    /// Logs could not be read or parsed.
    Unreadable { message: String },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainVerification {
    pub valid: bool,
    pub records_verified: usize,
    pub issues: Vec<ChainIssue>,
}

impl ChainVerification {
    /// Index of the first record that fails verification.
    pub fn first_divergence(&self) -> Option<usize> {
        self.issues.iter().find_map(|i| match i {
            ChainIssue::ChecksumMismatch { index, .. } | ChainIssue::BrokenLink { index, .. } => {
                Some(*index)
            }
            ChainIssue::Unreadable { .. } => None,
        })
    }
}

/// Replay `records` through the checksum function.
///
/// The first record anchors the chain: after a retention sweep its
/// predecessor is gone, so only its content is checked.
pub fn verify_records(records: &[AuditEvent]) -> ChainVerification {
    let mut issues = Vec::new();
    for (index, record) in records.iter().enumerate() {
        if index > 0 {
            let expected_previous = &records[index - 1].checksum;
            if &record.previous_checksum != expected_previous {
                issues.push(ChainIssue::BrokenLink {
                    index,
                    expected_previous: expected_previous.clone(),
                    actual_previous: record.previous_checksum.clone(),
                });
            }
        }
        let expected = compute_checksum(&record.previous_checksum, record);
        if expected != record.checksum {
            issues.push(ChainIssue::ChecksumMismatch {
                index,
                expected,
                actual: record.checksum.clone(),
            });
        }
    }
    ChainVerification {
        valid: issues.is_empty(),
        records_verified: records.len(),
        issues,
    }
}

// ---------------------------------------------------------------------------
// Trail
// ---------------------------------------------------------------------------

struct ChainState {
    running: String,
    swept_for: Option<NaiveDate>,
}

/// Hash-chained, append-only audit trail.
pub struct AuditTrail {
    sink: Box<dyn AuditSink>,
    retention_days: u32,
    state: Mutex<ChainState>,
}

impl AuditTrail {
    /// File-backed trail in `dir`.
    pub fn open(dir: impl Into<PathBuf>, retention_days: u32) -> Self {
        Self::with_sink(Box::new(FileAuditSink::new(dir)), retention_days)
    }

    pub fn with_sink(sink: Box<dyn AuditSink>, retention_days: u32) -> Self {
        let running = match sink.last_checksum() {
            Ok(last) => last.unwrap_or_default(),
            Err(e) => {
                warn!(error = %e, "Could not read last audit checksum; starting a new chain");
                String::new()
            }
        };
        Self {
            sink,
            retention_days,
            state: Mutex::new(ChainState { running, swept_for: None }),
        }
    }

    /// Checksum of the last record successfully written.
    pub fn running_checksum(&self) -> String {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).running.clone()
    }

    /// Stamp, chain, and persist one record.
    ///
    /// Returns the stored record. A write failure is logged and swallowed;
    /// the chain does not advance past a record that was never stored.
    pub fn log_event(&self, event: AuditEvent) -> Option<AuditEvent> {
        let kind = event.kind;
        match self.try_log_event(event) {
            Ok(stored) => Some(stored),
            Err(e) => {
                error!(error = %e, ?kind, "Failed to write audit record");
                None
            }
        }
    }

    /// As [`AuditTrail::log_event`], for callers that must know the record
    /// landed. Failures are `GateError::AuditWriteFailure`.
    pub fn try_log_event(&self, mut event: AuditEvent) -> Result<AuditEvent, GateError> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        let now = Utc::now();
        let today = now.date_naive();
        if state.swept_for != Some(today) {
            self.sweep(today);
            state.swept_for = Some(today);
        }

        event.timestamp = now;
        event.args = event.args.as_ref().map(redact_args);
        event.command = event.command.as_deref().map(sanitize_output);
        event.previous_checksum = state.running.clone();
        event.checksum = compute_checksum(&event.previous_checksum, &event);

        let line = serde_json::to_string(&event)
            .map_err(|e| GateError::AuditWriteFailure(format!("serialize: {e}")))?;
        self.sink
            .append(today, &line)
            .map_err(|e| GateError::AuditWriteFailure(format!("{e:#}")))?;
        state.running = event.checksum.clone();
        Ok(event)
    }

    fn sweep(&self, today: NaiveDate) {
        let cutoff = today - Duration::days(i64::from(self.retention_days));
        if let Err(e) = self.sink.prune_before(cutoff) {
            warn!(error = %e, "Audit retention sweep failed");
        }
    }

    /// Every retained record, oldest first.
    pub fn records(&self) -> anyhow::Result<Vec<AuditEvent>> {
        self.sink.read_all()
    }

    /// Replay the retained chain.
    pub fn verify(&self) -> ChainVerification {
        match self.sink.read_all() {
            Ok(records) => verify_records(&records),
            Err(e) => ChainVerification {
                valid: false,
                records_verified: 0,
                issues: vec![ChainIssue::Unreadable { message: format!("{e:#}") }],
            },
        }
    }

    // -- typed wrappers ------------------------------------------------------

    pub fn log_command_allowed(&self, scope: &AuditScope, command: &str, reason: &str) {
        self.log_event(
            AuditEvent::new(AuditEventKind::CommandAllowed, AuditOutcome::Success)
                .scoped(scope)
                .with_command(command)
                .with_args(serde_json::json!({ "reason": reason })),
        );
    }

    pub fn log_command_blocked(
        &self,
        scope: &AuditScope,
        command: &str,
        reason: &str,
        severity: Severity,
    ) {
        self.log_event(
            AuditEvent::new(AuditEventKind::CommandBlocked, AuditOutcome::Failure)
                .scoped(scope)
                .with_command(command)
                .with_severity(severity)
                .with_args(serde_json::json!({ "reason": reason })),
        );
    }

    /// Record an allow or block verdict. Approval verdicts are recorded by
    /// the approval coordinator.
    pub fn log_command_decision(
        &self,
        scope: &AuditScope,
        command: &str,
        result: &ClassificationResult,
    ) {
        let reason = result.reason.as_deref().unwrap_or_default();
        match result.verdict() {
            Verdict::Allow => self.log_command_allowed(scope, command, reason),
            Verdict::Block => self.log_command_blocked(
                scope,
                command,
                reason,
                result.severity.unwrap_or(Severity::High),
            ),
            Verdict::RequireApproval => {}
        }
    }

    pub fn log_tool_execution(
        &self,
        scope: &AuditScope,
        tool: &str,
        args: Value,
        outcome: AuditOutcome,
    ) {
        self.log_event(
            AuditEvent::new(AuditEventKind::ToolExecution, outcome)
                .scoped(scope)
                .with_tool(tool)
                .with_args(args),
        );
    }

    pub fn log_file_access(
        &self,
        scope: &AuditScope,
        path: &str,
        operation: &str,
        outcome: AuditOutcome,
    ) {
        self.log_event(
            AuditEvent::new(AuditEventKind::FileAccess, outcome)
                .scoped(scope)
                .with_args(serde_json::json!({ "path": path, "operation": operation })),
        );
    }

    pub fn log_network_egress(
        &self,
        scope: &AuditScope,
        url: &str,
        method: &str,
        outcome: AuditOutcome,
    ) {
        self.log_event(
            AuditEvent::new(AuditEventKind::NetworkEgress, outcome)
                .scoped(scope)
                .with_args(serde_json::json!({
                    "url": strip_url_credentials(url),
                    "method": method,
                })),
        );
    }

    pub fn log_pairing(
        &self,
        kind: AuditEventKind,
        channel: &str,
        sender_id: &str,
        outcome: AuditOutcome,
    ) {
        self.log_event(
            AuditEvent::new(kind, outcome)
                .with_args(serde_json::json!({ "channel": channel, "senderId": sender_id })),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit_sink::MemoryAuditSink;
    use std::sync::Arc;

    struct SharedSink(Arc<MemoryAuditSink>);

    impl AuditSink for SharedSink {
        fn append(&self, date: NaiveDate, line: &str) -> anyhow::Result<()> {
            self.0.append(date, line)
        }
        fn prune_before(&self, cutoff: NaiveDate) -> anyhow::Result<usize> {
            self.0.prune_before(cutoff)
        }
        fn read_all(&self) -> anyhow::Result<Vec<AuditEvent>> {
            self.0.read_all()
        }
    }

    struct FailingSink;

    impl AuditSink for FailingSink {
        fn append(&self, _: NaiveDate, _: &str) -> anyhow::Result<()> {
            anyhow::bail!("disk full")
        }
        fn prune_before(&self, _: NaiveDate) -> anyhow::Result<usize> {
            Ok(0)
        }
        fn read_all(&self) -> anyhow::Result<Vec<AuditEvent>> {
            Ok(Vec::new())
        }
    }

    fn scope() -> AuditScope {
        AuditScope::new(Some("s1".into()), RequestSource::Interactive)
    }

    fn populated(n: usize) -> (AuditTrail, Arc<MemoryAuditSink>) {
        let mem = Arc::new(MemoryAuditSink::new());
        let trail = AuditTrail::with_sink(Box::new(SharedSink(mem.clone())), 30);
        for i in 0..n {
            trail.log_command_allowed(&scope(), &format!("ls dir{i}"), "read-only");
        }
        (trail, mem)
    }

    #[test]
    fn test_chain_replays_cleanly() {
        let (trail, _) = populated(5);
        let records = trail.records().unwrap();
        assert_eq!(records.len(), 5);
        assert!(records[0].previous_checksum.is_empty());
        for pair in records.windows(2) {
            assert_eq!(pair[1].previous_checksum, pair[0].checksum);
        }
        assert_eq!(trail.running_checksum(), records[4].checksum);

        let report = trail.verify();
        assert!(report.valid, "{:?}", report.issues);
        assert_eq!(report.records_verified, 5);
    }

    #[test]
    fn test_checksum_is_deterministic() {
        let event = AuditEvent::new(AuditEventKind::Denied, AuditOutcome::Failure).with_command("x");
        assert_eq!(compute_checksum("abc", &event), compute_checksum("abc", &event));
        assert_ne!(compute_checksum("abc", &event), compute_checksum("abd", &event));
        assert_eq!(compute_checksum("", &event).len(), 64);
    }

    #[test]
    fn test_mutation_is_detected() {
        let (trail, _) = populated(4);
        let mut records = trail.records().unwrap();
        records[2].command = Some("rm -rf /".into());
        let report = verify_records(&records);
        assert!(!report.valid);
        assert_eq!(report.first_divergence(), Some(2));
    }

    #[test]
    fn test_mutation_of_first_record_is_detected() {
        let (trail, _) = populated(3);
        let mut records = trail.records().unwrap();
        records[0].result = AuditOutcome::Failure;
        assert_eq!(verify_records(&records).first_divergence(), Some(0));
    }

    #[test]
    fn test_deleted_record_is_detected() {
        let (trail, _) = populated(4);
        let mut records = trail.records().unwrap();
        records.remove(1);
        let report = verify_records(&records);
        assert!(!report.valid);
        assert!(matches!(report.issues[0], ChainIssue::BrokenLink { index: 1, .. }));
    }

    #[test]
    fn test_reordered_records_are_detected() {
        let (trail, _) = populated(3);
        let mut records = trail.records().unwrap();
        records.swap(1, 2);
        assert!(!verify_records(&records).valid);
    }

    #[test]
    fn test_write_failure_does_not_advance_chain() {
        let trail = AuditTrail::with_sink(Box::new(FailingSink), 30);
        let stored = trail.log_event(AuditEvent::new(
            AuditEventKind::CommandAllowed,
            AuditOutcome::Success,
        ));
        assert!(stored.is_none());
        assert!(trail.running_checksum().is_empty());

        let err = trail
            .try_log_event(AuditEvent::new(AuditEventKind::Denied, AuditOutcome::Failure))
            .unwrap_err();
        assert!(matches!(err, GateError::AuditWriteFailure(ref msg) if msg.contains("disk full")));
        assert!(trail.running_checksum().is_empty());
    }

    #[test]
    fn test_chain_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        {
            let trail = AuditTrail::open(dir.path(), 30);
            trail.log_command_allowed(&scope(), "ls", "read-only");
            trail.log_command_allowed(&scope(), "pwd", "read-only");
        }
        let reopened = AuditTrail::open(dir.path(), 30);
        let before = reopened.running_checksum();
        assert!(!before.is_empty());
        let stored = reopened
            .log_event(AuditEvent::new(AuditEventKind::Denied, AuditOutcome::Failure))
            .unwrap();
        assert_eq!(stored.previous_checksum, before);

        let report = reopened.verify();
        assert!(report.valid, "{:?}", report.issues);
        assert_eq!(report.records_verified, 3);
    }

    #[test]
    fn test_files_are_daily_jsonl() {
        let dir = tempfile::tempdir().unwrap();
        let trail = AuditTrail::open(dir.path(), 30);
        trail.log_command_allowed(&scope(), "ls", "read-only");

        let sink = FileAuditSink::new(dir.path());
        let path = sink.file_for(Utc::now().date_naive());
        let raw = std::fs::read_to_string(&path).unwrap();
        let line: Value = serde_json::from_str(raw.lines().next().unwrap()).unwrap();
        assert_eq!(line["type"], "command_allowed");
        assert_eq!(line["result"], "success");
        assert_eq!(line["sessionId"], "s1");
        assert!(line.get("previousChecksum").is_none());
        assert_eq!(line["checksum"].as_str().unwrap().len(), 64);
    }

    #[test]
    fn test_retention_deletes_old_files() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileAuditSink::new(dir.path());
        let today = Utc::now().date_naive();
        let old = today - Duration::days(45);
        let recent = today - Duration::days(3);
        sink.append(old, "{}").unwrap();
        sink.append(recent, "{}").unwrap();

        let trail = AuditTrail::open(dir.path(), 30);
        trail.log_command_allowed(&scope(), "ls", "read-only");

        assert!(!sink.file_for(old).exists());
        assert!(sink.file_for(recent).exists());
        assert!(sink.file_for(today).exists());
    }

    #[test]
    fn test_corrupt_log_reports_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileAuditSink::new(dir.path());
        sink.append(Utc::now().date_naive(), "not json").unwrap();
        let trail = AuditTrail::with_sink(Box::new(FileAuditSink::new(dir.path())), 30);
        let report = trail.verify();
        assert!(!report.valid);
        assert!(matches!(report.issues[0], ChainIssue::Unreadable { .. }));
    }

    #[test]
    fn test_float_args_replay_cleanly() {
        let (trail, _) = populated(0);
        for i in 0..500u32 {
            let v = f64::from(i) * 0.1 + 1.0 / f64::from(i + 3);
            trail.log_tool_execution(
                &scope(),
                "shell",
                serde_json::json!({ "v": v, "ratio": v / 7.0, "tiny": v * 1e-9 }),
                AuditOutcome::Success,
            );
        }
        let report = trail.verify();
        assert!(report.valid, "first issue: {:?}", report.issues.first());
        assert_eq!(report.records_verified, 500);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writers_keep_one_chain() {
        let mem = Arc::new(MemoryAuditSink::new());
        let trail = Arc::new(AuditTrail::with_sink(Box::new(SharedSink(mem.clone())), 30));

        let mut handles = Vec::new();
        for worker in 0..8 {
            let trail = trail.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..25 {
                    trail.log_command_allowed(&scope(), &format!("ls w{worker}/{i}"), "read-only");
                    tokio::task::yield_now().await;
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let report = trail.verify();
        assert!(report.valid, "{:?}", report.issues.first());
        assert_eq!(report.records_verified, 200);
        let records = trail.records().unwrap();
        assert_eq!(trail.running_checksum(), records[199].checksum);
    }

    #[test]
    fn test_args_are_redacted() {
        let args = serde_json::json!({
            "apiKey": "abc",
            "nested": { "password": "hunter2", "path": "/tmp/x" },
            "url": "https://bob:pw@example.com/repo",
            "body": "x".repeat(600),
        });
        let out = redact_args(&args);
        assert_eq!(out["apiKey"], REDACTED);
        assert_eq!(out["nested"]["password"], REDACTED);
        assert_eq!(out["nested"]["path"], "/tmp/x");
        assert_eq!(out["url"], "https://example.com/repo");
        let body = out["body"].as_str().unwrap();
        assert!(body.ends_with("…[truncated 88 chars]"));
        assert!(body.starts_with(&"x".repeat(512)));
    }

    #[test]
    fn test_network_egress_strips_credentials() {
        let (trail, _) = populated(0);
        trail.log_network_egress(
            &scope(),
            "https://token123@api.example.com/v1",
            "GET",
            AuditOutcome::Success,
        );
        let records = trail.records().unwrap();
        let url = records[0].args.as_ref().unwrap()["url"].as_str().unwrap();
        assert_eq!(url, "https://api.example.com/v1");
    }

    #[test]
    fn test_command_decision_skips_approval_verdicts() {
        let (trail, mem) = populated(0);
        let blocked = crate::classifier::classify("sudo rm -rf /");
        trail.log_command_decision(&scope(), "sudo rm -rf /", &blocked);
        let pending = crate::classifier::classify("npm install x");
        trail.log_command_decision(&scope(), "npm install x", &pending);
        let records = trail.records().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].kind, AuditEventKind::CommandBlocked);
        assert_eq!(records[0].severity, Some(Severity::Critical));
        assert_eq!(mem.lines().len(), 1);
    }
}
