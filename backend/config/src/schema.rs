//! ClawGate configuration schema.
//!
//! Every section has defaults, so an empty or missing `config.yaml` yields a
//! working, fail-closed gatekeeper.

use clawgate_core::{NetworkMode, Severity};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClawGateConfig {
    pub audit: AuditConfig,
    pub approval: ApprovalConfig,
    pub pairing: PairingConfig,
    pub sandbox: SandboxDefaults,
    pub classifier: ClassifierConfig,
    pub logging: LoggingConfig,
    pub workspace: WorkspaceConfig,
}

impl ClawGateConfig {
    /// Audit log directory, defaulting to `<config_dir>/audit`.
    pub fn audit_dir(&self, config_dir: &Path) -> PathBuf {
        self.audit.dir.clone().unwrap_or_else(|| config_dir.join("audit"))
    }

    /// Pairing store directory, defaulting to `<config_dir>/credentials`.
    pub fn pairing_dir(&self, config_dir: &Path) -> PathBuf {
        self.pairing.dir.clone().unwrap_or_else(|| config_dir.join("credentials"))
    }

    /// Diagnostic log directory, defaulting to `<config_dir>/logs`.
    pub fn log_dir(&self, config_dir: &Path) -> PathBuf {
        self.logging.dir.clone().unwrap_or_else(|| config_dir.join("logs"))
    }
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuditConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
    /// Daily log files older than this are deleted on rotation.
    pub retention_days: u32,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self { dir: None, retention_days: 30 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApprovalConfig {
    pub timeout_secs: u64,
    /// Whether interactive sessions may be prompted at all.
    pub interactive_prompt: bool,
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self { timeout_secs: 120, interactive_prompt: true }
    }
}

/// Longest pairing code lifetime accepted: one week.
pub const MAX_PAIRING_TTL_MINUTES: u64 = 7 * 24 * 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PairingConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
    pub ttl_minutes: u64,
    pub max_pending: usize,
    pub code_length: usize,
}

impl Default for PairingConfig {
    fn default() -> Self {
        Self { dir: None, ttl_minutes: 60, max_pending: 3, code_length: 8 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SandboxDefaults {
    pub image: String,
    /// Docker memory ceiling, e.g. "512m" or "1g".
    pub memory_limit: String,
    /// Fraction of CPU cores.
    pub cpu_limit: f64,
    pub network_mode: NetworkMode,
    pub timeout_secs: u64,
    pub max_output_bytes: usize,
    /// Run directly on the host when no isolation backend is available.
    pub allow_fallback: bool,
    pub pull_missing_image: bool,
}

impl Default for SandboxDefaults {
    fn default() -> Self {
        Self {
            image: "clawgate-sandbox:latest".to_string(),
            memory_limit: "512m".to_string(),
            cpu_limit: 0.5,
            network_mode: NetworkMode::None,
            timeout_secs: 60,
            max_output_bytes: 200_000,
            allow_fallback: false,
            pull_missing_image: true,
        }
    }
}

/// Operator-supplied blocked signature.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureConfig {
    pub pattern: String,
    pub reason: String,
    pub severity: Severity,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClassifierConfig {
    pub extra_blocked: Vec<SignatureConfig>,
    pub extra_approval_prefixes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingConfig {
    pub level: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), dir: None }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkspaceConfig {
    /// Agent workspace root; confines auto-approved file operations.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,
}
