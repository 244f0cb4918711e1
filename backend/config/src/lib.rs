//! `clawgate-config`: ClawGate configuration management.
//!
//! Provides:
//! - Typed config schema with fail-closed defaults
//! - YAML read/write (atomic temp-file + rename)
//! - `CLAWGATE_*` environment overrides
//! - Schema validation with field paths

pub mod env;
pub mod io;
pub mod schema;
pub mod validation;

pub use env::{apply_env_overrides, apply_env_overrides_with};
pub use io::{config_dir, config_file_path, load_config, write_config};
pub use schema::{
    ApprovalConfig, AuditConfig, ClassifierConfig, ClawGateConfig, LoggingConfig, PairingConfig,
    SandboxDefaults, SignatureConfig, WorkspaceConfig, MAX_PAIRING_TTL_MINUTES,
};
pub use validation::{validate, ConfigValidationError, ValidationReport};

use anyhow::Result;
use std::path::Path;

/// Load a config file, apply env overrides, and log validation findings.
///
/// Validation errors are logged here but left for the caller to act on;
/// `Gatekeeper::open` refuses to start with an invalid config.
pub async fn load_and_prepare(path: &Path) -> Result<ClawGateConfig> {
    let config = apply_env_overrides(load_config(path).await?);

    let report = validate(&config);
    for warning in &report.warnings {
        tracing::warn!(path = %warning.path, message = %warning.message, "Config warning");
    }
    for error in &report.errors {
        tracing::error!(path = %error.path, message = %error.message, "Config error");
    }

    Ok(config)
}
