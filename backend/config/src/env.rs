//! Environment variable overrides, applied after the YAML file is loaded.

use crate::schema::ClawGateConfig;
use std::path::PathBuf;
use tracing::warn;

pub const ENV_LOG_LEVEL: &str = "CLAWGATE_LOG_LEVEL";
pub const ENV_AUDIT_DIR: &str = "CLAWGATE_AUDIT_DIR";
pub const ENV_AUDIT_RETENTION_DAYS: &str = "CLAWGATE_AUDIT_RETENTION_DAYS";
pub const ENV_SANDBOX_IMAGE: &str = "CLAWGATE_SANDBOX_IMAGE";
pub const ENV_WORKSPACE: &str = "CLAWGATE_WORKSPACE";

/// Apply overrides from the process environment.
pub fn apply_env_overrides(config: ClawGateConfig) -> ClawGateConfig {
    apply_env_overrides_with(config, |key| std::env::var(key).ok())
}

/// Apply overrides using a provided lookup (useful for testing).
pub fn apply_env_overrides_with<F>(mut config: ClawGateConfig, lookup: F) -> ClawGateConfig
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(level) = get(ENV_LOG_LEVEL) {
        config.logging.level = level;
    }
    if let Some(dir) = get(ENV_AUDIT_DIR) {
        config.audit.dir = Some(PathBuf::from(dir));
    }
    if let Some(days) = get(ENV_AUDIT_RETENTION_DAYS) {
        match days.trim().parse::<u32>() {
            Ok(d) => config.audit.retention_days = d,
            Err(_) => warn!(value = %days, "Ignoring non-numeric {ENV_AUDIT_RETENTION_DAYS}"),
        }
    }
    if let Some(image) = get(ENV_SANDBOX_IMAGE) {
        config.sandbox.image = image;
    }
    if let Some(root) = get(ENV_WORKSPACE) {
        config.workspace.root = Some(PathBuf::from(root));
    }
    config
}
