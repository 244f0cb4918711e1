//! Config validation with dotted field paths.

use crate::schema::{ClawGateConfig, MAX_PAIRING_TTL_MINUTES};
use regex::Regex;
use thiserror::Error;

/// A config validation error with field path and message.
#[derive(Debug, Error)]
#[error("Config validation error at '{path}': {message}")]
pub struct ConfigValidationError {
    pub path: String,
    pub message: String,
}

/// A collection of validation errors found in one pass.
#[derive(Debug, Default)]
pub struct ValidationReport {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// All errors joined into one line, for surfacing as a single failure.
    pub fn summary(&self) -> String {
        self.errors
            .iter()
            .map(|e| format!("{}: {}", e.path, e.message))
            .collect::<Vec<_>>()
            .join("; ")
    }

    fn error(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError { path: path.into(), message: message.into() });
    }

    fn warn(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError { path: path.into(), message: message.into() });
    }
}

/// Validate the config and return a report of all errors and warnings.
pub fn validate(config: &ClawGateConfig) -> ValidationReport {
    let mut report = ValidationReport::default();
    validate_audit(config, &mut report);
    validate_approval(config, &mut report);
    validate_pairing(config, &mut report);
    validate_sandbox(config, &mut report);
    validate_classifier(config, &mut report);
    report
}

fn validate_audit(config: &ClawGateConfig, report: &mut ValidationReport) {
    if config.audit.retention_days == 0 {
        report.error("audit.retentionDays", "Must keep at least one day of audit logs");
    }
}

fn validate_approval(config: &ClawGateConfig, report: &mut ValidationReport) {
    if config.approval.timeout_secs == 0 {
        report.error("approval.timeoutSecs", "Approval timeout must be greater than zero");
    }
    if !config.approval.interactive_prompt {
        report.warn(
            "approval.interactivePrompt",
            "Interactive prompts disabled; every approval-required command will be denied",
        );
    }
}

fn validate_pairing(config: &ClawGateConfig, report: &mut ValidationReport) {
    let pairing = &config.pairing;
    if pairing.ttl_minutes == 0 {
        report.error("pairing.ttlMinutes", "Pairing codes need a non-zero lifetime");
    } else if pairing.ttl_minutes > MAX_PAIRING_TTL_MINUTES {
        report.error(
            "pairing.ttlMinutes",
            format!("Pairing codes may live at most {MAX_PAIRING_TTL_MINUTES} minutes"),
        );
    }
    if pairing.max_pending == 0 {
        report.error("pairing.maxPending", "At least one pending request per channel is required");
    }
    if !(6..=16).contains(&pairing.code_length) {
        report.error("pairing.codeLength", "Pairing code length must be between 6 and 16");
    }
}

fn validate_sandbox(config: &ClawGateConfig, report: &mut ValidationReport) {
    let sandbox = &config.sandbox;
    if sandbox.image.trim().is_empty() {
        report.error("sandbox.image", "Sandbox image cannot be empty");
    }
    if !is_memory_limit(&sandbox.memory_limit) {
        report.error(
            "sandbox.memoryLimit",
            format!("'{}' is not a docker memory size (e.g. 512m, 1g)", sandbox.memory_limit),
        );
    }
    if !(sandbox.cpu_limit > 0.0 && sandbox.cpu_limit.is_finite()) {
        report.error("sandbox.cpuLimit", "CPU limit must be a positive number of cores");
    }
    if sandbox.timeout_secs == 0 {
        report.error("sandbox.timeoutSecs", "Sandbox timeout must be greater than zero");
    }
    if sandbox.allow_fallback {
        report.warn(
            "sandbox.allowFallback",
            "Commands will run unisolated on the host when the sandbox backend is missing",
        );
    }
}

fn validate_classifier(config: &ClawGateConfig, report: &mut ValidationReport) {
    for (i, sig) in config.classifier.extra_blocked.iter().enumerate() {
        let path = format!("classifier.extraBlocked[{i}]");
        if let Err(e) = Regex::new(&sig.pattern) {
            report.error(format!("{path}.pattern"), format!("Invalid regex: {e}"));
        }
        if sig.reason.trim().is_empty() {
            report.error(format!("{path}.reason"), "A blocked signature needs a reason");
        }
    }
    for (i, prefix) in config.classifier.extra_approval_prefixes.iter().enumerate() {
        if prefix.trim().is_empty() {
            report.error(format!("classifier.extraApprovalPrefixes[{i}]"), "Prefix cannot be empty");
        }
    }
}

fn is_memory_limit(s: &str) -> bool {
    let s = s.trim().to_ascii_lowercase();
    let digits = s.trim_end_matches(['b', 'k', 'm', 'g']);
    !digits.is_empty() && digits.len() + 1 >= s.len() && digits.chars().all(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SignatureConfig;
    use clawgate_core::Severity;

    #[test]
    fn default_config_is_valid() {
        assert!(validate(&ClawGateConfig::default()).is_valid());
    }

    #[test]
    fn rejects_bad_regex_and_zero_limits() {
        let mut config = ClawGateConfig::default();
        config.classifier.extra_blocked.push(SignatureConfig {
            pattern: "(unclosed".into(),
            reason: "x".into(),
            severity: Severity::High,
        });
        config.pairing.max_pending = 0;
        config.sandbox.memory_limit = "lots".into();
        let report = validate(&config);
        assert!(!report.is_valid());
        let paths: Vec<_> = report.errors.iter().map(|e| e.path.as_str()).collect();
        assert!(paths.contains(&"classifier.extraBlocked[0].pattern"));
        assert!(paths.contains(&"pairing.maxPending"));
        assert!(paths.contains(&"sandbox.memoryLimit"));
    }

    #[test]
    fn rejects_oversized_pairing_ttl() {
        let mut config = ClawGateConfig::default();
        config.pairing.ttl_minutes = 1 << 60;
        let report = validate(&config);
        assert!(!report.is_valid());
        assert_eq!(report.errors[0].path, "pairing.ttlMinutes");

        config.pairing.ttl_minutes = MAX_PAIRING_TTL_MINUTES;
        assert!(validate(&config).is_valid());
    }

    #[test]
    fn memory_limit_shapes() {
        assert!(is_memory_limit("512m"));
        assert!(is_memory_limit("2g"));
        assert!(is_memory_limit("1048576"));
        assert!(!is_memory_limit("m"));
        assert!(!is_memory_limit("5gb"));
    }

    #[test]
    fn fallback_is_a_warning_not_an_error() {
        let mut config = ClawGateConfig::default();
        config.sandbox.allow_fallback = true;
        let report = validate(&config);
        assert!(report.is_valid());
        assert_eq!(report.warnings.len(), 1);
    }
}
