//! `clawgate sandbox doctor`: environment checks for the gatekeeper.

use anyhow::Result;
use clawgate_config::{validate, ClawGateConfig};
use clawgate_security::Gatekeeper;

use crate::output::{note_error, note_success, note_warn, supports_color, DIM, RESET};

fn detail(msg: &str) {
    if supports_color() {
        println!("    {DIM}{msg}{RESET}");
    } else {
        println!("    {msg}");
    }
}

/// Run every check. Returns false if any required check failed.
pub async fn run(gate: &Gatekeeper) -> Result<bool> {
    println!("\nRunning ClawGate doctor...\n");

    let mut ok = check_config(gate.config());
    ok &= check_sandbox(gate).await;
    ok &= check_audit(gate);

    println!();
    if ok {
        note_success("All checks passed.");
    } else {
        note_error("Some checks failed; see above.");
    }
    Ok(ok)
}

fn check_config(config: &ClawGateConfig) -> bool {
    println!("Configuration:");
    let report = validate(config);
    for warning in &report.warnings {
        note_warn(&format!("{}: {}", warning.path, warning.message));
    }
    if report.is_valid() {
        note_success("config is valid");
    } else {
        note_error(&report.summary());
    }
    if config.workspace.root.is_none() {
        detail("workspace.root is unset; workspace auto-approval is disabled");
    }
    report.is_valid()
}

async fn check_sandbox(gate: &Gatekeeper) -> bool {
    println!("Sandbox ({}):", gate.sandbox().backend_name());
    let defaults = &gate.config().sandbox;

    if !gate.sandbox().is_available().await {
        if defaults.allow_fallback {
            note_warn("isolation backend unavailable; commands will run directly on the host");
            return true;
        }
        note_error("isolation backend unavailable and fallback is disabled");
        detail("install and start docker, or set sandbox.allowFallback: true");
        return false;
    }
    note_success("isolation backend reachable");

    match gate.sandbox().ensure_available(&defaults.image).await {
        Ok(()) => {
            note_success(&format!("image {} ready", defaults.image));
            detail(&format!(
                "memory {} / cpus {} / network {}",
                defaults.memory_limit,
                defaults.cpu_limit,
                defaults.network_mode.docker_arg()
            ));
            true
        }
        Err(e) => {
            note_error(&format!("image {} unavailable: {e:#}", defaults.image));
            false
        }
    }
}

fn check_audit(gate: &Gatekeeper) -> bool {
    println!("Audit trail:");
    let report = gate.audit().verify();
    if report.valid {
        note_success(&format!("chain intact ({} records)", report.records_verified));
        true
    } else {
        note_error(&format!("chain verification failed ({} issues)", report.issues.len()));
        false
    }
}
