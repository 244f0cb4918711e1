mod doctor;
mod output;

use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};

use clawgate_config::{config_dir, config_file_path, load_and_prepare};
use clawgate_core::{ApprovalRequest, GateError};
use clawgate_logging::{init_logger, sanitize_output};
use clawgate_security::{Admission, ExecutionContext, ExecutionOutcome, Gatekeeper};

use output::{note_error, note_info, note_success, note_warn, render_table, verdict_label, Column};

#[derive(Parser)]
#[command(name = "clawgate")]
#[command(about = "ClawGate: command gatekeeper for autonomous agents")]
#[command(version)]
struct Cli {
    /// Config file (defaults to ~/.clawgate/config.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify a command without running it
    Classify {
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
        #[arg(required = true, trailing_var_arg = true)]
        command: Vec<String>,
    },
    /// Run a command through the gatekeeper, prompting for approval
    Run {
        /// Execute in the isolation sandbox
        #[arg(long)]
        sandbox: bool,
        #[arg(long)]
        session: Option<String>,
        #[arg(long)]
        cwd: Option<PathBuf>,
        #[arg(required = true, trailing_var_arg = true)]
        command: Vec<String>,
    },
    /// Manage pending pairing requests
    Pairing {
        #[command(subcommand)]
        action: PairingAction,
    },
    /// Manage per-channel sender allowlists
    Allow {
        #[command(subcommand)]
        action: AllowAction,
    },
    /// Check whether a sender may message the agent on a channel
    Check { channel: String, sender: String },
    /// Audit trail tools
    Audit {
        #[command(subcommand)]
        action: AuditAction,
    },
    /// Sandbox tools
    Sandbox {
        #[command(subcommand)]
        action: SandboxAction,
    },
    /// Redact secrets from stdin and write the result to stdout
    Sanitize,
}

#[derive(Subcommand)]
enum PairingAction {
    /// List pending requests (all channels if none given)
    List { channel: Option<String> },
    /// Approve a pairing code
    Approve { channel: String, code: String },
    /// Register first contact from a sender and print its code
    Request { channel: String, sender: String },
}

#[derive(Subcommand)]
enum AllowAction {
    List { channel: String },
    Add { channel: String, sender: String },
    Remove { channel: String, sender: String },
}

#[derive(Subcommand)]
enum AuditAction {
    /// Replay the checksum chain
    Verify {
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum SandboxAction {
    /// Check the isolation backend, image, config and audit chain
    Doctor,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(e) => {
            note_error(&format!("{e:#}"));
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<ExitCode> {
    let cli = Cli::parse();

    // `sanitize` is a pure filter and needs no state.
    if let Commands::Sanitize = cli.command {
        let mut input = String::new();
        std::io::stdin().read_to_string(&mut input).context("Failed to read stdin")?;
        print!("{}", sanitize_output(&input));
        return Ok(ExitCode::SUCCESS);
    }

    let (dir, path) = match &cli.config {
        Some(path) => (
            path.parent().map(PathBuf::from).unwrap_or_else(|| PathBuf::from(".")),
            path.clone(),
        ),
        None => {
            let dir = config_dir();
            let path = config_file_path(&dir);
            (dir, path)
        }
    };
    let config = load_and_prepare(&path).await?;
    init_logger(config.log_dir(&dir), &config.logging.level);
    debug!(config = %path.display(), "Loaded configuration");

    let gate = Arc::new(Gatekeeper::open(config, &dir)?);

    match cli.command {
        Commands::Classify { json, command } => {
            let command = command.join(" ");
            let result = gate.classify(&command);
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("{}  {}", verdict_label(&result), result.user_message());
                if let Some(severity) = result.severity {
                    println!("severity: {severity}");
                }
            }
        }
        Commands::Run { sandbox, session, cwd, command } => {
            return run_command(gate, command.join(" "), sandbox, session, cwd).await;
        }
        Commands::Pairing { action } => pairing(&gate, action).await?,
        Commands::Allow { action } => allow(&gate, action).await?,
        Commands::Check { channel, sender } => {
            if gate.pairing().is_allowed(&channel, &sender).await? {
                note_success(&format!("{sender} is allowed on {channel}"));
            } else {
                note_warn(&format!("{sender} is not allowed on {channel}"));
                return Ok(ExitCode::from(1));
            }
        }
        Commands::Audit { action: AuditAction::Verify { json } } => {
            let report = gate.audit().verify();
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else if report.valid {
                note_success(&format!("Audit chain intact ({} records)", report.records_verified));
            } else {
                note_error(&format!(
                    "Audit chain broken at record {}",
                    report
                        .first_divergence()
                        .map(|i| i.to_string())
                        .unwrap_or_else(|| "?".to_string())
                ));
                for issue in &report.issues {
                    println!("  {issue:?}");
                }
            }
            if !report.valid {
                return Ok(ExitCode::from(1));
            }
        }
        Commands::Sandbox { action: SandboxAction::Doctor } => {
            if !doctor::run(&gate).await? {
                return Ok(ExitCode::from(1));
            }
        }
        Commands::Sanitize => {}
    }
    Ok(ExitCode::SUCCESS)
}

/// Run one command as the interactive user, answering approval prompts
/// from stdin.
async fn run_command(
    gate: Arc<Gatekeeper>,
    command: String,
    sandbox: bool,
    session: Option<String>,
    cwd: Option<PathBuf>,
) -> Result<ExitCode> {
    let mut ctx = ExecutionContext::interactive().sandboxed(sandbox);
    ctx.session_id = session;
    ctx.cwd = cwd;

    let mut prompts = gate.approvals().subscribe_prompts();
    let prompter = {
        let gate = gate.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            while let Some(request) = prompts.recv().await {
                print_prompt(&request);
                let answer = lines.next_line().await.ok().flatten().unwrap_or_default();
                let approved = matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes");
                if let Err(e) = gate.approve_request(&request.id, approved, None) {
                    note_error(&format!("{e}"));
                }
            }
        })
    };

    info!(sandbox, "Running command through gatekeeper");
    let outcome = gate.execute(&command, &ctx).await;
    prompter.abort();

    Ok(match &outcome {
        ExecutionOutcome::Blocked { .. } => {
            note_error(&outcome.user_message());
            ExitCode::from(2)
        }
        ExecutionOutcome::Denied { .. } => {
            note_warn(&outcome.user_message());
            ExitCode::from(3)
        }
        ExecutionOutcome::Completed { result, auto_approved } => {
            if *auto_approved {
                note_info("auto-approved workspace file operation");
            }
            print!("{}", result.output);
            if !result.isolated && sandbox {
                note_warn("ran without isolation");
            }
            if result.success {
                ExitCode::SUCCESS
            } else {
                if let Some(error) = &result.error {
                    note_error(error);
                }
                ExitCode::from(u8::try_from(result.exit_code).unwrap_or(1).max(1))
            }
        }
    })
}

fn print_prompt(request: &ApprovalRequest) {
    println!();
    note_warn(&format!("Approval required ({}): {}", request.severity, request.reason));
    println!("    $ {}", request.command);
    print!("Approve? [y/N] ");
    let _ = std::io::Write::flush(&mut std::io::stdout());
}

async fn pairing(gate: &Gatekeeper, action: PairingAction) -> Result<()> {
    match action {
        PairingAction::List { channel } => {
            let channels = match channel {
                Some(c) => vec![c],
                None => gate.pairing().channels().await?,
            };
            let now = Utc::now();
            let mut rows = Vec::new();
            for channel in channels {
                for request in gate.pairing().list_pairing_requests(&channel).await? {
                    let age = (now - request.created_at).num_minutes();
                    rows.push(vec![channel.clone(), request.id, request.code, format!("{age}m")]);
                }
            }
            if rows.is_empty() {
                note_info("No pending pairing requests.");
            } else {
                let cols = [
                    Column::left("Channel"),
                    Column::left("Sender"),
                    Column::left("Code"),
                    Column::right("Age"),
                ];
                print!("{}", render_table(&cols, &rows));
            }
        }
        PairingAction::Approve { channel, code } => {
            match gate.redeem_pairing_code(&channel, &code).await {
                Ok(approval) => {
                    note_success(&format!("{} may now message on {channel}", approval.sender_id))
                }
                Err(GateError::PairingExpired) => {
                    note_warn("Pairing code expired; ask the sender to message again")
                }
                Err(GateError::PairingCodeInvalid) => note_warn("Unknown pairing code"),
                Err(e) => return Err(e.into()),
            }
        }
        PairingAction::Request { channel, sender } => {
            match gate.admit_message(&channel, &sender, None).await? {
                Admission::Allowed => note_info(&format!("{sender} is already allowed")),
                Admission::PairingRequired { code, created } => {
                    let verb = if created { "Issued" } else { "Pending" };
                    note_info(&format!("{verb} pairing code for {sender}: {code}"));
                }
            }
        }
    }
    Ok(())
}

async fn allow(gate: &Gatekeeper, action: AllowAction) -> Result<()> {
    match action {
        AllowAction::List { channel } => {
            let entries = gate.pairing().read_allow_from(&channel).await?;
            if entries.is_empty() {
                note_info(&format!("No senders allowed on {channel}"));
            }
            for entry in entries {
                println!("{entry}");
            }
        }
        AllowAction::Add { channel, sender } => {
            if gate.add_allow_from(&channel, &sender).await? {
                note_success(&format!("Added {sender} to {channel}"));
            } else {
                note_info(&format!("{sender} was already allowed on {channel}"));
            }
        }
        AllowAction::Remove { channel, sender } => {
            if gate.remove_allow_from(&channel, &sender).await? {
                note_success(&format!("Revoked {sender} on {channel}"));
            } else {
                note_warn(&format!("{sender} was not on the {channel} allowlist"));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_run_with_trailing_command() {
        let cli = Cli::parse_from(["clawgate", "run", "--sandbox", "ls", "-la", "/tmp"]);
        let Commands::Run { sandbox, command, .. } = cli.command else {
            panic!("expected run");
        };
        assert!(sandbox);
        assert_eq!(command.join(" "), "ls -la /tmp");
    }

    #[test]
    fn parses_pairing_approve() {
        let cli = Cli::parse_from(["clawgate", "pairing", "approve", "telegram", "k7m3xq9p"]);
        assert!(matches!(
            cli.command,
            Commands::Pairing { action: PairingAction::Approve { .. } }
        ));
    }
}
