//! Approval coordinator.
//!
//! Suspends a caller until a human front end decides, a timeout elapses, or
//! policy denies outright. Pending requests live in a table keyed by id, each
//! holding the oneshot sender that resumes its caller; whoever removes the
//! entry from the table owns the decision, so every request resolves exactly
//! once.

use clawgate_config::ApprovalConfig;
use clawgate_core::{ApprovalDecision, ApprovalRequest, DecidedBy, GateError};
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::audit::{AuditEvent, AuditEventKind, AuditOutcome, AuditTrail};

#[derive(Debug, Clone)]
pub struct ApprovalOptions {
    pub timeout: Duration,
    /// When false every request is denied by policy without prompting.
    pub allow_interactive_prompt: bool,
}

impl Default for ApprovalOptions {
    fn default() -> Self {
        Self::from_config(&ApprovalConfig::default())
    }
}

impl ApprovalOptions {
    pub fn from_config(config: &ApprovalConfig) -> Self {
        Self {
            timeout: Duration::from_secs(config.timeout_secs),
            allow_interactive_prompt: config.interactive_prompt,
        }
    }
}

struct PendingApproval {
    request: ApprovalRequest,
    tx: oneshot::Sender<ApprovalDecision>,
}

type PendingTable = Arc<Mutex<HashMap<String, PendingApproval>>>;

/// Removes a request from the table if its caller goes away before a
/// decision arrives.
struct PendingGuard {
    id: String,
    pending: PendingTable,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        let mut table = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        if table.remove(&self.id).is_some() {
            debug!(request_id = %self.id, "Approval request abandoned by caller");
        }
    }
}

pub struct ApprovalCoordinator {
    options: ApprovalOptions,
    pending: PendingTable,
    prompt_tx: Mutex<Option<mpsc::UnboundedSender<ApprovalRequest>>>,
    audit: Option<Arc<AuditTrail>>,
}

impl ApprovalCoordinator {
    pub fn new(options: ApprovalOptions) -> Self {
        Self {
            options,
            pending: Arc::new(Mutex::new(HashMap::new())),
            prompt_tx: Mutex::new(None),
            audit: None,
        }
    }

    /// Record every request and decision in `audit`.
    pub fn with_audit(mut self, audit: Arc<AuditTrail>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Defaults for callers with no per-request options.
    pub fn options(&self) -> &ApprovalOptions {
        &self.options
    }

    /// Attach a front end. New requests are delivered on the returned
    /// receiver; a later subscription replaces this one.
    pub fn subscribe_prompts(&self) -> mpsc::UnboundedReceiver<ApprovalRequest> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.prompt_tx.lock().unwrap_or_else(|e| e.into_inner()) = Some(tx);
        rx
    }

    fn prompt_sender(&self) -> Option<mpsc::UnboundedSender<ApprovalRequest>> {
        self.prompt_tx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .filter(|tx| !tx.is_closed())
            .cloned()
    }

    /// Suspend until the request is decided, within `opts.timeout`.
    /// Always yields a decision.
    pub async fn request_approval(
        &self,
        request: ApprovalRequest,
        opts: &ApprovalOptions,
    ) -> ApprovalDecision {
        self.audit_request(&request);

        if !request.source.is_trusted() {
            return self.deny_by_policy(
                &request,
                format!("Requests from {} sources cannot be approved interactively", request.source),
            );
        }
        if !opts.allow_interactive_prompt {
            return self.deny_by_policy(&request, "Interactive approval is disabled".to_string());
        }
        let Some(prompt_tx) = self.prompt_sender() else {
            return self.deny_by_policy(&request, "No approval front end is attached".to_string());
        };

        let id = request.id.clone();
        let (tx, mut rx) = oneshot::channel();
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id.clone(), PendingApproval { request: request.clone(), tx });
        let _guard = PendingGuard { id: id.clone(), pending: self.pending.clone() };

        if prompt_tx.send(request.clone()).is_err() {
            self.take_pending(&id);
            return self.deny_by_policy(&request, "Approval front end disconnected".to_string());
        }
        info!(request_id = %id, severity = %request.severity, "[Approval] Awaiting decision");

        let decision = match tokio::time::timeout(opts.timeout, &mut rx).await {
            Ok(Ok(decision)) => decision,
            Ok(Err(_)) => ApprovalDecision::new(&id, false, DecidedBy::Policy)
                .with_reason("Approval request was cancelled"),
            Err(_) => {
                if self.take_pending(&id).is_some() {
                    warn!(request_id = %id, "[Approval] Timed out");
                    ApprovalDecision::new(&id, false, DecidedBy::Timeout).with_reason(format!(
                        "No decision within {}s",
                        opts.timeout.as_secs()
                    ))
                } else {
                    // A decision was sent while the timer fired.
                    rx.try_recv().unwrap_or_else(|_| {
                        ApprovalDecision::new(&id, false, DecidedBy::Policy)
                            .with_reason("Approval request was cancelled")
                    })
                }
            }
        };

        self.audit_decision(&request, &decision);
        decision
    }

    /// Deliver a user decision to a suspended caller.
    pub fn approve_request(
        &self,
        request_id: &str,
        approved: bool,
        reason: Option<String>,
    ) -> Result<ApprovalDecision, GateError> {
        let mut table = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        let entry = table
            .remove(request_id)
            .ok_or_else(|| GateError::UnknownApprovalRequest(request_id.to_string()))?;
        let mut decision = ApprovalDecision::new(request_id, approved, DecidedBy::User);
        decision.reason = reason;
        // Sent under the lock so a racing timeout sees either the entry or
        // the decision.
        if entry.tx.send(decision.clone()).is_err() {
            return Err(GateError::UnknownApprovalRequest(request_id.to_string()));
        }
        info!(request_id, approved, "[Approval] Decision delivered");
        Ok(decision)
    }

    /// Withdraw a pending request; its caller resumes with a policy denial.
    pub fn cancel_request(&self, request_id: &str, reason: &str) -> bool {
        let mut table = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        let Some(entry) = table.remove(request_id) else {
            return false;
        };
        let decision =
            ApprovalDecision::new(request_id, false, DecidedBy::Policy).with_reason(reason);
        let _ = entry.tx.send(decision);
        info!(request_id, reason, "[Approval] Request cancelled");
        true
    }

    /// Undecided requests, oldest first.
    pub fn get_pending_approvals(&self) -> Vec<ApprovalRequest> {
        let table = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        let mut requests: Vec<_> = table.values().map(|p| p.request.clone()).collect();
        requests.sort_by_key(|r| r.requested_at);
        requests
    }

    fn take_pending(&self, id: &str) -> Option<PendingApproval> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner()).remove(id)
    }

    fn deny_by_policy(&self, request: &ApprovalRequest, reason: String) -> ApprovalDecision {
        info!(request_id = %request.id, %reason, "[Approval] Denied by policy");
        let decision = ApprovalDecision::new(&request.id, false, DecidedBy::Policy).with_reason(reason);
        self.audit_decision(request, &decision);
        decision
    }

    fn audit_request(&self, request: &ApprovalRequest) {
        let Some(audit) = &self.audit else { return };
        let mut args = json!({ "requestId": request.id, "reason": request.reason });
        if let Some(trust) = &request.trust {
            args["trust"] = json!({ "userId": trust.user_id, "role": trust.role, "method": trust.method });
        }
        let mut event = AuditEvent::new(AuditEventKind::ApprovalRequired, AuditOutcome::Pending)
            .with_command(&request.command)
            .with_severity(request.severity)
            .with_args(args);
        event.session_id = request.session_id.clone();
        event.source = Some(request.source);
        audit.log_event(event);
    }

    fn audit_decision(&self, request: &ApprovalRequest, decision: &ApprovalDecision) {
        let Some(audit) = &self.audit else { return };
        let (kind, outcome) = if decision.approved {
            (AuditEventKind::Approved, AuditOutcome::Success)
        } else {
            (AuditEventKind::Denied, AuditOutcome::Failure)
        };
        let mut event = AuditEvent::new(kind, outcome)
            .with_command(&request.command)
            .with_severity(request.severity)
            .with_args(json!({
                "requestId": request.id,
                "decidedBy": decision.decided_by.to_string(),
                "reason": decision.reason,
            }));
        event.session_id = request.session_id.clone();
        event.source = Some(request.source);
        audit.log_event(event);
    }
}
