use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Severity attached to a blocked signature or an approval request.
///
/// Ordered so that `Critical > High > Medium`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            other => Err(format!("unknown severity '{other}'")),
        }
    }
}

/// Where a request originated. Only `Interactive` is trusted enough to
/// reach a human approval prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestSource {
    Interactive,
    Channel,
    Api,
    Daemon,
}

impl RequestSource {
    pub fn is_trusted(&self) -> bool {
        matches!(self, RequestSource::Interactive)
    }
}

impl fmt::Display for RequestSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RequestSource::Interactive => "interactive",
            RequestSource::Channel => "channel",
            RequestSource::Api => "api",
            RequestSource::Daemon => "daemon",
        };
        f.write_str(s)
    }
}

/// Authentication result handed over by the API layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrustSignal {
    pub user_id: String,
    pub role: String,
    /// How the caller authenticated ("bearer", "api_key", ...).
    pub method: String,
}

/// Network exposure of a sandboxed execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkMode {
    #[default]
    None,
    Bridged,
    Host,
}

impl NetworkMode {
    /// Value for `docker run --network`.
    pub fn docker_arg(&self) -> &'static str {
        match self {
            NetworkMode::None => "none",
            NetworkMode::Bridged => "bridge",
            NetworkMode::Host => "host",
        }
    }
}

/// A command waiting on an approval decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalRequest {
    pub id: String,
    pub command: String,
    pub reason: String,
    pub severity: Severity,
    pub requested_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub source: RequestSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trust: Option<TrustSignal>,
}

impl ApprovalRequest {
    pub fn new(
        command: impl Into<String>,
        reason: impl Into<String>,
        severity: Severity,
        source: RequestSource,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            command: command.into(),
            reason: reason.into(),
            severity,
            requested_at: Utc::now(),
            session_id: None,
            source,
            trust: None,
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_trust(mut self, trust: TrustSignal) -> Self {
        self.trust = Some(trust);
        self
    }
}

/// Who settled an approval request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecidedBy {
    User,
    Policy,
    Timeout,
}

impl fmt::Display for DecidedBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DecidedBy::User => "user",
            DecidedBy::Policy => "policy",
            DecidedBy::Timeout => "timeout",
        };
        f.write_str(s)
    }
}

/// The single resolution of an [`ApprovalRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalDecision {
    pub request_id: String,
    pub approved: bool,
    pub decided_by: DecidedBy,
    pub decided_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ApprovalDecision {
    pub fn new(request_id: impl Into<String>, approved: bool, decided_by: DecidedBy) -> Self {
        Self {
            request_id: request_id.into(),
            approved,
            decided_by,
            decided_at: Utc::now(),
            reason: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}
