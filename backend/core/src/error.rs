use thiserror::Error;

/// Top-level error type for the ClawGate gatekeeper.
///
/// Policy outcomes (a blocked command, a denied approval, a failed sandbox
/// run) are normally returned as typed values. These variants exist for the
/// places where an outcome has to cross a `Result` boundary, and for misuse.
#[derive(Debug, Error)]
pub enum GateError {
    #[error("policy denied: {0}")]
    PolicyDenied(String),

    #[error("approval timed out: {0}")]
    ApprovalTimeout(String),

    #[error("sandbox failure: {0}")]
    SandboxFailure(String),

    #[error("audit write failed: {0}")]
    AuditWriteFailure(String),

    #[error("pairing code expired")]
    PairingExpired,

    #[error("pairing capacity exceeded: {0}")]
    PairingCapacityExceeded(String),

    #[error("pairing code invalid")]
    PairingCodeInvalid,

    #[error("no pending approval request with id {0}")]
    UnknownApprovalRequest(String),

    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
