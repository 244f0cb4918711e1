//! `clawgate-security`: command classification, approvals, audit, and
//! sender pairing, wired together by [`Gatekeeper`].

pub mod approval;
pub mod audit;
pub mod audit_sink;
pub mod auto_approve;
pub mod classifier;
pub mod gatekeeper;
pub mod pairing;
pub mod signatures;

pub use approval::{ApprovalCoordinator, ApprovalOptions};
pub use audit::{
    compute_checksum, redact_args, verify_records, AuditEvent, AuditEventKind, AuditOutcome,
    AuditScope, AuditTrail, ChainIssue, ChainVerification,
};
pub use audit_sink::{AuditSink, FileAuditSink, MemoryAuditSink};
pub use auto_approve::{should_auto_approve, AutoApproveContext};
pub use classifier::{classify, ClassificationResult, Verdict};
pub use gatekeeper::{Admission, ExecutionContext, ExecutionOutcome, Gatekeeper};
pub use pairing::{
    PairingApproval, PairingOptions, PairingRegistry, PairingRequest, PairingUpsert,
};
pub use signatures::{CommandSignature, SignatureStore};
