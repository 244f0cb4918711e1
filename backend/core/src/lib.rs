pub mod error;
pub mod types;

pub use error::GateError;
pub use types::{
    ApprovalDecision, ApprovalRequest, DecidedBy, NetworkMode, RequestSource, Severity,
    TrustSignal,
};
