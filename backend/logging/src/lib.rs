//! Telemetry and redaction components for ClawGate.
//!
//! Handles structured console + rolling NDJSON file logging, and the secret
//! redaction applied to anything surfaced to users or written to logs.

pub mod logger;
pub mod redact;

pub use logger::init_logger;
pub use redact::{REDACTED, sanitize_output};
