//! Output Redaction
//!
//! Scrubs secret-shaped tokens (API keys, cloud access keys, bearer tokens,
//! PEM private keys, URL credentials, `KEY=VALUE` secret lines) from text
//! before it is surfaced to a user or written to a log.
//!
//! Every replacement is itself outside the pattern it replaced, so applying
//! `sanitize_output` twice gives the same result as applying it once.

use regex::Regex;
use std::sync::LazyLock;

/// Marker substituted for redacted values.
pub const REDACTED: &str = "[REDACTED]";

static PRIVATE_KEY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)-----BEGIN ([A-Z0-9 ]*)PRIVATE KEY-----.*?(?:-----END [A-Z0-9 ]*PRIVATE KEY-----|\z)")
        .unwrap()
});

static API_KEY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"\b(?:sk|pk|rk)-[A-Za-z0-9_\-]{16,}",
        r"|\bgh[pousr]_[A-Za-z0-9]{20,}",
        r"|\bgithub_pat_[A-Za-z0-9_]{20,}",
        r"|\bxox[abprs]-[A-Za-z0-9\-]{10,}",
        r"|\bAIza[0-9A-Za-z_\-]{35}",
        r"|\bglpat-[A-Za-z0-9_\-]{20,}",
    ))
    .unwrap()
});

static AWS_KEY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:AKIA|ASIA|AGPA|AIDA|AROA)[0-9A-Z]{16}\b").unwrap());

static BEARER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(bearer)\s+[A-Za-z0-9\-._~+/]{8,}=*").unwrap());

static URL_CREDENTIALS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([A-Za-z][A-Za-z0-9+.\-]*://)[^/\s:@]+:[^/\s@]+@").unwrap());

static SECRET_ASSIGNMENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?im)^(\s*(?:export\s+)?["']?[A-Z0-9_.\-]*(?:SECRET|TOKEN|PASSWORD|PASSWD|API_?KEY|ACCESS_?KEY|PRIVATE_?KEY|CREDENTIALS?)[A-Z0-9_.\-]*["']?\s*[=:]\s*)\S.*$"#,
    )
    .unwrap()
});

/// Redacts secret-shaped substrings. Idempotent.
pub fn sanitize_output(input: &str) -> String {
    let mut out = PRIVATE_KEY_RE
        .replace_all(input, "[REDACTED_PRIVATE_KEY]")
        .into_owned();
    out = API_KEY_RE.replace_all(&out, "[REDACTED_API_KEY]").into_owned();
    out = AWS_KEY_RE.replace_all(&out, "[REDACTED_AWS_KEY]").into_owned();
    out = BEARER_RE.replace_all(&out, "${1} [REDACTED]").into_owned();
    out = URL_CREDENTIALS_RE.replace_all(&out, "${1}[REDACTED]@").into_owned();
    out = SECRET_ASSIGNMENT_RE.replace_all(&out, "${1}[REDACTED]").into_owned();
    out
}
