//! Signature store: blocked command signatures, the safe read-only verb
//! allowlist, approval-required prefixes and sensitive path markers.
//!
//! The built-in store is compiled once per process and never mutated.
//! Operator additions from config produce a separate store at startup.

use clawgate_config::ClassifierConfig;
use clawgate_core::{GateError, Severity};
use regex::Regex;
use std::sync::LazyLock;
use tracing::info;

/// A blocked pattern. A match is terminal for a classification.
#[derive(Debug, Clone)]
pub struct CommandSignature {
    pub pattern: Regex,
    pub reason: String,
    pub severity: Severity,
}

impl CommandSignature {
    fn new(pattern: &str, reason: &str, severity: Severity) -> Result<Self, GateError> {
        let pattern = Regex::new(pattern)
            .map_err(|e| GateError::Config(format!("bad signature regex {pattern:?}: {e}")))?;
        Ok(Self { pattern, reason: reason.to_string(), severity })
    }
}

const BLOCKED: &[(&str, &str, Severity)] = &[
    (
        r"\brm\s+-[A-Za-z]*[rR][A-Za-z]*\s+(?:-[A-Za-z-]+\s+)*(?:/|/\*|~/?|\$HOME/?)(?:\s|$|[;&|])",
        "Recursive deletion of the root or home directory",
        Severity::Critical,
    ),
    (
        r"\b(?:curl|wget|fetch)\b[^|;&]*\|\s*(?:sudo\s+)?(?:env\s+)?(?:ba|z|da|k|fi|c|tc)?sh\b",
        "Remote code execution: downloaded content piped into a shell",
        Severity::Critical,
    ),
    (
        r"\b(?:curl|wget)\b[^|;&]*\|\s*(?:sudo\s+)?(?:python[0-9.]*|perl|ruby|node|php)\b",
        "Remote code execution: downloaded content piped into an interpreter",
        Severity::Critical,
    ),
    (
        r"\b(?:ba|z|da)?sh\s+<\(\s*(?:curl|wget)\b|\beval\s+[\x22']?\$\(\s*(?:curl|wget)\b",
        "Remote code execution: downloaded content evaluated by the shell",
        Severity::Critical,
    ),
    (
        r":\(\)\s*\{\s*:\s*\|\s*:\s*&\s*\}\s*;\s*:",
        "Fork bomb",
        Severity::Critical,
    ),
    (
        r"\bmkfs(?:\.[a-z0-9]+)?\b",
        "Filesystem format",
        Severity::Critical,
    ),
    (
        r"\bdd\b[^;&|]*\bof=/dev/(?:sd|hd|nvme|vd|xvd|disk|mmcblk)",
        "Raw overwrite of a block device",
        Severity::Critical,
    ),
    (
        r">\s*/dev/(?:sd[a-z]|hd[a-z]|nvme[0-9]|vd[a-z]|xvd[a-z]|disk[0-9]|mmcblk[0-9])",
        "Redirect onto a block device",
        Severity::Critical,
    ),
    (
        r">\s*/etc/(?:passwd|shadow|sudoers|group)\b",
        "Overwrite of system account or sudo configuration",
        Severity::Critical,
    ),
    (
        r"\bbase64\s+(?:-d|--decode|-D)\b[^;&]*\|\s*(?:ba|z|da)?sh\b",
        "Obfuscated payload: decoded base64 piped into a shell",
        Severity::Critical,
    ),
    (
        r"\b(?:curl|wget)\b[^;&|]*(?:-d|--data(?:-binary|-raw)?|-F|--form|-T|--upload-file|--post-file)[=\s]+@?\S*(?:\.ssh/|\.aws/|\.gnupg/|\.env\b|/etc/shadow|/etc/passwd|id_rsa|id_ed25519)",
        "Credential exfiltration over the network",
        Severity::Critical,
    ),
    (
        r"\bsudo\b",
        "Privilege escalation via sudo",
        Severity::High,
    ),
    (
        r"(?:^|[;&|]\s*)(?:su|doas|pkexec)(?:\s|$)",
        "Privilege escalation via user switching",
        Severity::High,
    ),
    (
        r"/dev/(?:tcp|udp)/",
        "Raw network socket (reverse shell pattern)",
        Severity::High,
    ),
    (
        r"\b(?:nc|ncat|netcat)\b[^;&|]*\s-[ec]\s",
        "Netcat with command execution (reverse shell pattern)",
        Severity::High,
    ),
    (
        r"\bchmod\s+(?:-[A-Za-z]+\s+)*[0-7]?777\s+/",
        "World-writable permissions on an absolute path",
        Severity::High,
    ),
    (
        r"(?:^|[;&|]\s*)(?:shutdown|reboot|halt|poweroff)\b|\binit\s+[06]\b",
        "Host shutdown or reboot",
        Severity::High,
    ),
    (
        r"\bkill\s+-9\s+-1\b",
        "Killing every process of the user",
        Severity::High,
    ),
    (
        r"\biptables\s+-F\b|\bufw\s+disable\b|\bsetenforce\s+0\b",
        "Disabling host firewall or mandatory access control",
        Severity::High,
    ),
    (
        r"(?:>>?|\btee\s+(?:-a\s+)?)\s*(?:~|\$HOME)/\.(?:bashrc|bash_profile|zshrc|profile)\b",
        "Persistence via shell startup file",
        Severity::High,
    ),
    (
        r">>?\s*\S*\.ssh/authorized_keys\b",
        "Tampering with SSH authorized keys",
        Severity::High,
    ),
    (
        r"\bhistory\s+-c\b|\bunset\s+HISTFILE\b",
        "Clearing shell history",
        Severity::Medium,
    ),
    (
        r"\bcrontab\s+-r\b",
        "Removing all scheduled jobs",
        Severity::Medium,
    ),
];

/// Read-only verbs that may run without approval.
const ALLOWED_VERBS: &[&str] = &[
    "ls", "pwd", "echo", "printf", "cat", "head", "tail", "wc", "sort", "uniq", "cut", "tr",
    "nl", "column", "grep", "egrep", "fgrep", "rg", "jq", "date", "cal", "whoami", "id",
    "hostname", "uname", "uptime", "free", "which", "type", "file", "stat", "du", "df", "ps",
    "tree", "diff", "cmp", "basename", "dirname", "realpath", "readlink", "true", "false",
];

/// Flags that make an allowlisted verb run another program.
const EXEC_FLAGS: &[(&str, &[&str])] = &[
    ("rg", &["--pre", "--pre-glob"]),
    ("sort", &["--compress-program"]),
];

/// Command prefixes that always need an explicit decision.
const APPROVAL_PREFIXES: &[&str] = &[
    "npm install", "npm i", "npm uninstall", "npm publish", "npx", "yarn add", "pnpm add",
    "pip install", "pip3 install", "pip uninstall", "cargo install", "gem install",
    "go install", "apt install", "apt-get install", "apt remove", "apt-get remove",
    "brew install", "brew uninstall", "git push", "git commit", "git reset", "git clean",
    "git checkout", "git rebase", "git merge", "rm", "rmdir", "mv", "cp", "chmod", "chown",
    "ln", "docker", "podman", "kubectl", "helm", "terraform", "curl", "wget", "ssh", "scp",
    "rsync", "kill", "pkill", "killall", "systemctl", "service", "launchctl", "crontab",
];

static SENSITIVE_PATH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"\.ssh(?:/|\b)",
        r"|\bid_(?:rsa|dsa|ecdsa|ed25519)\b",
        r"|\.(?:pem|key|p12|pfx)\b",
        r"|\.aws/(?:credentials|config)\b",
        r"|\.config/gcloud\b|\.azure/|\.kube/config\b|\.docker/config\.json\b",
        r"|(?:^|[\s/'\x22=])\.env(?:\.[A-Za-z0-9_]+)?(?:$|[\s'\x22;|&])",
        r"|\.netrc\b|\.npmrc\b|\.pypirc\b|\.git-credentials\b|\.gnupg/",
        r"|/etc/(?:shadow|gshadow|sudoers|master\.passwd)\b",
        r"|/proc/[^/\s]+/(?:task/[^/\s]+/)?environ\b",
    ))
    .unwrap()
});

static BUILTIN: LazyLock<SignatureStore> = LazyLock::new(|| {
    SignatureStore::compile(&[], &[]).expect("built-in signatures are valid")
});

/// Immutable classification tables.
#[derive(Debug, Clone)]
pub struct SignatureStore {
    blocked: Vec<CommandSignature>,
    allowed_verbs: Vec<String>,
    approval_prefixes: Vec<String>,
}

impl SignatureStore {
    /// The process-wide built-in store.
    pub fn builtin() -> &'static SignatureStore {
        &BUILTIN
    }

    /// Built-in tables plus operator additions. Built-in signatures keep
    /// priority over extras.
    pub fn with_extras(config: &ClassifierConfig) -> Result<Self, GateError> {
        let extra_blocked: Vec<(&str, &str, Severity)> = config
            .extra_blocked
            .iter()
            .map(|s| (s.pattern.as_str(), s.reason.as_str(), s.severity))
            .collect();
        let store = Self::compile(&extra_blocked, &config.extra_approval_prefixes)?;
        info!(
            blocked = store.blocked.len(),
            prefixes = store.approval_prefixes.len(),
            "Signature store loaded"
        );
        Ok(store)
    }

    fn compile(
        extra_blocked: &[(&str, &str, Severity)],
        extra_prefixes: &[String],
    ) -> Result<Self, GateError> {
        let blocked = BLOCKED
            .iter()
            .chain(extra_blocked.iter())
            .map(|(p, r, s)| CommandSignature::new(p, r, *s))
            .collect::<Result<Vec<_>, _>>()?;
        let approval_prefixes = APPROVAL_PREFIXES
            .iter()
            .map(|p| p.to_string())
            .chain(extra_prefixes.iter().map(|p| p.trim().to_string()))
            .filter(|p| !p.is_empty())
            .collect();
        Ok(Self {
            blocked,
            allowed_verbs: ALLOWED_VERBS.iter().map(|v| v.to_string()).collect(),
            approval_prefixes,
        })
    }

    pub fn blocked(&self) -> &[CommandSignature] {
        &self.blocked
    }

    /// First blocked signature matching `command`, in priority order.
    pub fn first_blocked_match(&self, command: &str) -> Option<&CommandSignature> {
        self.blocked.iter().find(|sig| sig.pattern.is_match(command))
    }

    pub fn is_allowed_verb(&self, verb: &str) -> bool {
        self.allowed_verbs.iter().any(|v| v == verb)
    }

    /// The first flag in `segment` that lets `verb` execute another
    /// program, in either `--flag value` or `--flag=value` form.
    pub fn exec_flag<'a>(&self, verb: &str, segment: &'a str) -> Option<&'a str> {
        let (_, flags) = EXEC_FLAGS.iter().find(|(v, _)| *v == verb)?;
        segment.split_whitespace().skip(1).find(|token| {
            let name = token.split_once('=').map_or(*token, |(name, _)| name);
            flags.contains(&name)
        })
    }

    /// The approval prefix `command` starts with (on a word boundary) or equals.
    pub fn approval_prefix(&self, command: &str) -> Option<&str> {
        self.approval_prefixes
            .iter()
            .find(|p| {
                command == p.as_str()
                    || command
                        .strip_prefix(p.as_str())
                        .is_some_and(|rest| rest.starts_with(char::is_whitespace))
            })
            .map(String::as_str)
    }

    pub fn references_sensitive_path(&self, command: &str) -> bool {
        SENSITIVE_PATH_RE.is_match(command)
    }
}
