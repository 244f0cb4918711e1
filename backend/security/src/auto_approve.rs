//! Auto-approval for low-risk workspace file operations.
//!
//! An interactive user creating or moving files inside their own workspace
//! should not be prompted for every `mkdir`. Anything outside that narrow
//! shape still goes through the approval coordinator.

use clawgate_core::RequestSource;
use std::path::{Component, Path, PathBuf};

/// Characters that would let a command do more than its visible operands.
const SHELL_METACHARS: &[char] = &[
    ';', '|', '&', '$', '`', '<', '>', '(', ')', '{', '}', '*', '?', '[', ']', '~', '!', '\\',
    '\'', '"', '\n', '\r',
];

#[derive(Debug, Clone)]
pub struct AutoApproveContext {
    pub source: RequestSource,
    pub workspace_root: Option<PathBuf>,
    /// Directory relative operands are resolved against; defaults to the
    /// workspace root.
    pub cwd: Option<PathBuf>,
}

impl AutoApproveContext {
    pub fn new(source: RequestSource, workspace_root: Option<PathBuf>) -> Self {
        Self { source, workspace_root, cwd: None }
    }
}

fn allowed_flags(verb: &str) -> Option<&'static [&'static str]> {
    match verb {
        "mkdir" => Some(&["-p", "-v"]),
        "touch" => Some(&["-c"]),
        "cp" => Some(&["-r", "-R", "-p", "-v", "-n"]),
        "mv" => Some(&["-v", "-n"]),
        _ => None,
    }
}

fn min_operands(verb: &str) -> usize {
    match verb {
        "cp" | "mv" => 2,
        _ => 1,
    }
}

/// Resolve `.` and `..` without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Whether `path` stays under the workspace once symlinks are followed.
/// Only the deepest entry that already exists inside `root` is resolved;
/// anything below it is created by the command itself.
fn resolves_inside(path: &Path, root: &Path, real_root: &Path) -> bool {
    let Some(existing) = path
        .ancestors()
        .take_while(|p| p.starts_with(root))
        .find(|p| p.symlink_metadata().is_ok())
    else {
        return true;
    };
    // A dangling link fails to canonicalize and is rejected.
    existing.canonicalize().is_ok_and(|real| real.starts_with(real_root))
}

/// Whether `command` may skip the approval prompt.
pub fn should_auto_approve(command: &str, ctx: &AutoApproveContext) -> bool {
    if ctx.source != RequestSource::Interactive {
        return false;
    }
    let Some(root) = ctx.workspace_root.as_deref() else {
        return false;
    };
    if !root.is_absolute() || command.contains(SHELL_METACHARS) {
        return false;
    }

    let mut tokens = command.split_whitespace();
    let Some(verb) = tokens.next() else {
        return false;
    };
    let Some(flags) = allowed_flags(verb) else {
        return false;
    };

    let root = normalize(root);
    let real_root = root.canonicalize().unwrap_or_else(|_| root.clone());
    let base = ctx.cwd.as_deref().map(normalize).unwrap_or_else(|| root.clone());
    let mut operands = 0;
    for token in tokens {
        if token.starts_with('-') {
            if !flags.contains(&token) {
                return false;
            }
            continue;
        }
        let resolved = normalize(&base.join(token));
        if !resolved.starts_with(&root) || resolved == root {
            return false;
        }
        if !resolves_inside(&resolved, &root, &real_root) {
            return false;
        }
        operands += 1;
    }
    operands >= min_operands(verb)
}
