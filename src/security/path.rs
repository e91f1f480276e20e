//! Filename sanitization and workspace containment
//!
//! Every filename in this service comes from the caller, and the caller is
//! driven by a language model. Two rules apply:
//!
//! ```text
//! upload   "../../etc/cron.d/x"  ──sanitize──►  "etc/cron.d/x"   (stripped)
//! upload   "/abs/path.py"        ──sanitize──►  "abs/path.py"    (stripped)
//! execute  "../secret.py"        ──resolve───►  InvalidPath      (rejected)
//! ```
//!
//! Uploads are normalized so they always land inside the workspace. Lookups are
//! strict: anything that is not a plain relative path is refused, and the
//! final location is canonicalized so a symlink cannot point the interpreter
//! outside the workspace.

use std::path::{Component, Path, PathBuf};

use crate::error::{Result, SandboxError};

/// Normalize an uploaded filename into a relative path inside a workspace
///
/// Separators `/` and `\` are both honoured. Empty, `.` and `..` segments are
/// dropped, which also removes any absolute prefix. Fails with `InvalidPath`
/// when nothing usable remains or a segment contains a NUL byte.
pub fn sanitize_filename(name: &str) -> Result<PathBuf> {
    let mut clean = PathBuf::new();

    for segment in name.split(['/', '\\']) {
        match segment {
            "" | "." | ".." => continue,
            s if s.contains('\0') => {
                return Err(SandboxError::InvalidPath(name.escape_debug().to_string()));
            }
            // Drive prefixes such as "C:" would make the join absolute on Windows
            s if s.ends_with(':') => continue,
            s => clean.push(s),
        }
    }

    if clean.as_os_str().is_empty() {
        return Err(SandboxError::InvalidPath(name.escape_debug().to_string()));
    }
    Ok(clean)
}

/// Join a caller-supplied relative path onto `root`, refusing escapes
///
/// Absolute paths, `..` segments, backslashes and NUL bytes are rejected
/// outright. When the target exists it is canonicalized and must still sit
/// under the canonical root.
pub fn resolve_within(root: &Path, name: &str) -> Result<PathBuf> {
    let invalid = || SandboxError::InvalidPath(name.escape_debug().to_string());

    if name.is_empty() || name.contains('\0') || name.contains('\\') {
        return Err(invalid());
    }

    let relative = Path::new(name);
    let mut joined = root.to_path_buf();
    for component in relative.components() {
        match component {
            Component::Normal(part) => joined.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(invalid());
            }
        }
    }

    if joined == root {
        return Err(invalid());
    }

    // Symlinks created by executed code must not lead back out
    if let Ok(real) = joined.canonicalize() {
        let real_root = root.canonicalize()?;
        if !real.starts_with(&real_root) {
            return Err(invalid());
        }
    }

    Ok(joined)
}
