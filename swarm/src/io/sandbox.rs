//! Write containment: every target path must resolve inside one root.

use std::env;
use std::fs;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("SECURITY VIOLATION: attempt to access path outside sandbox: {}", .path.display())]
pub struct SandboxViolation {
    /// The resolved path that escaped the root.
    pub path: PathBuf,
    pub root: PathBuf,
}

#[derive(Debug, Clone)]
pub struct Sandbox {
    root: PathBuf,
}

impl Sandbox {
    /// The root must exist; it is canonicalized once.
    pub fn new(root: &Path) -> Result<Self> {
        let root = fs::canonicalize(root)
            .with_context(|| format!("resolve sandbox root {}", root.display()))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `path` and return it when it lies inside the root.
    ///
    /// Relative paths resolve against the working directory. Symlinks are
    /// followed for the longest existing prefix; the remainder is applied
    /// lexically. Escapes are reported as [`SandboxViolation`].
    pub fn ensure_contains(&self, path: &Path) -> Result<PathBuf> {
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            env::current_dir()
                .context("read working directory")?
                .join(path)
        };
        let resolved = resolve_existing_prefix(&absolute);
        if resolved.starts_with(&self.root) {
            Ok(resolved)
        } else {
            Err(SandboxViolation {
                path: resolved,
                root: self.root.clone(),
            }
            .into())
        }
    }
}

fn resolve_existing_prefix(absolute: &Path) -> PathBuf {
    for ancestor in absolute.ancestors() {
        let Ok(base) = fs::canonicalize(ancestor) else {
            continue;
        };
        let rest = absolute.strip_prefix(ancestor).unwrap_or(Path::new(""));
        return apply_lexically(base, rest);
    }
    apply_lexically(PathBuf::new(), absolute)
}

fn apply_lexically(mut base: PathBuf, rest: &Path) -> PathBuf {
    for component in rest.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                base.pop();
            }
            other => base.push(other.as_os_str()),
        }
    }
    base
}
