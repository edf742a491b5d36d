//! Source file listing, decoding, and guarded writes.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use thiserror::Error;
use tracing::{debug, instrument};
use walkdir::WalkDir;

use crate::io::sandbox::Sandbox;

const SKIPPED_DIRS: &[&str] = &["__pycache__"];

#[derive(Debug, Error, PartialEq, Eq)]
#[error("{} is {size} bytes, above the {limit} byte limit", .path.display())]
pub struct FileTooLarge {
    pub path: PathBuf,
    pub size: u64,
    pub limit: u64,
}

/// Recursively list files under `dir` whose extension is in `extensions`.
///
/// `__pycache__` directories and entries named in `ignore` are skipped. The
/// result is sorted so runs are deterministic.
pub fn list_source_files(
    dir: &Path,
    extensions: &[String],
    ignore: &[String],
) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(anyhow!("target directory not found: {}", dir.display()));
    }
    let skipped = |name: &str| SKIPPED_DIRS.contains(&name) || ignore.iter().any(|i| i == name);

    let mut files = Vec::new();
    let walker = WalkDir::new(dir).follow_links(false).into_iter().filter_entry(|entry| {
        entry.depth() == 0 || !skipped(&entry.file_name().to_string_lossy())
    });
    for entry in walker {
        let entry = entry.with_context(|| format!("walk {}", dir.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        if has_extension(entry.path(), extensions) {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}

fn has_extension(path: &Path, extensions: &[String]) -> bool {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return false;
    };
    extensions
        .iter()
        .any(|e| e.trim_start_matches('.').eq_ignore_ascii_case(ext))
}

/// Read a source file as UTF-8 (BOM stripped), falling back to Latin-1.
pub fn read_source(path: &Path) -> Result<String> {
    let bytes = fs::read(path).with_context(|| format!("read {}", path.display()))?;
    Ok(decode(bytes))
}

fn decode(bytes: Vec<u8>) -> String {
    let body = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(&bytes[..]);
    match std::str::from_utf8(body) {
        Ok(text) => text.to_string(),
        Err(_) => body.iter().map(|&b| char::from(b)).collect(),
    }
}

/// Fail with [`FileTooLarge`] when `path` exceeds `limit` bytes.
pub fn ensure_within_size(path: &Path, limit: u64) -> Result<u64> {
    let size = fs::metadata(path)
        .with_context(|| format!("stat {}", path.display()))?
        .len();
    if size > limit {
        return Err(FileTooLarge {
            path: path.to_path_buf(),
            size,
            limit,
        }
        .into());
    }
    Ok(size)
}

/// `<file>.<ext>.bak` next to `path`.
pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".bak");
    path.with_file_name(name)
}

/// The only writer of target files.
#[derive(Debug, Clone)]
pub struct FileStore {
    sandbox: Sandbox,
}

impl FileStore {
    pub fn new(sandbox: Sandbox) -> Self {
        Self { sandbox }
    }

    pub fn sandbox(&self) -> &Sandbox {
        &self.sandbox
    }

    /// Sandbox check, parent creation, single-generation backup, then write.
    ///
    /// A path outside the sandbox fails with a
    /// [`SandboxViolation`](crate::io::sandbox::SandboxViolation) that callers
    /// can recover with `downcast_ref`.
    #[instrument(skip_all, fields(path = %path.display(), bytes = text.len()))]
    pub fn write(&self, path: &Path, text: &str) -> Result<PathBuf> {
        let resolved = self.sandbox.ensure_contains(path)?;
        if let Some(parent) = resolved.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create directory {}", parent.display()))?;
        }
        if resolved.is_file() {
            let backup = backup_path(&resolved);
            fs::copy(&resolved, &backup)
                .with_context(|| format!("backup {} to {}", resolved.display(), backup.display()))?;
            debug!(backup = %backup.display(), "backup written");
        }
        fs::write(&resolved, text).with_context(|| format!("write {}", resolved.display()))?;
        Ok(resolved)
    }
}
