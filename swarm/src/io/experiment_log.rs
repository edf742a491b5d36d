//! Append-only JSON-lines log of every agent action.
//!
//! This is a product artifact, independent of `RUST_LOG`. Recording never
//! fails the caller: write errors are reported with `warn!` and dropped.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ActionKind {
    Analysis,
    Fix,
    Debug,
    Generation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogStatus {
    Success,
    Failure,
    Review,
    Retry,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentEntry {
    pub agent: String,
    pub model: String,
    pub action: ActionKind,
    pub details: Value,
    pub status: LogStatus,
}

impl ExperimentEntry {
    pub fn new(
        agent: &str,
        model: &str,
        action: ActionKind,
        details: Value,
        status: LogStatus,
    ) -> Self {
        Self {
            agent: agent.to_string(),
            model: model.to_string(),
            action,
            details,
            status,
        }
    }
}

/// One persisted line: the entry plus its timestamp.
#[derive(Debug, Serialize)]
struct LogLine<'a> {
    timestamp: String,
    #[serde(flatten)]
    entry: &'a ExperimentEntry,
}

pub trait ExperimentLog {
    fn record(&self, entry: ExperimentEntry);
}

#[derive(Debug, Clone)]
pub struct JsonlExperimentLog {
    path: PathBuf,
}

impl JsonlExperimentLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, entry: &ExperimentEntry, now: DateTime<Utc>) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("create log dir {}", parent.display()))?;
        }
        let line = LogLine {
            timestamp: now.to_rfc3339_opts(SecondsFormat::Millis, true),
            entry,
        };
        let mut buf = serde_json::to_string(&line).context("serialize experiment entry")?;
        buf.push('\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("open {}", self.path.display()))?;
        file.write_all(buf.as_bytes())
            .with_context(|| format!("append {}", self.path.display()))?;
        Ok(())
    }
}

impl ExperimentLog for JsonlExperimentLog {
    fn record(&self, entry: ExperimentEntry) {
        if let Err(err) = self.append(&entry, Utc::now()) {
            warn!(agent = %entry.agent, err = %format!("{err:#}"), "failed to record experiment entry");
        }
    }
}
