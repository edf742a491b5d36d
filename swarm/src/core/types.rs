//! Shared deterministic types for the audit → fix → judge loop.
//!
//! These types define stable contracts between components and serialize into
//! the experiment log and the CLI summary, so variant names are part of the
//! output format.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Severity attached to a single audit finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
}

/// Overall audit verdict for one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuditStatus {
    Pass,
    Warn,
    Fail,
}

/// One reported problem with a file and its suggested remediation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub severity: Severity,
    pub issue: String,
    pub suggestion: String,
}

impl Finding {
    pub fn new(severity: Severity, issue: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self {
            severity,
            issue: issue.into(),
            suggestion: suggestion.into(),
        }
    }
}

/// Resolve the audit status: any HIGH finding fails, any other finding warns.
pub fn resolve_status(findings: &[Finding]) -> AuditStatus {
    if findings.iter().any(|f| f.severity == Severity::High) {
        AuditStatus::Fail
    } else if findings.is_empty() {
        AuditStatus::Pass
    } else {
        AuditStatus::Warn
    }
}

/// Structured result of auditing one file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditReport {
    pub path: PathBuf,
    pub status: AuditStatus,
    /// Findings in rule order; issue, suggestion and severity stay aligned.
    pub findings: Vec<Finding>,
    /// Oracle review text, stored verbatim (or an error description).
    pub feedback: String,
}

impl AuditReport {
    pub fn issues(&self) -> Vec<String> {
        self.findings.iter().map(|f| f.issue.clone()).collect()
    }

    pub fn suggestions(&self) -> Vec<String> {
        self.findings.iter().map(|f| f.suggestion.clone()).collect()
    }

    pub fn severities(&self) -> Vec<Severity> {
        self.findings.iter().map(|f| f.severity).collect()
    }

    pub fn needs_fix(&self) -> bool {
        self.status != AuditStatus::Pass
    }
}

/// Fix request for one file inside a [`RefactoringPlan`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanEntry {
    pub path: PathBuf,
    pub issues: Vec<String>,
    pub suggestions: Vec<String>,
    /// Reason given by the previous judgement, when retrying.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub judge_feedback: Option<String>,
    /// Replacement text suggested by the previous judgement.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub judge_replacement: Option<String>,
}

impl PlanEntry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            issues: Vec::new(),
            suggestions: Vec::new(),
            judge_feedback: None,
            judge_replacement: None,
        }
    }
}

/// Per-iteration aggregation of every file that needs fixing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefactoringPlan {
    pub iteration: u32,
    pub entries: Vec<PlanEntry>,
    pub summary: String,
    /// Test output from the previous judge phase (empty on the first iteration).
    #[serde(skip)]
    pub test_output: String,
    /// Lint output from the previous judge phase (empty on the first iteration).
    #[serde(skip)]
    pub lint_output: String,
}

impl RefactoringPlan {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A plan entry merged with the plan-wide fields, as handed to the fixer.
#[derive(Debug, Clone, Serialize)]
pub struct FixRequest<'a> {
    pub iteration: u32,
    pub summary: &'a str,
    #[serde(flatten)]
    pub entry: &'a PlanEntry,
    #[serde(skip)]
    pub test_output: &'a str,
    #[serde(skip)]
    pub lint_output: &'a str,
}

impl<'a> FixRequest<'a> {
    pub fn new(plan: &'a RefactoringPlan, entry: &'a PlanEntry) -> Self {
        Self {
            iteration: plan.iteration,
            summary: &plan.summary,
            entry,
            test_output: &plan.test_output,
            lint_output: &plan.lint_output,
        }
    }

    pub fn path(&self) -> &Path {
        &self.entry.path
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FixStatus {
    Success,
    Fail,
}

/// Where the content written by the fixer came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentSource {
    JudgeSuggestion,
    Oracle,
    /// The proposal was discarded and the original content kept.
    Original,
}

/// Outcome of fixing one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixResult {
    pub path: PathBuf,
    pub status: FixStatus,
    pub changes_applied: bool,
    pub original_size: usize,
    pub fixed_size: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<ContentSource>,
    pub syntax_valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FixResult {
    pub fn failed(path: &Path, original: &str, error: impl Into<String>) -> Self {
        let size = original.chars().count();
        Self {
            path: path.to_path_buf(),
            status: FixStatus::Fail,
            changes_applied: false,
            original_size: size,
            fixed_size: size,
            source: None,
            syntax_valid: false,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchStatus {
    Complete,
    PartialSuccess,
    Failure,
}

/// Aggregated outcome of applying a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    /// Plan entries whose path no longer exists on disk.
    pub skipped: usize,
    pub overall_status: BatchStatus,
    pub results: Vec<FixResult>,
}

impl BatchSummary {
    /// Summary for an iteration whose plan had no entries.
    pub fn empty() -> Self {
        Self::from_results(0, 0, Vec::new())
    }

    pub fn from_results(total: usize, skipped: usize, results: Vec<FixResult>) -> Self {
        let successful = results
            .iter()
            .filter(|r| r.status == FixStatus::Success)
            .count();
        let failed = results.len() - successful;
        let overall_status = if failed == 0 {
            BatchStatus::Complete
        } else if successful > 0 {
            BatchStatus::PartialSuccess
        } else {
            BatchStatus::Failure
        };
        Self {
            total,
            successful,
            failed,
            skipped,
            overall_status,
            results,
        }
    }
}

/// Judge decision; the sole authority for loop termination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Decision {
    Success,
    Retry,
}

impl Decision {
    pub fn as_str(self) -> &'static str {
        match self {
            Decision::Success => "SUCCESS",
            Decision::Retry => "RETRY",
        }
    }
}

/// Verdict produced once per iteration after the fix phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Judgement {
    pub decision: Decision,
    pub reason: String,
    #[serde(default)]
    pub suggested_fix: String,
    #[serde(default)]
    pub failed_files: Vec<String>,
    /// Raw oracle reply (or error description).
    #[serde(default)]
    pub feedback: String,
}

impl Judgement {
    pub fn is_success(&self) -> bool {
        self.decision == Decision::Success
    }
}

/// Terminal state of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineStatus {
    Success,
    MaxIterationsReached,
}

/// One append-only history entry per phase per iteration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum PhaseRecord {
    Audit {
        iteration: u32,
        statuses: Vec<AuditStatus>,
        files_needing_fix: usize,
        unreadable: usize,
    },
    Fix {
        iteration: u32,
        total: usize,
        successful: usize,
        failed: usize,
        overall_status: BatchStatus,
    },
    Judge {
        iteration: u32,
        decision: Decision,
        reason: String,
    },
}

impl PhaseRecord {
    pub fn iteration(&self) -> u32 {
        match self {
            PhaseRecord::Audit { iteration, .. }
            | PhaseRecord::Fix { iteration, .. }
            | PhaseRecord::Judge { iteration, .. } => *iteration,
        }
    }

    /// One-line description used in the final summary.
    pub fn describe(&self) -> String {
        match self {
            PhaseRecord::Audit {
                iteration,
                files_needing_fix,
                ..
            } => format!("Iter {iteration}: audit → {files_needing_fix} file(s) need fixing"),
            PhaseRecord::Fix {
                iteration,
                overall_status,
                ..
            } => format!("Iter {iteration}: fix → {overall_status:?}"),
            PhaseRecord::Judge {
                iteration,
                decision,
                ..
            } => format!("Iter {iteration}: judge → {}", decision.as_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(status: FixStatus) -> FixResult {
        FixResult {
            path: PathBuf::from("a.py"),
            status,
            changes_applied: status == FixStatus::Success,
            original_size: 1,
            fixed_size: 1,
            source: Some(ContentSource::Oracle),
            syntax_valid: true,
            error: None,
        }
    }

    #[test]
    fn status_resolution_prefers_high_severity() {
        assert_eq!(resolve_status(&[]), AuditStatus::Pass);
        let medium = Finding::new(Severity::Medium, "no logging", "add logging");
        assert_eq!(resolve_status(std::slice::from_ref(&medium)), AuditStatus::Warn);
        let high = Finding::new(Severity::High, "eval", "remove eval");
        assert_eq!(resolve_status(&[medium, high]), AuditStatus::Fail);
    }

    #[test]
    fn batch_status_reflects_failures() {
        let all_ok = BatchSummary::from_results(2, 0, vec![result(FixStatus::Success); 2]);
        assert_eq!(all_ok.overall_status, BatchStatus::Complete);

        let mixed = BatchSummary::from_results(
            2,
            0,
            vec![result(FixStatus::Success), result(FixStatus::Fail)],
        );
        assert_eq!(mixed.overall_status, BatchStatus::PartialSuccess);
        assert_eq!((mixed.successful, mixed.failed), (1, 1));

        let none = BatchSummary::from_results(1, 0, vec![result(FixStatus::Fail)]);
        assert_eq!(none.overall_status, BatchStatus::Failure);

        assert_eq!(BatchSummary::empty().overall_status, BatchStatus::Complete);
    }

    #[test]
    fn fix_request_serializes_plan_context_without_outputs() {
        let mut entry = PlanEntry::new("pkg/a.py");
        entry.issues.push("eval used".to_string());
        let plan = RefactoringPlan {
            iteration: 2,
            entries: vec![entry],
            summary: "Iteration 2 - 1 files need attention".to_string(),
            test_output: "1 failed".to_string(),
            lint_output: String::new(),
        };
        let request = FixRequest::new(&plan, &plan.entries[0]);
        let json = serde_json::to_value(&request).expect("serialize");
        assert_eq!(json["iteration"], 2);
        assert_eq!(json["path"], "pkg/a.py");
        assert_eq!(json["issues"][0], "eval used");
        assert!(json.get("test_output").is_none());
        assert!(json.get("judge_feedback").is_none());
    }

    #[test]
    fn decision_serializes_uppercase() {
        let json = serde_json::to_string(&Decision::Retry).expect("serialize");
        assert_eq!(json, "\"RETRY\"");
        let status = serde_json::to_string(&PipelineStatus::MaxIterationsReached).expect("ser");
        assert_eq!(status, "\"MAX_ITERATIONS_REACHED\"");
    }
}
