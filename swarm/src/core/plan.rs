//! Per-iteration refactoring plan construction.

use std::path::Path;

use crate::core::types::{AuditReport, Judgement, PlanEntry, RefactoringPlan};

/// Build the plan for `iteration` from this iteration's audit reports.
///
/// A file is planned when its audit did not pass or when the previous
/// judgement named it as failing. Entries keep the order of `reports`.
pub fn build_plan(
    iteration: u32,
    reports: &[AuditReport],
    previous: Option<&Judgement>,
    test_output: &str,
    lint_output: &str,
) -> RefactoringPlan {
    let mut entries: Vec<(PlanEntry, bool)> = Vec::new();

    for report in reports {
        let named = previous.is_some_and(|j| names_file(&j.failed_files, &report.path));
        if !report.needs_fix() && !named {
            continue;
        }
        let mut entry = PlanEntry::new(report.path.clone());
        entry.issues = report.issues();
        entry.suggestions = report.suggestions();
        entries.push((entry, named));
    }

    let single = entries.len() == 1;
    let entries = entries
        .into_iter()
        .map(|(mut entry, named)| {
            if let Some(judgement) = previous {
                carry_judgement(&mut entry, judgement, named || single);
            }
            entry
        })
        .collect::<Vec<_>>();

    RefactoringPlan {
        iteration,
        summary: format!("Iteration {iteration} - {} files need attention", entries.len()),
        entries,
        test_output: test_output.to_string(),
        lint_output: lint_output.to_string(),
    }
}

fn carry_judgement(entry: &mut PlanEntry, judgement: &Judgement, replacement: bool) {
    let reason = judgement.reason.trim();
    if !reason.is_empty() {
        entry.issues.push(format!("Judge feedback: {reason}"));
        entry.judge_feedback = Some(reason.to_string());
    }
    let fix = judgement.suggested_fix.trim();
    if !fix.is_empty() {
        entry.suggestions.push(format!("Judge suggestion: {fix}"));
        if replacement {
            entry.judge_replacement = Some(judgement.suggested_fix.clone());
        }
    }
}

/// Whether `path` is named in `failed_files`, by file name or path suffix.
pub fn names_file(failed_files: &[String], path: &Path) -> bool {
    failed_files.iter().any(|name| {
        let name = Path::new(name.trim());
        !name.as_os_str().is_empty() && path.ends_with(name)
    })
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::core::types::{Decision, Finding, Severity};

    fn report(path: &str, findings: Vec<Finding>) -> AuditReport {
        AuditReport {
            path: PathBuf::from(path),
            status: crate::core::types::resolve_status(&findings),
            findings,
            feedback: String::new(),
        }
    }

    fn retry(reason: &str, fix: &str, failed: &[&str]) -> Judgement {
        Judgement {
            decision: Decision::Retry,
            reason: reason.to_string(),
            suggested_fix: fix.to_string(),
            failed_files: failed.iter().map(|s| (*s).to_string()).collect(),
            feedback: String::new(),
        }
    }

    #[test]
    fn only_failing_reports_are_planned() {
        let reports = vec![
            report("/p/clean.py", vec![]),
            report("/p/bad.py", vec![Finding::new(Severity::High, "eval", "remove eval")]),
        ];
        let plan = build_plan(1, &reports, None, "", "");
        assert_eq!(plan.entries.len(), 1);
        assert_eq!(plan.entries[0].path, PathBuf::from("/p/bad.py"));
        assert_eq!(plan.entries[0].issues, vec!["eval"]);
        assert_eq!(plan.summary, "Iteration 1 - 1 files need attention");
        assert!(plan.entries[0].judge_feedback.is_none());
    }

    #[test]
    fn clean_audit_gives_empty_plan() {
        let plan = build_plan(3, &[report("/p/a.py", vec![])], None, "", "");
        assert!(plan.is_empty());
        assert_eq!(plan.summary, "Iteration 3 - 0 files need attention");
    }

    #[test]
    fn judge_failed_files_are_planned_even_when_audit_passes() {
        let reports = vec![report("/p/pkg/a.py", vec![]), report("/p/pkg/b.py", vec![])];
        let judgement = retry("test_b fails", "", &["b.py"]);
        let plan = build_plan(2, &reports, Some(&judgement), "1 failed", "");
        assert_eq!(plan.entries.len(), 1);
        let entry = &plan.entries[0];
        assert_eq!(entry.path, PathBuf::from("/p/pkg/b.py"));
        assert_eq!(entry.issues, vec!["Judge feedback: test_b fails"]);
        assert_eq!(entry.judge_feedback.as_deref(), Some("test_b fails"));
        assert_eq!(plan.test_output, "1 failed");
    }

    #[test]
    fn replacement_is_attached_to_named_or_single_files() {
        let medium = || vec![Finding::new(Severity::Medium, "no logging", "add logging")];
        let reports = vec![report("/p/a.py", medium()), report("/p/b.py", medium())];
        let judgement = retry("b broken", "def f():\n    return 42\n", &["pkg/../b.py", "b.py"]);
        let plan = build_plan(2, &reports, Some(&judgement), "", "");
        assert_eq!(plan.entries.len(), 2);
        assert!(plan.entries[0].judge_replacement.is_none());
        assert!(plan.entries[1].judge_replacement.is_some());
        assert!(plan.entries.iter().all(|e| e.judge_feedback.is_some()));

        let single = build_plan(2, &reports[..1], Some(&judgement), "", "");
        assert!(single.entries[0].judge_replacement.is_some());
    }

    #[test]
    fn names_match_by_suffix_or_file_name() {
        let path = Path::new("/proj/pkg/util.py");
        assert!(names_file(&["util.py".to_string()], path));
        assert!(names_file(&["pkg/util.py".to_string()], path));
        assert!(!names_file(&["other/util.py".to_string()], path));
        assert!(!names_file(&["til.py".to_string()], path));
        assert!(!names_file(&[String::new()], path));
    }
}
