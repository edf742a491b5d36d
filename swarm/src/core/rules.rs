//! Deterministic audit rules.

use crate::core::syntax::{self, SyntaxError};
use crate::core::types::{Finding, Severity};

pub const DEFAULT_FORBIDDEN_CALLS: &[&str] = &[
    "eval",
    "exec",
    "__import__",
    "pickle.loads",
    "os.system",
    "subprocess.*",
];
pub const DEFAULT_LOGGING_MARKER: &str = "log_experiment";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleSet {
    /// Callee names to reject; a trailing `.*` matches any attribute under the prefix.
    pub forbidden_calls: Vec<String>,
    pub logging_marker: String,
}

impl Default for RuleSet {
    fn default() -> Self {
        Self {
            forbidden_calls: DEFAULT_FORBIDDEN_CALLS
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
            logging_marker: DEFAULT_LOGGING_MARKER.to_string(),
        }
    }
}

impl RuleSet {
    /// Evaluate every rule in order; findings accumulate.
    pub fn evaluate(&self, code: &str, require_logging: bool) -> Vec<Finding> {
        let mut findings = Vec::new();

        match syntax::call_sites(code) {
            Ok(calls) => {
                for call in calls {
                    if self.is_forbidden(&call.name) {
                        findings.push(Finding::new(
                            Severity::High,
                            format!("Forbidden usage detected: {} (line {})", call.name, call.line),
                            format!("Remove or replace `{}` with a safe alternative.", call.name),
                        ));
                    }
                }
            }
            Err(err) => {
                let suggestion = match err {
                    SyntaxError::Invalid { line } => {
                        format!("Fix the syntax error near line {line} so the file parses.")
                    }
                    other => format!("Fix the file so it parses ({other})."),
                };
                findings.push(Finding::new(
                    Severity::High,
                    "Syntax error, unable to parse",
                    suggestion,
                ));
            }
        }

        if require_logging && !code.contains(&self.logging_marker) {
            findings.push(Finding::new(
                Severity::Medium,
                format!("No logging detected with {}.", self.logging_marker),
                format!("Add {} calls to track agent actions.", self.logging_marker),
            ));
        }

        if code.contains('\0') {
            findings.push(Finding::new(
                Severity::High,
                "Null byte detected in file.",
                "Clean file encoding and remove binary content.",
            ));
        }

        findings
    }

    pub fn is_forbidden(&self, name: &str) -> bool {
        self.forbidden_calls.iter().any(|pattern| {
            match pattern.strip_suffix(".*") {
                Some(prefix) => name
                    .strip_prefix(prefix)
                    .is_some_and(|rest| rest.starts_with('.')),
                None => name == pattern,
            }
        })
    }
}
