//! Judge verdict parsing and the deterministic override.
//!
//! The oracle proposes a decision; this module decides. Lint lines carrying a
//! cosmetic rule code are ignored, and a non-SUCCESS proposal is forced to
//! SUCCESS when neither the tests nor the remaining lint report a problem.

use std::sync::LazyLock;

use serde_json::{Map, Value};

use crate::core::reply;
use crate::core::types::{Decision, Judgement};

pub const UNPARSED_REASON: &str = "Unable to parse LLM output as JSON";
pub const FORCED_SUCCESS_REASON: &str =
    "Tests pass and only cosmetic linting issues remain (ignored).";
pub const EMPTY_REASON: &str = "No issues detected.";

/// Pylint codes for docstrings, line length, import order and whitespace.
pub const DEFAULT_COSMETIC_CODES: &[&str] = &[
    "C0114", "C0115", "C0116", "C0301", "C0411", "C0412", "C0413", "C0303", "C0304", "C0305",
    "C0321",
];

/// Tallies such as `0 failed`, `no errors` or `0 test failures` are not mentions.
static ZERO_TALLY: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"(?i)\b(?:0|no|zero)\s+(?:[a-z-]+\s+)?(?:failed|failures?|fails?|errors?)\b")
        .unwrap()
});
static FAIL_OR_ERROR: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"(?i)fail|error").unwrap());
static ERROR_WORD: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"(?i)error").unwrap());
/// Pylint error and fatal message codes.
static LINT_ERROR_CODE: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"\b[EF]\d{4}\b").unwrap());

/// Fields read from the oracle's reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedVerdict {
    pub decision: Decision,
    pub reason: String,
    pub suggested_fix: String,
    pub failed_files: Vec<String>,
    /// Whether the reply contained a JSON object at all.
    pub parsed: bool,
}

impl ParsedVerdict {
    pub fn unparsed() -> Self {
        Self {
            decision: Decision::Retry,
            reason: UNPARSED_REASON.to_string(),
            suggested_fix: String::new(),
            failed_files: Vec::new(),
            parsed: false,
        }
    }
}

pub fn parse_verdict(reply: &str) -> ParsedVerdict {
    let stripped = reply::strip_code_fences(reply);
    let Some(map) = reply::parse_json_object(stripped) else {
        return ParsedVerdict::unparsed();
    };

    let decision = match map.get("decision").and_then(Value::as_str) {
        Some(d) if d.trim().eq_ignore_ascii_case("SUCCESS") => Decision::Success,
        _ => Decision::Retry,
    };
    ParsedVerdict {
        decision,
        reason: string_field(&map, "reason"),
        suggested_fix: string_field(&map, "suggested_fix"),
        failed_files: list_field(&map, "failed_files"),
        parsed: true,
    }
}

fn string_field(map: &Map<String, Value>, key: &str) -> String {
    match map.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

fn list_field(map: &Map<String, Value>, key: &str) -> Vec<String> {
    match map.get(key) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
        _ => Vec::new(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerdictPolicy {
    pub cosmetic_codes: Vec<String>,
}

impl Default for VerdictPolicy {
    fn default() -> Self {
        Self {
            cosmetic_codes: DEFAULT_COSMETIC_CODES
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
        }
    }
}

impl VerdictPolicy {
    /// Drop lint lines that carry a cosmetic rule code.
    pub fn filter_cosmetic(&self, lint_output: &str) -> String {
        lint_output
            .lines()
            .filter(|line| !self.cosmetic_codes.iter().any(|code| line.contains(code.as_str())))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Combine the oracle's proposal with the deterministic override.
    pub fn decide(
        &self,
        parsed: ParsedVerdict,
        test_output: &str,
        lint_output: &str,
        feedback: String,
    ) -> Judgement {
        let ParsedVerdict {
            decision,
            reason,
            suggested_fix,
            failed_files,
            parsed,
        } = parsed;

        let (decision, reason) = if decision == Decision::Success {
            (decision, reason)
        } else {
            let filtered = self.filter_cosmetic(lint_output);
            let tests_failing = test_mentions_failure(test_output);
            let lint_failing = lint_mentions_error(&filtered);
            if tests_failing || lint_failing {
                let reason = if parsed && !reason.trim().is_empty() {
                    reason
                } else {
                    failure_reason(test_output, tests_failing, &filtered, lint_failing)
                };
                (Decision::Retry, reason)
            } else {
                (Decision::Success, FORCED_SUCCESS_REASON.to_string())
            }
        };

        let reason = if reason.trim().is_empty() {
            EMPTY_REASON.to_string()
        } else {
            reason
        };

        Judgement {
            decision,
            reason,
            suggested_fix,
            failed_files,
            feedback,
        }
    }
}

pub fn test_mentions_failure(test_output: &str) -> bool {
    let neutral = ZERO_TALLY.replace_all(test_output, "");
    FAIL_OR_ERROR.is_match(&neutral)
}

pub fn lint_mentions_error(filtered_lint: &str) -> bool {
    let neutral = ZERO_TALLY.replace_all(filtered_lint, "");
    ERROR_WORD.is_match(&neutral) || LINT_ERROR_CODE.is_match(&neutral)
}

fn failure_reason(test_output: &str, tests: bool, lint: &str, lint_errors: bool) -> String {
    let mut parts = Vec::new();
    if tests {
        parts.push(describe("Tests still report failures", test_output, |line| {
            test_mentions_failure(line)
        }));
    }
    if lint_errors {
        parts.push(describe("Lint still reports errors", lint, lint_mentions_error));
    }
    parts.join(" ")
}

fn describe(headline: &str, output: &str, offending: impl Fn(&str) -> bool) -> String {
    let lines: Vec<&str> = output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && offending(line))
        .take(3)
        .collect();
    if lines.is_empty() {
        format!("{headline}.")
    } else {
        format!("{headline}: {}.", lines.join("; "))
    }
}
