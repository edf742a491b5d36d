//! Auditor agent: deterministic rules plus an oracle review of one file.

use std::path::Path;

use anyhow::Result;
use serde_json::json;
use tracing::{info, instrument};

use crate::core::rules::RuleSet;
use crate::core::types::{AuditReport, AuditStatus, resolve_status};
use crate::io::config::Sampling;
use crate::io::experiment_log::{ActionKind, ExperimentEntry, ExperimentLog, LogStatus};
use crate::io::oracle::{CompletionRequest, Oracle};
use crate::io::prompt::PromptSet;

use super::oracle_text;

pub const AUDITOR_AGENT: &str = "AuditorAgent";
pub const AUDITOR_SYSTEM_PROMPT: &str = "You are a meticulous Python code auditor. \
You review one file at a time and report concrete defects, security risks and missing logging. \
You never rewrite the code.";

pub struct Auditor<'a, O, L> {
    oracle: &'a O,
    log: &'a L,
    prompts: &'a PromptSet,
    rules: RuleSet,
    sampling: Sampling,
}

impl<'a, O: Oracle, L: ExperimentLog> Auditor<'a, O, L> {
    pub fn new(
        oracle: &'a O,
        log: &'a L,
        prompts: &'a PromptSet,
        rules: RuleSet,
        sampling: Sampling,
    ) -> Self {
        Self {
            oracle,
            log,
            prompts,
            rules,
            sampling,
        }
    }

    /// Audit one file. Oracle failures become feedback text; only prompt
    /// rendering can fail.
    #[instrument(skip_all, fields(path = %path.display(), require_logging))]
    pub fn audit(&self, path: &Path, code: &str, require_logging: bool) -> Result<AuditReport> {
        let findings = self.rules.evaluate(code, require_logging);
        let user = self.prompts.render_auditor(code)?;
        let feedback = oracle_text(
            self.oracle,
            &CompletionRequest::new(AUDITOR_SYSTEM_PROMPT, user, self.sampling),
        );

        let report = AuditReport {
            path: path.to_path_buf(),
            status: resolve_status(&findings),
            findings,
            feedback,
        };
        info!(status = ?report.status, findings = report.findings.len(), "audit finished");

        self.log.record(ExperimentEntry::new(
            AUDITOR_AGENT,
            self.oracle.model(),
            ActionKind::Analysis,
            json!({
                "input_prompt": AUDITOR_SYSTEM_PROMPT,
                "output_response": &report,
            }),
            if report.status == AuditStatus::Pass {
                LogStatus::Success
            } else {
                LogStatus::Review
            },
        ));
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Severity;
    use crate::io::config::OracleConfig;
    use crate::io::oracle::OracleError;
    use crate::test_support::{RecordingLog, ScriptedOracle};

    fn audit_with(
        oracle: &ScriptedOracle,
        log: &RecordingLog,
        code: &str,
        logging: bool,
    ) -> AuditReport {
        let prompts = PromptSet::builtin().expect("prompts");
        let auditor = Auditor::new(
            oracle,
            log,
            &prompts,
            RuleSet::default(),
            OracleConfig::default().auditor,
        );
        auditor.audit(Path::new("/p/app.py"), code, logging).expect("audit")
    }

    #[test]
    fn clean_code_passes_and_logs_success() {
        let oracle = ScriptedOracle::new().with_auditor_reply(Ok("Looks fine.".to_string()));
        let log = RecordingLog::default();
        let report = audit_with(&oracle, &log, "def add(a, b):\n    return a + b\n", false);

        assert_eq!(report.status, AuditStatus::Pass);
        assert!(report.findings.is_empty());
        assert_eq!(report.feedback, "Looks fine.");

        let entries = log.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].agent, AUDITOR_AGENT);
        assert_eq!(entries[0].status, LogStatus::Success);
        assert_eq!(entries[0].details["output_response"]["status"], "PASS");
    }

    #[test]
    fn forbidden_call_fails_with_high_finding() {
        let oracle = ScriptedOracle::new();
        let log = RecordingLog::default();
        let report = audit_with(&oracle, &log, "import os\nos.system(\"rm -rf /\")\n", false);

        assert_eq!(report.status, AuditStatus::Fail);
        assert_eq!(report.severities(), vec![Severity::High]);
        assert_eq!(log.entries()[0].status, LogStatus::Review);
    }

    #[test]
    fn oracle_error_becomes_feedback() {
        let oracle = ScriptedOracle::new()
            .with_auditor_reply(Err(OracleError::Transport("connection refused".to_string())));
        let log = RecordingLog::default();
        let report = audit_with(&oracle, &log, "x = 1\n", true);

        assert_eq!(report.feedback, "[LLM unavailable] request failed: connection refused");
        assert_eq!(report.status, AuditStatus::Warn);
    }

    #[test]
    fn full_file_text_reaches_the_oracle() {
        let oracle = ScriptedOracle::new();
        let log = RecordingLog::default();
        audit_with(&oracle, &log, "VALUE = 41 + 1\n", false);

        let requests = oracle.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].system, AUDITOR_SYSTEM_PROMPT);
        assert!(requests[0].user.contains("VALUE = 41 + 1"));
        assert_eq!(requests[0].max_tokens, 600);
    }
}
