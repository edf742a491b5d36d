//! Judge agent: turn test and lint output into a SUCCESS or RETRY decision.

use anyhow::Result;
use serde_json::json;
use tracing::{info, instrument};

use crate::core::types::Judgement;
use crate::core::verdict::{VerdictPolicy, parse_verdict};
use crate::io::config::Sampling;
use crate::io::experiment_log::{ActionKind, ExperimentEntry, ExperimentLog, LogStatus};
use crate::io::oracle::{CompletionRequest, Oracle};
use crate::io::prompt::PromptSet;

use super::oracle_text;

pub const JUDGE_AGENT: &str = "JudgeAgent";
pub const JUDGE_SYSTEM_PROMPT: &str = "You are a strict release judge for a Python project. \
You read test and lint output and answer with one JSON object.";

pub struct Judge<'a, O, L> {
    oracle: &'a O,
    log: &'a L,
    prompts: &'a PromptSet,
    policy: VerdictPolicy,
    sampling: Sampling,
}

impl<'a, O: Oracle, L: ExperimentLog> Judge<'a, O, L> {
    pub fn new(
        oracle: &'a O,
        log: &'a L,
        prompts: &'a PromptSet,
        policy: VerdictPolicy,
        sampling: Sampling,
    ) -> Self {
        Self {
            oracle,
            log,
            prompts,
            policy,
            sampling,
        }
    }

    /// An unreachable oracle or unparseable reply falls back to the tool
    /// output alone; only prompt rendering can fail.
    #[instrument(skip_all)]
    pub fn evaluate(&self, test_output: &str, lint_output: &str) -> Result<Judgement> {
        let user = self.prompts.render_judge(test_output, lint_output)?;
        let request = CompletionRequest::new(JUDGE_SYSTEM_PROMPT, user, self.sampling);
        let reply = oracle_text(self.oracle, &request);
        let parsed = parse_verdict(&reply);
        let parsed_ok = parsed.parsed;
        let judgement = self.policy.decide(parsed, test_output, lint_output, reply);
        info!(
            decision = judgement.decision.as_str(),
            parsed = parsed_ok,
            "judgement reached"
        );

        self.log.record(ExperimentEntry::new(
            JUDGE_AGENT,
            self.oracle.model(),
            ActionKind::Analysis,
            json!({
                "input_prompt": request.user,
                "output_response": &judgement,
            }),
            if judgement.is_success() {
                LogStatus::Success
            } else {
                LogStatus::Review
            },
        ));
        Ok(judgement)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Decision;
    use crate::core::verdict::{FORCED_SUCCESS_REASON, UNPARSED_REASON};
    use crate::io::config::OracleConfig;
    use crate::io::oracle::OracleError;
    use crate::test_support::{RecordingLog, ScriptedOracle};

    const PASSING: &str = "===== 3 passed in 0.02s =====";
    const FAILING: &str = "FAILED test_app.py::test_clean\n===== 1 failed, 2 passed in 0.05s =====";
    const COSMETIC_LINT: &str = "app.py:1:0: C0114: Missing module docstring (missing-module-docstring)";

    fn judge_with(oracle: &ScriptedOracle, log: &RecordingLog) -> Judgement {
        judge_outputs(oracle, log, PASSING, COSMETIC_LINT)
    }

    fn judge_outputs(
        oracle: &ScriptedOracle,
        log: &RecordingLog,
        test: &str,
        lint: &str,
    ) -> Judgement {
        let prompts = PromptSet::builtin().expect("prompts");
        let judge = Judge::new(
            oracle,
            log,
            &prompts,
            VerdictPolicy::default(),
            OracleConfig::default().judge,
        );
        judge.evaluate(test, lint).expect("evaluate")
    }

    #[test]
    fn oracle_success_is_trusted() {
        let oracle = ScriptedOracle::new().with_judge(vec![Ok(
            r#"{"decision": "SUCCESS", "reason": "All green."}"#.to_string(),
        )]);
        let log = RecordingLog::default();

        let judgement = judge_with(&oracle, &log);
        assert_eq!(judgement.decision, Decision::Success);
        assert_eq!(judgement.reason, "All green.");
        assert_eq!(log.entries()[0].agent, JUDGE_AGENT);
        assert_eq!(log.entries()[0].status, LogStatus::Success);

        let request = &oracle.requests()[0];
        assert_eq!(request.system, JUDGE_SYSTEM_PROMPT);
        assert!(request.user.contains("3 passed"));
        assert!(request.user.contains("C0114"));
    }

    #[test]
    fn retry_on_cosmetic_lint_is_overridden() {
        let oracle = ScriptedOracle::new().with_judge(vec![Ok(
            r#"{"decision": "RETRY", "reason": "Add a docstring.", "failed_files": ["app.py"]}"#
                .to_string(),
        )]);
        let log = RecordingLog::default();

        let judgement = judge_with(&oracle, &log);
        assert_eq!(judgement.decision, Decision::Success);
        assert_eq!(judgement.reason, FORCED_SUCCESS_REASON);
    }

    #[test]
    fn retry_with_failing_tests_keeps_details() {
        let oracle = ScriptedOracle::new().with_judge(vec![Ok(format!(
            "Sure:\n```json\n{}\n```",
            r#"{"decision": "RETRY", "reason": "test_clean fails.", "suggested_fix": "Guard the path.", "failed_files": ["app.py"]}"#
        ))]);
        let log = RecordingLog::default();

        let judgement = judge_outputs(&oracle, &log, FAILING, COSMETIC_LINT);
        assert_eq!(judgement.decision, Decision::Retry);
        assert_eq!(judgement.reason, "test_clean fails.");
        assert_eq!(judgement.suggested_fix, "Guard the path.");
        assert_eq!(judgement.failed_files, vec!["app.py".to_string()]);
        assert_eq!(log.entries()[0].status, LogStatus::Review);
    }

    #[test]
    fn unparsed_reply_with_failures_explains_from_output() {
        let oracle = ScriptedOracle::new().with_judge(vec![Ok("It looks bad.".to_string())]);
        let log = RecordingLog::default();

        let judgement = judge_outputs(&oracle, &log, FAILING, "");
        assert_eq!(judgement.decision, Decision::Retry);
        assert_ne!(judgement.reason, UNPARSED_REASON);
        assert!(judgement.reason.contains("1 failed"));
        assert_eq!(judgement.feedback, "It looks bad.");
    }

    #[test]
    fn unreachable_oracle_with_clean_output_succeeds() {
        let oracle = ScriptedOracle::new()
            .with_judge(vec![Err(OracleError::Timeout { seconds: 120 })]);
        let log = RecordingLog::default();

        let judgement = judge_with(&oracle, &log);
        assert_eq!(judgement.decision, Decision::Success);
        assert!(judgement.feedback.starts_with("[LLM unavailable]"));
    }
}
