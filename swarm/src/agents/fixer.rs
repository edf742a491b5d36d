//! Fixer agent: produce, validate and write replacement content per file.

use anyhow::{Context, Result};
use serde_json::json;
use tracing::{info, instrument, warn};

use crate::core::reply;
use crate::core::syntax;
use crate::core::types::{
    BatchSummary, ContentSource, FixRequest, FixResult, FixStatus, RefactoringPlan,
};
use crate::io::config::{FixerConfig, Sampling};
use crate::io::experiment_log::{ActionKind, ExperimentEntry, ExperimentLog, LogStatus};
use crate::io::files::{self, FileStore};
use crate::io::oracle::{CompletionRequest, Oracle};
use crate::io::prompt::PromptSet;
use crate::io::sandbox::SandboxViolation;

use super::unavailable;

pub const FIXER_AGENT: &str = "FixerAgent";
pub const FIXER_SYSTEM_PROMPT: &str = "You are an expert Python engineer. \
You fix the reported issues in one file and reply with the complete corrected file only.";

#[derive(Debug, Clone, Copy)]
pub struct FixSettings {
    pub max_prompt_chars: usize,
    pub min_content_chars: usize,
    pub sampling: Sampling,
}

impl FixSettings {
    pub fn new(fixer: FixerConfig, sampling: Sampling) -> Self {
        Self {
            max_prompt_chars: fixer.max_prompt_chars,
            min_content_chars: fixer.min_content_chars,
            sampling,
        }
    }
}

pub struct Fixer<'a, O, L> {
    oracle: &'a O,
    log: &'a L,
    prompts: &'a PromptSet,
    store: &'a FileStore,
    settings: FixSettings,
}

impl<'a, O: Oracle, L: ExperimentLog> Fixer<'a, O, L> {
    pub fn new(
        oracle: &'a O,
        log: &'a L,
        prompts: &'a PromptSet,
        store: &'a FileStore,
        settings: FixSettings,
    ) -> Self {
        Self {
            oracle,
            log,
            prompts,
            store,
            settings,
        }
    }

    /// Fix every planned file that still exists.
    ///
    /// Only a sandbox violation aborts the batch.
    #[instrument(skip_all, fields(iteration = plan.iteration, entries = plan.entries.len()))]
    pub fn apply_plan(&self, plan: &RefactoringPlan) -> Result<BatchSummary> {
        let mut results = Vec::with_capacity(plan.entries.len());
        let mut skipped = 0;
        for entry in &plan.entries {
            if !entry.path.exists() {
                warn!(path = %entry.path.display(), "planned file no longer exists, skipping");
                skipped += 1;
                continue;
            }
            results.push(self.fix_file(&FixRequest::new(plan, entry))?);
        }
        let summary = BatchSummary::from_results(plan.entries.len(), skipped, results);
        info!(
            successful = summary.successful,
            failed = summary.failed,
            skipped,
            status = ?summary.overall_status,
            "fix batch finished"
        );
        Ok(summary)
    }

    #[instrument(skip_all, fields(path = %request.path().display()))]
    pub fn fix_file(&self, request: &FixRequest<'_>) -> Result<FixResult> {
        let path = request.path();
        let original = files::read_source(path).unwrap_or_else(|err| {
            warn!(error = %format!("{err:#}"), "unreadable file, treating as empty");
            String::new()
        });

        let (candidate, source, prompt) = match self.judge_candidate(request) {
            Some(candidate) => (
                candidate,
                ContentSource::JudgeSuggestion,
                "judge suggestion".to_string(),
            ),
            None => {
                let prompt = match self.render_prompt(request, &original) {
                    Ok(prompt) => prompt,
                    Err(err) => {
                        let result = FixResult::failed(path, &original, format!("{err:#}"));
                        self.record(&result, "");
                        return Ok(result);
                    }
                };
                let call =
                    CompletionRequest::new(FIXER_SYSTEM_PROMPT, prompt, self.settings.sampling);
                match self.oracle.complete(&call) {
                    Ok(reply) => (
                        reply::code_body(&reply),
                        ContentSource::Oracle,
                        call.user,
                    ),
                    Err(err) => {
                        warn!(error = %err, "oracle unavailable, leaving file untouched");
                        let result = FixResult::failed(path, &original, unavailable(&err));
                        self.record(&result, &call.user);
                        return Ok(result);
                    }
                }
            }
        };

        let candidate_chars = candidate.trim().chars().count();
        let (content, source) = if candidate_chars < self.settings.min_content_chars {
            warn!(chars = candidate_chars, "proposal too short, keeping original content");
            (original.clone(), ContentSource::Original)
        } else if !syntax::is_valid(&candidate)
            && !original.trim().is_empty()
            && syntax::is_valid(&original)
        {
            warn!("proposal does not parse but the original does, keeping original content");
            (original.clone(), ContentSource::Original)
        } else {
            (candidate, source)
        };

        let syntax_valid = syntax::is_valid(&content);
        if !syntax_valid {
            warn!("written content does not parse");
        }

        if let Err(err) = self.store.write(path, &content) {
            if err.downcast_ref::<SandboxViolation>().is_some() {
                return Err(err);
            }
            let result = FixResult::failed(path, &original, format!("{err:#}"));
            self.record(&result, &prompt);
            return Ok(result);
        }

        let result = FixResult {
            path: path.to_path_buf(),
            status: FixStatus::Success,
            changes_applied: content != original,
            original_size: original.chars().count(),
            fixed_size: content.chars().count(),
            source: Some(source),
            syntax_valid,
            error: None,
        };
        info!(changes_applied = result.changes_applied, source = ?source, "file fixed");
        self.record(&result, &prompt);
        Ok(result)
    }

    /// A judge replacement that is long enough and parses.
    fn judge_candidate(&self, request: &FixRequest<'_>) -> Option<String> {
        let replacement = request.entry.judge_replacement.as_deref()?;
        let code = reply::code_body(replacement);
        if code.trim().chars().count() > self.settings.min_content_chars && syntax::is_valid(&code)
        {
            Some(code)
        } else {
            None
        }
    }

    fn render_prompt(&self, request: &FixRequest<'_>, code: &str) -> Result<String> {
        let plan = serde_json::to_string_pretty(request).context("serialize fix request")?;
        let prompt = self
            .prompts
            .render_fixer(&plan, code, request.test_output, request.lint_output)?;
        Ok(reply::truncate(&prompt, self.settings.max_prompt_chars))
    }

    fn record(&self, result: &FixResult, prompt: &str) {
        self.log.record(ExperimentEntry::new(
            FIXER_AGENT,
            self.oracle.model(),
            ActionKind::Fix,
            json!({
                "file": result.path.display().to_string(),
                "input_prompt": prompt,
                "output_response": result,
            }),
            match result.status {
                FixStatus::Success => LogStatus::Success,
                FixStatus::Fail => LogStatus::Failure,
            },
        ));
    }
}
