//! Prompt templates for the three agents.
//!
//! Templates are minijinja sources rendered in strict-undefined mode, so an
//! unknown placeholder is an error. Each template is test-rendered when the
//! set is built; a bad override fails at startup instead of mid-run.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use minijinja::{Environment, UndefinedBehavior, context};
use tracing::debug;

use crate::io::config::PromptPaths;

const AUDITOR_TEMPLATE: &str = include_str!("prompts/auditor.md");
const FIXER_TEMPLATE: &str = include_str!("prompts/fixer.md");
const JUDGE_TEMPLATE: &str = include_str!("prompts/judge.md");

const AUDITOR: &str = "auditor";
const FIXER: &str = "fixer";
const JUDGE: &str = "judge";

/// Loaded and validated auditor/fixer/judge templates.
pub struct PromptSet {
    env: Environment<'static>,
}

impl std::fmt::Debug for PromptSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromptSet").finish_non_exhaustive()
    }
}

impl PromptSet {
    pub fn builtin() -> Result<Self> {
        Self::from_sources(
            AUDITOR_TEMPLATE.to_string(),
            FIXER_TEMPLATE.to_string(),
            JUDGE_TEMPLATE.to_string(),
        )
    }

    /// Use the configured files, falling back to the built-in templates.
    pub fn load(paths: &PromptPaths) -> Result<Self> {
        Self::from_sources(
            read_or(paths.auditor.as_deref(), AUDITOR_TEMPLATE)?,
            read_or(paths.fixer.as_deref(), FIXER_TEMPLATE)?,
            read_or(paths.judge.as_deref(), JUDGE_TEMPLATE)?,
        )
    }

    pub fn from_sources(auditor: String, fixer: String, judge: String) -> Result<Self> {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.add_template_owned(AUDITOR, auditor)
            .context("parse auditor prompt")?;
        env.add_template_owned(FIXER, fixer)
            .context("parse fixer prompt")?;
        env.add_template_owned(JUDGE, judge)
            .context("parse judge prompt")?;

        let set = Self { env };
        set.render_auditor("x = 1")
            .context("auditor prompt must only use {{ code }}")?;
        set.render_fixer("{}", "x = 1", "out", "lint")
            .context("fixer prompt must only use {{ plan }}, {{ code }}, {{ test_output }}, {{ lint_output }}")?;
        set.render_judge("out", "lint")
            .context("judge prompt must only use {{ test_output }}, {{ lint_output }}")?;
        debug!("prompt templates validated");
        Ok(set)
    }

    pub fn render_auditor(&self, code: &str) -> Result<String> {
        let template = self.env.get_template(AUDITOR)?;
        Ok(template.render(context! { code => code })?)
    }

    pub fn render_fixer(
        &self,
        plan: &str,
        code: &str,
        test_output: &str,
        lint_output: &str,
    ) -> Result<String> {
        let template = self.env.get_template(FIXER)?;
        Ok(template.render(context! {
            plan => plan,
            code => code,
            test_output => test_output.trim(),
            lint_output => lint_output.trim(),
        })?)
    }

    pub fn render_judge(&self, test_output: &str, lint_output: &str) -> Result<String> {
        let template = self.env.get_template(JUDGE)?;
        Ok(template.render(context! {
            test_output => test_output.trim(),
            lint_output => lint_output.trim(),
        })?)
    }
}

fn read_or(path: Option<&Path>, builtin: &str) -> Result<String> {
    match path {
        Some(path) => {
            if !path.is_file() {
                return Err(anyhow!("prompt file not found: {}", path.display()));
            }
            fs::read_to_string(path).with_context(|| format!("read {}", path.display()))
        }
        None => Ok(builtin.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_templates_render() {
        let prompts = PromptSet::builtin().expect("builtin");
        let audit = prompts.render_auditor("print('hi')").expect("auditor");
        assert!(audit.contains("print('hi')"));

        let fix = prompts
            .render_fixer("{\"path\": \"a.py\"}", "x = 1", "", "")
            .expect("fixer");
        assert!(fix.contains("\"path\": \"a.py\""));
        assert!(!fix.contains("previous attempt"));

        let fix = prompts
            .render_fixer("{}", "x = 1", "1 failed", "E0602")
            .expect("fixer");
        assert!(fix.contains("1 failed"));
        assert!(fix.contains("E0602"));

        let judge = prompts.render_judge("2 passed", "rated 10/10").expect("judge");
        assert!(judge.contains("2 passed"));
        assert!(judge.contains("rated 10/10"));
    }

    #[test]
    fn code_is_not_interpreted_as_template() {
        let prompts = PromptSet::builtin().expect("builtin");
        let rendered = prompts.render_auditor("x = '{{ y }}'").expect("render");
        assert!(rendered.contains("{{ y }}"));
    }

    #[test]
    fn unknown_placeholder_fails_at_load() {
        let err = PromptSet::from_sources(
            "{{ code }} {{ unknown }}".to_string(),
            FIXER_TEMPLATE.to_string(),
            JUDGE_TEMPLATE.to_string(),
        )
        .expect_err("strict");
        assert!(format!("{err:#}").contains("auditor prompt"));
    }

    #[test]
    fn missing_override_file_is_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = PromptPaths {
            judge: Some(temp.path().join("judge.md")),
            ..PromptPaths::default()
        };
        let err = PromptSet::load(&paths).expect_err("missing");
        assert!(err.to_string().contains("prompt file not found"));
    }

    #[test]
    fn override_file_is_used() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("judge.md");
        fs::write(&path, "T={{ test_output }} L={{ lint_output }}").expect("write");
        let paths = PromptPaths {
            judge: Some(path),
            ..PromptPaths::default()
        };
        let prompts = PromptSet::load(&paths).expect("load");
        assert_eq!(prompts.render_judge("a", "b").expect("render"), "T=a L=b");
    }
}
