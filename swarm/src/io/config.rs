//! Swarm configuration loaded from `swarm.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::rules::RuleSet;
use crate::core::verdict::VerdictPolicy;

pub const DEFAULT_CONFIG_FILE: &str = "swarm.toml";

/// Swarm configuration (TOML).
///
/// Built once at startup and passed by reference into the pipeline. Missing
/// fields default to the values documented on each field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SwarmConfig {
    /// Iteration cap for one pipeline run.
    pub max_iterations: u32,

    /// Largest source file accepted, in bytes.
    pub max_file_size: u64,

    /// Whether the auditor requires the logging marker in every file.
    pub require_logging: bool,

    /// Extensions of tracked source files, with leading dot.
    pub extensions: Vec<String>,

    /// File or directory names skipped while listing sources.
    pub ignore: Vec<String>,

    /// Root outside of which no write is permitted. Defaults to the target directory.
    pub sandbox_root: Option<PathBuf>,

    /// JSON-lines experiment log, relative to the working directory.
    pub experiment_log: PathBuf,

    pub audit: AuditConfig,
    pub judge: JudgeConfig,
    pub fixer: FixerConfig,
    pub analysis: AnalysisConfig,
    pub oracle: OracleConfig,
    pub prompts: PromptPaths,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AuditConfig {
    pub logging_marker: String,
    pub forbidden_calls: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct JudgeConfig {
    /// Lint rule codes ignored by the deterministic override.
    pub cosmetic_codes: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FixerConfig {
    /// Rendered fixer prompts longer than this are truncated.
    pub max_prompt_chars: usize,
    /// Proposals shorter than this (trimmed) are discarded.
    pub min_content_chars: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Lint command; the target path is appended.
    pub lint_command: Vec<String>,
    /// Test command; the target directory is appended.
    pub test_command: Vec<String>,
    pub timeout_secs: u64,
    pub output_limit_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OracleConfig {
    /// OpenAI-compatible API base, without the `/chat/completions` suffix.
    pub base_url: String,
    /// Model id; when absent it is read from `model_env`.
    pub model: Option<String>,
    pub model_env: String,
    pub api_key_env: String,
    pub timeout_secs: u64,
    pub auditor: Sampling,
    pub fixer: Sampling,
    pub judge: Sampling,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Sampling {
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Optional template overrides; unset entries use the built-in prompts.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PromptPaths {
    pub auditor: Option<PathBuf>,
    pub fixer: Option<PathBuf>,
    pub judge: Option<PathBuf>,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            max_file_size: 50 * 1024,
            require_logging: true,
            extensions: vec![".py".to_string()],
            ignore: Vec::new(),
            sandbox_root: None,
            experiment_log: PathBuf::from("logs/experiment_data.jsonl"),
            audit: AuditConfig::default(),
            judge: JudgeConfig::default(),
            fixer: FixerConfig::default(),
            analysis: AnalysisConfig::default(),
            oracle: OracleConfig::default(),
            prompts: PromptPaths::default(),
        }
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        let rules = RuleSet::default();
        Self {
            logging_marker: rules.logging_marker,
            forbidden_calls: rules.forbidden_calls,
        }
    }
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            cosmetic_codes: VerdictPolicy::default().cosmetic_codes,
        }
    }
}

impl Default for FixerConfig {
    fn default() -> Self {
        Self {
            max_prompt_chars: 60_000,
            min_content_chars: 20,
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            lint_command: vec!["pylint".to_string()],
            test_command: vec!["pytest".to_string()],
            timeout_secs: 20,
            output_limit_bytes: 100_000,
        }
    }
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            base_url: "https://router.huggingface.co/v1".to_string(),
            model: None,
            model_env: "HF_MODEL".to_string(),
            api_key_env: "HF_TOKEN".to_string(),
            timeout_secs: 120,
            auditor: Sampling {
                max_tokens: 600,
                temperature: 0.1,
            },
            fixer: Sampling {
                max_tokens: 4096,
                temperature: 0.1,
            },
            judge: Sampling {
                max_tokens: 600,
                temperature: 0.0,
            },
        }
    }
}

impl SwarmConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(anyhow!("max_iterations must be > 0"));
        }
        if self.max_file_size == 0 {
            return Err(anyhow!("max_file_size must be > 0"));
        }
        if self.extensions.is_empty() || self.extensions.iter().any(|e| e.trim().is_empty()) {
            return Err(anyhow!("extensions must be a non-empty array of non-empty strings"));
        }
        if self.audit.logging_marker.trim().is_empty() {
            return Err(anyhow!("audit.logging_marker must not be empty"));
        }
        if self.fixer.max_prompt_chars == 0 {
            return Err(anyhow!("fixer.max_prompt_chars must be > 0"));
        }
        if is_empty_command(&self.analysis.lint_command) {
            return Err(anyhow!("analysis.lint_command must be a non-empty array"));
        }
        if is_empty_command(&self.analysis.test_command) {
            return Err(anyhow!("analysis.test_command must be a non-empty array"));
        }
        if self.analysis.timeout_secs == 0 {
            return Err(anyhow!("analysis.timeout_secs must be > 0"));
        }
        if self.analysis.output_limit_bytes == 0 {
            return Err(anyhow!("analysis.output_limit_bytes must be > 0"));
        }
        if self.oracle.timeout_secs == 0 {
            return Err(anyhow!("oracle.timeout_secs must be > 0"));
        }
        if self.oracle.base_url.trim().is_empty() {
            return Err(anyhow!("oracle.base_url must not be empty"));
        }
        for (name, sampling) in [
            ("auditor", self.oracle.auditor),
            ("fixer", self.oracle.fixer),
            ("judge", self.oracle.judge),
        ] {
            if sampling.max_tokens == 0 {
                return Err(anyhow!("oracle.{name}.max_tokens must be > 0"));
            }
            if !(0.0..=2.0).contains(&sampling.temperature) {
                return Err(anyhow!("oracle.{name}.temperature must be within 0.0..=2.0"));
            }
        }
        Ok(())
    }

    pub fn rules(&self) -> RuleSet {
        RuleSet {
            forbidden_calls: self.audit.forbidden_calls.clone(),
            logging_marker: self.audit.logging_marker.clone(),
        }
    }

    pub fn verdict_policy(&self) -> VerdictPolicy {
        VerdictPolicy {
            cosmetic_codes: self.judge.cosmetic_codes.clone(),
        }
    }
}

fn is_empty_command(command: &[String]) -> bool {
    command.first().is_none_or(|program| program.trim().is_empty())
}

/// Command-line values that take precedence over the file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    pub max_iterations: Option<u32>,
    pub max_file_size: Option<u64>,
    pub sandbox_root: Option<PathBuf>,
    pub ignore: Vec<String>,
    pub disable_logging_check: bool,
}

/// Apply command-line overrides to a loaded config and re-validate.
pub fn apply_overrides(mut base: SwarmConfig, overrides: &Overrides) -> Result<SwarmConfig> {
    if let Some(max_iterations) = overrides.max_iterations {
        base.max_iterations = max_iterations;
    }
    if let Some(max_file_size) = overrides.max_file_size {
        base.max_file_size = max_file_size;
    }
    if let Some(root) = &overrides.sandbox_root {
        base.sandbox_root = Some(root.clone());
    }
    for name in &overrides.ignore {
        if !base.ignore.contains(name) {
            base.ignore.push(name.clone());
        }
    }
    if overrides.disable_logging_check {
        base.require_logging = false;
    }
    base.validate()?;
    Ok(base)
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `SwarmConfig::default()`.
pub fn load_config(path: &Path) -> Result<SwarmConfig> {
    if !path.exists() {
        let cfg = SwarmConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: SwarmConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::rules::{DEFAULT_FORBIDDEN_CALLS, DEFAULT_LOGGING_MARKER};
    use crate::core::verdict::DEFAULT_COSMETIC_CODES;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, SwarmConfig::default());
        assert_eq!(cfg.audit.forbidden_calls.len(), DEFAULT_FORBIDDEN_CALLS.len());
        assert_eq!(cfg.audit.logging_marker, DEFAULT_LOGGING_MARKER);
        assert_eq!(cfg.judge.cosmetic_codes.len(), DEFAULT_COSMETIC_CODES.len());
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("swarm.toml");
        fs::write(
            &path,
            "max_iterations = 3\n\n[analysis]\ntest_command = [\"python\", \"-m\", \"pytest\"]\n\n[oracle.judge]\nmax_tokens = 300\ntemperature = 0.2\n",
        )
        .expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.max_iterations, 3);
        assert_eq!(cfg.analysis.test_command, vec!["python", "-m", "pytest"]);
        assert_eq!(cfg.analysis.lint_command, vec!["pylint"]);
        assert_eq!(cfg.analysis.timeout_secs, 20);
        assert_eq!(cfg.oracle.judge.max_tokens, 300);
        assert_eq!(cfg.oracle.auditor.max_tokens, 600);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("swarm.toml");
        fs::write(&path, "max_iterations = 0\n").expect("write");
        let err = load_config(&path).expect_err("invalid");
        assert!(format!("{err:#}").contains("max_iterations must be > 0"));

        let mut cfg = SwarmConfig::default();
        cfg.analysis.lint_command = vec![" ".to_string()];
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn overrides_take_precedence() {
        let overrides = Overrides {
            max_iterations: Some(2),
            max_file_size: Some(1024),
            sandbox_root: Some(PathBuf::from("/tmp/box")),
            ignore: vec!["venv".to_string()],
            disable_logging_check: true,
        };
        let merged = apply_overrides(SwarmConfig::default(), &overrides).expect("merge");
        assert_eq!(merged.max_iterations, 2);
        assert_eq!(merged.max_file_size, 1024);
        assert_eq!(merged.sandbox_root, Some(PathBuf::from("/tmp/box")));
        assert_eq!(merged.ignore, vec!["venv"]);
        assert!(!merged.require_logging);
    }

    #[test]
    fn zero_override_is_rejected() {
        let overrides = Overrides {
            max_iterations: Some(0),
            ..Overrides::default()
        };
        assert!(apply_overrides(SwarmConfig::default(), &overrides).is_err());
    }
}
