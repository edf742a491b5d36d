//! Lint and test collaborators.
//!
//! Both runs return combined stdout+stderr text and never fail: spawn errors
//! and timeouts are reported inside the returned text so the judge can read
//! them like any other tool output.

use std::path::Path;
use std::process::Command;
use std::time::Duration;

use tracing::{info, instrument, warn};

use crate::io::config::AnalysisConfig;
use crate::io::process::run_command_with_timeout;

pub const TIMED_OUT: &str = "ERROR: Command timed out.";

pub trait AnalysisRunner {
    /// Lint a file or directory.
    fn run_lint(&self, path: &Path) -> String;
    /// Run the test suite found under `dir`.
    fn run_tests(&self, dir: &Path) -> String;
}

/// Runs the configured external commands with the target path appended.
#[derive(Debug, Clone)]
pub struct CommandAnalysisRunner {
    pub lint_command: Vec<String>,
    pub test_command: Vec<String>,
    pub timeout: Duration,
    pub output_limit_bytes: usize,
}

impl CommandAnalysisRunner {
    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self {
            lint_command: config.lint_command.clone(),
            test_command: config.test_command.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            output_limit_bytes: config.output_limit_bytes,
        }
    }

    fn run(&self, argv: &[String], target: &Path, workdir: &Path) -> String {
        let Some((program, args)) = argv.split_first() else {
            return "ERROR: empty command".to_string();
        };
        let mut cmd = Command::new(program);
        cmd.args(args).arg(target).current_dir(workdir);

        match run_command_with_timeout(cmd, self.timeout, self.output_limit_bytes) {
            Ok(output) if output.timed_out => TIMED_OUT.to_string(),
            Ok(output) => {
                info!(program = %program, exit_code = ?output.status.code(), "analysis command finished");
                output.combined_text()
            }
            Err(err) => {
                warn!(program = %program, err = %err, "analysis command failed to run");
                format!("ERROR: {err:#}")
            }
        }
    }
}

impl AnalysisRunner for CommandAnalysisRunner {
    #[instrument(skip_all, fields(path = %path.display()))]
    fn run_lint(&self, path: &Path) -> String {
        if !path.exists() {
            return format!("ERROR: Path does not exist: {}", path.display());
        }
        let workdir = if path.is_dir() {
            path
        } else {
            path.parent().unwrap_or(Path::new("."))
        };
        self.run(&self.lint_command, path, workdir)
    }

    #[instrument(skip_all, fields(dir = %dir.display()))]
    fn run_tests(&self, dir: &Path) -> String {
        if !dir.is_dir() {
            return format!("ERROR: Directory does not exist: {}", dir.display());
        }
        self.run(&self.test_command, dir, dir)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn runner(lint: &[&str], test: &[&str], timeout: Duration) -> CommandAnalysisRunner {
        CommandAnalysisRunner {
            lint_command: lint.iter().map(|s| (*s).to_string()).collect(),
            test_command: test.iter().map(|s| (*s).to_string()).collect(),
            timeout,
            output_limit_bytes: 10_000,
        }
    }

    #[test]
    fn commands_receive_target_path() {
        let temp = tempfile::tempdir().expect("tempdir");
        let file = temp.path().join("app.py");
        std::fs::write(&file, "x = 1\n").expect("write");
        let runner = runner(&["echo", "lint"], &["echo", "test"], Duration::from_secs(5));

        assert_eq!(runner.run_lint(&file), format!("lint {}\n", file.display()));
        assert_eq!(
            runner.run_tests(temp.path()),
            format!("test {}\n", temp.path().display())
        );
    }

    #[test]
    fn missing_paths_are_reported_as_text() {
        let temp = tempfile::tempdir().expect("tempdir");
        let missing = temp.path().join("nope");
        let runner = runner(&["echo"], &["echo"], Duration::from_secs(5));
        assert!(runner.run_lint(&missing).starts_with("ERROR: Path does not exist:"));
        assert!(runner.run_tests(&missing).starts_with("ERROR: Directory does not exist:"));
    }

    #[test]
    fn timeout_is_reported_as_text() {
        let temp = tempfile::tempdir().expect("tempdir");
        let runner = runner(
            &["echo"],
            &["sh", "-c", "exec sleep 5"],
            Duration::from_millis(200),
        );
        assert_eq!(runner.run_tests(temp.path()), TIMED_OUT);
    }

    #[test]
    fn spawn_failure_is_reported_as_text() {
        let temp = tempfile::tempdir().expect("tempdir");
        let runner = runner(&["definitely-not-a-real-linter"], &["echo"], Duration::from_secs(1));
        assert!(runner.run_lint(temp.path()).starts_with("ERROR: "));
    }

    #[test]
    fn default_config_maps_to_pylint_and_pytest() {
        let runner = CommandAnalysisRunner::from_config(&AnalysisConfig::default());
        assert_eq!(runner.lint_command, vec!["pylint"]);
        assert_eq!(runner.test_command, vec!["pytest"]);
        assert_eq!(runner.timeout, Duration::from_secs(20));
    }
}
