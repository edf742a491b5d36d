//! Scripted fakes for the oracle, the analysis tools and the experiment log,
//! plus a throwaway project directory.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::agents::auditor::AUDITOR_SYSTEM_PROMPT;
use crate::agents::fixer::FIXER_SYSTEM_PROMPT;
use crate::agents::judge::JUDGE_SYSTEM_PROMPT;
use crate::io::analysis::AnalysisRunner;
use crate::io::experiment_log::{ExperimentEntry, ExperimentLog};
use crate::io::files::FileStore;
use crate::io::oracle::{CompletionRequest, Oracle, OracleError};
use crate::io::sandbox::Sandbox;

pub const SCRIPTED_MODEL: &str = "scripted-model";

type Reply = Result<String, OracleError>;

/// Oracle that answers each agent from its own script, keyed by system prompt.
///
/// The auditor gets the same reply every time; fixer and judge replies are
/// consumed in order and an exhausted queue answers with a transport error.
pub struct ScriptedOracle {
    auditor: Reply,
    fixer: RefCell<VecDeque<Reply>>,
    judge: RefCell<VecDeque<Reply>>,
    requests: RefCell<Vec<CompletionRequest>>,
}

impl ScriptedOracle {
    pub fn new() -> Self {
        Self {
            auditor: Ok("No issues found.".to_string()),
            fixer: RefCell::new(VecDeque::new()),
            judge: RefCell::new(VecDeque::new()),
            requests: RefCell::new(Vec::new()),
        }
    }

    pub fn with_auditor_reply(mut self, reply: Reply) -> Self {
        self.auditor = reply;
        self
    }

    pub fn with_fixer(self, replies: Vec<Reply>) -> Self {
        self.fixer.borrow_mut().extend(replies);
        self
    }

    pub fn with_judge(self, replies: Vec<Reply>) -> Self {
        self.judge.borrow_mut().extend(replies);
        self
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.borrow().clone()
    }

    /// Requests sent with the given system prompt.
    pub fn requests_for(&self, system: &str) -> Vec<CompletionRequest> {
        self.requests
            .borrow()
            .iter()
            .filter(|r| r.system == system)
            .cloned()
            .collect()
    }

    pub fn assert_drained(&self) {
        assert!(
            self.fixer.borrow().is_empty(),
            "unused fixer replies: {:?}",
            self.fixer.borrow()
        );
        assert!(
            self.judge.borrow().is_empty(),
            "unused judge replies: {:?}",
            self.judge.borrow()
        );
    }
}

impl Default for ScriptedOracle {
    fn default() -> Self {
        Self::new()
    }
}

impl Oracle for ScriptedOracle {
    fn model(&self) -> &str {
        SCRIPTED_MODEL
    }

    fn complete(&self, request: &CompletionRequest) -> Result<String, OracleError> {
        self.requests.borrow_mut().push(request.clone());
        let queue = match request.system.as_str() {
            AUDITOR_SYSTEM_PROMPT => return self.auditor.clone(),
            FIXER_SYSTEM_PROMPT => &self.fixer,
            JUDGE_SYSTEM_PROMPT => &self.judge,
            other => panic!("unexpected system prompt: {other}"),
        };
        queue
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| Err(OracleError::Transport("scripted oracle exhausted".to_string())))
    }
}

/// Analysis runner replaying queued test and lint outputs.
#[derive(Default)]
pub struct ScriptedAnalysis {
    tests: RefCell<VecDeque<String>>,
    lints: RefCell<VecDeque<String>>,
    calls: RefCell<Vec<(String, PathBuf)>>,
}

impl ScriptedAnalysis {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue one `(test_output, lint_output)` pair per judged iteration.
    pub fn with_runs(self, runs: &[(&str, &str)]) -> Self {
        for (test, lint) in runs {
            self.tests.borrow_mut().push_back((*test).to_string());
            self.lints.borrow_mut().push_back((*lint).to_string());
        }
        self
    }

    /// `("tests" | "lint", path)` in call order.
    pub fn calls(&self) -> Vec<(String, PathBuf)> {
        self.calls.borrow().clone()
    }

    pub fn assert_drained(&self) {
        assert!(self.tests.borrow().is_empty(), "unused test outputs");
        assert!(self.lints.borrow().is_empty(), "unused lint outputs");
    }
}

impl AnalysisRunner for ScriptedAnalysis {
    fn run_lint(&self, path: &Path) -> String {
        self.calls
            .borrow_mut()
            .push(("lint".to_string(), path.to_path_buf()));
        self.lints
            .borrow_mut()
            .pop_front()
            .expect("unexpected lint run")
    }

    fn run_tests(&self, dir: &Path) -> String {
        self.calls
            .borrow_mut()
            .push(("tests".to_string(), dir.to_path_buf()));
        self.tests
            .borrow_mut()
            .pop_front()
            .expect("unexpected test run")
    }
}

/// Experiment log that keeps entries in memory.
#[derive(Default)]
pub struct RecordingLog {
    entries: RefCell<Vec<ExperimentEntry>>,
}

impl RecordingLog {
    pub fn entries(&self) -> Vec<ExperimentEntry> {
        self.entries.borrow().clone()
    }

    pub fn agents(&self) -> Vec<String> {
        self.entries.borrow().iter().map(|e| e.agent.clone()).collect()
    }
}

impl ExperimentLog for RecordingLog {
    fn record(&self, entry: ExperimentEntry) {
        self.entries.borrow_mut().push(entry);
    }
}

/// Temporary project directory with a canonical root.
pub struct TestProject {
    _dir: TempDir,
    root: PathBuf,
}

impl TestProject {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("create temp project");
        let root = fs::canonicalize(dir.path()).expect("canonicalize temp project");
        Self { _dir: dir, root }
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn write(&self, rel: &str, content: &str) -> PathBuf {
        let path = self.root.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent");
        }
        fs::write(&path, content).expect("write project file");
        path
    }

    pub fn read(&self, rel: &str) -> String {
        fs::read_to_string(self.root.join(rel)).expect("read project file")
    }

    /// File store sandboxed to the project root.
    pub fn store(&self) -> FileStore {
        FileStore::new(Sandbox::new(&self.root).expect("sandbox"))
    }
}

impl Default for TestProject {
    fn default() -> Self {
        Self::new()
    }
}
