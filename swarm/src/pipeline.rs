//! The audit → fix → judge state machine.
//!
//! One run builds the dependency graph once, then iterates until the judge
//! returns SUCCESS or `max_iterations` is exhausted. Every iteration appends
//! exactly one audit, one fix and one judge record to the history.

use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, instrument, warn};

use crate::agents::auditor::Auditor;
use crate::agents::fixer::{FixSettings, Fixer};
use crate::agents::judge::Judge;
use crate::core::depgraph::DependencyGraph;
use crate::core::plan::build_plan;
use crate::core::reply;
use crate::core::types::{
    AuditReport, BatchStatus, BatchSummary, Judgement, PhaseRecord, PipelineStatus,
    RefactoringPlan,
};
use crate::io::analysis::AnalysisRunner;
use crate::io::config::SwarmConfig;
use crate::io::experiment_log::{ActionKind, ExperimentEntry, ExperimentLog, LogStatus};
use crate::io::files::{self, FileStore};
use crate::io::oracle::Oracle;
use crate::io::prompt::PromptSet;

pub const ORCHESTRATOR_AGENT: &str = "Pipeline-Orchestrator";
const OUTPUT_SAMPLE_CHARS: usize = 600;

/// What a run works on: the directory tests run in, the tracked files, and
/// the path handed to the linter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunTarget {
    pub dir: PathBuf,
    pub files: Vec<PathBuf>,
    pub lint_path: PathBuf,
}

impl RunTarget {
    /// Every tracked source file under `dir`.
    pub fn directory(dir: &Path, config: &SwarmConfig) -> Result<Self> {
        if !dir.is_dir() {
            bail!("target directory does not exist: {}", dir.display());
        }
        let files = files::list_source_files(dir, &config.extensions, &config.ignore)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            files,
            lint_path: dir.to_path_buf(),
        })
    }

    /// Just `file`, with tests run in its parent directory.
    pub fn single_file(file: &Path) -> Result<Self> {
        if !file.is_file() {
            bail!("target file does not exist: {}", file.display());
        }
        let dir = file
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."))
            .to_path_buf();
        Ok(Self {
            dir,
            files: vec![file.to_path_buf()],
            lint_path: file.to_path_buf(),
        })
    }
}

/// Progress for one finished iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IterationReport {
    pub iteration: u32,
    pub files_audited: usize,
    pub files_needing_fix: usize,
    pub fix_status: BatchStatus,
    pub files_fixed: usize,
    pub judgement: Judgement,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineSummary {
    pub status: PipelineStatus,
    pub iterations_performed: u32,
    pub success: bool,
    pub files_processed: usize,
    pub last_judgement: Option<Judgement>,
    pub history: Vec<PhaseRecord>,
    pub history_summary: Vec<String>,
}

enum Phase {
    Audit,
    Fix(RefactoringPlan),
    Judge(BatchSummary),
    Done(PipelineStatus),
}

pub struct Pipeline<'a, O, A, L> {
    config: &'a SwarmConfig,
    oracle: &'a O,
    analysis: &'a A,
    log: &'a L,
    prompts: &'a PromptSet,
    store: &'a FileStore,
}

impl<'a, O: Oracle, A: AnalysisRunner, L: ExperimentLog> Pipeline<'a, O, A, L> {
    pub fn new(
        config: &'a SwarmConfig,
        oracle: &'a O,
        analysis: &'a A,
        log: &'a L,
        prompts: &'a PromptSet,
        store: &'a FileStore,
    ) -> Self {
        Self {
            config,
            oracle,
            analysis,
            log,
            prompts,
            store,
        }
    }

    /// Run to SUCCESS or the iteration cap.
    ///
    /// Input problems (missing directory, no files, oversized file) and
    /// sandbox violations are errors; everything else is reported in the
    /// summary.
    #[instrument(skip_all, fields(dir = %target.dir.display(), files = target.files.len()))]
    pub fn run<F: FnMut(&IterationReport)>(
        &self,
        target: &RunTarget,
        mut on_iteration: F,
    ) -> Result<PipelineSummary> {
        if !target.dir.is_dir() {
            bail!("target directory does not exist: {}", target.dir.display());
        }
        if target.files.is_empty() {
            bail!("no source files found in {}", target.dir.display());
        }
        for path in &target.files {
            files::ensure_within_size(path, self.config.max_file_size)?;
        }

        let order = self.fix_order(&target.files);
        let auditor = Auditor::new(
            self.oracle,
            self.log,
            self.prompts,
            self.config.rules(),
            self.config.oracle.auditor,
        );
        let fixer = Fixer::new(
            self.oracle,
            self.log,
            self.prompts,
            self.store,
            FixSettings::new(self.config.fixer, self.config.oracle.fixer),
        );
        let judge = Judge::new(
            self.oracle,
            self.log,
            self.prompts,
            self.config.verdict_policy(),
            self.config.oracle.judge,
        );

        let mut history = Vec::new();
        let mut iteration = 1;
        let mut previous: Option<Judgement> = None;
        let mut test_output = String::new();
        let mut lint_output = String::new();
        let mut files_audited = 0;
        let mut files_needing_fix = 0;

        let mut phase = Phase::Audit;
        let status = loop {
            phase = match phase {
                Phase::Audit => {
                    info!(iteration, "audit phase");
                    let (reports, unreadable) = self.audit_all(&auditor, &order)?;
                    let plan = build_plan(
                        iteration,
                        &reports,
                        previous.as_ref(),
                        &test_output,
                        &lint_output,
                    );
                    files_audited = reports.len();
                    files_needing_fix = plan.entries.len();
                    history.push(PhaseRecord::Audit {
                        iteration,
                        statuses: reports.iter().map(|r| r.status).collect(),
                        files_needing_fix,
                        unreadable,
                    });
                    Phase::Fix(plan)
                }
                Phase::Fix(plan) => {
                    let batch = if plan.is_empty() {
                        info!(iteration, "nothing to fix");
                        BatchSummary::empty()
                    } else {
                        info!(iteration, entries = plan.entries.len(), "fix phase");
                        fixer.apply_plan(&plan)?
                    };
                    history.push(PhaseRecord::Fix {
                        iteration,
                        total: batch.total,
                        successful: batch.successful,
                        failed: batch.failed,
                        overall_status: batch.overall_status,
                    });
                    Phase::Judge(batch)
                }
                Phase::Judge(batch) => {
                    info!(iteration, "judge phase");
                    test_output = self.analysis.run_tests(&target.dir);
                    lint_output = self.analysis.run_lint(&target.lint_path);
                    let judgement = judge.evaluate(&test_output, &lint_output)?;
                    history.push(PhaseRecord::Judge {
                        iteration,
                        decision: judgement.decision,
                        reason: judgement.reason.clone(),
                    });
                    self.record_iteration(
                        iteration,
                        files_audited,
                        &batch,
                        &judgement,
                        &test_output,
                        &lint_output,
                    );
                    on_iteration(&IterationReport {
                        iteration,
                        files_audited,
                        files_needing_fix,
                        fix_status: batch.overall_status,
                        files_fixed: batch.successful,
                        judgement: judgement.clone(),
                    });

                    let success = judgement.is_success();
                    previous = Some(judgement);
                    if success {
                        Phase::Done(PipelineStatus::Success)
                    } else if iteration >= self.config.max_iterations {
                        warn!(iteration, "iteration cap reached without success");
                        Phase::Done(PipelineStatus::MaxIterationsReached)
                    } else {
                        iteration += 1;
                        Phase::Audit
                    }
                }
                Phase::Done(status) => break status,
            };
        };

        info!(status = ?status, iterations = iteration, "pipeline finished");
        let history_summary = history.iter().map(PhaseRecord::describe).collect();
        Ok(PipelineSummary {
            status,
            iterations_performed: iteration,
            success: status == PipelineStatus::Success,
            files_processed: order.len(),
            last_judgement: previous,
            history,
            history_summary,
        })
    }

    /// Read every file once and order them by the dependency graph.
    fn fix_order(&self, paths: &[PathBuf]) -> Vec<PathBuf> {
        let snapshot: Vec<(PathBuf, String)> = paths
            .iter()
            .map(|path| {
                let text = files::read_source(path).unwrap_or_else(|err| {
                    warn!(path = %path.display(), error = %format!("{err:#}"), "unreadable file");
                    String::new()
                });
                (path.clone(), text)
            })
            .collect();
        let graph = DependencyGraph::build(&snapshot);
        debug!(
            files = graph.len(),
            edges = graph.edge_count(),
            unparsed = graph.unparsed().len(),
            "dependency graph built"
        );
        graph.fix_order()
    }

    fn audit_all(
        &self,
        auditor: &Auditor<'_, O, L>,
        order: &[PathBuf],
    ) -> Result<(Vec<AuditReport>, usize)> {
        let mut reports = Vec::with_capacity(order.len());
        let mut unreadable = 0;
        for path in order {
            let code = match files::read_source(path) {
                Ok(code) => code,
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %format!("{err:#}"),
                        "skipping unreadable file"
                    );
                    unreadable += 1;
                    continue;
                }
            };
            reports.push(auditor.audit(path, &code, self.config.require_logging)?);
        }
        Ok((reports, unreadable))
    }

    fn record_iteration(
        &self,
        iteration: u32,
        files_processed: usize,
        batch: &BatchSummary,
        judgement: &Judgement,
        test_output: &str,
        lint_output: &str,
    ) {
        self.log.record(ExperimentEntry::new(
            ORCHESTRATOR_AGENT,
            self.oracle.model(),
            ActionKind::Analysis,
            json!({
                "iteration": iteration,
                "decision": judgement.decision.as_str(),
                "files_processed": files_processed,
                "files_fixed": batch.successful,
                "judge_reason": judgement.reason,
                "pytest_output_sample": reply::sample(test_output, OUTPUT_SAMPLE_CHARS),
                "pylint_output_sample": reply::sample(lint_output, OUTPUT_SAMPLE_CHARS),
            }),
            if judgement.is_success() {
                LogStatus::Success
            } else {
                LogStatus::Retry
            },
        ));
    }
}
