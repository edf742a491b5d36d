//! `swarm`: audit, fix and judge a Python project until its tests and lint
//! come back clean.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{ArgGroup, Args, Parser, Subcommand};
use tracing::warn;

use swarm::agents::auditor::Auditor;
use swarm::core::depgraph::DependencyGraph;
use swarm::exit_codes;
use swarm::io::analysis::CommandAnalysisRunner;
use swarm::io::config::{
    DEFAULT_CONFIG_FILE, Overrides, SwarmConfig, apply_overrides, load_config,
};
use swarm::io::experiment_log::JsonlExperimentLog;
use swarm::io::files::{self, FileStore};
use swarm::io::oracle::{ChatOracle, Oracle};
use swarm::io::prompt::PromptSet;
use swarm::io::sandbox::Sandbox;
use swarm::logging;
use swarm::pipeline::{IterationReport, Pipeline, RunTarget};

#[derive(Parser)]
#[command(
    name = "swarm",
    version,
    about = "Iterative audit, fix and judge loop for Python projects"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the audit → fix → judge loop until SUCCESS or the iteration cap.
    Run(RunArgs),
    /// Print the import dependency graph and the fix order.
    Graph {
        /// Project directory.
        #[arg(long)]
        dir: PathBuf,
        /// File or directory names to skip.
        #[arg(long, num_args = 1..)]
        ignore: Vec<String>,
        /// Config file (defaults to `swarm.toml` if present).
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Audit one file and print the report as JSON.
    Audit {
        file: PathBuf,
        /// Do not require experiment-logging calls.
        #[arg(long)]
        no_logging_check: bool,
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[derive(Args)]
#[command(group(ArgGroup::new("target").required(true).args(["dir", "file"])))]
struct RunArgs {
    /// Project directory to repair.
    #[arg(long)]
    dir: Option<PathBuf>,
    /// Single file to repair; tests run in its directory.
    #[arg(long)]
    file: Option<PathBuf>,
    #[arg(long)]
    max_iterations: Option<u32>,
    /// Per-file size limit in bytes.
    #[arg(long = "max-size")]
    max_size: Option<u64>,
    /// File or directory names to skip.
    #[arg(long, num_args = 1..)]
    ignore: Vec<String>,
    /// Config file (defaults to `swarm.toml` if present).
    #[arg(long)]
    config: Option<PathBuf>,
    /// Root outside of which nothing is written (defaults to the target directory).
    #[arg(long)]
    sandbox: Option<PathBuf>,
    /// Do not require experiment-logging calls.
    #[arg(long)]
    no_logging_check: bool,
}

fn main() {
    logging::init();
    let cli = Cli::parse();
    let code = match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            exit_codes::for_error(&err)
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Command::Run(args) => cmd_run(args),
        Command::Graph {
            dir,
            ignore,
            config,
        } => cmd_graph(&dir, ignore, config.as_deref()),
        Command::Audit {
            file,
            no_logging_check,
            config,
        } => cmd_audit(&file, no_logging_check, config.as_deref()),
    }
}

fn cmd_run(args: RunArgs) -> Result<i32> {
    let config = settings(
        args.config.as_deref(),
        &Overrides {
            max_iterations: args.max_iterations,
            max_file_size: args.max_size,
            sandbox_root: args.sandbox,
            ignore: args.ignore,
            disable_logging_check: args.no_logging_check,
        },
    )?;

    let target = match (&args.dir, &args.file) {
        (Some(dir), _) => {
            if !dir.is_dir() {
                bail!("target directory does not exist: {}", dir.display());
            }
            RunTarget::directory(&canonical(dir)?, &config)?
        }
        (None, Some(file)) => {
            if !file.is_file() {
                bail!("target file does not exist: {}", file.display());
            }
            RunTarget::single_file(&canonical(file)?)?
        }
        (None, None) => bail!("either --dir or --file is required"),
    };

    let root = config.sandbox_root.clone().unwrap_or_else(|| target.dir.clone());
    let sandbox = Sandbox::new(&root)?;
    for path in &target.files {
        sandbox.ensure_contains(path)?;
    }

    let prompts = PromptSet::load(&config.prompts)?;
    let oracle = ChatOracle::from_env(&config.oracle)?;
    let analysis = CommandAnalysisRunner::from_config(&config.analysis);
    let log = JsonlExperimentLog::new(&config.experiment_log);
    let store = FileStore::new(sandbox);

    println!(
        "swarm: {} file(s) in {} | model {} | max {} iteration(s) | sandbox {}",
        target.files.len(),
        target.dir.display(),
        oracle.model(),
        config.max_iterations,
        store.sandbox().root().display()
    );

    let pipeline = Pipeline::new(&config, &oracle, &analysis, &log, &prompts, &store);
    let summary = pipeline.run(&target, print_iteration)?;
    println!(
        "{}",
        serde_json::to_string_pretty(&summary).context("serialize summary")?
    );

    Ok(if summary.success {
        exit_codes::OK
    } else {
        exit_codes::NOT_CONVERGED
    })
}

fn print_iteration(report: &IterationReport) {
    println!(
        "Iteration {}: audited {}, {} need fixing, fixed {} ({:?}), judge {}: {}",
        report.iteration,
        report.files_audited,
        report.files_needing_fix,
        report.files_fixed,
        report.fix_status,
        report.judgement.decision.as_str(),
        report.judgement.reason
    );
}

fn cmd_graph(dir: &Path, ignore: Vec<String>, config: Option<&Path>) -> Result<i32> {
    let config = settings(
        config,
        &Overrides {
            ignore,
            ..Overrides::default()
        },
    )?;
    if !dir.is_dir() {
        bail!("target directory does not exist: {}", dir.display());
    }
    let dir = canonical(dir)?;
    let paths = files::list_source_files(&dir, &config.extensions, &config.ignore)?;

    let snapshot: Vec<(PathBuf, String)> = paths
        .into_iter()
        .map(|path| {
            let text = files::read_source(&path).unwrap_or_else(|err| {
                warn!(path = %path.display(), error = %format!("{err:#}"), "unreadable file");
                String::new()
            });
            (path, text)
        })
        .collect();
    let graph = DependencyGraph::build(&snapshot);
    if graph.is_empty() {
        bail!("no source files found in {}", dir.display());
    }
    let relative = |p: &Path| p.strip_prefix(&dir).unwrap_or(p).display().to_string();

    println!("Dependency graph:");
    print!("{}", graph.render(&dir));
    println!("Fix order:");
    for (position, path) in graph.fix_order().iter().enumerate() {
        println!("{}. {}", position + 1, relative(path));
    }
    if !graph.unparsed().is_empty() {
        println!("Unparsed:");
        for path in graph.unparsed() {
            println!("{}", relative(path));
        }
    }
    Ok(exit_codes::OK)
}

fn cmd_audit(file: &Path, no_logging_check: bool, config: Option<&Path>) -> Result<i32> {
    let config = settings(
        config,
        &Overrides {
            disable_logging_check: no_logging_check,
            ..Overrides::default()
        },
    )?;
    if !file.is_file() {
        bail!("target file does not exist: {}", file.display());
    }
    files::ensure_within_size(file, config.max_file_size)?;
    let code = files::read_source(file)?;

    let prompts = PromptSet::load(&config.prompts)?;
    let oracle = ChatOracle::from_env(&config.oracle)?;
    let log = JsonlExperimentLog::new(&config.experiment_log);
    let auditor = Auditor::new(
        &oracle,
        &log,
        &prompts,
        config.rules(),
        config.oracle.auditor,
    );
    let report = auditor.audit(&canonical(file)?, &code, config.require_logging)?;
    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("serialize audit report")?
    );
    Ok(exit_codes::OK)
}

/// Defaults, then the config file, then command-line overrides.
fn settings(path: Option<&Path>, overrides: &Overrides) -> Result<SwarmConfig> {
    let base = match path {
        Some(path) => {
            if !path.is_file() {
                bail!("config file not found: {}", path.display());
            }
            load_config(path)?
        }
        None => load_config(Path::new(DEFAULT_CONFIG_FILE))?,
    };
    apply_overrides(base, overrides)
}

fn canonical(path: &Path) -> Result<PathBuf> {
    fs::canonicalize(path).with_context(|| format!("resolve {}", path.display()))
}
