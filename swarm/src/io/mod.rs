//! Side-effecting collaborators used by the agents and the pipeline.

pub mod analysis;
pub mod config;
pub mod experiment_log;
pub mod files;
pub mod oracle;
pub mod process;
pub mod prompt;
pub mod sandbox;
