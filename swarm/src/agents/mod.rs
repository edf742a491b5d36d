//! Agents that combine deterministic core logic with the oracle.
//!
//! Each agent borrows its collaborators, converts oracle failures into values
//! locally, and records one experiment-log entry per call.

use tracing::warn;

use crate::io::oracle::{CompletionRequest, Oracle};

pub mod auditor;
pub mod fixer;
pub mod judge;

/// Oracle reply text, or the error rendered as feedback.
pub(crate) fn oracle_text<O: Oracle>(oracle: &O, request: &CompletionRequest) -> String {
    match oracle.complete(request) {
        Ok(text) => text,
        Err(err) => {
            warn!(error = %err, "oracle unavailable");
            unavailable(&err)
        }
    }
}

pub(crate) fn unavailable(err: &dyn std::fmt::Display) -> String {
    format!("[LLM unavailable] {err}")
}
