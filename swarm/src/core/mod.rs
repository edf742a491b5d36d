//! Deterministic, pure logic shared by the pipeline.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! source text and reports and return deterministic outputs suitable for tests.

pub mod depgraph;
pub mod plan;
pub mod reply;
pub mod rules;
pub mod syntax;
pub mod types;
pub mod verdict;
