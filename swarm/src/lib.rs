//! Iterative code-repair orchestrator.
//!
//! The crate drives an audit → fix → judge loop over a Python project until an
//! external test/lint run is judged clean or an iteration cap is reached. The
//! architecture keeps a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (audit rules, dependency ordering,
//!   plan construction, verdict override). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting collaborators (filesystem, sandbox, subprocesses,
//!   language-model oracle, experiment log). Each sits behind a small trait or
//!   struct so tests can substitute scripted fakes.
//!
//! [`agents`] combine the two into the auditor, fixer and judge, and
//! [`pipeline`] runs the iteration state machine.

pub mod agents;
pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod pipeline;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
