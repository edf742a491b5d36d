//! Stable exit codes for the `swarm` CLI.

use crate::io::files::FileTooLarge;

/// Command succeeded (pipeline reached `SUCCESS`).
pub const OK: i32 = 0;
/// Invalid configuration, missing input, or a sandbox violation.
pub const INVALID: i32 = 1;
/// A tracked source file exceeds `max_file_size`.
pub const TOO_LARGE: i32 = 2;
/// The pipeline stopped at `max_iterations` without a `SUCCESS` judgement.
pub const NOT_CONVERGED: i32 = 3;

/// Map a fatal error to its exit code.
pub fn for_error(err: &anyhow::Error) -> i32 {
    if err.downcast_ref::<FileTooLarge>().is_some() {
        TOO_LARGE
    } else {
        INVALID
    }
}
