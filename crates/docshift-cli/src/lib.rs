//! docshift command line
//!
//! Runs migration job files against JSON collection files and generates
//! contract fixtures.

#![warn(unreachable_pub)]

pub mod commands;
pub mod job_file;
pub mod logging;

/// Process exit status on success
pub const EXIT_OK: i32 = 0;
/// Process exit status when a job fails
pub const EXIT_FAILURE: i32 = 1;
/// Process exit status on an unexpected fault (panic)
pub const EXIT_PANIC: i32 = 7;

/// Exit status for a failed run: worker panics count as unexpected faults
#[must_use]
pub fn exit_code(error: &anyhow::Error) -> i32 {
    let panicked = error
        .chain()
        .filter_map(|cause| cause.downcast_ref::<docshift_core::MigrationError>())
        .any(docshift_core::MigrationError::is_panic);
    if panicked {
        EXIT_PANIC
    } else {
        EXIT_FAILURE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;
    use docshift_core::{MigrationError, TaskError, ValidationError};

    fn failed(error: MigrationError) -> anyhow::Error {
        Err::<(), _>(error).context("job 'job.json' failed").unwrap_err()
    }

    #[test]
    fn worker_panic_exits_with_fault_status() {
        let error = failed(TaskError::Panicked("index out of bounds".into()).into());
        assert_eq!(exit_code(&error), EXIT_PANIC);
    }

    #[test]
    fn migration_errors_exit_with_failure_status() {
        assert_eq!(exit_code(&failed(ValidationError::InvalidWriteMode.into())), EXIT_FAILURE);
        assert_eq!(exit_code(&failed(TaskError::Aborted.into())), EXIT_FAILURE);
        assert_eq!(exit_code(&anyhow::anyhow!("unreadable job file")), EXIT_FAILURE);
    }
}
