//! Error types for startup-time
//!
//! Configuration, build and correctness failures all abort the run. A missing
//! compiler or interpreter is not an error: the affected test is disabled.

use std::path::PathBuf;

use thiserror::Error;

/// Test catalog errors, raised at load time or while resolving selectors
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Failed to read test catalog {0}: {1}")]
    Unreadable(PathBuf, String),

    #[error("Failed to parse test catalog: {0}")]
    Parse(String),

    #[error("invalid test spec ({0}): compiled tests must define a source file")]
    MissingSource(String),

    #[error("invalid test spec ({id}): group ID ({group}) conflicts with test ID")]
    GroupConflict { id: String, group: String },

    #[error("invalid test spec ({id}): bytecode stage {stage:?} is not a compiled test")]
    InvalidStage { id: String, stage: String },

    #[error("invalid test spec ({0}): a compile strategy requires a compile command")]
    StrategyWithoutCompile(String),

    #[error("Can't resolve IDs for: {0:?}")]
    UnknownId(String),
}

/// Build directory and compilation errors
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("Don't know how to build {0}")]
    MissingPrerequisite(String),

    #[error("Dependency cycle detected at {0}")]
    CycleDetected(String),

    #[error("Command failed with status ({status}): {command}")]
    CommandFailed { command: String, status: String },

    #[error("Failed to run {command}: {message}")]
    SpawnFailed { command: String, message: String },
}

/// Errors raised while checking or timing a benchmark program
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("error running {id} ({status}): {output}")]
    Failed {
        id: String,
        status: String,
        output: String,
    },

    #[error("invalid output for {id}: {output:?}")]
    InvalidOutput { id: String, output: String },

    #[error("Process spawn failed for {id}: {message}")]
    SpawnFailed { id: String, message: String },
}

/// Exit codes
pub mod exit_codes {
    pub const GENERAL_ERROR: i32 = 1;
    pub const CONFIG_ERROR: i32 = 2;
    pub const BUILD_FAILED: i32 = 3;
    pub const TEST_FAILED: i32 = 4;
}

/// Get exit code for an error
pub fn get_exit_code(err: &anyhow::Error) -> i32 {
    if err.downcast_ref::<CatalogError>().is_some() {
        exit_codes::CONFIG_ERROR
    } else if err.downcast_ref::<BuildError>().is_some() {
        exit_codes::BUILD_FAILED
    } else if err.downcast_ref::<ExecutionError>().is_some() {
        exit_codes::TEST_FAILED
    } else {
        exit_codes::GENERAL_ERROR
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_exit_codes() {
        let err = anyhow::Error::from(CatalogError::UnknownId("nope".into()));
        assert_eq!(get_exit_code(&err), exit_codes::CONFIG_ERROR);

        let err = anyhow::Error::from(BuildError::MissingPrerequisite("a.c".into()));
        assert_eq!(get_exit_code(&err), exit_codes::BUILD_FAILED);

        let err = anyhow::Error::from(ExecutionError::InvalidOutput {
            id: "c".into(),
            output: String::new(),
        });
        assert_eq!(get_exit_code(&err), exit_codes::TEST_FAILED);

        assert_eq!(get_exit_code(&anyhow::anyhow!("other")), exit_codes::GENERAL_ERROR);
    }

    #[test]
    fn test_exit_code_survives_context() {
        let result: Result<(), CatalogError> = Err(CatalogError::MissingSource("c".into()));
        let err = result.context("loading catalog").unwrap_err();
        assert_eq!(get_exit_code(&err), exit_codes::CONFIG_ERROR);
    }

    #[test]
    fn test_messages() {
        let err = CatalogError::UnknownId("nope".into());
        assert_eq!(err.to_string(), "Can't resolve IDs for: \"nope\"");

        let err = CatalogError::GroupConflict {
            id: "ruby".into(),
            group: "python".into(),
        };
        assert!(err.to_string().contains("conflicts with test ID"));
    }
}
