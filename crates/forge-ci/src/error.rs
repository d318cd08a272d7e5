//! Error taxonomy for forge pipeline runs.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Version-control metadata a publish run depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataField {
    Commit,
    RepoName,
    Branch,
}

impl fmt::Display for MetadataField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            MetadataField::Commit => "commit",
            MetadataField::RepoName => "repository name",
            MetadataField::Branch => "branch",
        };
        f.write_str(label)
    }
}

/// Errors produced by stages, collaborators and function dispatch.
#[derive(Debug, thiserror::Error)]
pub enum ForgeError {
    /// Static analysis reported diagnostics. Displays the diagnostic text verbatim.
    #[error("{0}")]
    Verification(String),

    /// Version-control metadata could not be read.
    #[error("error retrieving {0}")]
    Metadata(MetadataField),

    /// An external tool could not be started.
    #[error("failed to run {program}: {message}")]
    Command { program: String, message: String },

    /// An external tool exited unsuccessfully.
    #[error("{program} exited with code {exit_code}: {stderr}")]
    CommandFailed {
        program: String,
        exit_code: i32,
        stderr: String,
    },

    /// A clean work tree was required but it has uncommitted changes.
    #[error("work tree at {} has uncommitted changes", .0.display())]
    DirtyWorkTree(std::path::PathBuf),

    /// An external tool exceeded the configured timeout.
    #[error("{program} timed out after {secs} seconds")]
    Timeout { program: String, secs: u64 },

    #[error("unknown function: {0}")]
    UnknownFunction(String),

    #[error("function {function} missing required argument: {param}")]
    MissingArgument { function: String, param: String },

    #[error("function {function} has no argument named {param}")]
    UnexpectedArgument { function: String, param: String },

    #[error("function {function} argument {param} must be a {expected}")]
    InvalidArgument {
        function: String,
        param: String,
        expected: String,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for forge operations.
pub type Result<T> = std::result::Result<T, ForgeError>;
