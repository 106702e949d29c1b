use crate::bridge::BridgeError;
use crate::engine::EngineError;
use crate::imageio::ImageIoError;
use crate::resolve::OpName;
use std::path::PathBuf;
use thiserror::Error;

/// Bad or missing arguments and settings. Raised before any engine or
/// image work starts.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("opName must be one of {:?}, got {:?}", OpName::ALL.map(|op| op.as_str()), .found)]
    InvalidOperation { found: Option<String> },

    #[error("{input} must be defined to run {op}")]
    MissingRequiredInput { input: &'static str, op: OpName },

    #[error("{param} must be defined to run {op}")]
    MissingRequiredParameter { param: &'static str, op: OpName },

    #[error("invalid {param} {value:?}: {reason}")]
    InvalidParameter {
        param: &'static str,
        value: String,
        reason: String,
    },

    #[error("cannot list input directory {}: {source}", .path.display())]
    InputDirectory {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid {name} setting {value:?}: {reason}")]
    InvalidSetting {
        name: &'static str,
        value: String,
        reason: &'static str,
    },

    #[error("cannot read parameter file {}: {reason}", .path.display())]
    ParamsFile { path: PathBuf, reason: String },
}

/// Failure while handling one file. Aborts the run.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to load {}: {source}", .path.display())]
    Load { path: PathBuf, source: ImageIoError },

    #[error("failed to convert {}: {source}", .path.display())]
    Convert { path: PathBuf, source: EngineError },

    #[error("filter failed on {}: {source}", .path.display())]
    Invoke { path: PathBuf, source: EngineError },

    #[error("failed to save {}: {source}", .path.display())]
    Save { path: PathBuf, source: ImageIoError },

    #[error(
        "{} would overwrite {}, already written in this run",
        .path.display(),
        .output.display()
    )]
    OutputClash { path: PathBuf, output: PathBuf },
}

impl ProcessError {
    /// The file the failure is attributed to.
    pub fn path(&self) -> &PathBuf {
        match self {
            ProcessError::Load { path, .. }
            | ProcessError::Convert { path, .. }
            | ProcessError::Invoke { path, .. }
            | ProcessError::Save { path, .. }
            | ProcessError::OutputClash { path, .. } => path,
        }
    }
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    RuntimeInit(#[from] BridgeError),

    #[error(transparent)]
    PerFile(#[from] ProcessError),

    #[error("cannot create output directory {}: {source}", .path.display())]
    OutputDirectory {
        path: PathBuf,
        source: std::io::Error,
    },
}
