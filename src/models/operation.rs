use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, FsError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    CreateDir,
    CreateFile,
    Copy,
    Move,
    Rename,
    Delete,
}

impl std::fmt::Display for OperationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CreateDir => write!(f, "create_dir"),
            Self::CreateFile => write!(f, "create_file"),
            Self::Copy => write!(f, "copy"),
            Self::Move => write!(f, "move"),
            Self::Rename => write!(f, "rename"),
            Self::Delete => write!(f, "delete"),
        }
    }
}

impl std::str::FromStr for OperationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create_dir" => Ok(Self::CreateDir),
            "create_file" => Ok(Self::CreateFile),
            "copy" => Ok(Self::Copy),
            "move" => Ok(Self::Move),
            "rename" => Ok(Self::Rename),
            "delete" => Ok(Self::Delete),
            _ => Err(format!("unknown operation type: {s}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationFailure {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&FsError> for OperationFailure {
    fn from(err: &FsError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Outcome of a mutating action. Never carries a raw error; the caller
/// renders `error`/`warning` uniformly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationResult {
    pub operation: OperationType,
    pub succeeded: bool,
    pub affected_paths: Vec<PathBuf>,
    pub error: Option<OperationFailure>,
    pub warning: Option<OperationFailure>,
}

impl OperationResult {
    pub fn success(operation: OperationType, affected_paths: Vec<PathBuf>) -> Self {
        Self {
            operation,
            succeeded: true,
            affected_paths,
            error: None,
            warning: None,
        }
    }

    pub fn failure(operation: OperationType, affected_paths: Vec<PathBuf>, err: &FsError) -> Self {
        Self {
            operation,
            succeeded: false,
            affected_paths,
            error: Some(err.into()),
            warning: None,
        }
    }

    pub fn with_warning(mut self, err: &FsError) -> Self {
        self.warning = Some(err.into());
        self
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }

    /// A delete whose target was already gone achieved what was asked.
    pub fn is_benign(&self) -> bool {
        self.operation == OperationType::Delete && self.error_kind() == Some(ErrorKind::NotFound)
    }
}
