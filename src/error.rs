use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Coarse classification of a failure, stable enough for a UI to branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    PermissionDenied,
    NotADirectory,
    AlreadyExists,
    InvalidName,
    Boundary,
    PartialMove,
    NotEmpty,
    InvalidTarget,
    InvalidContent,
    Io,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::NotFound => "not_found",
            Self::PermissionDenied => "permission_denied",
            Self::NotADirectory => "not_a_directory",
            Self::AlreadyExists => "already_exists",
            Self::InvalidName => "invalid_name",
            Self::Boundary => "boundary",
            Self::PartialMove => "partial_move",
            Self::NotEmpty => "not_empty",
            Self::InvalidTarget => "invalid_target",
            Self::InvalidContent => "invalid_content",
            Self::Io => "io",
        };
        f.write_str(s)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FsError {
    #[error("path does not exist: {0}")]
    NotFound(PathBuf),

    #[error("permission denied: {0}")]
    PermissionDenied(PathBuf),

    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("already exists: {0}")]
    AlreadyExists(PathBuf),

    #[error("invalid name {name:?}: {reason}")]
    InvalidName { name: String, reason: &'static str },

    #[error("already at filesystem root: {0}")]
    Boundary(PathBuf),

    #[error("copied {source_path} to {dest}, but removing the source failed: {cause}")]
    PartialMove {
        source_path: PathBuf,
        dest: PathBuf,
        cause: io::Error,
    },

    #[error("directory not empty: {0}")]
    NotEmpty(PathBuf),

    #[error("invalid target {path}: {reason}")]
    InvalidTarget { path: PathBuf, reason: String },

    #[error("content cannot be encoded as {charset}: {reason}")]
    InvalidContent {
        charset: &'static str,
        reason: String,
    },

    #[error("IO error on {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
}

impl FsError {
    /// Classify an IO error raised while touching `path`.
    pub fn from_io(err: io::Error, path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        match err.kind() {
            io::ErrorKind::NotFound => Self::NotFound(path),
            io::ErrorKind::PermissionDenied => Self::PermissionDenied(path),
            io::ErrorKind::NotADirectory => Self::NotADirectory(path),
            io::ErrorKind::AlreadyExists => Self::AlreadyExists(path),
            io::ErrorKind::DirectoryNotEmpty => Self::NotEmpty(path),
            _ => Self::Io { path, source: err },
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::PermissionDenied(_) => ErrorKind::PermissionDenied,
            Self::NotADirectory(_) => ErrorKind::NotADirectory,
            Self::AlreadyExists(_) => ErrorKind::AlreadyExists,
            Self::InvalidName { .. } => ErrorKind::InvalidName,
            Self::Boundary(_) => ErrorKind::Boundary,
            Self::PartialMove { .. } => ErrorKind::PartialMove,
            Self::NotEmpty(_) => ErrorKind::NotEmpty,
            Self::InvalidTarget { .. } => ErrorKind::InvalidTarget,
            Self::InvalidContent { .. } => ErrorKind::InvalidContent,
            Self::Io { .. } => ErrorKind::Io,
        }
    }
}

/// Extension for attaching the offending path to `io::Result`s.
pub(crate) trait IoResultExt<T> {
    fn at(self, path: impl AsRef<Path>) -> Result<T, FsError>;
}

impl<T> IoResultExt<T> for io::Result<T> {
    fn at(self, path: impl AsRef<Path>) -> Result<T, FsError> {
        self.map_err(|e| FsError::from_io(e, path))
    }
}

impl Serialize for FsError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

pub type Result<T, E = FsError> = std::result::Result<T, E>;
