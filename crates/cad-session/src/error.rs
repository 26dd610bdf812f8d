use std::fmt;
use std::io;
use std::path::PathBuf;

use cad_ai::GenerationError;
use cad_mesh::MeshError;
use cad_script::{ExecutionError, ValidationError};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("solid has no surface to export")]
    EmptySolid,

    #[error("mesh is not closed ({triangles} triangles)")]
    NotWatertight { triangles: usize },

    #[error("meshing failed: {0}")]
    Meshing(#[from] MeshError),

    #[error("invalid artifact file name '{0}'")]
    InvalidFileName(String),

    #[error("artifact '{0}' not found")]
    NotFound(String),

    #[error("artifact I/O failed for {}: {source}", .path.display())]
    Io { path: PathBuf, source: io::Error },
}

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("history I/O failed for {}: {source}", .path.display())]
    Io { path: PathBuf, source: io::Error },

    #[error("history file {} is corrupt: {source}", .path.display())]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("history file {} has unsupported version {version}", .path.display())]
    UnsupportedVersion { path: PathBuf, version: u32 },

    #[error("history file {} is inconsistent: {reason}", .path.display())]
    Inconsistent { path: PathBuf, reason: String },

    #[error("failed to lock {}: {source}", .path.display())]
    Lock { path: PathBuf, source: io::Error },
}

/// Any failure of a user-facing operation.
#[derive(Debug, thiserror::Error)]
pub enum OperationError {
    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error("invalid script: {0}")]
    Validation(#[from] ValidationError),

    #[error("execution failed: {0}")]
    Execution(#[from] ExecutionError),

    #[error("export failed: {0}")]
    Export(#[from] ExportError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error("unknown turn '{0}'")]
    UnknownTurn(String),
}

impl OperationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OperationError::Generation(_) => ErrorKind::Generation,
            OperationError::Validation(_) => ErrorKind::Validation,
            OperationError::Execution(_) => ErrorKind::Execution,
            OperationError::Export(_) => ErrorKind::Export,
            OperationError::Persistence(_) => ErrorKind::Persistence,
            OperationError::UnknownTurn(_) => ErrorKind::UnknownTurn,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Generation,
    Validation,
    Execution,
    Export,
    Persistence,
    UnknownTurn,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Generation => "generation",
            ErrorKind::Validation => "validation",
            ErrorKind::Execution => "execution",
            ErrorKind::Export => "export",
            ErrorKind::Persistence => "persistence",
            ErrorKind::UnknownTurn => "unknown_turn",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
