//! Error types for the evaluation engine.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our custom error.
pub type Result<T> = std::result::Result<T, EvalError>;

/// Stable machine-readable code attached to every [`EvalError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    DatasetNotFound,
    DatasetInvalid,
    EvalRunFailed,
    LangfuseError,
    RagasError,
    IoError,
    ConfigInvalid,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::DatasetNotFound => "DATASET_NOT_FOUND",
            ErrorCode::DatasetInvalid => "DATASET_INVALID",
            ErrorCode::EvalRunFailed => "EVAL_RUN_FAILED",
            ErrorCode::LangfuseError => "LANGFUSE_ERROR",
            ErrorCode::RagasError => "RAGAS_ERROR",
            ErrorCode::IoError => "IO_ERROR",
            ErrorCode::ConfigInvalid => "CONFIG_INVALID",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur while evaluating retrieval quality.
#[derive(Error, Debug)]
pub enum EvalError {
    /// No golden dataset exists for the project.
    #[error(
        "No golden dataset for project '{project}' (expected at '{path}'). \
         Add entries with `ctx-eval golden add {project} --query ...`"
    )]
    DatasetNotFound { project: String, path: PathBuf },

    /// The golden dataset file exists but cannot be used.
    #[error("Invalid golden dataset at '{path}': {detail}")]
    DatasetInvalid { path: PathBuf, detail: String },

    /// An evaluation run could not be computed or compared.
    #[error("Evaluation run failed: {0}")]
    EvalRunFailed(String),

    /// Reserved for the trace cloud-sync collaborator.
    #[error("Langfuse error: {0}. Check LANGFUSE_PUBLIC_KEY, LANGFUSE_SECRET_KEY and LANGFUSE_HOST")]
    Langfuse(String),

    /// The judge-model subprocess failed or returned unusable output.
    #[error("Judge-model evaluation failed: {0}")]
    Ragas(String),

    /// Error reading or writing files.
    #[error("I/O error for path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl EvalError {
    /// The code identifying this error's category.
    pub fn code(&self) -> ErrorCode {
        match self {
            EvalError::DatasetNotFound { .. } => ErrorCode::DatasetNotFound,
            EvalError::DatasetInvalid { .. } => ErrorCode::DatasetInvalid,
            EvalError::EvalRunFailed(_) => ErrorCode::EvalRunFailed,
            EvalError::Langfuse(_) => ErrorCode::LangfuseError,
            EvalError::Ragas(_) => ErrorCode::RagasError,
            EvalError::Io { .. } => ErrorCode::IoError,
            EvalError::Config(_) => ErrorCode::ConfigInvalid,
        }
    }

    pub fn dataset_not_found(project: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self::DatasetNotFound {
            project: project.into(),
            path: path.into(),
        }
    }

    pub fn dataset_invalid(path: impl Into<PathBuf>, detail: impl Into<String>) -> Self {
        Self::DatasetInvalid {
            path: path.into(),
            detail: detail.into(),
        }
    }

    pub fn eval_run_failed(detail: impl Into<String>) -> Self {
        Self::EvalRunFailed(detail.into())
    }

    pub fn langfuse(detail: impl Into<String>) -> Self {
        Self::Langfuse(detail.into())
    }

    pub fn ragas(detail: impl Into<String>) -> Self {
        Self::Ragas(detail.into())
    }

    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn config(detail: impl Into<String>) -> Self {
        Self::Config(detail.into())
    }
}
