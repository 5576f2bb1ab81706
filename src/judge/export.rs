//! Input rows for the judge-model runners.

use crate::error::{EvalError, Result};
use crate::golden::GoldenEntry;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// One RAGAS input row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RagasRow {
    pub question: String,
    pub answer: String,
    pub contexts: Vec<String>,
    pub ground_truths: Vec<String>,
}

impl RagasRow {
    /// Row for a golden entry, using its expected answer as ground truth.
    pub fn from_golden(
        entry: &GoldenEntry,
        answer: impl Into<String>,
        contexts: Vec<String>,
    ) -> Self {
        Self {
            question: entry.query.clone(),
            answer: answer.into(),
            contexts,
            ground_truths: entry.expected_answer.iter().cloned().collect(),
        }
    }
}

/// One DeepEval input row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeepEvalRow {
    pub input: String,
    pub actual_output: String,
    pub retrieval_context: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_output: Option<String>,
}

impl DeepEvalRow {
    pub fn from_golden(
        entry: &GoldenEntry,
        actual_output: impl Into<String>,
        retrieval_context: Vec<String>,
    ) -> Self {
        Self {
            input: entry.query.clone(),
            actual_output: actual_output.into(),
            retrieval_context,
            expected_output: entry.expected_answer.clone(),
        }
    }
}

/// Write rows as a JSON array, the input format both runners read.
pub fn write_rows<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| EvalError::io(parent, e))?;
        }
    }

    let content = serde_json::to_string_pretty(rows)
        .map_err(|e| EvalError::ragas(format!("cannot serialize export rows: {}", e)))?;
    fs::write(path, content).map_err(|e| EvalError::io(path, e))?;
    Ok(())
}
