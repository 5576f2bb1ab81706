//! Judge-model bridge.
//!
//! Answer-quality metrics (faithfulness, relevancy) are computed by external
//! Python frameworks. This module provides:
//! - The subprocess bridge that runs them with timeouts and output limits
//! - Strictly validated result types
//! - The embedded interpreter scripts
//! - Writers for the runners' input formats

pub mod bridge;
pub mod export;
pub mod results;
pub mod scripts;

pub use bridge::{Framework, JudgeBridge, JudgeSettings};
pub use export::{DeepEvalRow, RagasRow, write_rows};
pub use results::{
    DeepEvalMetricScore, DeepEvalResults, DeepEvalRowScores, ExecutionMetadata, JudgeOutput,
    PythonAvailability, RagasResults, RagasRowScores, decode_output,
};
pub use scripts::{ScriptSet, Scripts};
