//! ctx-eval - retrieval-quality evaluation for a RAG search product.
//!
//! Answers "did this change make search better or worse?" by scoring search
//! output against curated golden queries and comparing runs over time.
//!
//! # Overview
//!
//! 1. Golden entries (a query plus its expected files and/or answer) are kept
//!    per project by the [`GoldenStore`]
//! 2. The search pipeline's ranked file paths are scored against them with
//!    IR metrics (MRR, Precision@K, Recall@K, Hit Rate, NDCG, MAP)
//! 3. Stored runs are compared to flag regressions and improvements
//! 4. Optionally, answers are graded by a judge model through the
//!    [`JudgeBridge`]
//!
//! # Quick Start
//!
//! ```no_run
//! use ctx_eval::{
//!     config::EvalConfig,
//!     golden::{GoldenStore, NewGoldenEntry},
//!     metrics::{QueryResult, compute_aggregate_metrics},
//!     trend::{EvalRun, compute_trend},
//! };
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = EvalConfig::load()?;
//!     config.validate()?;
//!
//!     let store = GoldenStore::new(&config.golden_path);
//!     store.add(
//!         "my-project",
//!         NewGoldenEntry::new("where is the session cookie set?")
//!             .with_files(["src/auth/session.ts"]),
//!     )?;
//!
//!     let queries: Vec<QueryResult> = store
//!         .list("my-project")?
//!         .into_iter()
//!         .map(|entry| QueryResult {
//!             retrieved: vec!["./src/auth/Session.ts".to_string()],
//!             expected: entry.expected_file_paths.unwrap_or_default(),
//!         })
//!         .collect();
//!
//!     let metrics = compute_aggregate_metrics(&queries, Some(config.default_k));
//!     let run_config = serde_json::json!({});
//!     let run = EvalRun::new("my-project", "1.0", queries.len(), &metrics, &run_config)?;
//!
//!     let trend = compute_trend(&[run])?;
//!     println!("{}", ctx_eval::trend::format_trend_report(&trend));
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - **paths**: Path normalization and file-level deduplication
//! - **metrics**: Pure retrieval metrics and threshold checks
//! - **trend**: Run-over-run comparison and trend reports
//! - **golden**: Versioned per-project golden dataset files
//! - **judge**: Subprocess bridge to RAGAS / DeepEval

pub mod config;
pub mod error;
pub mod golden;
pub mod judge;
pub mod metrics;
pub mod paths;
pub mod trend;

// Re-export commonly used types
pub use config::EvalConfig;
pub use error::{ErrorCode, EvalError, Result};
pub use golden::{EntrySource, GoldenDataset, GoldenEntry, GoldenStore, NewGoldenEntry};
pub use judge::{DeepEvalResults, JudgeBridge, PythonAvailability, RagasResults};
pub use metrics::{QueryResult, RetrievalMetrics, compute_aggregate_metrics};
pub use paths::normalize_path;
pub use trend::{EvalRun, MetricTrend, TrendResult, compare_runs, compute_trend};
