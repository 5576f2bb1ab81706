//! Typed results returned by the judge-model scripts.
//!
//! Script output is untrusted: it is decoded into structs that reject unknown
//! fields, then bounds-checked. A result is either entirely valid or rejected
//! with every violation listed.

use crate::error::{EvalError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Characters of raw output quoted in decode errors.
const SNIPPET_LEN: usize = 500;

/// What the availability probe found.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PythonAvailability {
    pub python: bool,
    pub python_version: Option<String>,
    pub ragas: bool,
    pub ragas_version: Option<String>,
    pub deepeval: bool,
    pub deepeval_version: Option<String>,
}

impl PythonAvailability {
    /// Whether any judge-model framework can be used.
    pub fn any_framework(&self) -> bool {
        self.ragas || self.deepeval
    }
}

/// JSON printed by the probe script.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct ProbeOutput {
    python_version: Option<String>,
    ragas: bool,
    ragas_version: Option<String>,
    deepeval: bool,
    deepeval_version: Option<String>,
}

impl From<ProbeOutput> for PythonAvailability {
    fn from(probe: ProbeOutput) -> Self {
        Self {
            python: true,
            python_version: probe.python_version,
            ragas: probe.ragas,
            ragas_version: probe.ragas_version,
            deepeval: probe.deepeval,
            deepeval_version: probe.deepeval_version,
        }
    }
}

/// How a script run went.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExecutionMetadata {
    pub model: String,
    pub metrics: Vec<String>,
    pub row_count: usize,
    pub duration_seconds: f64,
    pub framework_version: Option<String>,
}

/// RAGAS scores for an exported dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RagasResults {
    /// Mean score per metric.
    pub scores: BTreeMap<String, f64>,
    pub rows: Vec<RagasRowScores>,
    pub metadata: ExecutionMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RagasRowScores {
    pub question: String,
    /// `None` when the framework could not score the row.
    pub scores: BTreeMap<String, Option<f64>>,
}

/// DeepEval scores for an exported dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeepEvalResults {
    /// Mean score per metric.
    pub scores: BTreeMap<String, f64>,
    pub rows: Vec<DeepEvalRowScores>,
    pub metadata: ExecutionMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeepEvalRowScores {
    pub input: String,
    pub metrics: BTreeMap<String, DeepEvalMetricScore>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeepEvalMetricScore {
    pub score: f64,
    pub success: bool,
    pub reason: Option<String>,
}

/// Output of a runner script that can be checked against the request.
pub trait JudgeOutput: DeserializeOwned {
    /// Every way this result disagrees with its schema or the request.
    fn violations(&self, requested: &[String]) -> Vec<String>;
}

impl JudgeOutput for RagasResults {
    fn violations(&self, requested: &[String]) -> Vec<String> {
        let mut violations = Vec::new();
        check_scores(&self.scores, requested, &mut violations);
        self.metadata.check(self.rows.len(), &mut violations);

        for (i, row) in self.rows.iter().enumerate() {
            for (metric, score) in &row.scores {
                if let Some(score) = score {
                    check_unit(&format!("rows[{}].scores.{}", i, metric), *score, &mut violations);
                }
            }
        }

        violations
    }
}

impl JudgeOutput for DeepEvalResults {
    fn violations(&self, requested: &[String]) -> Vec<String> {
        let mut violations = Vec::new();
        check_scores(&self.scores, requested, &mut violations);
        self.metadata.check(self.rows.len(), &mut violations);

        for (i, row) in self.rows.iter().enumerate() {
            for (metric, detail) in &row.metrics {
                check_unit(
                    &format!("rows[{}].metrics.{}.score", i, metric),
                    detail.score,
                    &mut violations,
                );
            }
        }

        violations
    }
}

impl ExecutionMetadata {
    fn check(&self, row_count: usize, violations: &mut Vec<String>) {
        if self.row_count != row_count {
            violations.push(format!(
                "metadata.row_count: {} does not match {} rows",
                self.row_count, row_count
            ));
        }
        if !self.duration_seconds.is_finite() || self.duration_seconds < 0.0 {
            violations.push(format!(
                "metadata.duration_seconds: {} must be a non-negative number",
                self.duration_seconds
            ));
        }
    }
}

fn check_scores(
    scores: &BTreeMap<String, f64>,
    requested: &[String],
    violations: &mut Vec<String>,
) {
    for metric in requested {
        if !scores.contains_key(metric) {
            violations.push(format!("scores.{}: missing requested metric", metric));
        }
    }
    for (metric, score) in scores {
        check_unit(&format!("scores.{}", metric), *score, violations);
    }
}

fn check_unit(field: &str, value: f64, violations: &mut Vec<String>) {
    if !(0.0..=1.0).contains(&value) {
        violations.push(format!("{}: {} is outside [0, 1]", field, value));
    }
}

/// Decode and validate raw runner output.
pub fn decode_output<T: JudgeOutput>(raw: &str, requested: &[String]) -> Result<T> {
    let parsed: T = serde_json::from_str(raw).map_err(|e| {
        EvalError::ragas(format!(
            "could not parse judge-model output: {}. Output: {}",
            e,
            snippet(raw)
        ))
    })?;

    let violations = parsed.violations(requested);
    if !violations.is_empty() {
        return Err(EvalError::ragas(format!(
            "judge-model output failed validation: {}",
            violations.join("; ")
        )));
    }

    Ok(parsed)
}

/// Decode the probe script's standard output.
pub(crate) fn decode_probe(raw: &str) -> Result<PythonAvailability> {
    let probe: ProbeOutput = serde_json::from_str(raw.trim()).map_err(|e| {
        EvalError::ragas(format!(
            "could not parse availability probe output: {}. Output: {}",
            e,
            snippet(raw)
        ))
    })?;
    Ok(probe.into())
}

/// Leading part of `raw`, cut on a character boundary.
pub(crate) fn snippet(raw: &str) -> String {
    let trimmed = raw.trim();
    match trimmed.char_indices().nth(SNIPPET_LEN) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    fn requested(metrics: &[&str]) -> Vec<String> {
        metrics.iter().map(|m| m.to_string()).collect()
    }

    const RAGAS_OK: &str = r#"{
        "scores": {"faithfulness": 0.9, "answer_relevancy": 0.75},
        "rows": [
            {"question": "q1", "scores": {"faithfulness": 1.0, "answer_relevancy": 0.5}},
            {"question": "q2", "scores": {"faithfulness": 0.8, "answer_relevancy": null}}
        ],
        "metadata": {
            "model": "gpt-4o-mini",
            "metrics": ["faithfulness", "answer_relevancy"],
            "row_count": 2,
            "duration_seconds": 12.5,
            "framework_version": "0.1.9"
        }
    }"#;

    #[test]
    fn test_decode_ragas() {
        let results: RagasResults =
            decode_output(RAGAS_OK, &requested(&["faithfulness", "answer_relevancy"])).unwrap();
        assert_eq!(results.scores["faithfulness"], 0.9);
        assert_eq!(results.rows.len(), 2);
        assert_eq!(results.rows[1].scores["answer_relevancy"], None);
        assert_eq!(results.metadata.framework_version.as_deref(), Some("0.1.9"));
    }

    #[test]
    fn test_decode_rejects_out_of_range_and_missing() {
        let raw = r#"{
            "scores": {"faithfulness": 1.2},
            "rows": [{"question": "q", "scores": {"faithfulness": -0.1}}],
            "metadata": {"model": "m", "metrics": [], "row_count": 3,
                         "duration_seconds": 1.0, "framework_version": null}
        }"#;
        let err = decode_output::<RagasResults>(
            raw,
            &requested(&["faithfulness", "context_recall"]),
        )
        .unwrap_err();
        assert_eq!(err.code(), ErrorCode::RagasError);

        let message = err.to_string();
        assert!(message.contains("scores.faithfulness: 1.2 is outside [0, 1]"));
        assert!(message.contains("scores.context_recall: missing requested metric"));
        assert!(message.contains("rows[0].scores.faithfulness"));
        assert!(message.contains("metadata.row_count"));
    }

    #[test]
    fn test_decode_rejects_unknown_fields() {
        let raw = r#"{"scores": {}, "rows": [], "metadata": {"model": "m", "metrics": [],
            "row_count": 0, "duration_seconds": 0, "framework_version": null}, "extra": 1}"#;
        let err = decode_output::<RagasResults>(raw, &[]).unwrap_err();
        assert!(err.to_string().contains("extra"));
    }

    #[test]
    fn test_decode_invalid_json_includes_snippet() {
        let err =
            decode_output::<RagasResults>("Traceback (most recent call last)", &[]).unwrap_err();
        assert!(err.to_string().contains("Traceback"));
    }

    #[test]
    fn test_decode_deepeval() {
        let raw = r#"{
            "scores": {"faithfulness": 0.5},
            "rows": [
                {"input": "q", "metrics": {"faithfulness": {"score": 0.5, "success": false, "reason": "partly unsupported"}}}
            ],
            "metadata": {"model": "m", "metrics": ["faithfulness"], "row_count": 1,
                         "duration_seconds": 3.0, "framework_version": "1.0.0"}
        }"#;
        let results: DeepEvalResults = decode_output(raw, &requested(&["faithfulness"])).unwrap();
        let detail = &results.rows[0].metrics["faithfulness"];
        assert!(!detail.success);
        assert_eq!(detail.reason.as_deref(), Some("partly unsupported"));
    }

    #[test]
    fn test_decode_deepeval_row_bounds() {
        let raw = r#"{
            "scores": {"hallucination": 0.5},
            "rows": [{"input": "q", "metrics": {"hallucination": {"score": 3.0, "success": true, "reason": null}}}],
            "metadata": {"model": "m", "metrics": ["hallucination"], "row_count": 1,
                         "duration_seconds": 3.0, "framework_version": null}
        }"#;
        let err =
            decode_output::<DeepEvalResults>(raw, &requested(&["hallucination"])).unwrap_err();
        assert!(err.to_string().contains("rows[0].metrics.hallucination.score"));
    }

    #[test]
    fn test_decode_probe() {
        let availability = decode_probe(
            r#"{"python_version": "3.12.1", "ragas": true, "ragas_version": "0.1.9", "deepeval": false, "deepeval_version": null}
"#,
        )
        .unwrap();
        assert!(availability.python);
        assert!(availability.ragas);
        assert!(!availability.deepeval);
        assert!(availability.any_framework());
        assert_eq!(availability.python_version.as_deref(), Some("3.12.1"));
    }

    #[test]
    fn test_decode_probe_is_strict() {
        for raw in [
            "{}",
            r#"{"python_version": "3.12.1", "ragas": true}"#,
            r#"{"python_version": "3.12.1", "ragas": true, "ragas_version": null,
                "deepeval": false, "deepeval_version": null, "torch": true}"#,
        ] {
            let err = decode_probe(raw).unwrap_err();
            assert_eq!(err.code(), ErrorCode::RagasError, "{raw}");
        }
    }

    #[test]
    fn test_snippet_truncates_on_char_boundary() {
        let raw = "é".repeat(600);
        let cut = snippet(&raw);
        assert!(cut.ends_with("..."));
        assert_eq!(cut.chars().count(), SNIPPET_LEN + 3);
        assert_eq!(snippet("  short "), "short");
    }
}
