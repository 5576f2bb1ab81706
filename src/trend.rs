//! Run-over-run comparison of retrieval metrics.
//!
//! Movements larger than [`REGRESSION_THRESHOLD`] in either direction are
//! reported as improvements or regressions; anything within the threshold,
//! including exactly `±0.05`, is stable.

use crate::error::{EvalError, Result};
use crate::metrics::{MetricName, RetrievalMetrics};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use tracing::warn;
use uuid::Uuid;

/// Absolute change (on the 0-1 scale) that counts as a real movement.
pub const REGRESSION_THRESHOLD: f64 = 0.05;

/// A persisted evaluation run, as stored by the run store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalRun {
    pub id: String,
    pub project_id: String,
    pub timestamp: DateTime<Utc>,
    pub dataset_version: String,
    pub query_count: usize,
    /// Serialized [`RetrievalMetrics`].
    pub metrics: String,
    /// Serialized snapshot of the search settings used.
    pub config: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Decoded view of an [`EvalRun`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalRunSummary {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub query_count: usize,
    pub metrics: RetrievalMetrics,
}

impl EvalRun {
    /// Build a new run record stamped with a fresh id and the current time.
    pub fn new(
        project_id: impl Into<String>,
        dataset_version: impl Into<String>,
        query_count: usize,
        metrics: &RetrievalMetrics,
        config: &serde_json::Value,
    ) -> Result<Self> {
        let metrics = serde_json::to_string(metrics)
            .map_err(|e| EvalError::eval_run_failed(format!("cannot serialize metrics: {}", e)))?;

        Ok(Self {
            id: Uuid::new_v4().to_string(),
            project_id: project_id.into(),
            timestamp: Utc::now(),
            dataset_version: dataset_version.into(),
            query_count,
            metrics,
            config: config.to_string(),
            notes: None,
        })
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    /// Deserialize the stored metrics.
    pub fn parsed_metrics(&self) -> Result<RetrievalMetrics> {
        serde_json::from_str(&self.metrics).map_err(|e| {
            EvalError::eval_run_failed(format!("run '{}' has unreadable metrics: {}", self.id, e))
        })
    }

    pub fn summary(&self) -> Result<EvalRunSummary> {
        Ok(EvalRunSummary {
            id: self.id.clone(),
            timestamp: self.timestamp,
            query_count: self.query_count,
            metrics: self.parsed_metrics()?,
        })
    }
}

/// Direction a metric moved between two runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
    Stable,
}

impl Direction {
    pub fn arrow(&self) -> &'static str {
        match self {
            Direction::Up => "↑",
            Direction::Down => "↓",
            Direction::Stable => "→",
        }
    }
}

/// Classify a metric delta against [`REGRESSION_THRESHOLD`].
///
/// Deltas are rounded to 1e-9 first so that `0.85 - 0.80` lands on the
/// stable side of the boundary.
pub fn classify_delta(delta: f64) -> Direction {
    let delta = (delta * 1e9).round() / 1e9;
    if delta > REGRESSION_THRESHOLD {
        Direction::Up
    } else if delta < -REGRESSION_THRESHOLD {
        Direction::Down
    } else {
        Direction::Stable
    }
}

/// Comparison of one metric between two runs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricComparison {
    pub metric: MetricName,
    pub current: f64,
    pub previous: f64,
    pub delta: f64,
    pub direction: Direction,
}

/// Result of [`compare_runs`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunComparison {
    pub metrics: Vec<MetricComparison>,
    pub improved: usize,
    pub regressed: usize,
    pub stable: usize,
}

impl RunComparison {
    pub fn has_regressions(&self) -> bool {
        self.regressed > 0
    }
}

/// Compare two metric sets metric by metric.
pub fn compare_runs(current: &RetrievalMetrics, previous: &RetrievalMetrics) -> RunComparison {
    let metrics: Vec<MetricComparison> = MetricName::ALL
        .into_iter()
        .map(|metric| {
            let (cur, prev) = (current.get(metric), previous.get(metric));
            let delta = cur - prev;
            MetricComparison {
                metric,
                current: cur,
                previous: prev,
                delta,
                direction: classify_delta(delta),
            }
        })
        .collect();

    let count = |d: Direction| metrics.iter().filter(|m| m.direction == d).count();
    let (improved, regressed, stable) = (
        count(Direction::Up),
        count(Direction::Down),
        count(Direction::Stable),
    );

    RunComparison {
        metrics,
        improved,
        regressed,
        stable,
    }
}

/// Trend of one metric across the latest two runs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricTrend {
    pub metric: MetricName,
    pub current: f64,
    pub previous: Option<f64>,
    pub delta: Option<f64>,
    pub direction: Direction,
    pub is_regression: bool,
    pub is_improvement: bool,
}

/// Trend report over a run history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendResult {
    pub metrics: Vec<MetricTrend>,
    pub run_count: usize,
    pub current_run_id: String,
    pub previous_run_id: Option<String>,
    pub has_regressions: bool,
    pub has_improvements: bool,
}

impl TrendResult {
    pub fn regressions(&self) -> impl Iterator<Item = &MetricTrend> {
        self.metrics.iter().filter(|t| t.is_regression)
    }

    pub fn improvements(&self) -> impl Iterator<Item = &MetricTrend> {
        self.metrics.iter().filter(|t| t.is_improvement)
    }
}

/// Compute the trend for a run history ordered most-recent-first.
///
/// Fails if the history is empty or the latest run's metrics cannot be
/// decoded. A corrupt previous run is reported as if there were none.
pub fn compute_trend(runs: &[EvalRun]) -> Result<TrendResult> {
    let current_run = runs
        .first()
        .ok_or_else(|| EvalError::eval_run_failed("no evaluation runs to report on"))?;
    let current = current_run.parsed_metrics()?;

    let previous = runs.get(1).and_then(|run| match run.parsed_metrics() {
        Ok(metrics) => Some((run.id.clone(), metrics)),
        Err(err) => {
            warn!(run_id = %run.id, error = %err, "Ignoring previous run with corrupt metrics");
            None
        }
    });

    let metrics: Vec<MetricTrend> = MetricName::ALL
        .into_iter()
        .map(|metric| {
            let cur = current.get(metric);
            match &previous {
                Some((_, prev_metrics)) => {
                    let prev = prev_metrics.get(metric);
                    let delta = cur - prev;
                    let direction = classify_delta(delta);
                    MetricTrend {
                        metric,
                        current: cur,
                        previous: Some(prev),
                        delta: Some(delta),
                        direction,
                        is_regression: direction == Direction::Down,
                        is_improvement: direction == Direction::Up,
                    }
                }
                None => MetricTrend {
                    metric,
                    current: cur,
                    previous: None,
                    delta: None,
                    direction: Direction::Stable,
                    is_regression: false,
                    is_improvement: false,
                },
            }
        })
        .collect();

    let has_regressions = metrics.iter().any(|t| t.is_regression);
    let has_improvements = metrics.iter().any(|t| t.is_improvement);

    Ok(TrendResult {
        metrics,
        run_count: runs.len(),
        current_run_id: current_run.id.clone(),
        previous_run_id: previous.map(|(id, _)| id),
        has_regressions,
        has_improvements,
    })
}

/// Sort a run log most-recent-first and keep the latest `last` runs.
pub fn select_recent(mut runs: Vec<EvalRun>, last: usize) -> Vec<EvalRun> {
    runs.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    runs.truncate(last);
    runs
}

/// Render a plain-text trend table.
pub fn format_trend_report(trend: &TrendResult) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "Runs considered: {}", trend.run_count);
    let _ = writeln!(out, "Current run:     {}", trend.current_run_id);
    match &trend.previous_run_id {
        Some(id) => {
            let _ = writeln!(out, "Previous run:    {}", id);
        }
        None => {
            let _ = writeln!(out, "Previous run:    (none)");
        }
    }
    let _ = writeln!(out);

    let _ = writeln!(
        out,
        "{:<14}{:>10}{:>10}{:>10}  ",
        "Metric", "Current", "Previous", "Delta"
    );
    let _ = writeln!(out, "{}", "─".repeat(47));
    for t in &trend.metrics {
        let previous = t.previous.map_or_else(|| "-".to_string(), |p| format!("{:.4}", p));
        let delta = t.delta.map_or_else(|| "-".to_string(), |d| format!("{:+.4}", d));
        let _ = writeln!(
            out,
            "{:<14}{:>10.4}{:>10}{:>10}  {}",
            t.metric.label(),
            t.current,
            previous,
            delta,
            t.direction.arrow()
        );
    }
    let _ = writeln!(out);

    if trend.previous_run_id.is_none() {
        let _ = writeln!(out, "No previous run to compare against.");
        return out;
    }

    if trend.has_regressions {
        let _ = writeln!(out, "Regressions:");
        for t in trend.regressions() {
            let _ = writeln!(out, "  {} {:+.4}", t.metric.label(), t.delta.unwrap_or_default());
        }
    }
    if trend.has_improvements {
        let _ = writeln!(out, "Improvements:");
        for t in trend.improvements() {
            let _ = writeln!(out, "  {} {:+.4}", t.metric.label(), t.delta.unwrap_or_default());
        }
    }
    if !trend.has_regressions && !trend.has_improvements {
        let _ = writeln!(
            out,
            "All metrics stable (within ±{:.2}).",
            REGRESSION_THRESHOLD
        );
    }

    out
}
