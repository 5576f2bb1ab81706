//! Retrieval-quality metrics.
//!
//! Every function here is pure: it takes the rank-ordered list of retrieved
//! file paths and the golden list of expected paths and returns a score in
//! `[0, 1]`. Paths are normalized before comparison and the retrieved list is
//! deduplicated at file level, so several chunks of one file count once, at
//! their best rank.
//!
//! `k` is the rank cutoff. `None` means "all deduplicated retrieved paths".

use crate::paths::{dedupe_paths, path_set};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt::Write as _;

/// Aggregate retrieval scores for a set of queries (macro-averaged).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievalMetrics {
    pub mrr: f64,
    pub precision_at_k: f64,
    pub recall_at_k: f64,
    pub hit_rate: f64,
    pub ndcg: f64,
    pub map: f64,
}

/// The six metrics tracked across runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricName {
    Mrr,
    PrecisionAtK,
    RecallAtK,
    HitRate,
    Ndcg,
    Map,
}

impl MetricName {
    /// All metrics, in display order.
    pub const ALL: [MetricName; 6] = [
        MetricName::Mrr,
        MetricName::PrecisionAtK,
        MetricName::RecallAtK,
        MetricName::HitRate,
        MetricName::Ndcg,
        MetricName::Map,
    ];

    /// Field name used in serialized metrics.
    pub fn key(&self) -> &'static str {
        match self {
            MetricName::Mrr => "mrr",
            MetricName::PrecisionAtK => "precision_at_k",
            MetricName::RecallAtK => "recall_at_k",
            MetricName::HitRate => "hit_rate",
            MetricName::Ndcg => "ndcg",
            MetricName::Map => "map",
        }
    }

    /// Human-readable label.
    pub fn label(&self) -> &'static str {
        match self {
            MetricName::Mrr => "MRR",
            MetricName::PrecisionAtK => "Precision@K",
            MetricName::RecallAtK => "Recall@K",
            MetricName::HitRate => "Hit Rate",
            MetricName::Ndcg => "NDCG",
            MetricName::Map => "MAP",
        }
    }
}

impl RetrievalMetrics {
    /// Value of a single metric.
    pub fn get(&self, metric: MetricName) -> f64 {
        match metric {
            MetricName::Mrr => self.mrr,
            MetricName::PrecisionAtK => self.precision_at_k,
            MetricName::RecallAtK => self.recall_at_k,
            MetricName::HitRate => self.hit_rate,
            MetricName::Ndcg => self.ndcg,
            MetricName::Map => self.map,
        }
    }
}

/// One query's retrieved and expected paths.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryResult {
    /// Rank-ordered retrieved file paths (may repeat a file).
    pub retrieved: Vec<String>,
    /// Golden relevant file paths.
    pub expected: Vec<String>,
}

impl QueryResult {
    pub fn new(retrieved: Vec<String>, expected: Vec<String>) -> Self {
        Self {
            retrieved,
            expected,
        }
    }
}

/// Scores for a single query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PerQueryMetrics {
    pub reciprocal_rank: f64,
    pub precision: f64,
    pub recall: f64,
    pub hit: f64,
}

/// Normalized view of one query, shared by the metric functions.
struct Judged {
    ranked: Vec<String>,
    relevant: HashSet<String>,
}

impl Judged {
    fn new<R: AsRef<str>, E: AsRef<str>>(retrieved: &[R], expected: &[E]) -> Self {
        Self {
            ranked: dedupe_paths(retrieved),
            relevant: path_set(expected),
        }
    }

    fn is_degenerate(&self) -> bool {
        self.ranked.is_empty() || self.relevant.is_empty()
    }

    /// The `k` actually applied to the deduplicated list.
    fn cutoff(&self, k: Option<usize>) -> usize {
        k.map_or(self.ranked.len(), |k| k.min(self.ranked.len()))
    }

    fn top(&self, k: Option<usize>) -> &[String] {
        &self.ranked[..self.cutoff(k)]
    }

    fn hits(&self, k: Option<usize>) -> usize {
        self.top(k)
            .iter()
            .filter(|p| self.relevant.contains(*p))
            .count()
    }
}

/// `1 / rank` of the first relevant result, or 0 when none is found.
pub fn reciprocal_rank<R: AsRef<str>, E: AsRef<str>>(retrieved: &[R], expected: &[E]) -> f64 {
    let judged = Judged::new(retrieved, expected);
    if judged.is_degenerate() {
        return 0.0;
    }

    judged
        .ranked
        .iter()
        .position(|p| judged.relevant.contains(p))
        .map_or(0.0, |rank| 1.0 / (rank + 1) as f64)
}

/// Fraction of the top-`k` deduplicated results that are relevant.
pub fn precision_at_k<R: AsRef<str>, E: AsRef<str>>(
    retrieved: &[R],
    expected: &[E],
    k: Option<usize>,
) -> f64 {
    let judged = Judged::new(retrieved, expected);
    if judged.is_degenerate() {
        return 0.0;
    }

    let cutoff = judged.cutoff(k);
    if cutoff == 0 {
        return 0.0;
    }
    judged.hits(k) as f64 / cutoff as f64
}

/// Fraction of all expected paths found in the top-`k` results.
pub fn recall_at_k<R: AsRef<str>, E: AsRef<str>>(
    retrieved: &[R],
    expected: &[E],
    k: Option<usize>,
) -> f64 {
    let judged = Judged::new(retrieved, expected);
    if judged.is_degenerate() {
        return 0.0;
    }
    judged.hits(k) as f64 / judged.relevant.len() as f64
}

/// 1.0 if any top-`k` result is relevant, else 0.0.
pub fn hit_rate<R: AsRef<str>, E: AsRef<str>>(
    retrieved: &[R],
    expected: &[E],
    k: Option<usize>,
) -> f64 {
    let judged = Judged::new(retrieved, expected);
    if judged.is_degenerate() || judged.hits(k) == 0 {
        0.0
    } else {
        1.0
    }
}

/// Binary-relevance NDCG over the top-`k` results.
///
/// DCG discounts each relevant hit at 0-indexed rank `i` by `1 / log2(i + 2)`.
/// The ideal ranking places `min(|expected|, k)` relevant items first.
pub fn ndcg_at_k<R: AsRef<str>, E: AsRef<str>>(
    retrieved: &[R],
    expected: &[E],
    k: Option<usize>,
) -> f64 {
    let judged = Judged::new(retrieved, expected);
    if judged.is_degenerate() {
        return 0.0;
    }

    let discount = |rank: usize| 1.0 / ((rank + 2) as f64).log2();

    let dcg: f64 = judged
        .top(k)
        .iter()
        .enumerate()
        .filter(|(_, p)| judged.relevant.contains(*p))
        .map(|(rank, _)| discount(rank))
        .sum();

    let ideal_len = judged
        .relevant
        .len()
        .min(k.unwrap_or(judged.ranked.len()));
    let idcg: f64 = (0..ideal_len).map(discount).sum();

    if idcg == 0.0 {
        return 0.0;
    }
    (dcg / idcg).min(1.0)
}

/// Average precision over the top-`k` results.
///
/// Divides by `|expected|` rather than the number of hits, so queries that
/// miss relevant files are penalized.
pub fn average_precision<R: AsRef<str>, E: AsRef<str>>(
    retrieved: &[R],
    expected: &[E],
    k: Option<usize>,
) -> f64 {
    let judged = Judged::new(retrieved, expected);
    if judged.is_degenerate() {
        return 0.0;
    }

    let mut hits = 0usize;
    let mut sum = 0.0;
    for (rank, path) in judged.top(k).iter().enumerate() {
        if judged.relevant.contains(path) {
            hits += 1;
            sum += hits as f64 / (rank + 1) as f64;
        }
    }

    sum / judged.relevant.len() as f64
}

/// Reciprocal rank, precision, recall and hit for one query.
pub fn compute_per_query_metrics<R: AsRef<str>, E: AsRef<str>>(
    retrieved: &[R],
    expected: &[E],
    k: Option<usize>,
) -> PerQueryMetrics {
    PerQueryMetrics {
        reciprocal_rank: reciprocal_rank(retrieved, expected),
        precision: precision_at_k(retrieved, expected, k),
        recall: recall_at_k(retrieved, expected, k),
        hit: hit_rate(retrieved, expected, k),
    }
}

/// Macro-average of all six metrics across queries.
///
/// An empty query set yields all-zero metrics.
pub fn compute_aggregate_metrics(queries: &[QueryResult], k: Option<usize>) -> RetrievalMetrics {
    if queries.is_empty() {
        return RetrievalMetrics::default();
    }

    let mut totals = RetrievalMetrics::default();
    for query in queries {
        let (retrieved, expected) = (&query.retrieved, &query.expected);
        totals.mrr += reciprocal_rank(retrieved, expected);
        totals.precision_at_k += precision_at_k(retrieved, expected, k);
        totals.recall_at_k += recall_at_k(retrieved, expected, k);
        totals.hit_rate += hit_rate(retrieved, expected, k);
        totals.ndcg += ndcg_at_k(retrieved, expected, k);
        totals.map += average_precision(retrieved, expected, k);
    }

    let n = queries.len() as f64;
    RetrievalMetrics {
        mrr: totals.mrr / n,
        precision_at_k: totals.precision_at_k / n,
        recall_at_k: totals.recall_at_k / n,
        hit_rate: totals.hit_rate / n,
        ndcg: totals.ndcg / n,
        map: totals.map / n,
    }
}

/// Minimum acceptable values for a batch evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub mrr: f64,
    pub hit_rate: f64,
    pub precision_at_k: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            mrr: 0.5,
            hit_rate: 0.7,
            precision_at_k: 0.3,
        }
    }
}

/// Outcome of comparing one metric against its threshold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdCheck {
    pub metric: MetricName,
    pub actual: f64,
    pub threshold: f64,
    pub passed: bool,
}

/// Check the thresholded metrics; a metric passes when `actual >= threshold`.
pub fn check_thresholds(
    metrics: &RetrievalMetrics,
    thresholds: &Thresholds,
) -> Vec<ThresholdCheck> {
    [
        (MetricName::Mrr, thresholds.mrr),
        (MetricName::HitRate, thresholds.hit_rate),
        (MetricName::PrecisionAtK, thresholds.precision_at_k),
    ]
    .into_iter()
    .map(|(metric, threshold)| {
        let actual = metrics.get(metric);
        ThresholdCheck {
            metric,
            actual,
            threshold,
            passed: actual >= threshold,
        }
    })
    .collect()
}

pub fn all_passed(checks: &[ThresholdCheck]) -> bool {
    checks.iter().all(|c| c.passed)
}

/// Plain-text table of the six metrics.
pub fn format_metrics_table(metrics: &RetrievalMetrics, k: usize) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Retrieval metrics (k = {})", k);
    let _ = writeln!(out, "{}", "─".repeat(28));
    for metric in MetricName::ALL {
        let _ = writeln!(out, "{:<14}{:>10.4}", metric.label(), metrics.get(metric));
    }
    out
}
