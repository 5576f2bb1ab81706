//! End-to-end batch evaluation: golden entries -> metrics -> runs -> trend.

use ctx_eval::golden::{GoldenStore, NewGoldenEntry};
use ctx_eval::judge::{RagasRow, write_rows};
use ctx_eval::metrics::{QueryResult, Thresholds, check_thresholds, compute_aggregate_metrics};
use ctx_eval::trend::{Direction, EvalRun, compute_trend};
use ctx_eval::{ErrorCode, MetricTrend};
use std::collections::HashMap;
use tempfile::TempDir;

/// Canned search output keyed by query.
fn search(results: &HashMap<&str, Vec<&str>>, query: &str) -> Vec<String> {
    results
        .get(query)
        .map(|paths| paths.iter().map(|p| p.to_string()).collect())
        .unwrap_or_default()
}

fn evaluate(
    store: &GoldenStore,
    results: &HashMap<&str, Vec<&str>>,
) -> (usize, ctx_eval::RetrievalMetrics) {
    let entries = store.load_required("acme").unwrap().entries;
    let queries: Vec<QueryResult> = entries
        .iter()
        .filter_map(|entry| {
            let expected = entry.expected_file_paths.clone()?;
            Some(QueryResult::new(search(results, &entry.query), expected))
        })
        .collect();
    (queries.len(), compute_aggregate_metrics(&queries, Some(5)))
}

#[test]
fn batch_evaluation_detects_regression_between_runs() {
    let dir = TempDir::new().unwrap();
    let store = GoldenStore::new(dir.path());

    assert_eq!(
        store.load_required("acme").unwrap_err().code(),
        ErrorCode::DatasetNotFound
    );

    store
        .add("acme", NewGoldenEntry::new("login handler").with_files(["src/auth/login.ts"]))
        .unwrap();
    store
        .add(
            "acme",
            NewGoldenEntry::new("db pool config").with_files(["src/db/pool.ts", "config/db.yaml"]),
        )
        .unwrap();
    store
        .add("acme", NewGoldenEntry::new("what is the retry policy?").with_answer("3 retries"))
        .unwrap();

    let good: HashMap<&str, Vec<&str>> = HashMap::from([
        ("login handler", vec!["./src/Auth/login.ts", "src/auth/login.ts", "src/app.ts"]),
        ("db pool config", vec!["src/db/pool.ts", "config\\db.yaml"]),
    ]);
    let (count, baseline) = evaluate(&store, &good);
    assert_eq!(count, 2);
    assert!((baseline.mrr - 1.0).abs() < 1e-9);
    assert!((baseline.recall_at_k - 1.0).abs() < 1e-9);
    assert!(check_thresholds(&baseline, &Thresholds::default()).iter().all(|c| c.passed));

    let worse: HashMap<&str, Vec<&str>> = HashMap::from([
        ("login handler", vec!["src/app.ts", "src/auth/login.ts"]),
        ("db pool config", vec!["src/db/pool.ts"]),
    ]);
    let (_, current) = evaluate(&store, &worse);

    let config = serde_json::json!({"k": 5, "mode": "hybrid"});
    let mut first = EvalRun::new("acme", "1.0", count, &baseline, &config).unwrap();
    let second = EvalRun::new("acme", "1.0", count, &current, &config).unwrap();
    first.timestamp = second.timestamp - chrono::Duration::hours(1);

    let trend = compute_trend(&[second.clone(), first.clone()]).unwrap();
    assert_eq!(trend.current_run_id, second.id);
    assert_eq!(trend.previous_run_id.as_deref(), Some(first.id.as_str()));
    assert!(trend.has_regressions);

    let mrr: &MetricTrend = &trend.metrics[0];
    assert_eq!(mrr.direction, Direction::Down);
    assert!((mrr.delta.unwrap() + 0.25).abs() < 1e-9);
}

#[test]
fn golden_answers_export_for_judge_model() {
    let dir = TempDir::new().unwrap();
    let store = GoldenStore::new(dir.path().join("golden"));
    store
        .add("acme", NewGoldenEntry::new("what is the retry policy?").with_answer("3 retries"))
        .unwrap();

    let rows: Vec<RagasRow> = store
        .list("acme")
        .unwrap()
        .iter()
        .map(|entry| {
            RagasRow::from_golden(entry, "it retries three times", vec!["retry.ts".into()])
        })
        .collect();

    let path = dir.path().join("export/ragas.json");
    write_rows(&path, &rows).unwrap();

    let written: Vec<RagasRow> =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(written, rows);
    assert_eq!(written[0].ground_truths, vec!["3 retries"]);
}
