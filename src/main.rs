//! ctx-eval CLI
//!
//! Drives the evaluation engine from files: golden dataset CRUD, scoring a
//! search results file, trend reports over a run log, and judge-model runs.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use ctx_eval::{
    config::EvalConfig,
    golden::{EntrySource, GoldenStore, NewGoldenEntry},
    judge::JudgeBridge,
    metrics::{
        QueryResult, all_passed, check_thresholds, compute_aggregate_metrics, format_metrics_table,
    },
    trend::{EvalRun, compute_trend, format_trend_report, select_recent},
};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::debug;

/// ctx-eval - retrieval-quality evaluation for RAG search
#[derive(Parser)]
#[command(name = "ctx-eval")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage golden datasets
    Golden {
        #[command(subcommand)]
        command: GoldenCommands,
    },

    /// Score a search results file against expected paths
    Score {
        /// JSON array of {"retrieved": [...], "expected": [...]}
        results: PathBuf,

        /// Rank cutoff (defaults to the configured default_k)
        #[arg(short = 'k', long)]
        k: Option<usize>,

        /// Output as JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Show metric trends across stored runs
    Report {
        /// JSON array of evaluation runs
        runs: PathBuf,

        /// Number of most recent runs to consider
        #[arg(long, default_value_t = 2)]
        last: usize,

        /// Output as JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Judge-model (RAGAS / DeepEval) evaluation
    Judge {
        #[command(subcommand)]
        command: JudgeCommands,
    },
}

#[derive(Subcommand)]
enum GoldenCommands {
    /// List golden entries for a project
    List {
        project: String,

        /// Only entries with this tag
        #[arg(long)]
        tag: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Add a golden entry
    Add {
        project: String,

        /// The query text
        #[arg(short, long)]
        query: String,

        /// Expected relevant file (repeatable)
        #[arg(short, long = "file")]
        files: Vec<String>,

        /// Expected answer text
        #[arg(short, long)]
        answer: Option<String>,

        /// Tag (repeatable)
        #[arg(short, long = "tag")]
        tags: Vec<String>,

        /// Provenance: manual, generated or captured
        #[arg(long, default_value = "manual")]
        source: EntrySource,
    },

    /// Remove a golden entry by id
    Remove { project: String, id: String },
}

#[derive(Subcommand)]
enum JudgeCommands {
    /// Check whether the interpreter and judge-model packages are installed
    Check,

    /// Run RAGAS metrics over an exported dataset
    Ragas {
        data: PathBuf,

        /// Comma-separated metric names
        #[arg(long, value_delimiter = ',', default_value = "faithfulness,answer_relevancy")]
        metrics: Vec<String>,
    },

    /// Run DeepEval metrics over an exported dataset
    Deepeval {
        data: PathBuf,

        /// Comma-separated metric names
        #[arg(long, value_delimiter = ',', default_value = "faithfulness,answer_relevancy")]
        metrics: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = EvalConfig::load().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;
    debug!(golden_path = %config.golden_path.display(), "Loaded configuration");

    match cli.command {
        Commands::Golden { command } => cmd_golden(&config, command),
        Commands::Score { results, k, json } => cmd_score(&config, results, k, json),
        Commands::Report { runs, last, json } => cmd_report(runs, last, json),
        Commands::Judge { command } => cmd_judge(&config, command).await,
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("ctx_eval={level}")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn cmd_golden(config: &EvalConfig, command: GoldenCommands) -> Result<ExitCode> {
    let store = GoldenStore::new(&config.golden_path);

    match command {
        GoldenCommands::List { project, tag, json } => {
            let entries = match tag {
                Some(tag) => store.list_tagged(&project, &tag)?,
                None => store.list(&project)?,
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
                return Ok(ExitCode::SUCCESS);
            }

            if entries.is_empty() {
                println!("No golden entries for '{}'.", project);
                return Ok(ExitCode::SUCCESS);
            }

            println!("Golden entries for '{}' ({}):", project, entries.len());
            println!("{}", "─".repeat(60));
            for entry in &entries {
                println!("{}  [{:?}]", entry.id, entry.source);
                println!("  Query:    {}", entry.query);
                if let Some(files) = &entry.expected_file_paths {
                    println!("  Files:    {}", files.join(", "));
                }
                if let Some(answer) = &entry.expected_answer {
                    println!("  Answer:   {}", answer);
                }
                if let Some(tags) = &entry.tags {
                    println!("  Tags:     {}", tags.join(", "));
                }
            }
        }
        GoldenCommands::Add {
            project,
            query,
            files,
            answer,
            tags,
            source,
        } => {
            let mut entry = NewGoldenEntry::new(query).with_source(source);
            if !files.is_empty() {
                entry = entry.with_files(files);
            }
            if let Some(answer) = answer {
                entry = entry.with_answer(answer);
            }
            if !tags.is_empty() {
                entry = entry.with_tags(tags);
            }

            let created = store.add(&project, entry)?;
            println!("Added golden entry {}", created.id);
            println!("  Saved to: {}", store.path(&project).display());
        }
        GoldenCommands::Remove { project, id } => {
            if store.remove(&project, &id)? {
                println!("Removed golden entry {}", id);
            } else {
                println!("No golden entry with id {} in '{}'.", id, project);
                return Ok(ExitCode::FAILURE);
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn cmd_score(
    config: &EvalConfig,
    results: PathBuf,
    k: Option<usize>,
    json: bool,
) -> Result<ExitCode> {
    let content = std::fs::read_to_string(&results)
        .with_context(|| format!("Failed to read results file: {}", results.display()))?;
    let queries: Vec<QueryResult> =
        serde_json::from_str(&content).context("Failed to parse results JSON")?;

    let k = k.unwrap_or(config.default_k);
    if k == 0 {
        bail!("k must be at least 1");
    }

    let metrics = compute_aggregate_metrics(&queries, Some(k));
    let checks = check_thresholds(&metrics, &config.thresholds);
    let passed = all_passed(&checks);

    if json {
        let report = serde_json::json!({
            "query_count": queries.len(),
            "k": k,
            "metrics": metrics,
            "thresholds": checks,
            "passed": passed,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Scored {} queries from {}\n", queries.len(), results.display());
        print!("{}", format_metrics_table(&metrics, k));
        println!();
        for check in &checks {
            println!(
                "{:<14}{:>8.4} >= {:<6.2} {}",
                check.metric.label(),
                check.actual,
                check.threshold,
                if check.passed { "PASS" } else { "FAIL" }
            );
        }
    }

    Ok(if passed {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn cmd_report(runs: PathBuf, last: usize, json: bool) -> Result<ExitCode> {
    let content = std::fs::read_to_string(&runs)
        .with_context(|| format!("Failed to read run log: {}", runs.display()))?;
    let all_runs: Vec<EvalRun> =
        serde_json::from_str(&content).context("Failed to parse run log JSON")?;

    let recent = select_recent(all_runs, last.max(1));
    let trend = compute_trend(&recent)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&trend)?);
    } else {
        print!("{}", format_trend_report(&trend));
    }

    Ok(if trend.has_regressions {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

async fn cmd_judge(config: &EvalConfig, command: JudgeCommands) -> Result<ExitCode> {
    let bridge = JudgeBridge::from_config(config);

    match command {
        JudgeCommands::Check => {
            let availability = bridge.check_availability().await;
            println!("Interpreter: {}", config.python_path.display());
            println!(
                "  Python:   {}",
                availability.python_version.as_deref().unwrap_or("not available")
            );
            println!(
                "  RAGAS:    {}",
                version_or_missing(availability.ragas, availability.ragas_version.as_deref())
            );
            println!(
                "  DeepEval: {}",
                version_or_missing(availability.deepeval, availability.deepeval_version.as_deref())
            );
            if !availability.any_framework() {
                println!("\nInstall a judge-model package: pip install ragas deepeval");
                return Ok(ExitCode::FAILURE);
            }
        }
        JudgeCommands::Ragas { data, metrics } => {
            let results = bridge.run_ragas(&data, &metrics).await?;
            println!("{}", serde_json::to_string_pretty(&results)?);
        }
        JudgeCommands::Deepeval { data, metrics } => {
            let results = bridge.run_deepeval(&data, &metrics).await?;
            println!("{}", serde_json::to_string_pretty(&results)?);
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn version_or_missing(installed: bool, version: Option<&str>) -> String {
    match (installed, version) {
        (true, Some(version)) => format!("installed ({})", version),
        (true, None) => "installed".to_string(),
        (false, _) => "not installed".to_string(),
    }
}
