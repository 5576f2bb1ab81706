//! Configuration for the evaluation engine.
//!
//! Supports both environment variables and YAML config file.
//! Environment variables take precedence over config file values.

use crate::error::{EvalError, Result};
use crate::metrics::Thresholds;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default directory for golden datasets (tilde-expanded on load).
pub const DEFAULT_GOLDEN_PATH: &str = "~/.ctx/eval";

/// Default judge model handed to the evaluation scripts.
pub const DEFAULT_RAGAS_MODEL: &str = "gpt-4o-mini";

/// Evaluation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalConfig {
    /// Root directory holding one golden dataset per project.
    pub golden_path: PathBuf,

    /// Cutoff used by the @K metrics when none is given (1-100).
    pub default_k: usize,

    /// Pass/fail bars for `score`.
    pub thresholds: Thresholds,

    /// Interpreter used for the judge-model scripts.
    pub python_path: PathBuf,

    /// Model name passed to the judge-model scripts.
    pub ragas_model: String,

    /// Wall-clock limit for one judge-model subprocess.
    pub timeout_secs: u64,

    /// Maximum bytes captured from each of stdout/stderr.
    pub max_buffer_bytes: usize,

    /// API key forwarded to the judge-model subprocess.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,

    /// Custom API base URL forwarded to the judge-model subprocess.
    pub api_base: Option<String>,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            golden_path: expand_tilde(DEFAULT_GOLDEN_PATH),
            default_k: 5,
            thresholds: Thresholds::default(),
            python_path: PathBuf::from("python3"),
            ragas_model: DEFAULT_RAGAS_MODEL.to_string(),
            timeout_secs: 300,
            max_buffer_bytes: 10 * 1024 * 1024,
            api_key: None,
            api_base: None,
        }
    }
}

/// Configuration file structure (YAML format).
#[derive(Debug, Deserialize)]
struct ConfigFile {
    eval: Option<EvalFileSection>,
}

#[derive(Debug, Deserialize)]
struct EvalFileSection {
    golden_path: Option<String>,
    default_k: Option<usize>,
    thresholds: Option<ThresholdsFileSection>,
    python_path: Option<String>,
    ragas_model: Option<String>,
    timeout_secs: Option<u64>,
    max_buffer_bytes: Option<usize>,
    api_key: Option<String>,
    api_base: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ThresholdsFileSection {
    mrr: Option<f64>,
    hit_rate: Option<f64>,
    precision_at_k: Option<f64>,
}

impl EvalConfig {
    /// Load configuration from environment variables and optional config file.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables (CTX_EVAL_*, OPENAI_API_KEY, OPENAI_API_BASE)
    /// 2. Config file (~/.config/ctx-eval/config.yaml)
    /// 3. Default values
    pub fn load() -> Result<Self> {
        let mut config = EvalConfig::default();

        if let Some(config_path) = Self::config_file_path() {
            if config_path.exists() {
                config = Self::load_from_file(&config_path)?;
            }
        }

        config.apply_env();
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| EvalError::io(path, e))?;
        Self::from_yaml(&content)
    }

    /// Parse a YAML document with an optional `eval:` section.
    pub fn from_yaml(content: &str) -> Result<Self> {
        let file_config: ConfigFile = serde_yaml::from_str(content)
            .map_err(|e| EvalError::config(format!("Failed to parse config file: {}", e)))?;

        let mut config = EvalConfig::default();

        if let Some(eval) = file_config.eval {
            if let Some(golden_path) = eval.golden_path {
                config.golden_path = expand_tilde(&golden_path);
            }
            if let Some(default_k) = eval.default_k {
                config.default_k = default_k;
            }
            if let Some(thresholds) = eval.thresholds {
                if let Some(mrr) = thresholds.mrr {
                    config.thresholds.mrr = mrr;
                }
                if let Some(hit_rate) = thresholds.hit_rate {
                    config.thresholds.hit_rate = hit_rate;
                }
                if let Some(precision) = thresholds.precision_at_k {
                    config.thresholds.precision_at_k = precision;
                }
            }
            if let Some(python_path) = eval.python_path {
                config.python_path = expand_tilde(&python_path);
            }
            if let Some(model) = eval.ragas_model {
                config.ragas_model = model;
            }
            if let Some(timeout) = eval.timeout_secs {
                config.timeout_secs = timeout;
            }
            if let Some(max_buffer) = eval.max_buffer_bytes {
                config.max_buffer_bytes = max_buffer;
            }
            config.api_key = eval.api_key.filter(|k| !k.is_empty());
            config.api_base = eval.api_base.filter(|b| !b.is_empty());
        }

        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(golden_path) = env::var("CTX_EVAL_GOLDEN_PATH") {
            self.golden_path = expand_tilde(&golden_path);
        }

        if let Ok(default_k) = env::var("CTX_EVAL_DEFAULT_K") {
            if let Ok(k) = default_k.parse() {
                self.default_k = k;
            }
        }

        if let Ok(python_path) = env::var("CTX_EVAL_PYTHON_PATH") {
            self.python_path = expand_tilde(&python_path);
        }

        if let Ok(model) = env::var("CTX_EVAL_RAGAS_MODEL") {
            self.ragas_model = model;
        }

        if let Ok(timeout) = env::var("CTX_EVAL_TIMEOUT_SECS") {
            if let Ok(secs) = timeout.parse() {
                self.timeout_secs = secs;
            }
        }

        if let Ok(api_key) = env::var("OPENAI_API_KEY") {
            if !api_key.is_empty() {
                self.api_key = Some(api_key);
            }
        }

        if let Ok(api_base) = env::var("OPENAI_API_BASE") {
            if !api_base.is_empty() {
                self.api_base = Some(api_base);
            }
        }
    }

    /// Get the default config file path.
    pub fn config_file_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "ctx-eval")
            .map(|dirs| dirs.config_dir().join("config.yaml"))
    }

    /// Subprocess timeout as a duration.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Validate ranges of numeric settings.
    pub fn validate(&self) -> Result<()> {
        if !(1..=100).contains(&self.default_k) {
            return Err(EvalError::config(format!(
                "default_k must be between 1 and 100, got {}",
                self.default_k
            )));
        }

        for (name, value) in [
            ("thresholds.mrr", self.thresholds.mrr),
            ("thresholds.hit_rate", self.thresholds.hit_rate),
            ("thresholds.precision_at_k", self.thresholds.precision_at_k),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(EvalError::config(format!(
                    "{} must be between 0 and 1, got {}",
                    name, value
                )));
            }
        }

        if self.python_path.as_os_str().is_empty() {
            return Err(EvalError::config(
                "python_path must not be empty. Set CTX_EVAL_PYTHON_PATH or add it to the config file.",
            ));
        }

        if self.ragas_model.trim().is_empty() {
            return Err(EvalError::config("ragas_model must not be empty"));
        }

        if self.timeout_secs == 0 {
            return Err(EvalError::config("timeout_secs must be greater than 0"));
        }

        Ok(())
    }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    let home = || directories::BaseDirs::new().map(|dirs| dirs.home_dir().to_path_buf());

    if path == "~" {
        if let Some(home) = home() {
            return home;
        }
    } else if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = home() {
            return home.join(rest);
        }
    }

    PathBuf::from(path)
}
