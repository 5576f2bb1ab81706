//! Subprocess bridge to the judge-model toolchain.
//!
//! Each call spawns one interpreter process with the script body passed via
//! `-c` and its arguments passed as separate argv entries (never through a
//! shell). Runners write their result to a temporary JSON file which is read,
//! validated and removed before the call returns.

use super::results::{
    DeepEvalResults, JudgeOutput, PythonAvailability, RagasResults, decode_output, decode_probe,
};
use super::scripts::ScriptSet;
use crate::config::EvalConfig;
use crate::error::{EvalError, Result};
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Judge-model framework driven by a runner script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framework {
    Ragas,
    DeepEval,
}

impl Framework {
    pub fn name(&self) -> &'static str {
        match self {
            Framework::Ragas => "ragas",
            Framework::DeepEval => "deepeval",
        }
    }

    /// Metrics the runner script knows how to compute.
    pub fn supported_metrics(&self) -> &'static [&'static str] {
        match self {
            Framework::Ragas => &[
                "faithfulness",
                "answer_relevancy",
                "context_precision",
                "context_recall",
            ],
            Framework::DeepEval => &[
                "faithfulness",
                "answer_relevancy",
                "contextual_precision",
                "contextual_recall",
                "contextual_relevancy",
                "hallucination",
            ],
        }
    }
}

/// Settings for the judge-model subprocesses.
#[derive(Debug, Clone)]
pub struct JudgeSettings {
    /// Interpreter executable.
    pub python_path: PathBuf,
    /// Judge model name passed to the runners.
    pub model: String,
    /// Wall-clock limit per subprocess.
    pub timeout: Duration,
    /// Maximum bytes captured from each of stdout and stderr.
    pub max_buffer: usize,
    /// Forwarded as `OPENAI_API_KEY`.
    pub api_key: Option<String>,
    /// Forwarded as `OPENAI_API_BASE` and `OPENAI_BASE_URL`.
    pub api_base: Option<String>,
}

impl Default for JudgeSettings {
    fn default() -> Self {
        Self::from_config(&EvalConfig::default())
    }
}

impl JudgeSettings {
    pub fn from_config(config: &EvalConfig) -> Self {
        Self {
            python_path: config.python_path.clone(),
            model: config.ragas_model.clone(),
            timeout: config.timeout(),
            max_buffer: config.max_buffer_bytes,
            api_key: config.api_key.clone(),
            api_base: config.api_base.clone(),
        }
    }
}

/// Captured result of a finished subprocess.
#[derive(Debug)]
struct Captured {
    status: ExitStatus,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
}

enum CaptureError {
    Overflow(&'static str),
    Io(io::Error),
}

/// Temporary output file that is removed when dropped.
struct TempOutput {
    path: PathBuf,
}

impl TempOutput {
    fn new(framework: Framework) -> Self {
        let path = std::env::temp_dir().join(format!(
            "ctx-eval-{}-{}.json",
            framework.name(),
            Uuid::new_v4()
        ));
        Self { path }
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempOutput {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Removed judge-model output file"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                path = %self.path.display(),
                error = %e,
                "Failed to remove judge-model output file"
            ),
        }
    }
}

/// Runs the judge-model scripts as subprocesses.
pub struct JudgeBridge {
    settings: JudgeSettings,
    scripts: ScriptSet,
}

impl JudgeBridge {
    pub fn new(settings: JudgeSettings) -> Self {
        Self {
            settings,
            scripts: ScriptSet::default(),
        }
    }

    pub fn from_config(config: &EvalConfig) -> Self {
        Self::new(JudgeSettings::from_config(config))
    }

    /// Replace the embedded scripts.
    pub fn with_scripts(mut self, scripts: ScriptSet) -> Self {
        self.scripts = scripts;
        self
    }

    pub fn settings(&self) -> &JudgeSettings {
        &self.settings
    }

    /// Probe the interpreter and judge-model packages.
    ///
    /// Never fails: any problem yields an all-unavailable result.
    pub async fn check_availability(&self) -> PythonAvailability {
        match self.probe().await {
            Ok(availability) => availability,
            Err(err) => {
                warn!(error = %err, "Judge-model toolchain unavailable");
                PythonAvailability::default()
            }
        }
    }

    async fn probe(&self) -> Result<PythonAvailability> {
        let captured = self.execute(&self.scripts.probe, &[]).await?;
        decode_probe(&String::from_utf8_lossy(&captured.stdout))
    }

    /// Score an exported RAGAS dataset.
    pub async fn run_ragas(&self, data_path: &Path, metrics: &[String]) -> Result<RagasResults> {
        self.run(Framework::Ragas, data_path, metrics).await
    }

    /// Score an exported DeepEval dataset.
    pub async fn run_deepeval(
        &self,
        data_path: &Path,
        metrics: &[String],
    ) -> Result<DeepEvalResults> {
        self.run(Framework::DeepEval, data_path, metrics).await
    }

    async fn run<T: JudgeOutput>(
        &self,
        framework: Framework,
        data_path: &Path,
        metrics: &[String],
    ) -> Result<T> {
        validate_request(framework, data_path, metrics)?;

        let output = TempOutput::new(framework);
        let script = match framework {
            Framework::Ragas => &self.scripts.ragas,
            Framework::DeepEval => &self.scripts.deepeval,
        };
        let args: Vec<OsString> = vec![
            data_path.as_os_str().to_owned(),
            output.path().as_os_str().to_owned(),
            OsString::from(metrics.join(",")),
            OsString::from(&self.settings.model),
        ];

        info!(
            framework = framework.name(),
            input = %data_path.display(),
            metrics = %metrics.join(","),
            model = %self.settings.model,
            "Running judge-model evaluation"
        );
        let started = Instant::now();
        let captured = self.execute(script, &args).await?;

        let raw = match tokio::fs::read_to_string(output.path()).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(EvalError::ragas(format!(
                    "{} script exited successfully but produced no output at '{}'. stderr: {}",
                    framework.name(),
                    output.path().display(),
                    stderr_text(&captured.stderr)
                )));
            }
            Err(e) => {
                return Err(EvalError::ragas(format!(
                    "cannot read {} output '{}': {}",
                    framework.name(),
                    output.path().display(),
                    e
                )));
            }
        };

        let results = decode_output(&raw, metrics)?;
        debug!(
            framework = framework.name(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Judge-model evaluation finished"
        );
        Ok(results)
    }

    /// Spawn the interpreter, wait for it within the timeout, and capture
    /// its output. Non-zero exits are errors.
    async fn execute(&self, script: &str, args: &[OsString]) -> Result<Captured> {
        let mut command = Command::new(&self.settings.python_path);
        command
            .arg("-c")
            .arg(script)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Own process group, so a timeout can take down forked workers too.
        #[cfg(unix)]
        command.process_group(0);

        match &self.settings.api_key {
            Some(api_key) => command.env("OPENAI_API_KEY", api_key),
            None => command.env_remove("OPENAI_API_KEY"),
        };
        match &self.settings.api_base {
            Some(api_base) => command
                .env("OPENAI_API_BASE", api_base)
                .env("OPENAI_BASE_URL", api_base),
            None => command
                .env_remove("OPENAI_API_BASE")
                .env_remove("OPENAI_BASE_URL"),
        };

        debug!(
            python = %self.settings.python_path.display(),
            script_len = script.len(),
            args = args.len(),
            "Spawning judge-model subprocess"
        );

        let mut child = command.spawn().map_err(|e| self.spawn_error(e))?;
        let process_group = child.id();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let limit = self.settings.max_buffer;

        let collect = async {
            let (stdout, stderr) = tokio::try_join!(
                read_capped(stdout, limit, "stdout"),
                read_capped(stderr, limit, "stderr")
            )?;
            let status = child.wait().await.map_err(CaptureError::Io)?;
            Ok::<_, CaptureError>(Captured {
                status,
                stdout,
                stderr,
            })
        };
        let outcome = tokio::time::timeout(self.settings.timeout, collect).await;

        let captured = match outcome {
            Ok(Ok(captured)) => captured,
            Ok(Err(CaptureError::Overflow(stream))) => {
                terminate(&mut child, process_group).await;
                return Err(EvalError::ragas(format!(
                    "judge-model subprocess wrote more than {} bytes to {}; output limit exceeded",
                    limit, stream
                )));
            }
            Ok(Err(CaptureError::Io(e))) => {
                terminate(&mut child, process_group).await;
                return Err(EvalError::ragas(format!(
                    "failed to collect judge-model subprocess output: {}",
                    e
                )));
            }
            Err(_) => {
                terminate(&mut child, process_group).await;
                return Err(EvalError::ragas(format!(
                    "judge-model subprocess timed out after {}s and was killed. \
                     Increase timeout_secs or evaluate fewer rows",
                    self.settings.timeout.as_secs_f64()
                )));
            }
        };

        if !captured.status.success() {
            let status = match captured.status.code() {
                Some(code) => format!("exit code {}", code),
                None => "a signal".to_string(),
            };
            return Err(EvalError::ragas(format!(
                "judge-model subprocess terminated with {}: {}",
                status,
                stderr_text(&captured.stderr)
            )));
        }

        Ok(captured)
    }

    fn spawn_error(&self, err: io::Error) -> EvalError {
        let python = self.settings.python_path.display();
        match err.kind() {
            io::ErrorKind::NotFound => EvalError::ragas(format!(
                "Python interpreter not found at '{}'. Install Python 3 with `pip install ragas deepeval`, \
                 or point python_path (CTX_EVAL_PYTHON_PATH) at an interpreter that has them",
                python
            )),
            io::ErrorKind::PermissionDenied => EvalError::ragas(format!(
                "Python interpreter at '{}' is not executable. Check python_path (CTX_EVAL_PYTHON_PATH)",
                python
            )),
            _ => EvalError::ragas(format!("failed to start '{}': {}", python, err)),
        }
    }
}

/// Reject a request before any process is spawned.
fn validate_request(framework: Framework, data_path: &Path, metrics: &[String]) -> Result<()> {
    if !data_path.is_file() {
        return Err(EvalError::ragas(format!(
            "input file '{}' does not exist. Export the evaluation data first",
            data_path.display()
        )));
    }

    if metrics.is_empty() {
        return Err(EvalError::ragas(format!(
            "no metrics requested. Supported {} metrics: {}",
            framework.name(),
            framework.supported_metrics().join(", ")
        )));
    }

    let supported = framework.supported_metrics();
    let unknown: Vec<&str> = metrics
        .iter()
        .map(String::as_str)
        .filter(|m| !supported.contains(m))
        .collect();
    if !unknown.is_empty() {
        return Err(EvalError::ragas(format!(
            "unsupported {} metric(s): {}. Supported: {}",
            framework.name(),
            unknown.join(", "),
            supported.join(", ")
        )));
    }

    Ok(())
}

/// Kill the subprocess together with everything it started, then reap it.
async fn terminate(child: &mut Child, process_group: Option<u32>) {
    #[cfg(unix)]
    {
        if let Some(pgid) = process_group {
            // SAFETY: killpg takes plain integers; a stale group only yields ESRCH.
            let rc = unsafe { libc::killpg(pgid as libc::pid_t, libc::SIGKILL) };
            if rc != 0 {
                debug!(pgid, error = %io::Error::last_os_error(), "killpg failed");
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = process_group;
    }

    let _ = child.kill().await;
}

async fn read_capped<R: AsyncRead + Unpin>(
    reader: Option<R>,
    limit: usize,
    stream: &'static str,
) -> std::result::Result<Vec<u8>, CaptureError> {
    let Some(reader) = reader else {
        return Ok(Vec::new());
    };

    let mut buf = Vec::new();
    reader
        .take(limit as u64 + 1)
        .read_to_end(&mut buf)
        .await
        .map_err(CaptureError::Io)?;

    if buf.len() > limit {
        return Err(CaptureError::Overflow(stream));
    }
    Ok(buf)
}

fn stderr_text(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    if text.is_empty() {
        "(no stderr output)".to_string()
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use tempfile::TempDir;

    fn bridge_with_python(python: &str) -> JudgeBridge {
        JudgeBridge::new(JudgeSettings {
            python_path: PathBuf::from(python),
            ..JudgeSettings::default()
        })
    }

    fn input_file(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("input.json");
        std::fs::write(&path, "[]").unwrap();
        path
    }

    fn metrics(names: &[&str]) -> Vec<String> {
        names.iter().map(|m| m.to_string()).collect()
    }

    #[test]
    fn test_settings_from_config() {
        let mut config = EvalConfig::default();
        config.timeout_secs = 42;
        config.api_base = Some("http://localhost:4000".to_string());
        let settings = JudgeSettings::from_config(&config);
        assert_eq!(settings.timeout, Duration::from_secs(42));
        assert_eq!(settings.python_path, PathBuf::from("python3"));
        assert_eq!(settings.max_buffer, 10 * 1024 * 1024);
        assert_eq!(settings.api_base.as_deref(), Some("http://localhost:4000"));
    }

    #[test]
    fn test_temp_output_removed_on_drop() {
        let output = TempOutput::new(Framework::Ragas);
        let path = output.path().to_path_buf();
        std::fs::write(&path, "{}").unwrap();
        drop(output);
        assert!(!path.exists());

        let unique_a = TempOutput::new(Framework::DeepEval);
        let unique_b = TempOutput::new(Framework::DeepEval);
        assert_ne!(unique_a.path(), unique_b.path());
    }

    #[test]
    fn test_validate_request() {
        let dir = TempDir::new().unwrap();
        let input = input_file(&dir);

        assert!(validate_request(Framework::Ragas, &input, &metrics(&["faithfulness"])).is_ok());

        let missing = dir.path().join("missing.json");
        let err =
            validate_request(Framework::Ragas, &missing, &metrics(&["faithfulness"])).unwrap_err();
        assert!(err.to_string().contains("does not exist"));

        let err = validate_request(Framework::Ragas, &input, &[]).unwrap_err();
        assert!(err.to_string().contains("no metrics requested"));

        let err =
            validate_request(Framework::Ragas, &input, &metrics(&["hallucination"])).unwrap_err();
        assert!(err.to_string().contains("unsupported ragas metric(s): hallucination"));
        assert!(validate_request(Framework::DeepEval, &input, &metrics(&["hallucination"])).is_ok());
    }

    #[tokio::test]
    async fn test_availability_without_interpreter() {
        let bridge = bridge_with_python("/nonexistent/ctx-eval/python3");
        let availability = bridge.check_availability().await;
        assert_eq!(availability, PythonAvailability::default());
    }

    #[tokio::test]
    async fn test_missing_interpreter_is_actionable() {
        let dir = TempDir::new().unwrap();
        let bridge = bridge_with_python("/nonexistent/ctx-eval/python3");
        let err = bridge
            .run_ragas(&input_file(&dir), &metrics(&["faithfulness"]))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::RagasError);
        assert!(err.to_string().contains("Python interpreter not found"));
    }

    #[tokio::test]
    async fn test_validation_happens_before_spawn() {
        let dir = TempDir::new().unwrap();
        // A missing interpreter would produce a different message if spawned.
        let bridge = bridge_with_python("/nonexistent/ctx-eval/python3");
        let err = bridge
            .run_deepeval(&dir.path().join("nope.json"), &metrics(&["faithfulness"]))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }
}
