//! Interpreter scripts executed by the judge-model bridge.
//!
//! The scripts live next to this module and are embedded at compile time,
//! so the binary carries everything it needs to run an evaluation.

use std::borrow::Cow;

/// Embedded script bodies.
pub struct Scripts;

impl Scripts {
    /// Prints a JSON object describing the interpreter and installed
    /// judge-model packages.
    pub fn probe() -> &'static str {
        include_str!("scripts/probe.py")
    }

    /// RAGAS runner. Arguments: input path, output path, metrics CSV, model.
    pub fn ragas_runner() -> &'static str {
        include_str!("scripts/ragas_runner.py")
    }

    /// DeepEval runner. Arguments: input path, output path, metrics CSV, model.
    pub fn deepeval_runner() -> &'static str {
        include_str!("scripts/deepeval_runner.py")
    }
}

/// The set of script bodies a bridge runs; defaults to the embedded ones.
#[derive(Debug, Clone)]
pub struct ScriptSet {
    pub probe: Cow<'static, str>,
    pub ragas: Cow<'static, str>,
    pub deepeval: Cow<'static, str>,
}

impl Default for ScriptSet {
    fn default() -> Self {
        Self {
            probe: Cow::Borrowed(Scripts::probe()),
            ragas: Cow::Borrowed(Scripts::ragas_runner()),
            deepeval: Cow::Borrowed(Scripts::deepeval_runner()),
        }
    }
}
