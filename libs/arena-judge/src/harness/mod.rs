// Harness generation
// Wraps a submission into a self-contained program that calls the entry point
// with one test case's input and prints a single JSON result line

pub mod entry;
pub mod literal;
mod python;
mod script;

pub use python::PythonHarness;
pub use script::{JavaScriptHarness, TypeScriptHarness};

use crate::error::{JudgeError, Result};
use arena_common::TestCase;
use handlebars::Handlebars;
use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

/// Maximum allowed source code size (1MB)
pub const MAX_SOURCE_CODE_BYTES: usize = 1024 * 1024;

/// Maximum allowed serialized test input size (10MB)
pub const MAX_TEST_INPUT_BYTES: usize = 10 * 1024 * 1024;

/// Diagnostic every harness writes to stderr when no entry point exists
pub const NO_ENTRY_POINT: &str = "No solution function found";

/// One language's wrapping strategy
///
/// **Contract for implementations:**
/// - the submission is emitted first and unmodified, so line numbers in
///   compiler errors match the user's file
/// - the program prints exactly one JSON line for the return value, preceded
///   by a newline so it never merges with the user's own partial output
/// - any failure while locating or calling the entry point goes to stderr
///   with a non-zero exit status and no result line
/// - every piece of test data is embedded through [`literal`]
pub trait HarnessStrategy: Send + Sync {
    /// Canonical registry name this strategy wraps
    fn language(&self) -> &str;

    fn wrap(&self, source: &str, case: &TestCase) -> Result<String>;
}

/// Registered-strategy map from language name to harness builder
pub struct HarnessGenerator {
    strategies: HashMap<String, Box<dyn HarnessStrategy>>,
}

impl HarnessGenerator {
    /// An empty generator; every language fails until registered
    pub fn new() -> Self {
        Self {
            strategies: HashMap::new(),
        }
    }

    /// Generator with the JavaScript, TypeScript and Python strategies
    pub fn with_default_strategies() -> Self {
        let mut generator = Self::new();
        generator.register(Box::new(JavaScriptHarness));
        generator.register(Box::new(TypeScriptHarness));
        generator.register(Box::new(PythonHarness));
        generator
    }

    /// Add or replace the strategy for `strategy.language()`
    pub fn register(&mut self, strategy: Box<dyn HarnessStrategy>) {
        self.strategies
            .insert(strategy.language().to_lowercase(), strategy);
    }

    pub fn supports(&self, language: &str) -> bool {
        self.strategies.contains_key(&language.to_lowercase())
    }

    /// Build the complete program for one test case
    ///
    /// `language` is the canonical registry name. Fails with
    /// `HarnessGeneration` when no strategy is registered for it or when the
    /// submission or its input is too large to embed.
    pub fn wrap(&self, source: &str, language: &str, case: &TestCase) -> Result<String> {
        let strategy = self
            .strategies
            .get(&language.to_lowercase())
            .ok_or_else(|| JudgeError::harness(language, "no wrapping strategy"))?;

        if source.len() > MAX_SOURCE_CODE_BYTES {
            return Err(JudgeError::harness(
                language,
                format!(
                    "source code exceeds maximum size of {} bytes (got {} bytes)",
                    MAX_SOURCE_CODE_BYTES,
                    source.len()
                ),
            ));
        }

        let program = strategy.wrap(source, case)?;
        debug!(language, bytes = program.len(), "Generated harness");
        Ok(program)
    }
}

impl Default for HarnessGenerator {
    fn default() -> Self {
        Self::with_default_strategies()
    }
}

/// Positional arguments of `case` as one JSON array
pub(crate) fn encoded_arguments(language: &str, case: &TestCase) -> Result<String> {
    let args = serde_json::to_string(&case.arguments())
        .map_err(|e| JudgeError::harness(language, format!("input is not serializable: {}", e)))?;

    if args.len() > MAX_TEST_INPUT_BYTES {
        return Err(JudgeError::harness(
            language,
            format!(
                "test input exceeds maximum size of {} bytes (got {} bytes)",
                MAX_TEST_INPUT_BYTES,
                args.len()
            ),
        ));
    }
    Ok(args)
}

/// Render a harness template
///
/// Values are inserted verbatim. Anything derived from user data must
/// already be a literal produced by [`literal`].
pub(crate) fn render<T: Serialize>(language: &str, template: &str, data: &T) -> Result<String> {
    let mut handlebars = Handlebars::new();
    handlebars.set_strict_mode(true);
    handlebars.register_escape_fn(handlebars::no_escape);

    handlebars
        .render_template(template, data)
        .map_err(|e| JudgeError::harness(language, format!("template rendering failed: {}", e)))
}

/// Write `program` to a temp file and run it with a local interpreter
#[cfg(test)]
pub(crate) fn run_locally(interpreter: &str, extension: &str, program: &str) -> std::process::Output {
    use std::sync::atomic::{AtomicUsize, Ordering};
    static NEXT: AtomicUsize = AtomicUsize::new(0);

    let path = std::env::temp_dir().join(format!(
        "arena-harness-{}-{}.{}",
        std::process::id(),
        NEXT.fetch_add(1, Ordering::SeqCst),
        extension
    ));
    std::fs::write(&path, program).unwrap();
    let output = std::process::Command::new(interpreter)
        .arg(&path)
        .output()
        .unwrap_or_else(|e| panic!("failed to start {}: {}", interpreter, e));
    std::fs::remove_file(&path).ok();
    output
}
