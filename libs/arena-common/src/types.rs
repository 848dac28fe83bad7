use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Error recorded on a test case whose execution hit a time limit
pub const TIMEOUT_ERROR: &str = "timeout";

/// Error recorded when the last stdout line of a harness is not valid JSON
pub const PARSE_ERROR: &str = "Failed to parse test result";

/// Language Registry Entry (Immutable)
/// Maps a logical language name to the identifiers the execution engine
/// understands, plus the filename the submission is uploaded under
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageSpec {
    pub name: String,
    pub engine_language: String,
    pub engine_version: String,
    pub source_filename: String,
    #[serde(default)]
    pub aliases: Vec<String>,
}

impl fmt::Display for LanguageSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} {})", self.name, self.engine_language, self.engine_version)
    }
}

/// Test Case Definition (Immutable Input)
/// Test cases are immutable - the runner must not mutate them
/// Ordering matters - results are reported in the same order
///
/// `input` is normally a JSON object whose values are passed to the
/// solution as positional arguments, in key order. The stored challenge
/// format names the expected value `output`, which is accepted as an alias.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    pub input: Value,
    #[serde(alias = "output")]
    pub expected_output: Value,
    #[serde(default)]
    pub hidden: bool,
}

impl TestCase {
    pub fn new(input: Value, expected_output: Value) -> Self {
        Self {
            input,
            expected_output,
            hidden: false,
        }
    }

    /// Positional arguments for the entry point
    ///
    /// - object: its values, in key order
    /// - array: its elements
    /// - anything else: the value itself as the only argument
    pub fn arguments(&self) -> Vec<&Value> {
        match &self.input {
            Value::Object(map) => map.values().collect(),
            Value::Array(items) => items.iter().collect(),
            other => vec![other],
        }
    }
}

/// One call to the execution engine
/// Built fresh per test case because the harness embeds that case's input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRequest {
    pub language: String,
    pub version: String,
    pub filename: String,
    pub source_body: String,
    pub stdin: String,
    pub timeout_ms: u64,
    pub memory_limit_bytes: u64,
}

/// Raw result reported by the execution engine
/// Untrusted: stdout/stderr may be truncated and the exit code may be missing
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub memory_bytes: Option<u64>,
}

/// Result of running a program as-is, without a harness or test cases
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionReport {
    /// Finished in time with exit code 0 (or no code reported)
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub elapsed_ms: u64,
    pub memory_bytes: u64,
}

impl ExecutionReport {
    pub fn from_outcome(outcome: ExecutionOutcome, elapsed_ms: u64) -> Self {
        Self {
            success: !outcome.timed_out && outcome.exit_code.map_or(true, |code| code == 0),
            stdout: outcome.stdout,
            stderr: outcome.stderr,
            exit_code: outcome.exit_code,
            timed_out: outcome.timed_out,
            elapsed_ms,
            memory_bytes: outcome.memory_bytes.unwrap_or(0),
        }
    }

    /// The engine killed the program at its time limit
    pub fn timed_out(elapsed_ms: u64) -> Self {
        Self {
            timed_out: true,
            elapsed_ms,
            ..Self::default()
        }
    }
}

/// Value produced by a submission
/// `Json` when the harness printed a parseable result line, `Raw` holds the
/// untouched stdout when it did not
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ActualOutput {
    Json(Value),
    Raw(String),
}

impl fmt::Display for ActualOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActualOutput::Json(value) => write!(f, "{}", value),
            ActualOutput::Raw(raw) => write!(f, "{}", raw.trim_end()),
        }
    }
}

/// Per-Test Result
/// Invariant: `passed` implies `error` is None and `stderr` is empty
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCaseResult {
    pub index: usize,
    pub passed: bool,
    pub input: Value,
    pub actual_output: Option<ActualOutput>,
    pub expected_output: Value,
    pub elapsed_ms: u64,
    pub stderr: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub hidden: bool,
}

impl TestCaseResult {
    pub fn is_timeout(&self) -> bool {
        self.error.as_deref() == Some(TIMEOUT_ERROR)
    }
}

/// Aggregate Result of one run
///
/// ## Scoring Semantics:
/// - score = round(100 * test_cases_passed / total_test_cases)
/// - no test cases: score 0 and error_message set
/// - results[i] always corresponds to test_cases[i]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub total_test_cases: usize,
    pub test_cases_passed: usize,
    pub results: Vec<TestCaseResult>,
    pub total_elapsed_ms: u64,
    pub peak_memory_bytes: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub score: u8,
}

impl RunResult {
    /// Finalize a run from its ordered per-case results
    pub fn from_results(
        total_test_cases: usize,
        results: Vec<TestCaseResult>,
        total_elapsed_ms: u64,
        peak_memory_bytes: u64,
        error_message: Option<String>,
    ) -> Self {
        let test_cases_passed = results.iter().filter(|r| r.passed).count();
        let error_message = match (total_test_cases, error_message) {
            (0, None) => Some("No test cases provided".to_string()),
            (_, message) => message,
        };

        Self {
            total_test_cases,
            test_cases_passed,
            results,
            total_elapsed_ms,
            peak_memory_bytes,
            error_message,
            score: score(test_cases_passed, total_test_cases),
        }
    }

    /// A run that never executed anything
    pub fn aborted(error_message: impl Into<String>) -> Self {
        Self {
            total_test_cases: 0,
            test_cases_passed: 0,
            results: Vec::new(),
            total_elapsed_ms: 0,
            peak_memory_bytes: 0,
            error_message: Some(error_message.into()),
            score: 0,
        }
    }

    pub fn all_passed(&self) -> bool {
        self.total_test_cases > 0 && self.test_cases_passed == self.total_test_cases
    }
}

/// round(100 * passed / total), halves rounded up; 0 when there is nothing to score
pub fn score(passed: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    let passed = passed.min(total) as u64;
    let total = total as u64;
    ((200 * passed + total) / (2 * total)) as u8
}
