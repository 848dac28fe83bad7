// Result formatter
// Pure rendering of a RunResult for people; never parsed back

use arena_common::{ActualOutput, RunResult, TestCaseResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::Write;

const TRUNCATION_SUFFIX: &str = "... (output truncated)";

/// What the summary may reveal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayConfig {
    pub show_hidden_tests: bool,
    /// Longest actual output / stderr shown before truncation, in characters
    pub max_output_length: usize,
    pub show_execution_time: bool,
    pub show_memory_usage: bool,
}

impl DisplayConfig {
    /// What end users see
    pub fn production() -> Self {
        Self {
            show_hidden_tests: false,
            max_output_length: 1000,
            show_execution_time: true,
            show_memory_usage: false,
        }
    }

    /// Everything, for challenge authors
    pub fn development() -> Self {
        Self {
            show_hidden_tests: true,
            max_output_length: 10_000,
            show_execution_time: true,
            show_memory_usage: true,
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self::production()
    }
}

/// Overall verdict of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Passed,
    Failed,
    Error,
    Timeout,
}

impl RunStatus {
    /// A run-level error wins, then timeouts, then mismatches
    pub fn of(result: &RunResult) -> Self {
        if result.error_message.is_some() {
            RunStatus::Error
        } else if result.results.iter().any(TestCaseResult::is_timeout) {
            RunStatus::Timeout
        } else if result.all_passed() {
            RunStatus::Passed
        } else {
            RunStatus::Failed
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Passed => "passed",
            RunStatus::Failed => "failed",
            RunStatus::Error => "error",
            RunStatus::Timeout => "timeout",
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            RunStatus::Passed => "All tests passed",
            RunStatus::Failed => "Some tests failed",
            RunStatus::Error => "Execution error",
            RunStatus::Timeout => "Time limit exceeded",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub human_text: String,
    pub status: RunStatus,
    pub machine_result: RunResult,
}

/// Render `result` for display
///
/// One line per test case (index, verdict, elapsed time), followed on failure
/// by expected/actual and any error or stderr, then a trailing aggregate line.
/// Hidden cases are masked in both the text and `machine_result` unless
/// `config.show_hidden_tests` is set.
pub fn summarize(result: &RunResult, config: &DisplayConfig) -> Summary {
    let status = RunStatus::of(result);
    let mut text = String::new();

    for case in &result.results {
        let masked = case.hidden && !config.show_hidden_tests;
        let verdict = if case.passed { "PASSED" } else { "FAILED" };
        let label = if case.hidden { " (hidden)" } else { "" };

        let _ = write!(text, "Test {}{}: {}", case.index + 1, label, verdict);
        if config.show_execution_time {
            let _ = write!(text, " ({}ms)", case.elapsed_ms);
        }
        text.push('\n');

        if case.passed || masked {
            continue;
        }
        if let Some(error) = &case.error {
            let _ = writeln!(text, "  Error:    {}", error);
        }
        let _ = writeln!(text, "  Expected: {}", case.expected_output);
        let actual = case
            .actual_output
            .as_ref()
            .map(ActualOutput::to_string)
            .unwrap_or_else(|| "(no output)".to_string());
        let _ = writeln!(text, "  Actual:   {}", truncate(&actual, config.max_output_length));
        if !case.stderr.trim().is_empty() {
            let _ = writeln!(
                text,
                "  Stderr:   {}",
                truncate(case.stderr.trim_end(), config.max_output_length)
            );
        }
    }

    if let Some(message) = &result.error_message {
        let _ = writeln!(text, "Error: {}", message);
    }
    text.push_str(&summary_line(result, status, config));

    Summary {
        human_text: text,
        status,
        machine_result: mask_hidden(result, config),
    }
}

/// `"{passed}/{total} tests passed • {ms}ms • <status>"`
pub fn summary_line(result: &RunResult, status: RunStatus, config: &DisplayConfig) -> String {
    let mut parts = vec![format!(
        "{}/{} tests passed",
        result.test_cases_passed, result.total_test_cases
    )];
    if config.show_execution_time {
        parts.push(format!("{}ms", result.total_elapsed_ms));
    }
    if config.show_memory_usage && result.peak_memory_bytes > 0 {
        parts.push(format_memory(result.peak_memory_bytes));
    }
    parts.push(status.describe().to_string());
    parts.join(" • ")
}

fn format_memory(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * KB;
    if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}{}", &text[..cut], TRUNCATION_SUFFIX),
        None => text.to_string(),
    }
}

fn mask_hidden(result: &RunResult, config: &DisplayConfig) -> RunResult {
    let mut masked = result.clone();
    if config.show_hidden_tests {
        return masked;
    }
    for case in masked.results.iter_mut().filter(|c| c.hidden) {
        case.input = Value::Null;
        case.expected_output = Value::Null;
        case.actual_output = None;
        case.stderr.clear();
    }
    masked
}
