// Test runner
// One execution per test case; results are classified, compared and
// aggregated into a RunResult in input order

use crate::client::ExecutionClient;
use crate::error::{JudgeError, Result};
use crate::harness::{HarnessGenerator, MAX_SOURCE_CODE_BYTES};
use crate::normalize;
use crate::registry::LanguageRegistry;
use arena_common::config::{Config, MAX_PARALLEL_TESTS_CAP};
use arena_common::types::{PARSE_ERROR, TIMEOUT_ERROR};
use arena_common::{
    ActualOutput, ExecutionOutcome, ExecutionReport, ExecutionRequest, LanguageSpec, RunResult,
    TestCase, TestCaseResult,
};
use futures_util::{future, stream, StreamExt};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Limits and policies applied to every execution of a run
#[derive(Debug, Clone, PartialEq)]
pub struct RunnerOptions {
    pub timeout_ms: u64,
    pub memory_limit_bytes: u64,
    /// 1 runs test cases strictly one after another
    pub max_parallel_tests: usize,
    /// Attempts per test case when the engine is unavailable
    pub max_attempts: u32,
    /// Base delay between attempts, multiplied by the attempt number
    pub retry_backoff: Duration,
}

impl RunnerOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            timeout_ms: config.default_timeout_ms,
            memory_limit_bytes: config.memory_limit_bytes,
            max_parallel_tests: config.max_parallel_tests,
            max_attempts: config.engine_max_attempts,
            retry_backoff: Duration::from_millis(config.engine_retry_backoff_ms),
        }
    }
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            timeout_ms: 5000,
            memory_limit_bytes: 128 * 1024 * 1024,
            max_parallel_tests: 1,
            max_attempts: 2,
            retry_backoff: Duration::from_millis(250),
        }
    }
}

/// What one test case produced
struct CaseOutcome {
    result: TestCaseResult,
    engine_error: Option<String>,
    memory_bytes: Option<u64>,
}

/// Orchestrates a submission against its test cases
///
/// **Core Responsibility:**
/// - resolve the language before anything touches the network
/// - build every harness up front; a harness failure aborts the run
/// - execute, parse and compare each case independently
///
/// Cheap to clone; all collaborators are shared.
#[derive(Clone)]
pub struct TestRunner {
    registry: Arc<LanguageRegistry>,
    harness: Arc<HarnessGenerator>,
    client: Arc<dyn ExecutionClient>,
    options: RunnerOptions,
}

impl TestRunner {
    pub fn new(
        registry: Arc<LanguageRegistry>,
        harness: Arc<HarnessGenerator>,
        client: Arc<dyn ExecutionClient>,
        options: RunnerOptions,
    ) -> Self {
        Self {
            registry,
            harness,
            client,
            options,
        }
    }

    pub fn options(&self) -> &RunnerOptions {
        &self.options
    }

    /// Same collaborators, different limits
    pub fn with_options(&self, options: RunnerOptions) -> Self {
        Self {
            options,
            ..self.clone()
        }
    }

    /// Run a submission; fatal errors become a failed RunResult
    pub async fn run(&self, source: &str, language: &str, test_cases: &[TestCase]) -> RunResult {
        self.run_with_cancel(source, language, test_cases, &CancellationToken::new())
            .await
    }

    /// Like [`run`](Self::run), stopping new executions once `cancel` fires
    ///
    /// In-flight executions are left to finish or hit their own timeout.
    pub async fn run_with_cancel(
        &self,
        source: &str,
        language: &str,
        test_cases: &[TestCase],
        cancel: &CancellationToken,
    ) -> RunResult {
        match self.try_run(source, language, test_cases, cancel).await {
            Ok(result) => result,
            Err(e) => {
                error!(language, error = %e, "Run aborted");
                RunResult::aborted(e.to_string())
            }
        }
    }

    /// Run a submission, surfacing fatal errors to the caller
    ///
    /// ## Errors
    /// - `UnsupportedLanguage` before any execution is attempted
    /// - `HarnessGeneration` when any test case cannot be wrapped
    ///
    /// Engine failures never end up here; they are recorded on the affected
    /// test case.
    #[instrument(
        name = "run",
        skip_all,
        fields(language = %language, test_cases = test_cases.len())
    )]
    pub async fn try_run(
        &self,
        source: &str,
        language: &str,
        test_cases: &[TestCase],
        cancel: &CancellationToken,
    ) -> Result<RunResult> {
        let spec = self.registry.resolve(language)?;

        if test_cases.is_empty() {
            info!("No test cases to run");
            return Ok(RunResult::from_results(0, Vec::new(), 0, 0, None));
        }

        let programs = test_cases
            .iter()
            .map(|case| self.harness.wrap(source, &spec.name, case))
            .collect::<Result<Vec<_>>>()?;

        let parallel = self.options.max_parallel_tests.clamp(1, MAX_PARALLEL_TESTS_CAP);
        let started = Instant::now();

        // buffered() keeps input order regardless of completion order
        let outcomes: Vec<CaseOutcome> = stream::iter(test_cases.iter().zip(programs).enumerate())
            .take_while(|_| future::ready(!cancel.is_cancelled()))
            .map(|(index, (case, program))| self.execute_case(spec, index, case, program, cancel))
            .boxed()
            .buffered(parallel)
            .collect()
            .await;

        let total_elapsed_ms = if parallel == 1 {
            outcomes.iter().map(|o| o.result.elapsed_ms).sum()
        } else {
            started.elapsed().as_millis() as u64
        };
        let peak_memory_bytes = outcomes
            .iter()
            .filter_map(|o| o.memory_bytes)
            .max()
            .unwrap_or(0);

        let error_message = if outcomes.len() < test_cases.len() {
            warn!(
                executed = outcomes.len(),
                total = test_cases.len(),
                "Run cancelled"
            );
            Some(format!(
                "Run cancelled after {} of {} test cases",
                outcomes.len(),
                test_cases.len()
            ))
        } else {
            outcomes.iter().find_map(|o| o.engine_error.clone())
        };

        let results: Vec<TestCaseResult> = outcomes.into_iter().map(|o| o.result).collect();
        let run = RunResult::from_results(
            test_cases.len(),
            results,
            total_elapsed_ms,
            peak_memory_bytes,
            error_message,
        );

        info!(
            passed = run.test_cases_passed,
            total = run.total_test_cases,
            score = run.score,
            elapsed_ms = run.total_elapsed_ms,
            "Run finished"
        );
        Ok(run)
    }

    /// Run a program as-is, with no harness and no test cases
    ///
    /// ## Errors
    /// - `UnsupportedLanguage` before the engine is contacted
    /// - `SourceTooLarge` for sources over [`MAX_SOURCE_CODE_BYTES`]
    /// - `EngineUnavailable` once retries are exhausted
    ///
    /// A program killed at its time limit is a report with `timed_out` set,
    /// not an error.
    #[instrument(name = "execute", skip_all, fields(language = %language))]
    pub async fn execute_source(
        &self,
        source: &str,
        language: &str,
        stdin: &str,
    ) -> Result<ExecutionReport> {
        let spec = self.registry.resolve(language)?;
        if source.len() > MAX_SOURCE_CODE_BYTES {
            return Err(JudgeError::SourceTooLarge {
                size: source.len(),
                limit: MAX_SOURCE_CODE_BYTES,
            });
        }

        let request = self.request(spec, source.to_string(), stdin);
        let (outcome, elapsed_ms) = self
            .execute_with_retry(&request, 0, &CancellationToken::new())
            .await;

        let report = match outcome {
            Ok(outcome) => ExecutionReport::from_outcome(outcome, elapsed_ms),
            Err(JudgeError::EngineTimeout(reason)) => {
                debug!(reason = %reason, "Execution timed out");
                ExecutionReport::timed_out(elapsed_ms)
            }
            Err(e) => {
                warn!(error = %e, "Execution failed");
                return Err(e);
            }
        };

        info!(
            success = report.success,
            exit_code = ?report.exit_code,
            elapsed_ms,
            "Execution finished"
        );
        Ok(report)
    }

    fn request(&self, spec: &LanguageSpec, source_body: String, stdin: &str) -> ExecutionRequest {
        ExecutionRequest {
            language: spec.engine_language.clone(),
            version: spec.engine_version.clone(),
            filename: spec.source_filename.clone(),
            source_body,
            stdin: stdin.to_string(),
            timeout_ms: self.options.timeout_ms,
            memory_limit_bytes: self.options.memory_limit_bytes,
        }
    }

    async fn execute_case(
        &self,
        spec: &LanguageSpec,
        index: usize,
        case: &TestCase,
        program: String,
        cancel: &CancellationToken,
    ) -> CaseOutcome {
        let request = self.request(spec, program, "");
        let (outcome, elapsed_ms) = self.execute_with_retry(&request, index, cancel).await;

        match outcome {
            Ok(outcome) => {
                let memory_bytes = outcome.memory_bytes;
                let result = judge(index, case, outcome, elapsed_ms);
                debug!(
                    test_index = index,
                    passed = result.passed,
                    elapsed_ms,
                    error = result.error.as_deref().unwrap_or(""),
                    "Test case finished"
                );
                CaseOutcome {
                    result,
                    engine_error: None,
                    memory_bytes,
                }
            }
            Err(JudgeError::EngineTimeout(reason)) => {
                debug!(test_index = index, reason = %reason, "Test case timed out");
                CaseOutcome {
                    result: failed(index, case, elapsed_ms, TIMEOUT_ERROR.to_string()),
                    engine_error: None,
                    memory_bytes: None,
                }
            }
            Err(e) => {
                warn!(test_index = index, error = %e, "Test case could not be executed");
                CaseOutcome {
                    result: failed(index, case, elapsed_ms, e.to_string()),
                    engine_error: Some(e.to_string()),
                    memory_bytes: None,
                }
            }
        }
    }

    /// Returns the final attempt's result and how long that attempt took
    ///
    /// No new attempt is submitted once `cancel` has fired.
    async fn execute_with_retry(
        &self,
        request: &ExecutionRequest,
        index: usize,
        cancel: &CancellationToken,
    ) -> (Result<ExecutionOutcome>, u64) {
        let max_attempts = self.options.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            let started = Instant::now();
            let result = self.client.execute(request).await;
            let elapsed_ms = started.elapsed().as_millis() as u64;

            let retryable = matches!(result, Err(JudgeError::EngineUnavailable(_)))
                && attempt < max_attempts
                && !cancel.is_cancelled();
            if !retryable {
                return (result, elapsed_ms);
            }

            if let Err(e) = &result {
                warn!(
                    test_index = index,
                    attempt,
                    max_attempts,
                    error = %e,
                    "Execution engine unavailable, retrying"
                );
            }
            tokio::select! {
                _ = tokio::time::sleep(self.options.retry_backoff * attempt) => attempt += 1,
                _ = cancel.cancelled() => {
                    debug!(test_index = index, "Run cancelled during retry backoff");
                    return (result, elapsed_ms);
                }
            }
        }
    }
}

/// Classify one engine outcome against the expected value
fn judge(index: usize, case: &TestCase, outcome: ExecutionOutcome, elapsed_ms: u64) -> TestCaseResult {
    let mut result = TestCaseResult {
        index,
        passed: false,
        input: case.input.clone(),
        actual_output: None,
        expected_output: case.expected_output.clone(),
        elapsed_ms,
        stderr: outcome.stderr,
        error: None,
        hidden: case.hidden,
    };

    if outcome.timed_out {
        result.error = Some(TIMEOUT_ERROR.to_string());
        if !outcome.stdout.is_empty() {
            result.actual_output = Some(ActualOutput::Raw(outcome.stdout));
        }
        return result;
    }

    match parse_result_line(&outcome.stdout) {
        Ok(actual) => {
            let matches = normalize::json_equals(&actual, &case.expected_output);
            let clean_exit = outcome.exit_code.map_or(true, |code| code == 0);
            if matches && !clean_exit {
                result.error = outcome
                    .exit_code
                    .map(|code| format!("Process exited with code {}", code));
            }
            result.passed = matches && clean_exit && result.stderr.is_empty();
            result.actual_output = Some(ActualOutput::Json(actual));
        }
        Err(_) => {
            result.error = Some(PARSE_ERROR.to_string());
            result.actual_output = Some(ActualOutput::Raw(outcome.stdout));
        }
    }
    result
}

fn failed(index: usize, case: &TestCase, elapsed_ms: u64, error: String) -> TestCaseResult {
    TestCaseResult {
        index,
        passed: false,
        input: case.input.clone(),
        actual_output: None,
        expected_output: case.expected_output.clone(),
        elapsed_ms,
        stderr: String::new(),
        error: Some(error),
        hidden: case.hidden,
    }
}

/// Parse the last non-empty stdout line as JSON
pub fn parse_result_line(stdout: &str) -> Result<Value> {
    let line = stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .last()
        .ok_or_else(|| JudgeError::ResultParse("no output".to_string()))?;

    serde_json::from_str(line).map_err(|e| JudgeError::ResultParse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockExecutionClient;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn options() -> RunnerOptions {
        RunnerOptions {
            retry_backoff: Duration::ZERO,
            ..RunnerOptions::default()
        }
    }

    fn runner(client: impl ExecutionClient + 'static, options: RunnerOptions) -> TestRunner {
        TestRunner::new(
            Arc::new(LanguageRegistry::builtin()),
            Arc::new(HarnessGenerator::with_default_strategies()),
            Arc::new(client),
            options,
        )
    }

    fn printed(value: Value) -> Result<ExecutionOutcome> {
        Ok(ExecutionOutcome {
            stdout: format!("\n{}\n", value),
            exit_code: Some(0),
            ..Default::default()
        })
    }

    /// Arguments the JavaScript harness embedded into `program`
    fn embedded_args(program: &str) -> Vec<Value> {
        let marker = "JSON.parse(\"";
        let start = program.find(marker).unwrap() + marker.len();
        let end = start + program[start..].find("\");").unwrap();
        let json = program[start..end].replace("\\\"", "\"").replace("\\\\", "\\");
        serde_json::from_str(&json).unwrap()
    }

    /// Engine double that "runs" the JavaScript harness by handing the
    /// embedded arguments to a closure
    struct FakeEngine<F> {
        behaviour: F,
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl<F> FakeEngine<F>
    where
        F: Fn(&[Value]) -> (u64, Result<ExecutionOutcome>) + Send + Sync,
    {
        fn new(behaviour: F) -> Arc<Self> {
            Arc::new(Self {
                behaviour,
                calls: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl<F> ExecutionClient for FakeEngine<F>
    where
        F: Fn(&[Value]) -> (u64, Result<ExecutionOutcome>) + Send + Sync,
    {
        async fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionOutcome> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            let (delay_ms, result) = (self.behaviour)(&embedded_args(&request.source_body));
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            result
        }
    }

    fn shared_runner<C: ExecutionClient + 'static>(client: &Arc<C>, options: RunnerOptions) -> TestRunner {
        TestRunner::new(
            Arc::new(LanguageRegistry::builtin()),
            Arc::new(HarnessGenerator::with_default_strategies()),
            client.clone(),
            options,
        )
    }

    const DOUBLER: &str = "function solution(n) { return n * 2; }";

    fn doubling_engine(args: &[Value]) -> (u64, Result<ExecutionOutcome>) {
        (0, printed(json!(args[0].as_i64().unwrap() * 2)))
    }

    #[tokio::test]
    async fn test_partial_pass_scores_fifty() {
        let engine = FakeEngine::new(doubling_engine);
        let cases = vec![
            TestCase::new(json!({"n": 3}), json!(6)),
            TestCase::new(json!({"n": 5}), json!(11)),
        ];

        let run = shared_runner(&engine, options()).run(DOUBLER, "javascript", &cases).await;

        assert_eq!(run.total_test_cases, 2);
        assert_eq!(run.test_cases_passed, 1);
        assert_eq!(run.score, 50);
        assert!(run.results[0].passed);
        assert!(!run.results[1].passed);
        assert_eq!(run.results[1].actual_output, Some(ActualOutput::Json(json!(10))));
        assert_eq!(run.results[1].expected_output, json!(11));
        assert!(run.results[1].error.is_none());
        assert!(run.error_message.is_none());
    }

    #[tokio::test]
    async fn test_syntax_error_is_a_failed_case() {
        let mut mock = MockExecutionClient::new();
        mock.expect_execute().times(1).returning(|_| {
            Ok(ExecutionOutcome {
                stdout: String::new(),
                stderr: "SyntaxError: Unexpected token '}'".to_string(),
                exit_code: Some(1),
                ..Default::default()
            })
        });

        let cases = vec![TestCase::new(json!({"n": 1}), json!(2))];
        let run = runner(mock, options())
            .run("function solution(n) { return n * 2; }}", "javascript", &cases)
            .await;

        let result = &run.results[0];
        assert!(!result.passed);
        assert!(result.stderr.contains("SyntaxError"));
        assert_eq!(result.error.as_deref(), Some(PARSE_ERROR));
        assert_eq!(run.test_cases_passed, 0);
        assert!(run.error_message.is_none());
    }

    #[tokio::test]
    async fn test_no_test_cases() {
        let mut mock = MockExecutionClient::new();
        mock.expect_execute().times(0);

        let run = runner(mock, options()).run(DOUBLER, "javascript", &[]).await;

        assert_eq!(run.total_test_cases, 0);
        assert_eq!(run.score, 0);
        assert!(run.error_message.is_some());
    }

    #[tokio::test]
    async fn test_timeout_does_not_affect_next_case() {
        let engine = FakeEngine::new(|args: &[Value]| {
            if args[0] == json!(0) {
                (0, Err(JudgeError::EngineTimeout("run terminated by SIGKILL".into())))
            } else {
                doubling_engine(args)
            }
        });
        let cases = vec![
            TestCase::new(json!({"n": 0}), json!(0)),
            TestCase::new(json!({"n": 4}), json!(8)),
        ];

        let run = shared_runner(&engine, options()).run(DOUBLER, "javascript", &cases).await;

        assert_eq!(run.results[0].error.as_deref(), Some(TIMEOUT_ERROR));
        assert!(run.results[0].is_timeout());
        assert!(run.results[1].passed);
        assert_eq!(run.test_cases_passed, 1);
        assert_eq!(run.total_test_cases, 2);
        // timeouts are not retried
        assert_eq!(engine.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_engine_reported_timeout_flag() {
        let mut mock = MockExecutionClient::new();
        mock.expect_execute().returning(|_| {
            Ok(ExecutionOutcome {
                stdout: "partial".to_string(),
                timed_out: true,
                ..Default::default()
            })
        });

        let cases = vec![TestCase::new(json!({"n": 1}), json!(2))];
        let run = runner(mock, options()).run(DOUBLER, "javascript", &cases).await;

        assert!(run.results[0].is_timeout());
        assert_eq!(
            run.results[0].actual_output,
            Some(ActualOutput::Raw("partial".to_string()))
        );
    }

    #[tokio::test]
    async fn test_unsupported_language_never_calls_engine() {
        let mut mock = MockExecutionClient::new();
        mock.expect_execute().times(0);
        let runner = runner(mock, options());
        let cases = vec![TestCase::new(json!({"n": 1}), json!(2))];

        let err = runner
            .try_run(DOUBLER, "not-a-real-language", &cases, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, JudgeError::UnsupportedLanguage(_)));

        let run = runner.run(DOUBLER, "not-a-real-language", &cases).await;
        assert_eq!(run.total_test_cases, 0);
        assert_eq!(
            run.error_message.as_deref(),
            Some("Language not-a-real-language not supported")
        );
    }

    #[tokio::test]
    async fn test_missing_harness_is_fatal() {
        let mut mock = MockExecutionClient::new();
        mock.expect_execute().times(0);

        let cases = vec![TestCase::new(json!({"n": 1}), json!(2))];
        let run = runner(mock, options())
            .run("package main", "go", &cases)
            .await;

        assert_eq!(run.total_test_cases, 0);
        assert!(run.error_message.unwrap().contains("no wrapping strategy"));
    }

    #[tokio::test]
    async fn test_unavailable_engine_isolated_to_one_case() {
        let engine = FakeEngine::new(|args: &[Value]| {
            if args[0] == json!(2) {
                (0, Err(JudgeError::EngineUnavailable("engine returned 503".into())))
            } else {
                doubling_engine(args)
            }
        });
        let cases = vec![
            TestCase::new(json!({"n": 1}), json!(2)),
            TestCase::new(json!({"n": 2}), json!(4)),
            TestCase::new(json!({"n": 3}), json!(6)),
        ];
        let options = RunnerOptions {
            max_attempts: 1,
            ..options()
        };

        let run = shared_runner(&engine, options).run(DOUBLER, "javascript", &cases).await;

        assert!(run.results[0].passed);
        assert!(!run.results[1].passed);
        assert!(run.results[2].passed);
        assert_eq!(run.test_cases_passed, 2);
        assert!(run.error_message.unwrap().contains("503"));
        assert!(run.results[1].error.as_deref().unwrap().contains("503"));
    }

    #[tokio::test]
    async fn test_unavailable_engine_is_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut mock = MockExecutionClient::new();
        mock.expect_execute().times(2).returning(move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(JudgeError::EngineUnavailable("connection reset".into()))
            } else {
                printed(json!(2))
            }
        });

        let cases = vec![TestCase::new(json!({"n": 1}), json!(2))];
        let run = runner(mock, options()).run(DOUBLER, "javascript", &cases).await;

        assert!(run.results[0].passed);
        assert!(run.error_message.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_cancelled_run_is_not_retried() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let mut mock = MockExecutionClient::new();
        mock.expect_execute().times(1).returning(move |_| {
            trigger.cancel();
            Err(JudgeError::EngineUnavailable("connection reset".into()))
        });

        let options = RunnerOptions {
            max_attempts: 3,
            retry_backoff: Duration::from_secs(30),
            ..options()
        };
        let cases = vec![TestCase::new(json!({"n": 1}), json!(2))];
        let run = runner(mock, options)
            .run_with_cancel(DOUBLER, "javascript", &cases, &cancel)
            .await;

        assert_eq!(run.results.len(), 1);
        assert!(run.results[0].error.as_deref().unwrap().contains("connection reset"));
        assert!(run.error_message.unwrap().contains("connection reset"));
    }

    #[tokio::test]
    async fn test_cancel_during_backoff_ends_retry() {
        let mut mock = MockExecutionClient::new();
        mock.expect_execute()
            .times(1)
            .returning(|_| Err(JudgeError::EngineUnavailable("connection reset".into())));

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let options = RunnerOptions {
            max_attempts: 3,
            retry_backoff: Duration::from_secs(30),
            ..options()
        };
        let cases = vec![TestCase::new(json!({"n": 1}), json!(2))];
        let run = tokio::time::timeout(
            Duration::from_secs(5),
            runner(mock, options).run_with_cancel(DOUBLER, "javascript", &cases, &cancel),
        )
        .await
        .expect("retry backoff ignored cancellation");

        assert!(!run.results[0].passed);
        assert!(run.results[0].error.as_deref().unwrap().contains("connection reset"));
    }

    #[tokio::test]
    async fn test_execute_source_runs_program_unwrapped() {
        let mut mock = MockExecutionClient::new();
        mock.expect_execute()
            .withf(|req: &ExecutionRequest| {
                req.language == "python"
                    && req.source_body == "print(input())"
                    && req.stdin == "hi\n"
                    && req.timeout_ms == 1500
            })
            .times(1)
            .returning(|_| {
                Ok(ExecutionOutcome {
                    stdout: "hi\n".to_string(),
                    exit_code: Some(0),
                    memory_bytes: Some(2048),
                    ..Default::default()
                })
            });

        let options = RunnerOptions {
            timeout_ms: 1500,
            ..options()
        };
        let report = runner(mock, options)
            .execute_source("print(input())", "py", "hi\n")
            .await
            .unwrap();

        assert!(report.success);
        assert_eq!(report.stdout, "hi\n");
        assert_eq!(report.exit_code, Some(0));
        assert_eq!(report.memory_bytes, 2048);
        assert!(!report.timed_out);
    }

    #[tokio::test]
    async fn test_execute_source_reports_failures() {
        let mut mock = MockExecutionClient::new();
        mock.expect_execute().times(1).returning(|_| {
            Ok(ExecutionOutcome {
                stderr: "ZeroDivisionError: division by zero".to_string(),
                exit_code: Some(1),
                ..Default::default()
            })
        });
        let report = runner(mock, options())
            .execute_source("print(1 / 0)", "python", "")
            .await
            .unwrap();
        assert!(!report.success);
        assert_eq!(report.exit_code, Some(1));
        assert!(report.stderr.contains("ZeroDivisionError"));

        let mut mock = MockExecutionClient::new();
        mock.expect_execute()
            .times(1)
            .returning(|_| Err(JudgeError::EngineTimeout("run terminated by SIGKILL".into())));
        let report = runner(mock, options())
            .execute_source("while True: pass", "python", "")
            .await
            .unwrap();
        assert!(report.timed_out);
        assert!(!report.success);
    }

    #[tokio::test]
    async fn test_execute_source_rejects_before_engine() {
        let mut mock = MockExecutionClient::new();
        mock.expect_execute().times(0);
        let runner = runner(mock, options());

        let err = runner.execute_source("print(1)", "cobol", "").await.unwrap_err();
        assert!(matches!(err, JudgeError::UnsupportedLanguage(_)));

        let huge = "#".repeat(MAX_SOURCE_CODE_BYTES + 1);
        let err = runner.execute_source(&huge, "python", "").await.unwrap_err();
        assert!(matches!(err, JudgeError::SourceTooLarge { .. }));
    }

    #[tokio::test]
    async fn test_execute_source_unavailable_after_retries() {
        let mut mock = MockExecutionClient::new();
        mock.expect_execute()
            .times(2)
            .returning(|_| Err(JudgeError::EngineUnavailable("engine returned 503".into())));

        let err = runner(mock, options())
            .execute_source("print(1)", "python", "")
            .await
            .unwrap_err();
        assert!(matches!(err, JudgeError::EngineUnavailable(_)));
    }

    #[tokio::test]
    async fn test_results_keep_input_order_when_parallel() {
        // later cases finish first
        let engine = FakeEngine::new(|args: &[Value]| {
            let n = args[0].as_i64().unwrap();
            ((6 - n as u64) * 15, printed(json!(n * 2)))
        });
        let cases: Vec<TestCase> = (0..6)
            .map(|n| TestCase::new(json!({ "n": n }), json!(n * 2)))
            .collect();
        let options = RunnerOptions {
            max_parallel_tests: 3,
            ..options()
        };

        let run = shared_runner(&engine, options).run(DOUBLER, "javascript", &cases).await;

        assert_eq!(run.test_cases_passed, 6);
        for (i, result) in run.results.iter().enumerate() {
            assert_eq!(result.index, i);
            assert_eq!(result.input, cases[i].input);
        }
        let max_in_flight = engine.max_in_flight.load(Ordering::SeqCst);
        assert!(max_in_flight > 1 && max_in_flight <= 3, "{}", max_in_flight);
    }

    #[tokio::test]
    async fn test_stderr_fails_matching_output() {
        let mut mock = MockExecutionClient::new();
        mock.expect_execute().returning(|_| {
            Ok(ExecutionOutcome {
                stdout: "\n2\n".to_string(),
                stderr: "DeprecationWarning: Buffer()".to_string(),
                exit_code: Some(0),
                ..Default::default()
            })
        });

        let cases = vec![TestCase::new(json!({"n": 1}), json!(2))];
        let run = runner(mock, options()).run(DOUBLER, "javascript", &cases).await;

        assert!(!run.results[0].passed);
        assert_eq!(run.results[0].actual_output, Some(ActualOutput::Json(json!(2))));
    }

    #[tokio::test]
    async fn test_nonzero_exit_fails_matching_output() {
        let mut mock = MockExecutionClient::new();
        mock.expect_execute()
            .returning(|_| Ok(ExecutionOutcome {
                stdout: "\n2\n".to_string(),
                exit_code: Some(3),
                ..Default::default()
            }));

        let cases = vec![TestCase::new(json!({"n": 1}), json!(2))];
        let run = runner(mock, options()).run(DOUBLER, "javascript", &cases).await;

        assert!(!run.results[0].passed);
        assert_eq!(run.results[0].error.as_deref(), Some("Process exited with code 3"));
    }

    #[tokio::test]
    async fn test_memory_and_elapsed_aggregation() {
        let memory = Arc::new(AtomicUsize::new(0));
        let counter = memory.clone();
        let mut mock = MockExecutionClient::new();
        mock.expect_execute().times(3).returning(move |_| {
            let call = counter.fetch_add(1, Ordering::SeqCst) as u64;
            Ok(ExecutionOutcome {
                stdout: "\n2\n".to_string(),
                exit_code: Some(0),
                memory_bytes: Some([4096, 9000, 512][call as usize]),
                ..Default::default()
            })
        });

        let cases = vec![TestCase::new(json!({"n": 1}), json!(2)); 3];
        let run = runner(mock, options()).run(DOUBLER, "javascript", &cases).await;

        assert_eq!(run.peak_memory_bytes, 9000);
        assert_eq!(
            run.total_elapsed_ms,
            run.results.iter().map(|r| r.elapsed_ms).sum::<u64>()
        );
        assert!(run.all_passed());
    }

    #[tokio::test]
    async fn test_cancelled_run_stops_submitting() {
        let mut mock = MockExecutionClient::new();
        mock.expect_execute().times(0);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let cases = vec![
            TestCase::new(json!({"n": 1}), json!(2)),
            TestCase::new(json!({"n": 2}), json!(4)),
        ];
        let run = runner(mock, options())
            .run_with_cancel(DOUBLER, "javascript", &cases, &cancel)
            .await;

        assert_eq!(run.total_test_cases, 2);
        assert!(run.results.is_empty());
        assert_eq!(
            run.error_message.as_deref(),
            Some("Run cancelled after 0 of 2 test cases")
        );
    }

    #[tokio::test]
    async fn test_request_uses_engine_identifiers() {
        let mut mock = MockExecutionClient::new();
        mock.expect_execute()
            .withf(|req: &ExecutionRequest| {
                req.language == "python"
                    && req.version == "3.10.0"
                    && req.filename == "solution.py"
                    && req.timeout_ms == 1500
                    && req.source_body.starts_with("def solution(n):")
            })
            .times(1)
            .returning(|_| printed(json!(2)));

        let options = RunnerOptions {
            timeout_ms: 1500,
            ..options()
        };
        let cases = vec![TestCase::new(json!({"n": 1}), json!(2))];
        let run = runner(mock, options)
            .run("def solution(n):\n    return n * 2\n", "py", &cases)
            .await;
        assert!(run.results[0].passed);
    }

    #[test]
    fn test_parse_result_line_takes_last_non_empty_line() {
        assert_eq!(parse_result_line("debug 1\n\n[1, 2]\n\n").unwrap(), json!([1, 2]));
        assert_eq!(parse_result_line("\nnull\n").unwrap(), Value::Null);
        assert!(matches!(parse_result_line(""), Err(JudgeError::ResultParse(_))));
        assert!(parse_result_line("[1, 2]\nTraceback").is_err());
    }

    #[test]
    fn test_non_json_output_keeps_raw_stdout() {
        let case = TestCase::new(json!({"n": 1}), json!(2));
        let outcome = ExecutionOutcome {
            stdout: "hello world\n".to_string(),
            exit_code: Some(0),
            ..Default::default()
        };
        let result = judge(0, &case, outcome, 5);
        assert!(!result.passed);
        assert_eq!(result.error.as_deref(), Some(PARSE_ERROR));
        assert_eq!(
            result.actual_output,
            Some(ActualOutput::Raw("hello world\n".to_string()))
        );
    }

    #[test]
    fn test_options_from_config() {
        let config = Config::from_lookup(|_| None);
        let options = RunnerOptions::from_config(&config);
        assert_eq!(options.timeout_ms, config.default_timeout_ms);
        assert_eq!(options.max_parallel_tests, config.max_parallel_tests);
    }
}
