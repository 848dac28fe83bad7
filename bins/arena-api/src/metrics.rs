// Prometheus metrics for the Arena API

use anyhow::{Context, Result};
use arena_common::{ExecutionReport, RunResult};
use lazy_static::lazy_static;
use prometheus::{CounterVec, Encoder, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // Runs finished (language, overall status)
    pub static ref RUNS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("arena_runs_total", "Total number of runs"),
        &["language", "status"]
    )
    .expect("metric can be created");

    // Test case verdicts (language, passed|failed)
    pub static ref TEST_CASES_TOTAL: CounterVec = CounterVec::new(
        Opts::new("arena_test_cases_total", "Total number of executed test cases"),
        &["language", "verdict"]
    )
    .expect("metric can be created");

    // Plain executions without test cases (language, success|failed|timeout|error)
    pub static ref EXECUTIONS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("arena_executions_total", "Total number of plain executions"),
        &["language", "outcome"]
    )
    .expect("metric can be created");

    // Test cases the engine could not run
    pub static ref ENGINE_ERRORS: CounterVec = CounterVec::new(
        Opts::new("arena_engine_errors_total", "Test cases lost to execution engine failures"),
        &["language"]
    )
    .expect("metric can be created");

    pub static ref RUN_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new("arena_run_duration_ms", "Run wall-clock time in milliseconds")
            .buckets(vec![100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0, 30000.0]),
        &["language"]
    )
    .expect("metric can be created");
}

/// Register every collector with the registry
pub fn init_metrics() -> Result<()> {
    REGISTRY
        .register(Box::new(RUNS_TOTAL.clone()))
        .context("Failed to register arena_runs_total")?;
    REGISTRY
        .register(Box::new(TEST_CASES_TOTAL.clone()))
        .context("Failed to register arena_test_cases_total")?;
    REGISTRY
        .register(Box::new(EXECUTIONS_TOTAL.clone()))
        .context("Failed to register arena_executions_total")?;
    REGISTRY
        .register(Box::new(ENGINE_ERRORS.clone()))
        .context("Failed to register arena_engine_errors_total")?;
    REGISTRY
        .register(Box::new(RUN_DURATION.clone()))
        .context("Failed to register arena_run_duration_ms")?;
    Ok(())
}

/// Render metrics in Prometheus text format
pub fn render_metrics() -> Result<String> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder
        .encode(&REGISTRY.gather(), &mut buffer)
        .context("Failed to encode metrics")?;
    String::from_utf8(buffer).context("Metrics output is not UTF-8")
}

/// Record a finished run
pub fn record_run(language: &str, status: &str, result: &RunResult, wall_time_ms: f64) {
    RUNS_TOTAL.with_label_values(&[language, status]).inc();
    RUN_DURATION.with_label_values(&[language]).observe(wall_time_ms);

    let failed = result.results.len() - result.test_cases_passed.min(result.results.len());
    TEST_CASES_TOTAL
        .with_label_values(&[language, "passed"])
        .inc_by(result.test_cases_passed as f64);
    TEST_CASES_TOTAL
        .with_label_values(&[language, "failed"])
        .inc_by(failed as f64);

    let engine_errors = result
        .results
        .iter()
        .filter(|r| r.error.is_some() && r.actual_output.is_none() && !r.is_timeout())
        .count();
    if engine_errors > 0 {
        ENGINE_ERRORS
            .with_label_values(&[language])
            .inc_by(engine_errors as f64);
    }
}

/// Label for a finished plain execution
pub fn execution_outcome(report: &ExecutionReport) -> &'static str {
    if report.timed_out {
        "timeout"
    } else if report.success {
        "success"
    } else {
        "failed"
    }
}

pub fn record_execution(language: &str, outcome: &str) {
    EXECUTIONS_TOTAL.with_label_values(&[language, outcome]).inc();
}
