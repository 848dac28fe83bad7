// HTTP route handlers for the Arena API

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use arena_common::{ExecutionReport, RunResult, TestCase};
use arena_judge::{
    summarize, EngineRuntime, HarnessGenerator, JudgeError, LanguageRegistry, RunStatus,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::{metrics, AppState};

#[derive(Debug, Deserialize)]
pub struct RunRequest {
    pub language: String,
    #[serde(alias = "code")]
    pub source_code: String,
    /// A list of test cases, or a single test case object
    #[serde(default)]
    pub test_cases: Value,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct ExecuteRequest {
    pub language: String,
    #[serde(alias = "code")]
    pub source_code: String,
    #[serde(default)]
    pub stdin: String,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct ExecuteResponse {
    pub run_id: String,
    #[serde(flatten)]
    pub report: ExecutionReport,
}

#[derive(Debug, Serialize)]
pub struct RunResponse {
    pub run_id: String,
    pub status: RunStatus,
    pub summary: String,
    pub result: RunResult,
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub run_id: String,
    pub status: RunStatus,
    pub all_tests_passed: bool,
    pub score: u8,
    pub summary: String,
    pub result: RunResult,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LanguageInfo {
    pub name: String,
    pub version: String,
    pub aliases: Vec<String>,
    /// Whether submissions can be wrapped for this language
    pub runnable: bool,
    /// Whether the engine reports the runtime as installed; absent when the
    /// engine could not be asked
    #[serde(skip_serializing_if = "Option::is_none")]
    pub installed: Option<bool>,
}

/// Error body returned for rejected requests
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<JudgeError> for ApiError {
    fn from(e: JudgeError) -> Self {
        let status = match &e {
            JudgeError::UnsupportedLanguage(_) => StatusCode::BAD_REQUEST,
            JudgeError::SourceTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            JudgeError::HarnessGeneration { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            JudgeError::EngineUnavailable(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

/// Validate and convert the `test_cases` field
///
/// Accepts an array of test cases or one test case object. Every test case
/// needs `input` and `output` (or `expected_output`).
pub fn parse_test_cases(value: Value) -> Result<Vec<TestCase>, ApiError> {
    let items = match value {
        Value::Null => return Err(ApiError::bad_request("Test cases are required")),
        Value::Array(items) => items,
        object @ Value::Object(_) => vec![object],
        _ => {
            return Err(ApiError::bad_request(
                "Test cases must be an array or an object",
            ))
        }
    };

    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| {
            let complete = item.get("input").is_some()
                && (item.get("output").is_some() || item.get("expected_output").is_some());
            if !complete {
                return Err(ApiError::bad_request(format!(
                    "Test case {} must have input and output",
                    i + 1
                )));
            }
            serde_json::from_value(item).map_err(|e| {
                ApiError::bad_request(format!("Test case {} is invalid: {}", i + 1, e))
            })
        })
        .collect()
}

/// Registry entries joined with what the engine has installed
pub fn language_catalog(
    registry: &LanguageRegistry,
    harness: &HarnessGenerator,
    runtimes: Option<&[EngineRuntime]>,
) -> Vec<LanguageInfo> {
    registry
        .languages()
        .iter()
        .map(|spec| LanguageInfo {
            name: spec.name.clone(),
            version: spec.engine_version.clone(),
            aliases: spec.aliases.clone(),
            runnable: harness.supports(&spec.name),
            installed: runtimes.map(|runtimes| {
                runtimes.iter().any(|rt| {
                    (rt.language == spec.engine_language
                        || rt.aliases.contains(&spec.engine_language))
                        && rt.version == spec.engine_version
                })
            }),
        })
        .collect()
}

/// Run a submission on its own task
///
/// If the client goes away the handler future is dropped, which cancels the
/// token: no further test cases are submitted, while the one in flight is
/// left to finish inside the engine.
async fn run_submission(
    state: &AppState,
    payload: RunRequest,
    run_id: Uuid,
) -> Result<RunResult, ApiError> {
    if payload.source_code.trim().is_empty() {
        return Err(ApiError::bad_request("Source code is required"));
    }
    let test_cases = parse_test_cases(payload.test_cases)?;

    let mut options = state.runner.options().clone();
    options.timeout_ms = state.config.effective_timeout_ms(payload.timeout_ms);
    let runner = state.runner.with_options(options);

    let cancel = CancellationToken::new();
    let guard = cancel.clone().drop_guard();
    let language = payload.language;
    let source = payload.source_code;

    info!(
        run_id = %run_id,
        language = %language,
        test_cases = test_cases.len(),
        "Run requested"
    );

    let started = Instant::now();
    let span = info_span!("request", run_id = %run_id);
    let task_language = language.clone();
    let outcome = tokio::spawn(
        async move {
            runner
                .try_run(&source, &task_language, &test_cases, &cancel)
                .await
        }
        .instrument(span),
    )
    .await;
    guard.disarm();

    let result = match outcome {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => {
            warn!(run_id = %run_id, error = %e, "Run rejected");
            return Err(e.into());
        }
        Err(e) => {
            error!(run_id = %run_id, error = %e, "Run task failed");
            return Err(ApiError {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                message: "Run did not complete".to_string(),
            });
        }
    };

    let status = RunStatus::of(&result);
    metrics::record_run(
        &language,
        status.as_str(),
        &result,
        started.elapsed().as_millis() as f64,
    );
    Ok(result)
}

/// POST /execute - Run code as-is, without test cases
pub async fn execute_code(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ExecuteRequest>,
) -> Result<Json<ExecuteResponse>, ApiError> {
    if payload.source_code.trim().is_empty() {
        return Err(ApiError::bad_request("Source code is required"));
    }

    let run_id = Uuid::new_v4();
    let mut options = state.runner.options().clone();
    options.timeout_ms = state.config.effective_timeout_ms(payload.timeout_ms);
    let runner = state.runner.with_options(options);

    info!(run_id = %run_id, language = %payload.language, "Execution requested");
    let outcome = runner
        .execute_source(&payload.source_code, &payload.language, &payload.stdin)
        .instrument(info_span!("request", run_id = %run_id))
        .await;

    match outcome {
        Ok(report) => {
            metrics::record_execution(&payload.language, metrics::execution_outcome(&report));
            Ok(Json(ExecuteResponse {
                run_id: run_id.to_string(),
                report,
            }))
        }
        Err(e) => {
            warn!(run_id = %run_id, error = %e, "Execution rejected");
            if matches!(e, JudgeError::EngineUnavailable(_)) {
                metrics::record_execution(&payload.language, "error");
            }
            Err(e.into())
        }
    }
}

/// POST /run - Execute a submission against test cases
pub async fn run_code(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RunRequest>,
) -> Result<Json<RunResponse>, ApiError> {
    let run_id = Uuid::new_v4();
    let result = run_submission(&state, payload, run_id).await?;
    let summary = summarize(&result, &state.display);

    Ok(Json(RunResponse {
        run_id: run_id.to_string(),
        status: summary.status,
        summary: summary.human_text,
        result: summary.machine_result,
    }))
}

/// POST /submit - Execute and report the verdict the challenge layer stores
pub async fn submit_code(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RunRequest>,
) -> Result<Json<SubmitResponse>, ApiError> {
    let run_id = Uuid::new_v4();
    let result = run_submission(&state, payload, run_id).await?;
    let summary = summarize(&result, &state.display);

    info!(
        run_id = %run_id,
        passed = result.test_cases_passed,
        total = result.total_test_cases,
        score = result.score,
        "Submission judged"
    );

    Ok(Json(SubmitResponse {
        run_id: run_id.to_string(),
        status: summary.status,
        all_tests_passed: result.all_passed(),
        score: result.score,
        summary: summary.human_text,
        result: summary.machine_result,
    }))
}

/// GET /languages - Configured languages and their engine availability
pub async fn list_languages(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let engine = state.engine.clone();
    let runtimes = match state
        .runtimes
        .get_or_refresh(|| async move { engine.runtimes().await })
        .await
    {
        Ok(runtimes) => Some(runtimes),
        Err(e) => {
            warn!(error = %e, "Could not fetch engine runtimes");
            None
        }
    };

    let languages = language_catalog(&state.registry, &state.harness, runtimes.as_deref());
    Json(json!({ "languages": languages }))
}

/// GET /health - Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// GET /metrics - Prometheus scrape endpoint
pub async fn get_metrics() -> Response {
    match metrics::render_metrics() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to render metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
