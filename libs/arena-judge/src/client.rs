// Execution client
// Thin adapter to a Piston-compatible execution engine. One HTTP call per
// execute(), no retries; retry policy lives in the runner.

use crate::error::{JudgeError, Result};
use arena_common::{ExecutionOutcome, ExecutionRequest};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Extra time granted to the HTTP call on top of the run timeout, covering
/// queueing and compilation inside the engine
const TRANSPORT_SLACK: Duration = Duration::from_secs(15);

/// Engine-agnostic execution boundary
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExecutionClient: Send + Sync {
    /// Run one program
    ///
    /// ## Errors
    /// - `EngineUnavailable`: transport failure (including the HTTP call
    ///   running past its deadline), non-2xx status, or a response without
    ///   the expected result fields
    /// - `EngineTimeout`: the engine reports that it killed the program
    async fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionOutcome>;
}

#[derive(Debug, Serialize)]
struct PistonFile<'a> {
    name: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct PistonExecuteRequest<'a> {
    language: &'a str,
    version: &'a str,
    files: Vec<PistonFile<'a>>,
    stdin: &'a str,
    run_timeout: u64,
    run_memory_limit: i64,
}

impl<'a> From<&'a ExecutionRequest> for PistonExecuteRequest<'a> {
    fn from(request: &'a ExecutionRequest) -> Self {
        Self {
            language: &request.language,
            version: &request.version,
            files: vec![PistonFile {
                name: &request.filename,
                content: &request.source_body,
            }],
            stdin: &request.stdin,
            run_timeout: request.timeout_ms,
            // the engine reads -1 as unlimited
            run_memory_limit: i64::try_from(request.memory_limit_bytes)
                .ok()
                .filter(|limit| *limit > 0)
                .unwrap_or(-1),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct PistonStage {
    stdout: Option<String>,
    stderr: Option<String>,
    code: Option<i32>,
    signal: Option<String>,
    status: Option<String>,
    memory: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct PistonExecuteResponse {
    run: Option<PistonStage>,
    compile: Option<PistonStage>,
    message: Option<String>,
}

/// A runtime installed on the engine, as listed by `GET /runtimes`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineRuntime {
    pub language: String,
    pub version: String,
    #[serde(default)]
    pub aliases: Vec<String>,
}

/// HTTP client for the Piston v2 API
#[derive(Debug, Clone)]
pub struct PistonClient {
    http: reqwest::Client,
    base_url: String,
    transport_slack: Duration,
}

impl PistonClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| JudgeError::EngineUnavailable(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            transport_slack: TRANSPORT_SLACK,
        })
    }

    /// Override how long the HTTP call may outlive the run timeout
    pub fn with_transport_slack(mut self, slack: Duration) -> Self {
        self.transport_slack = slack;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Runtimes the engine currently has installed
    pub async fn runtimes(&self) -> Result<Vec<EngineRuntime>> {
        let url = format!("{}/runtimes", self.base_url);
        let response = self
            .http
            .get(&url)
            .timeout(self.transport_slack)
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(JudgeError::EngineUnavailable(format!(
                "GET /runtimes returned {}",
                response.status()
            )));
        }

        response
            .json::<Vec<EngineRuntime>>()
            .await
            .map_err(|e| JudgeError::EngineUnavailable(format!("malformed runtimes list: {}", e)))
    }
}

#[async_trait]
impl ExecutionClient for PistonClient {
    async fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionOutcome> {
        let url = format!("{}/execute", self.base_url);
        let body = PistonExecuteRequest::from(request);

        debug!(
            language = %request.language,
            version = %request.version,
            timeout_ms = request.timeout_ms,
            "Submitting to execution engine"
        );

        let response = self
            .http
            .post(&url)
            .json(&body)
            .timeout(Duration::from_millis(request.timeout_ms) + self.transport_slack)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            warn!(status = %status, "Execution engine rejected request");
            return Err(JudgeError::EngineUnavailable(format!(
                "engine returned {}: {}",
                status,
                detail.trim()
            )));
        }

        let parsed: PistonExecuteResponse = response
            .json()
            .await
            .map_err(|e| JudgeError::EngineUnavailable(format!("malformed engine response: {}", e)))?;

        outcome_from_response(parsed)
    }
}

/// The engine never answered; that is never the submission's fault
fn transport_error(e: reqwest::Error) -> JudgeError {
    if e.is_timeout() {
        JudgeError::EngineUnavailable(format!("no response in time: {}", e))
    } else {
        JudgeError::EngineUnavailable(format!("request failed: {}", e))
    }
}

/// Map an engine response onto the engine-agnostic outcome
fn outcome_from_response(response: PistonExecuteResponse) -> Result<ExecutionOutcome> {
    // a failed compile stage has no run stage; that is the user's error
    if let (Some(compile), None) = (response.compile.as_ref(), response.run.as_ref()) {
        if compile.status.as_deref() == Some("TO") {
            return Err(JudgeError::EngineTimeout(
                "compile exceeded its time limit".to_string(),
            ));
        }
        if let Some(signal) = compile.signal.as_deref() {
            return Err(JudgeError::EngineTimeout(format!(
                "compile terminated by {}",
                signal
            )));
        }
        if compile.code.unwrap_or(0) != 0 {
            return Ok(ExecutionOutcome {
                stdout: compile.stdout.clone().unwrap_or_default(),
                stderr: compile.stderr.clone().unwrap_or_default(),
                exit_code: compile.code,
                timed_out: false,
                memory_bytes: None,
            });
        }
    }

    let run = match response.run {
        Some(run) => run,
        None => {
            return Err(JudgeError::EngineUnavailable(
                response
                    .message
                    .unwrap_or_else(|| "response has no run result".to_string()),
            ))
        }
    };

    if run.status.as_deref() == Some("TO") {
        return Err(JudgeError::EngineTimeout("run exceeded its time limit".to_string()));
    }
    if let Some(signal) = run.signal.as_deref() {
        return Err(JudgeError::EngineTimeout(format!("run terminated by {}", signal)));
    }

    match (run.stdout, run.stderr) {
        (Some(stdout), Some(stderr)) => Ok(ExecutionOutcome {
            stdout,
            stderr,
            exit_code: run.code,
            timed_out: false,
            memory_bytes: run.memory,
        }),
        _ => Err(JudgeError::EngineUnavailable(
            "run result is missing stdout or stderr".to_string(),
        )),
    }
}
