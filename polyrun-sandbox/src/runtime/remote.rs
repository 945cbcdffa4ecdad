//! Remote runtime backed by a Piston-compatible execution API

use super::{Runtime, RuntimeError};
use crate::config::RemoteConfig;
use crate::error::Result;
use crate::limits::ExecutionLimits;
use crate::registry::LanguageSpec;
use crate::source;
use crate::types::{format_secs, ExecutionRequest, ExecutionResult, FailureReason};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Memory limit value meaning "use the service's own ceiling"
const UNLIMITED: i64 = -1;

/// Request body for `POST /execute`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PistonRequest {
    pub language: String,
    pub version: String,
    pub files: Vec<PistonFile>,
    pub stdin: String,
    /// Milliseconds
    pub compile_timeout: u64,
    /// Milliseconds
    pub run_timeout: u64,
    pub compile_memory_limit: i64,
    pub run_memory_limit: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PistonFile {
    pub name: String,
    pub content: String,
}

/// Response body; `compile` is only present for compiled languages
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PistonResponse {
    #[serde(default)]
    pub compile: Option<PistonStage>,
    pub run: PistonStage,
}

/// One phase of a remote execution
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PistonStage {
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    /// Absent when the process was killed by a signal
    #[serde(default)]
    pub code: Option<i32>,
    #[serde(default)]
    pub signal: Option<String>,
}

impl PistonStage {
    fn killed(&self) -> bool {
        self.code.is_none() && self.signal.as_deref() == Some("SIGKILL")
    }
}

/// Remote runtime - delegates execution to an external multi-language API
pub struct RemoteRuntime {
    client: reqwest::Client,
    config: RemoteConfig,
    limits: ExecutionLimits,
}

impl RemoteRuntime {
    pub fn new(config: RemoteConfig, limits: ExecutionLimits) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            client,
            config,
            limits,
        })
    }

    pub fn config(&self) -> &RemoteConfig {
        &self.config
    }

    fn payload(&self, request: &ExecutionRequest, spec: &LanguageSpec) -> Option<PistonRequest> {
        let target = spec.remote.as_ref()?;
        let prepared = source::prepare(spec, &request.code);
        Some(PistonRequest {
            language: target.language.clone(),
            version: target.version.clone(),
            files: vec![PistonFile {
                name: prepared.file_name,
                content: prepared.content,
            }],
            stdin: request.stdin.clone().unwrap_or_default(),
            compile_timeout: self.config.compile_timeout_ms,
            run_timeout: self.config.run_timeout_for(spec.timeout).as_millis() as u64,
            compile_memory_limit: UNLIMITED,
            run_memory_limit: UNLIMITED,
        })
    }

    /// Map a two-phase response. A failed compile phase wins over the run.
    fn map_response(
        &self,
        response: PistonResponse,
        run_timeout: Duration,
        elapsed: Duration,
    ) -> ExecutionResult {
        if let Some(compile) = response.compile {
            if compile.killed() {
                let timeout = Duration::from_millis(self.config.compile_timeout_ms);
                return ExecutionResult::failed(
                    FailureReason::CompileTimeout,
                    format!("Compilation timed out after {} seconds", format_secs(timeout)),
                    timeout,
                );
            }
            if compile.code != Some(0) || !compile.stderr.is_empty() {
                let diagnostic = if compile.stderr.is_empty() {
                    compile.stdout
                } else {
                    compile.stderr
                };
                return ExecutionResult::failed(
                    FailureReason::CompileError,
                    self.limits.truncate(&diagnostic),
                    elapsed,
                );
            }
        }

        let run = response.run;
        if run.killed() {
            return ExecutionResult::timed_out(run_timeout);
        }
        let stdout = self.limits.truncate(&run.stdout);
        let stderr = self.limits.truncate(&run.stderr);
        match run.code {
            Some(0) => ExecutionResult::succeeded(stdout, stderr, elapsed),
            Some(code) => ExecutionResult::runtime_error(stdout, stderr, code, elapsed),
            None => {
                let stderr = match (&run.signal, stderr.is_empty()) {
                    (Some(signal), true) => format!("Terminated by signal {}", signal),
                    _ => stderr,
                };
                ExecutionResult::runtime_error(stdout, stderr, 1, elapsed)
            }
        }
    }

    async fn send(&self, payload: &PistonRequest) -> std::result::Result<PistonResponse, RuntimeError> {
        let response = self
            .client
            .post(&self.config.endpoint)
            .json(payload)
            .send()
            .await
            .map_err(|e| RuntimeError::RemoteUnavailable(e.to_string()))?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(RuntimeError::RemoteUnavailable(format!(
                "remote returned {}: {}",
                status,
                body.trim()
            )));
        }

        response
            .json::<PistonResponse>()
            .await
            .map_err(|e| RuntimeError::RemoteUnavailable(format!("malformed response: {}", e)))
    }
}

#[async_trait]
impl Runtime for RemoteRuntime {
    async fn execute(
        &self,
        request: &ExecutionRequest,
        spec: &LanguageSpec,
        cancel: &CancellationToken,
    ) -> std::result::Result<ExecutionResult, RuntimeError> {
        if !self.config.enabled {
            return Err(RuntimeError::RemoteUnavailable(
                "remote execution is disabled".to_string(),
            ));
        }
        let payload = self.payload(request, spec).ok_or_else(|| {
            RuntimeError::RemoteUnavailable(format!("no remote runtime registered for {}", spec.id))
        })?;
        let run_timeout = Duration::from_millis(payload.run_timeout);

        tracing::debug!(
            endpoint = %self.config.endpoint,
            language = %payload.language,
            version = %payload.version,
            file = %payload.files[0].name,
            "Submitting to remote runtime"
        );

        let start = Instant::now();
        let response = tokio::select! {
            response = self.send(&payload) => response?,
            _ = cancel.cancelled() => {
                return Ok(ExecutionResult::failed(
                    FailureReason::Cancelled,
                    "Execution cancelled",
                    start.elapsed(),
                ));
            }
        };

        Ok(self.map_response(response, run_timeout, start.elapsed()))
    }

    fn name(&self) -> &str {
        "remote"
    }
}
