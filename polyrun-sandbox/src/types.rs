//! Core types for sandbox execution

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Unique execution identifier, used to correlate log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExecutionId(pub uuid::Uuid);

impl ExecutionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for ExecutionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Request to execute code
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRequest {
    /// The source text to execute
    pub code: String,

    /// Language identifier or alias
    pub language: String,

    /// Optional stdin input
    #[serde(default)]
    pub stdin: Option<String>,
}

impl ExecutionRequest {
    /// Create a request without stdin
    pub fn new(code: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            language: language.into(),
            stdin: None,
        }
    }

    /// Attach stdin. Empty input is treated as no input.
    pub fn with_stdin(mut self, stdin: impl Into<String>) -> Self {
        let stdin = stdin.into();
        self.stdin = if stdin.is_empty() { None } else { Some(stdin) };
        self
    }
}

/// Why an execution did not succeed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// Request was malformed (e.g. empty source)
    InvalidRequest,
    /// Language not present in the registry
    UnsupportedLanguage,
    /// Source matched a denylist pattern
    SecurityRejected,
    /// Compiler exited non-zero
    CompileError,
    /// Compiler exceeded the compile bound
    CompileTimeout,
    /// Program exceeded the language timeout
    Timeout,
    /// Program exited non-zero
    RuntimeError,
    /// Neither the local toolchain nor the remote backend could run the code
    NoRuntimeAvailable,
    /// Caller cancelled the execution
    Cancelled,
    /// Unexpected failure while setting up the execution
    InternalError,
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FailureReason::InvalidRequest => "invalid_request",
            FailureReason::UnsupportedLanguage => "unsupported_language",
            FailureReason::SecurityRejected => "security_rejected",
            FailureReason::CompileError => "compile_error",
            FailureReason::CompileTimeout => "compile_timeout",
            FailureReason::Timeout => "timeout",
            FailureReason::RuntimeError => "runtime_error",
            FailureReason::NoRuntimeAvailable => "no_runtime_available",
            FailureReason::Cancelled => "cancelled",
            FailureReason::InternalError => "internal_error",
        };
        f.write_str(name)
    }
}

/// Result of code execution, returned to the caller as a value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Whether the program ran and exited with code 0
    pub success: bool,

    /// Captured stdout (size-capped)
    pub output: String,

    /// Captured stderr or an error message (size-capped)
    pub error: Option<String>,

    /// Elapsed wall-clock seconds, rounded to milliseconds
    pub execution_time: f64,

    /// Set whenever `success` is false
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<FailureReason>,

    /// Backend that produced the result ("local" or "remote")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime: Option<String>,
}

impl ExecutionResult {
    /// Successful run. Non-empty stderr is kept as `error`.
    pub fn succeeded(output: String, stderr: String, elapsed: Duration) -> Self {
        Self {
            success: true,
            output,
            error: if stderr.is_empty() { None } else { Some(stderr) },
            execution_time: round_secs(elapsed),
            reason: None,
            runtime: None,
        }
    }

    /// Failed run with a reason and a message
    pub fn failed(reason: FailureReason, error: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            success: false,
            output: String::new(),
            error: Some(error.into()),
            execution_time: round_secs(elapsed),
            reason: Some(reason),
            runtime: None,
        }
    }

    /// Failure raised before anything ran
    pub fn rejected(reason: FailureReason, error: impl Into<String>) -> Self {
        Self::failed(reason, error, Duration::ZERO)
    }

    /// Non-zero exit. Partial stdout is kept.
    pub fn runtime_error(output: String, stderr: String, exit_code: i32, elapsed: Duration) -> Self {
        let error = if stderr.is_empty() {
            format!("Execution failed with non-zero exit code {}", exit_code)
        } else {
            stderr
        };
        Self {
            output,
            ..Self::failed(FailureReason::RuntimeError, error, elapsed)
        }
    }

    /// Run killed at the deadline. Reports the timeout, not the measured time.
    pub fn timed_out(timeout: Duration) -> Self {
        Self::failed(
            FailureReason::Timeout,
            format!("Execution timed out after {} seconds", format_secs(timeout)),
            timeout,
        )
    }

    /// Tag the backend that produced this result
    pub fn with_runtime(mut self, runtime: impl Into<String>) -> Self {
        self.runtime = Some(runtime.into());
        self
    }
}

fn round_secs(elapsed: Duration) -> f64 {
    (elapsed.as_secs_f64() * 1000.0).round() / 1000.0
}

/// Whole seconds print without a fractional part
pub(crate) fn format_secs(duration: Duration) -> String {
    if duration.subsec_nanos() == 0 {
        duration.as_secs().to_string()
    } else {
        format!("{:.3}", duration.as_secs_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_succeeded_keeps_stderr_as_error() {
        let result = ExecutionResult::succeeded("hi\n".into(), String::new(), Duration::ZERO);
        assert!(result.success);
        assert!(result.error.is_none());
        assert!(result.reason.is_none());

        let result =
            ExecutionResult::succeeded("hi\n".into(), "warning".into(), Duration::ZERO);
        assert!(result.success);
        assert_eq!(result.error.as_deref(), Some("warning"));
    }

    #[test]
    fn test_runtime_error_message() {
        let result =
            ExecutionResult::runtime_error("partial".into(), String::new(), 3, Duration::ZERO);
        assert!(!result.success);
        assert_eq!(result.output, "partial");
        assert_eq!(result.reason, Some(FailureReason::RuntimeError));
        assert_eq!(
            result.error.as_deref(),
            Some("Execution failed with non-zero exit code 3")
        );
    }

    #[test]
    fn test_timed_out_reports_timeout_value() {
        let result = ExecutionResult::timed_out(Duration::from_secs(10));
        assert_eq!(result.execution_time, 10.0);
        assert_eq!(result.reason, Some(FailureReason::Timeout));
        assert_eq!(
            result.error.as_deref(),
            Some("Execution timed out after 10 seconds")
        );
        assert!(result.output.is_empty());
    }

    #[test]
    fn test_execution_time_rounding() {
        let result =
            ExecutionResult::succeeded(String::new(), String::new(), Duration::from_micros(1_234_567));
        assert_eq!(result.execution_time, 1.235);
    }

    #[test]
    fn test_serialized_shape() {
        let result = ExecutionResult::timed_out(Duration::from_secs(1)).with_runtime("local");
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["reason"], "timeout");
        assert_eq!(json["runtime"], "local");

        let ok = ExecutionResult::succeeded("x".into(), String::new(), Duration::ZERO);
        let json = serde_json::to_value(&ok).unwrap();
        assert!(json["error"].is_null());
        assert!(json.get("reason").is_none());
    }

    #[test]
    fn test_empty_stdin_is_none() {
        let request = ExecutionRequest::new("print(1)", "python").with_stdin("");
        assert!(request.stdin.is_none());
        let request = ExecutionRequest::new("print(1)", "python").with_stdin("5\n");
        assert_eq!(request.stdin.as_deref(), Some("5\n"));
    }
}
