//! Sandbox service - main entry point

use crate::config::SandboxConfig;
use crate::error::Result;
use crate::policy::SecurityPolicy;
use crate::registry::{LanguageInfo, LanguageRegistry, LanguageSpec};
use crate::runtime::{ProcessRuntime, RemoteRuntime, Runtime, RuntimeError};
use crate::types::{ExecutionId, ExecutionRequest, ExecutionResult, FailureReason};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Code execution service: validates a request, screens it, and runs it on
/// the local toolchain or the remote API, falling back from one to the other.
///
/// Holds only read-only state, so a single instance can serve any number of
/// concurrent calls.
pub struct SandboxService {
    registry: Arc<LanguageRegistry>,
    policy: Arc<SecurityPolicy>,
    local: Arc<dyn Runtime>,
    remote: Arc<dyn Runtime>,
}

impl SandboxService {
    /// Build the service and both runtimes from configuration
    pub fn new(config: SandboxConfig) -> Result<Self> {
        let registry = config.registry()?;
        let policy = config.security.policy();

        let mut local = ProcessRuntime::with_limits(config.execution.limits.clone());
        if let Some(dir) = &config.execution.work_dir {
            local = local.with_work_root(dir.clone());
        }
        let remote = RemoteRuntime::new(config.remote, config.execution.limits)?;

        Ok(Self::with_runtimes(registry, policy, local, remote))
    }

    /// Assemble a service from explicit parts
    pub fn with_runtimes(
        registry: LanguageRegistry,
        policy: SecurityPolicy,
        local: impl Runtime + 'static,
        remote: impl Runtime + 'static,
    ) -> Self {
        Self {
            registry: Arc::new(registry),
            policy: Arc::new(policy),
            local: Arc::new(local),
            remote: Arc::new(remote),
        }
    }

    pub fn registry(&self) -> &LanguageRegistry {
        &self.registry
    }

    /// Read-only language catalog for clients
    pub fn languages(&self) -> Vec<LanguageInfo> {
        self.registry.catalog()
    }

    /// Execute code. Never fails: every problem is reported in the result.
    pub async fn execute(&self, request: ExecutionRequest) -> ExecutionResult {
        self.execute_with_cancel(request, CancellationToken::new())
            .await
    }

    /// Execute code, stopping early (and killing the process) when `cancel`
    /// fires.
    pub async fn execute_with_cancel(
        &self,
        request: ExecutionRequest,
        cancel: CancellationToken,
    ) -> ExecutionResult {
        let id = ExecutionId::new();
        let span = tracing::info_span!(
            "execute",
            execution_id = %id,
            language = %request.language.trim(),
        );
        self.dispatch(request, cancel).instrument(span).await
    }

    async fn dispatch(&self, request: ExecutionRequest, cancel: CancellationToken) -> ExecutionResult {
        if request.code.trim().is_empty() {
            return ExecutionResult::rejected(FailureReason::InvalidRequest, "Code is required");
        }

        let spec = match self.registry.lookup(&request.language) {
            Ok(spec) => spec,
            Err(e) => {
                tracing::info!(error = %e, "Unsupported language");
                return ExecutionResult::rejected(FailureReason::UnsupportedLanguage, e.to_string());
            }
        };

        if let Some(violation) = self.policy.scan(&request.code, &spec.id) {
            tracing::warn!(pattern = %violation.pattern, "Rejected by security prefilter");
            return ExecutionResult::rejected(FailureReason::SecurityRejected, violation.message());
        }

        tracing::info!(
            code_len = request.code.len(),
            remote_preferred = spec.is_remote_preferred(),
            "Executing code"
        );

        let (first, second) = if spec.is_remote_preferred() {
            (&self.remote, &self.local)
        } else {
            (&self.local, &self.remote)
        };

        let first_err = match self.attempt(first, &request, spec, &cancel).await {
            Ok(result) => return result,
            Err(e) => e,
        };
        if cancel.is_cancelled() {
            return ExecutionResult::failed(
                FailureReason::Cancelled,
                "Execution cancelled",
                Duration::ZERO,
            );
        }
        tracing::warn!(
            runtime = first.name(),
            error = %first_err,
            fallback = second.name(),
            "Runtime unavailable, falling back"
        );

        match self.attempt(second, &request, spec, &cancel).await {
            Ok(result) => result,
            Err(second_err) => {
                tracing::warn!(error = %second_err, "No runtime available");
                ExecutionResult::rejected(
                    FailureReason::NoRuntimeAvailable,
                    format!(
                        "No runtime available for {}. {}; {}. Supported: {}",
                        spec.name,
                        first_err,
                        second_err,
                        self.registry.supported()
                    ),
                )
            }
        }
    }

    async fn attempt(
        &self,
        runtime: &Arc<dyn Runtime>,
        request: &ExecutionRequest,
        spec: &LanguageSpec,
        cancel: &CancellationToken,
    ) -> std::result::Result<ExecutionResult, RuntimeError> {
        let result = runtime.execute(request, spec, cancel).await?;
        tracing::info!(
            runtime = runtime.name(),
            success = result.success,
            reason = ?result.reason,
            execution_time = result.execution_time,
            "Execution finished"
        );
        Ok(result.with_runtime(runtime.name()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Runtime stand-in that counts calls and returns a canned outcome
    struct FakeRuntime {
        name: &'static str,
        available: bool,
        calls: Arc<AtomicUsize>,
    }

    impl FakeRuntime {
        fn new(name: &'static str, available: bool) -> (Self, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            (
                Self {
                    name,
                    available,
                    calls: calls.clone(),
                },
                calls,
            )
        }
    }

    #[async_trait]
    impl Runtime for FakeRuntime {
        async fn execute(
            &self,
            _request: &ExecutionRequest,
            _spec: &LanguageSpec,
            _cancel: &CancellationToken,
        ) -> std::result::Result<ExecutionResult, RuntimeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.available {
                return Err(RuntimeError::RemoteUnavailable(format!("{} is down", self.name)));
            }
            Ok(ExecutionResult::succeeded(
                format!("from {}\n", self.name),
                String::new(),
                Duration::from_millis(5),
            ))
        }

        fn name(&self) -> &str {
            self.name
        }
    }

    struct Harness {
        service: SandboxService,
        local_calls: Arc<AtomicUsize>,
        remote_calls: Arc<AtomicUsize>,
    }

    fn harness(local_up: bool, remote_up: bool) -> Harness {
        let (local, local_calls) = FakeRuntime::new("local", local_up);
        let (remote, remote_calls) = FakeRuntime::new("remote", remote_up);
        Harness {
            service: SandboxService::with_runtimes(
                LanguageRegistry::builtin(),
                SecurityPolicy::default(),
                local,
                remote,
            ),
            local_calls,
            remote_calls,
        }
    }

    fn calls(counter: &Arc<AtomicUsize>) -> usize {
        counter.load(Ordering::SeqCst)
    }

    #[tokio::test]
    async fn test_local_first_for_interpreted() {
        let h = harness(true, true);
        let result = h.service.execute(ExecutionRequest::new("print('hi')", "python")).await;
        assert!(result.success);
        assert_eq!(result.output, "from local\n");
        assert_eq!(result.runtime.as_deref(), Some("local"));
        assert_eq!(calls(&h.local_calls), 1);
        assert_eq!(calls(&h.remote_calls), 0);
    }

    #[tokio::test]
    async fn test_remote_first_for_compiled() {
        let h = harness(true, true);
        let result = h
            .service
            .execute(ExecutionRequest::new("fn main() {}", "rust"))
            .await;
        assert_eq!(result.runtime.as_deref(), Some("remote"));
        assert_eq!(calls(&h.local_calls), 0);
        assert_eq!(calls(&h.remote_calls), 1);
    }

    #[tokio::test]
    async fn test_falls_back_to_remote() {
        let h = harness(false, true);
        let result = h.service.execute(ExecutionRequest::new("puts 1", "ruby")).await;
        assert!(result.success);
        assert_eq!(result.output, "from remote\n");
        assert_eq!(calls(&h.local_calls), 1);
        assert_eq!(calls(&h.remote_calls), 1);
    }

    #[tokio::test]
    async fn test_falls_back_to_local() {
        let h = harness(true, false);
        let result = h
            .service
            .execute(ExecutionRequest::new("int main(){return 0;}", "c"))
            .await;
        assert_eq!(result.runtime.as_deref(), Some("local"));
        assert_eq!(calls(&h.remote_calls), 1);
        assert_eq!(calls(&h.local_calls), 1);
    }

    #[tokio::test]
    async fn test_both_unavailable() {
        let h = harness(false, false);
        let result = h.service.execute(ExecutionRequest::new("print(1)", "python")).await;
        assert!(!result.success);
        assert_eq!(result.reason, Some(FailureReason::NoRuntimeAvailable));
        let error = result.error.unwrap();
        assert!(error.contains("local is down"));
        assert!(error.contains("remote is down"));
        assert!(error.contains("Supported: "));
        assert!(result.runtime.is_none());
    }

    #[tokio::test]
    async fn test_security_rejection_spawns_nothing() {
        let h = harness(true, true);
        let result = h
            .service
            .execute(ExecutionRequest::new("import os; os.system('ls')", "python"))
            .await;
        assert!(!result.success);
        assert_eq!(result.reason, Some(FailureReason::SecurityRejected));
        assert!(result.error.unwrap().contains("import os"));
        assert_eq!(calls(&h.local_calls), 0);
        assert_eq!(calls(&h.remote_calls), 0);
    }

    #[tokio::test]
    async fn test_unsupported_language() {
        let h = harness(true, true);
        let result = h.service.execute(ExecutionRequest::new("x", "cobol")).await;
        assert_eq!(result.reason, Some(FailureReason::UnsupportedLanguage));
        assert!(result.error.unwrap().contains("python"));
        assert_eq!(calls(&h.local_calls), 0);
    }

    #[tokio::test]
    async fn test_empty_code_rejected() {
        let h = harness(true, true);
        let result = h.service.execute(ExecutionRequest::new("  \n", "python")).await;
        assert_eq!(result.reason, Some(FailureReason::InvalidRequest));
        assert_eq!(result.error.as_deref(), Some("Code is required"));
    }

    #[tokio::test]
    async fn test_alias_resolves() {
        let h = harness(true, true);
        let result = h.service.execute(ExecutionRequest::new("print(1)", " PY ")).await;
        assert!(result.success);
    }

    #[tokio::test]
    async fn test_cancelled_before_fallback() {
        let h = harness(false, true);
        let token = CancellationToken::new();
        token.cancel();
        let result = h
            .service
            .execute_with_cancel(ExecutionRequest::new("print(1)", "python"), token)
            .await;
        assert_eq!(result.reason, Some(FailureReason::Cancelled));
        assert_eq!(calls(&h.remote_calls), 0);
    }

    #[test]
    fn test_languages_catalog() {
        let h = harness(true, true);
        let languages = h.service.languages();
        assert_eq!(languages.len(), 13);
        assert!(languages.iter().any(|l| l.id == "java" && l.remote_preferred));
    }
}
