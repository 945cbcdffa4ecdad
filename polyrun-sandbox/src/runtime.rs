//! Runtime trait and implementations

mod process;
mod remote;
mod workspace;

use crate::registry::LanguageSpec;
use crate::types::{ExecutionRequest, ExecutionResult};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

pub use process::ProcessRuntime;
pub use remote::{PistonFile, PistonRequest, PistonResponse, PistonStage, RemoteRuntime};
pub use workspace::Workspace;

/// Conditions that mean "this backend cannot run the code at all".
///
/// The coordinator recovers from both by trying the other backend; they
/// never reach the caller. Everything else a runtime observes (compile
/// errors, timeouts, crashes) is reported as an `ExecutionResult`.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// Interpreter or compiler binary could not be launched
    #[error("Runtime '{program}' is not available on this server: {source}")]
    ToolchainUnavailable {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Remote backend unreachable, disabled, or returned garbage
    #[error("Remote execution unavailable: {0}")]
    RemoteUnavailable(String),
}

/// Runtime abstraction for executing code
#[async_trait]
pub trait Runtime: Send + Sync {
    /// Run `request` as described by `spec`. The caller has already resolved
    /// the language and passed the security prefilter.
    async fn execute(
        &self,
        request: &ExecutionRequest,
        spec: &LanguageSpec,
        cancel: &CancellationToken,
    ) -> Result<ExecutionResult, RuntimeError>;

    /// Get runtime name
    fn name(&self) -> &str;
}
