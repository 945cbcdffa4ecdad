//! Polyrun Sandbox - multi-language code execution
//!
//! Runs untrusted snippets with toolchains installed on the host, falling
//! back to a remote execution API when a toolchain is missing (or first, for
//! languages that need heavyweight compilers). Every call yields an
//! [`ExecutionResult`]; failures are values, never panics or errors.

mod config;
mod error;
mod limits;
mod policy;
mod registry;
mod runtime;
mod service;
mod source;
mod types;

pub use config::{
    ExecutionConfig, RemoteConfig, SandboxConfig, SecurityConfig, DEFAULT_REMOTE_ENDPOINT,
};
pub use error::{Result, SandboxError};
pub use limits::{
    truncate_chars, ExecutionLimits, DEFAULT_COMPILE_TIMEOUT, MAX_LANGUAGE_TIMEOUT,
    MAX_OUTPUT_CHARS,
};
pub use policy::{scan, SecurityPolicy, Violation};
pub use registry::{
    builtin_specs, CommandTemplate, LanguageInfo, LanguageRegistry, LanguageSpec, Preference,
    RemoteTarget, ScriptMode, TemplateVars, Toolchain, ToolchainKind,
};
pub use runtime::{
    PistonFile, PistonRequest, PistonResponse, PistonStage, ProcessRuntime, RemoteRuntime,
    Runtime, RuntimeError, Workspace,
};
pub use service::SandboxService;
pub use source::{prepare, PreparedSource};
pub use types::{ExecutionId, ExecutionRequest, ExecutionResult, FailureReason};

/// Re-exported so callers can cancel without depending on tokio-util directly
pub use tokio_util::sync::CancellationToken;
