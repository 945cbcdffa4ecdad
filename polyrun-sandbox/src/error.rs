//! Error types for the sandbox

use std::path::PathBuf;

/// Result type for sandbox setup operations
pub type Result<T> = std::result::Result<T, SandboxError>;

/// Errors raised while building or configuring the sandbox.
///
/// Execution itself never fails with this type: `SandboxService::execute`
/// folds every failure into an `ExecutionResult`.
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    /// Language identifier not present in the registry
    #[error("Language \"{language}\" is not supported for execution. Supported: {supported}")]
    UnsupportedLanguage {
        /// Requested identifier
        language: String,
        /// Comma separated list of registered identifiers
        supported: String,
    },

    /// A language entry failed validation
    #[error("Invalid language spec '{id}': {reason}")]
    InvalidLanguageSpec {
        /// Offending language id
        id: String,
        /// What was wrong with it
        reason: String,
    },

    /// Configuration file could not be read
    #[error("Failed to read config {path}: {source}")]
    ConfigRead {
        /// Path that was read
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Configuration file could not be parsed
    #[error("Failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Home directory unknown, so the default config path cannot be built
    #[error("Cannot determine home directory")]
    NoHomeDirectory,

    /// HTTP client for the remote backend could not be built
    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}
