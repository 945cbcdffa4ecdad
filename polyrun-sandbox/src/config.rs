//! Configuration management for the sandbox

use crate::error::{Result, SandboxError};
use crate::limits::ExecutionLimits;
use crate::policy::SecurityPolicy;
use crate::registry::{LanguageRegistry, LanguageSpec};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Public Piston instance
pub const DEFAULT_REMOTE_ENDPOINT: &str = "https://emkc.org/api/v2/piston/execute";

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Local execution settings
    #[serde(default)]
    pub execution: ExecutionConfig,
    /// Remote execution API settings
    #[serde(default)]
    pub remote: RemoteConfig,
    /// Extra denylist patterns
    #[serde(default)]
    pub security: SecurityConfig,
    /// Languages added to, or replacing, the built-in table
    #[serde(default)]
    pub languages: Vec<LanguageSpec>,
}

/// Local execution configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionConfig {
    #[serde(flatten)]
    pub limits: ExecutionLimits,
    /// Parent directory for per-request workspaces
    #[serde(default)]
    pub work_dir: Option<PathBuf>,
}

/// Remote execution API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    #[serde(default = "RemoteConfig::default_enabled")]
    pub enabled: bool,
    /// Full URL of the execute endpoint
    #[serde(default = "RemoteConfig::default_endpoint")]
    pub endpoint: String,
    /// Bound on the whole HTTP exchange
    #[serde(default = "RemoteConfig::default_request_timeout", with = "humantime_serde")]
    pub request_timeout: Duration,
    /// Compile budget sent to the remote service
    #[serde(default = "RemoteConfig::default_compile_timeout_ms")]
    pub compile_timeout_ms: u64,
    /// Upper bound on the run budget sent to the remote service
    #[serde(default = "RemoteConfig::default_run_timeout_ms")]
    pub run_timeout_ms: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            enabled: Self::default_enabled(),
            endpoint: Self::default_endpoint(),
            request_timeout: Self::default_request_timeout(),
            compile_timeout_ms: Self::default_compile_timeout_ms(),
            run_timeout_ms: Self::default_run_timeout_ms(),
        }
    }
}

impl RemoteConfig {
    fn default_enabled() -> bool {
        true
    }

    fn default_endpoint() -> String {
        DEFAULT_REMOTE_ENDPOINT.to_string()
    }

    fn default_request_timeout() -> Duration {
        Duration::from_secs(60)
    }

    fn default_compile_timeout_ms() -> u64 {
        10_000
    }

    fn default_run_timeout_ms() -> u64 {
        3_000
    }

    /// Run budget for a language: its own timeout, capped by the config
    pub fn run_timeout_for(&self, language_timeout: Duration) -> Duration {
        language_timeout.min(Duration::from_millis(self.run_timeout_ms))
    }
}

/// Additional denylist entries on top of the built-in sets
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecurityConfig {
    #[serde(default)]
    pub extra_common_patterns: Vec<String>,
    /// Keyed by language id
    #[serde(default)]
    pub extra_language_patterns: HashMap<String, Vec<String>>,
}

impl SecurityConfig {
    /// Built-in policy extended with the configured patterns
    pub fn policy(&self) -> SecurityPolicy {
        let mut policy =
            SecurityPolicy::default().with_common_patterns(&self.extra_common_patterns);
        for (language, patterns) in &self.extra_language_patterns {
            policy = policy.with_language_patterns(language, patterns);
        }
        policy
    }
}

impl SandboxConfig {
    /// Load from the default path; defaults when the file does not exist
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    /// Load from an explicit file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| SandboxError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// `~/.config/polyrun/config.toml`
    pub fn config_path() -> Result<PathBuf> {
        let home = dirs::home_dir().ok_or(SandboxError::NoHomeDirectory)?;
        Ok(home.join(".config").join("polyrun").join("config.toml"))
    }

    /// Built-in registry with the configured languages applied
    pub fn registry(&self) -> Result<LanguageRegistry> {
        LanguageRegistry::builtin().with_overrides(self.languages.iter().cloned())
    }
}
