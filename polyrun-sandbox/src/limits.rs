//! Resource limits applied to every execution

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Maximum characters retained per captured stream
pub const MAX_OUTPUT_CHARS: usize = 50_000;

/// Upper bound for any language's run timeout
pub const MAX_LANGUAGE_TIMEOUT: Duration = Duration::from_secs(20);

/// Default bound for a compile step
pub const DEFAULT_COMPILE_TIMEOUT: Duration = Duration::from_secs(30);

/// Limits shared by the local and remote runtimes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionLimits {
    /// Characters kept from stdout and, separately, from stderr
    #[serde(default = "default_max_output_chars")]
    pub max_output_chars: usize,

    /// Wall-clock bound for compile steps
    #[serde(default = "default_compile_timeout", with = "humantime_serde")]
    pub compile_timeout: Duration,
}

fn default_max_output_chars() -> usize {
    MAX_OUTPUT_CHARS
}

fn default_compile_timeout() -> Duration {
    DEFAULT_COMPILE_TIMEOUT
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            max_output_chars: MAX_OUTPUT_CHARS,
            compile_timeout: DEFAULT_COMPILE_TIMEOUT,
        }
    }
}

impl ExecutionLimits {
    /// Limits with a custom output cap
    pub fn with_max_output_chars(mut self, max: usize) -> Self {
        self.max_output_chars = max;
        self
    }

    /// Limits with a custom compile timeout
    pub fn with_compile_timeout(mut self, timeout: Duration) -> Self {
        self.compile_timeout = timeout;
        self
    }

    /// Byte budget kept while reading a stream. Four bytes per char covers
    /// any UTF-8 input, so the char cap is always reachable.
    pub fn capture_bytes(&self) -> usize {
        self.max_output_chars.saturating_mul(4)
    }

    /// Apply the character cap to a captured stream
    pub fn truncate(&self, text: &str) -> String {
        truncate_chars(text, self.max_output_chars)
    }
}

/// Keep at most `max` characters of `text`, never splitting a code point.
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
