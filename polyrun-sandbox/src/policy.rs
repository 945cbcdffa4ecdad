//! Security prefilter: a denylist scan run before any process is spawned
//!
//! This is a tripwire, not a sandbox. Matching is a case-insensitive literal
//! substring test, so string obfuscation trivially bypasses it and harmless
//! code that happens to contain a pattern is rejected. The real resource
//! bound is the process timeout plus the output caps enforced by the
//! runtimes; this layer only catches the obvious cases cheaply.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Destructive shell idioms and fork bombs, checked for every language
const COMMON_PATTERNS: &[&str] = &[
    "rm -rf",
    "rm -fr",
    "del /f",
    "format c:",
    "mkfs",
    "dd if=",
    ":(){ :|:& };:",
    ":(){:|:&};:",
    "/dev/sda",
    "chmod -r 777 /",
    "shutdown -h",
];

const PYTHON_PATTERNS: &[&str] = &[
    "import os",
    "from os",
    "import subprocess",
    "from subprocess",
    "import sys",
    "from sys",
    "import shutil",
    "import ctypes",
    "eval(",
    "exec(",
    "__import__",
    "socket",
    "requests.",
    "urllib",
];

const JAVASCRIPT_PATTERNS: &[&str] = &[
    "child_process",
    "require(\"fs\")",
    "require('fs')",
    "require(\"net\")",
    "require('net')",
    "process.exit",
    "process.env",
    "process.kill",
    "eval(",
];

const TYPESCRIPT_PATTERNS: &[&str] = &[
    "child_process",
    "require(\"fs\")",
    "require('fs')",
    "from \"fs\"",
    "from 'fs'",
    "process.exit",
    "process.env",
    "eval(",
    "deno.",
];

const RUBY_PATTERNS: &[&str] = &[
    "system(",
    "exec(",
    "spawn(",
    "%x(",
    "io.popen",
    "open3",
    "fileutils",
    "file.delete",
    "exit!",
    "env[",
    "eval(",
    "fiddle",
];

const PHP_PATTERNS: &[&str] = &[
    "shell_exec",
    "exec(",
    "system(",
    "passthru",
    "proc_open",
    "popen(",
    "pcntl_",
    "unlink(",
    "rmdir(",
    "getenv(",
    "$_env",
    "eval(",
    "ffi::",
];

const BASH_PATTERNS: &[&str] = &[
    "rm ",
    "mv ",
    "curl",
    "wget",
    "sudo",
    "chmod",
    "chown",
    "kill",
    "nc ",
    "ssh",
    "exec ",
    "eval ",
    "printenv",
    "/dev/",
];

const LUA_PATTERNS: &[&str] = &[
    "os.execute",
    "io.popen",
    "os.remove",
    "os.rename",
    "os.exit",
    "os.getenv",
    "loadstring",
    "ffi",
];

const GO_PATTERNS: &[&str] = &[
    "\"os/exec\"",
    "\"syscall\"",
    "\"unsafe\"",
    "\"net\"",
    "os.remove",
    "os.exit",
    "os.getenv",
    "os.environ",
    "import \"c\"",
];

const RUST_PATTERNS: &[&str] = &[
    "std::process",
    "std::fs",
    "std::env",
    "std::net",
    "unsafe",
    "asm!",
    "extern \"c\"",
];

const C_PATTERNS: &[&str] = &[
    "system(",
    "fork(",
    "execl",
    "execv",
    "popen(",
    "remove(",
    "unlink(",
    "rmdir(",
    "getenv(",
    "exit(",
    "asm(",
    "__asm__",
    "<unistd.h>",
    "<sys/socket.h>",
];

const CPP_PATTERNS: &[&str] = &[
    "system(",
    "fork(",
    "execl",
    "execv",
    "popen(",
    "remove(",
    "unlink(",
    "getenv(",
    "exit(",
    "asm(",
    "__asm__",
    "<unistd.h>",
    "<filesystem>",
    "std::filesystem",
];

const JAVA_PATTERNS: &[&str] = &[
    "runtime.getruntime",
    "processbuilder",
    "system.exit",
    "system.getenv",
    "system.loadlibrary",
    "java.io.file",
    "java.nio.file",
    "java.net",
];

const KOTLIN_PATTERNS: &[&str] = &[
    "runtime.getruntime",
    "processbuilder",
    "exitprocess",
    "system.exit",
    "system.getenv",
    "java.io.file",
    "java.nio.file",
    "java.net",
    "kotlin.io.path",
];

/// A denylist hit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    /// The pattern that matched, as stored in the denylist
    pub pattern: String,
}

impl Violation {
    /// Message shown to the caller
    pub fn message(&self) -> String {
        format!(
            "Potentially dangerous operation detected: {}. Code execution is restricted for security.",
            self.pattern
        )
    }
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message())
    }
}

/// Denylist configuration: common patterns plus per-language patterns.
/// Patterns are stored lower-case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityPolicy {
    common: Vec<String>,
    languages: HashMap<String, Vec<String>>,
}

fn lowered(patterns: &[&str]) -> Vec<String> {
    patterns.iter().map(|p| p.to_lowercase()).collect()
}

impl Default for SecurityPolicy {
    fn default() -> Self {
        let mut languages = HashMap::new();
        for (language, patterns) in [
            ("python", PYTHON_PATTERNS),
            ("javascript", JAVASCRIPT_PATTERNS),
            ("typescript", TYPESCRIPT_PATTERNS),
            ("ruby", RUBY_PATTERNS),
            ("php", PHP_PATTERNS),
            ("bash", BASH_PATTERNS),
            ("lua", LUA_PATTERNS),
            ("go", GO_PATTERNS),
            ("rust", RUST_PATTERNS),
            ("c", C_PATTERNS),
            ("cpp", CPP_PATTERNS),
            ("java", JAVA_PATTERNS),
            ("kotlin", KOTLIN_PATTERNS),
        ] {
            languages.insert(language.to_string(), lowered(patterns));
        }

        Self {
            common: lowered(COMMON_PATTERNS),
            languages,
        }
    }
}

impl SecurityPolicy {
    /// Policy with no patterns at all
    pub fn permissive() -> Self {
        Self {
            common: Vec::new(),
            languages: HashMap::new(),
        }
    }

    /// Add patterns checked for every language
    pub fn with_common_patterns<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.common
            .extend(patterns.into_iter().map(|p| p.as_ref().to_lowercase()));
        self
    }

    /// Add patterns checked for one language id
    pub fn with_language_patterns<I, S>(mut self, language: &str, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.languages
            .entry(language.to_lowercase())
            .or_default()
            .extend(patterns.into_iter().map(|p| p.as_ref().to_lowercase()));
        self
    }

    /// Patterns checked for every language
    pub fn common_patterns(&self) -> &[String] {
        &self.common
    }

    /// Patterns specific to a language id (empty if none)
    pub fn language_patterns(&self, language: &str) -> &[String] {
        self.languages
            .get(language)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Return the first pattern found in `source`: common patterns first,
    /// then the language's own. `language` must be a registry id.
    pub fn scan(&self, source: &str, language: &str) -> Option<Violation> {
        let haystack = source.to_lowercase();
        self.common
            .iter()
            .chain(self.language_patterns(language))
            .find(|pattern| !pattern.is_empty() && haystack.contains(pattern.as_str()))
            .map(|pattern| Violation {
                pattern: pattern.clone(),
            })
    }
}

/// Scan with the default denylist
pub fn scan(source: &str, language: &str) -> Option<Violation> {
    SecurityPolicy::default().scan(source, language)
}
