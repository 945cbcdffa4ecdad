//! Language registry: the static table of supported languages
//!
//! Each entry describes how source text becomes a running program. Adding a
//! language is a data change here (or a `[[languages]]` entry in the config
//! file); the runtimes dispatch on [`Toolchain`] and never on language ids.

use crate::error::{Result, SandboxError};
use crate::limits::MAX_LANGUAGE_TIMEOUT;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::time::Duration;

/// Argument vector with `{source}`, `{output}`, `{dir}` and `{class}` placeholders
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandTemplate(Vec<String>);

/// Values substituted into a [`CommandTemplate`]
#[derive(Debug, Clone, Copy)]
pub struct TemplateVars<'a> {
    pub source: &'a Path,
    pub output: &'a Path,
    pub dir: &'a Path,
    pub class: &'a str,
}

impl CommandTemplate {
    pub fn new<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(args.into_iter().map(Into::into).collect())
    }

    /// First element of the template, before substitution
    pub fn program(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }

    pub fn args(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Substitute placeholders in every argument
    pub fn render(&self, vars: &TemplateVars<'_>) -> Vec<String> {
        self.0
            .iter()
            .map(|arg| {
                arg.replace("{source}", &vars.source.to_string_lossy())
                    .replace("{output}", &vars.output.to_string_lossy())
                    .replace("{dir}", &vars.dir.to_string_lossy())
                    .replace("{class}", vars.class)
            })
            .collect()
    }
}

/// Script-mode alternative for archive toolchains
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptMode {
    /// Interpreter invocation, run directly on the source
    pub run: CommandTemplate,
    /// Extension used for script sources (without the dot)
    pub extension: String,
}

/// How a language's source becomes a running program
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Toolchain {
    /// Run the interpreter on the source file
    Interpreted { run: CommandTemplate },

    /// Compile to a native binary at `{output}`, then run it
    Compiled {
        compile: CommandTemplate,
        run: CommandTemplate,
    },

    /// File must be named after the public type; the loader takes `{class}`
    ClassBased {
        compile: CommandTemplate,
        run: CommandTemplate,
        #[serde(default = "default_class_name")]
        default_class: String,
    },

    /// Compile to a runnable archive at `{output}`, or run as a script when
    /// the source has no entry point
    ArchiveBased {
        compile: CommandTemplate,
        run: CommandTemplate,
        #[serde(default)]
        script: Option<ScriptMode>,
    },
}

fn default_class_name() -> String {
    "Main".to_string()
}

/// Tag of a [`Toolchain`], for display and the catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolchainKind {
    Interpreted,
    Compiled,
    ClassBased,
    ArchiveBased,
}

impl Toolchain {
    pub fn kind(&self) -> ToolchainKind {
        match self {
            Toolchain::Interpreted { .. } => ToolchainKind::Interpreted,
            Toolchain::Compiled { .. } => ToolchainKind::Compiled,
            Toolchain::ClassBased { .. } => ToolchainKind::ClassBased,
            Toolchain::ArchiveBased { .. } => ToolchainKind::ArchiveBased,
        }
    }

    pub fn compile_command(&self) -> Option<&CommandTemplate> {
        match self {
            Toolchain::Interpreted { .. } => None,
            Toolchain::Compiled { compile, .. }
            | Toolchain::ClassBased { compile, .. }
            | Toolchain::ArchiveBased { compile, .. } => Some(compile),
        }
    }

    pub fn run_command(&self) -> &CommandTemplate {
        match self {
            Toolchain::Interpreted { run }
            | Toolchain::Compiled { run, .. }
            | Toolchain::ClassBased { run, .. }
            | Toolchain::ArchiveBased { run, .. } => run,
        }
    }

    fn templates(&self) -> Vec<&CommandTemplate> {
        let mut templates = vec![self.run_command()];
        templates.extend(self.compile_command());
        if let Toolchain::ArchiveBased {
            script: Some(script),
            ..
        } = self
        {
            templates.push(&script.run);
        }
        templates
    }
}

/// Identifier pair understood by the remote execution API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteTarget {
    pub language: String,
    pub version: String,
}

/// Which backend is tried first
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Preference {
    /// Local toolchain first, remote on a missing toolchain
    #[default]
    Local,
    /// Remote first, local when the remote is unreachable
    Remote,
}

/// Immutable description of one language
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanguageSpec {
    /// Registry key (lower-case)
    pub id: String,

    /// Display name for clients
    pub name: String,

    /// Extra identifiers resolving to this entry
    #[serde(default)]
    pub aliases: Vec<String>,

    /// Source file extension, without the dot
    pub extension: String,

    pub toolchain: Toolchain,

    /// Run timeout
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// Remote identifier, if the remote backend supports the language
    #[serde(default)]
    pub remote: Option<RemoteTarget>,

    #[serde(default)]
    pub preference: Preference,

    /// Extra child environment; values may use `{dir}`
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl LanguageSpec {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        extension: impl Into<String>,
        toolchain: Toolchain,
        timeout: Duration,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            aliases: Vec::new(),
            extension: extension.into(),
            toolchain,
            timeout,
            remote: None,
            preference: Preference::Local,
            env: BTreeMap::new(),
        }
    }

    pub fn with_aliases(mut self, aliases: &[&str]) -> Self {
        self.aliases = aliases.iter().map(|a| a.to_string()).collect();
        self
    }

    pub fn with_remote(mut self, language: &str, version: &str) -> Self {
        self.remote = Some(RemoteTarget {
            language: language.to_string(),
            version: version.to_string(),
        });
        self
    }

    pub fn remote_preferred(mut self) -> Self {
        self.preference = Preference::Remote;
        self
    }

    pub fn with_env(mut self, key: &str, value: &str) -> Self {
        self.env.insert(key.to_string(), value.to_string());
        self
    }

    pub fn kind(&self) -> ToolchainKind {
        self.toolchain.kind()
    }

    pub fn is_remote_preferred(&self) -> bool {
        self.preference == Preference::Remote
    }

    fn validate(&self) -> Result<()> {
        let invalid = |reason: String| SandboxError::InvalidLanguageSpec {
            id: self.id.clone(),
            reason,
        };

        if self.id.is_empty() || self.id != self.id.trim().to_lowercase() {
            return Err(invalid("id must be non-empty lower-case".to_string()));
        }
        if self.extension.is_empty() || self.extension.starts_with('.') {
            return Err(invalid("extension must be non-empty, without a dot".to_string()));
        }
        if self.timeout.is_zero() || self.timeout > MAX_LANGUAGE_TIMEOUT {
            return Err(invalid(format!(
                "timeout {:?} outside (0s, {:?}]",
                self.timeout, MAX_LANGUAGE_TIMEOUT
            )));
        }
        if self.toolchain.templates().iter().any(|t| t.is_empty()) {
            return Err(invalid("command template is empty".to_string()));
        }
        Ok(())
    }
}

/// Catalog entry exposed to clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageInfo {
    pub id: String,
    pub name: String,
    /// Run timeout in seconds
    pub timeout: u64,
    pub remote_preferred: bool,
}

/// Read-only table of languages, built once and shared
#[derive(Debug, Clone)]
pub struct LanguageRegistry {
    languages: BTreeMap<String, LanguageSpec>,
    aliases: HashMap<String, String>,
}

impl LanguageRegistry {
    /// Build a registry, validating every entry
    pub fn new(specs: impl IntoIterator<Item = LanguageSpec>) -> Result<Self> {
        let mut registry = Self {
            languages: BTreeMap::new(),
            aliases: HashMap::new(),
        };
        for spec in specs {
            spec.validate()?;
            if registry.languages.contains_key(&spec.id) {
                return Err(SandboxError::InvalidLanguageSpec {
                    id: spec.id,
                    reason: "duplicate id".to_string(),
                });
            }
            registry.insert(spec);
        }
        Ok(registry)
    }

    /// The built-in language table
    pub fn builtin() -> Self {
        let mut registry = Self {
            languages: BTreeMap::new(),
            aliases: HashMap::new(),
        };
        for spec in builtin_specs() {
            registry.insert(spec);
        }
        registry
    }

    /// Add or replace entries, validating each
    pub fn with_overrides(mut self, specs: impl IntoIterator<Item = LanguageSpec>) -> Result<Self> {
        for spec in specs {
            spec.validate()?;
            if let Some(old) = self.languages.remove(&spec.id) {
                self.aliases.retain(|_, target| *target != old.id);
            }
            self.insert(spec);
        }
        Ok(self)
    }

    fn insert(&mut self, spec: LanguageSpec) {
        for alias in &spec.aliases {
            self.aliases.insert(alias.to_lowercase(), spec.id.clone());
        }
        self.languages.insert(spec.id.clone(), spec);
    }

    /// Resolve an identifier or alias, case-insensitively. Ids shadow aliases.
    pub fn lookup(&self, language: &str) -> Result<&LanguageSpec> {
        let key = language.trim().to_lowercase();
        self.languages
            .get(&key)
            .or_else(|| self.aliases.get(&key).and_then(|id| self.languages.get(id)))
            .ok_or_else(|| SandboxError::UnsupportedLanguage {
                language: language.trim().to_string(),
                supported: self.supported(),
            })
    }

    /// Comma separated list of registered ids
    pub fn supported(&self) -> String {
        self.languages.keys().cloned().collect::<Vec<_>>().join(", ")
    }

    pub fn iter(&self) -> impl Iterator<Item = &LanguageSpec> {
        self.languages.values()
    }

    pub fn len(&self) -> usize {
        self.languages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.languages.is_empty()
    }

    /// Entries for client-side language pickers, sorted by id
    pub fn catalog(&self) -> Vec<LanguageInfo> {
        self.languages
            .values()
            .map(|spec| LanguageInfo {
                id: spec.id.clone(),
                name: spec.name.clone(),
                timeout: spec.timeout.as_secs(),
                remote_preferred: spec.is_remote_preferred(),
            })
            .collect()
    }
}

impl Default for LanguageRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

fn interpreted(run: &[&str]) -> Toolchain {
    Toolchain::Interpreted {
        run: CommandTemplate::new(run.iter().copied()),
    }
}

fn compiled(compile: &[&str]) -> Toolchain {
    Toolchain::Compiled {
        compile: CommandTemplate::new(compile.iter().copied()),
        run: CommandTemplate::new(["{output}"]),
    }
}

fn secs(n: u64) -> Duration {
    Duration::from_secs(n)
}

/// Built-in languages. Interpreters are assumed present on the host;
/// compilers and JVMs are not, so those entries prefer the remote backend.
pub fn builtin_specs() -> Vec<LanguageSpec> {
    vec![
        LanguageSpec::new("python", "Python", "py", interpreted(&["python3", "{source}"]), secs(10))
            .with_aliases(&["py", "python3"])
            .with_remote("python", "3.10.0"),
        LanguageSpec::new("javascript", "JavaScript", "js", interpreted(&["node", "{source}"]), secs(10))
            .with_aliases(&["js", "node", "nodejs"])
            .with_remote("javascript", "18.15.0"),
        LanguageSpec::new(
            "typescript",
            "TypeScript",
            "ts",
            interpreted(&["npx", "ts-node", "{source}"]),
            secs(15),
        )
        .with_aliases(&["ts"])
        .with_remote("typescript", "5.0.3"),
        LanguageSpec::new("ruby", "Ruby", "rb", interpreted(&["ruby", "{source}"]), secs(10))
            .with_aliases(&["rb"])
            .with_remote("ruby", "3.0.1"),
        LanguageSpec::new("php", "PHP", "php", interpreted(&["php", "{source}"]), secs(10))
            .with_remote("php", "8.2.3"),
        LanguageSpec::new("bash", "Bash", "sh", interpreted(&["bash", "{source}"]), secs(10))
            .with_aliases(&["sh", "shell"])
            .with_remote("bash", "5.2.0"),
        LanguageSpec::new("lua", "Lua", "lua", interpreted(&["lua", "{source}"]), secs(10))
            .with_remote("lua", "5.4.4"),
        LanguageSpec::new(
            "go",
            "Go",
            "go",
            compiled(&["go", "build", "-o", "{output}", "{source}"]),
            secs(15),
        )
        .with_aliases(&["golang"])
        .with_remote("go", "1.16.2")
        .with_env("GOCACHE", "{dir}/.gocache")
        .with_env("GOPATH", "{dir}/.gopath")
        .remote_preferred(),
        LanguageSpec::new(
            "rust",
            "Rust",
            "rs",
            compiled(&["rustc", "-O", "--edition", "2021", "-o", "{output}", "{source}"]),
            secs(15),
        )
        .with_aliases(&["rs"])
        .with_remote("rust", "1.68.2")
        .remote_preferred(),
        LanguageSpec::new(
            "c",
            "C",
            "c",
            compiled(&["gcc", "-O2", "-std=c11", "-o", "{output}", "{source}", "-lm"]),
            secs(10),
        )
        .with_remote("c", "10.2.0")
        .remote_preferred(),
        LanguageSpec::new(
            "cpp",
            "C++",
            "cpp",
            compiled(&["g++", "-O2", "-std=c++17", "-o", "{output}", "{source}"]),
            secs(10),
        )
        .with_aliases(&["c++", "cxx", "cc"])
        .with_remote("c++", "10.2.0")
        .remote_preferred(),
        LanguageSpec::new(
            "java",
            "Java",
            "java",
            Toolchain::ClassBased {
                compile: CommandTemplate::new(["javac", "-encoding", "UTF-8", "-d", "{dir}", "{source}"]),
                run: CommandTemplate::new(["java", "-Xss1m", "-cp", "{dir}", "{class}"]),
                default_class: default_class_name(),
            },
            secs(15),
        )
        .with_remote("java", "15.0.2")
        .remote_preferred(),
        LanguageSpec::new(
            "kotlin",
            "Kotlin",
            "kt",
            Toolchain::ArchiveBased {
                compile: CommandTemplate::new(["kotlinc", "{source}", "-include-runtime", "-d", "{output}"]),
                run: CommandTemplate::new(["java", "-jar", "{output}"]),
                script: Some(ScriptMode {
                    run: CommandTemplate::new(["kotlinc", "-script", "{source}"]),
                    extension: "kts".to_string(),
                }),
            },
            secs(20),
        )
        .with_aliases(&["kt"])
        .with_remote("kotlin", "1.8.20")
        .remote_preferred(),
    ]
}
