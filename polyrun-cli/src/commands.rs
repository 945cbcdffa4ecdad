//! CLI command implementations
//!
//! Each `execute_*` function returns whether the command succeeded, which
//! `main` turns into the process exit status.

use anyhow::{anyhow, Context, Result};
use polyrun_sandbox::{
    CancellationToken, ExecutionRequest, LanguageRegistry, SandboxConfig, SandboxService,
    SecurityPolicy,
};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Where the program text comes from
pub enum SourceInput {
    File(PathBuf),
    Inline(String),
}

impl SourceInput {
    pub fn from_args(file: Option<PathBuf>, code: Option<String>) -> Self {
        match (code, file) {
            (Some(code), _) => Self::Inline(code),
            (None, Some(file)) => Self::File(file),
            // clap enforces one of the two
            (None, None) => Self::Inline(String::new()),
        }
    }

    fn read(self) -> Result<String> {
        match self {
            Self::Inline(code) => Ok(code),
            Self::File(path) => read_path(&path),
        }
    }
}

/// What the program sees on its standard input
pub enum StdinInput {
    None,
    File(PathBuf),
    Text(String),
}

impl StdinInput {
    pub fn from_args(file: Option<PathBuf>, text: Option<String>) -> Self {
        match (file, text) {
            (Some(file), _) => Self::File(file),
            (None, Some(text)) => Self::Text(text),
            (None, None) => Self::None,
        }
    }

    fn read(self) -> Result<Option<String>> {
        match self {
            Self::None => Ok(None),
            Self::Text(text) => Ok(Some(text)),
            Self::File(path) => read_path(&path).map(Some),
        }
    }
}

fn read_path(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut buffer = String::new();
        std::io::stdin()
            .read_to_string(&mut buffer)
            .context("Failed to read standard input")?;
        return Ok(buffer);
    }
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

/// Console logging on stderr (stdout carries results), plus an optional
/// daily rolling file. The returned guard must live until exit.
pub fn init_logging(verbose: bool, log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let log_level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!(
            "polyrun={},polyrun_sandbox={}",
            log_level, log_level
        ))
    });

    let console = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(true);

    match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
            let file_appender = tracing_appender::rolling::daily(dir, "polyrun.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            tracing_subscriber::registry()
                .with(console)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(non_blocking)
                        .with_ansi(false),
                )
                .with(filter)
                .try_init()
                .map_err(|e| anyhow!("Failed to initialise logging: {}", e))?;
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry()
                .with(console)
                .with(filter)
                .try_init()
                .map_err(|e| anyhow!("Failed to initialise logging: {}", e))?;
            Ok(None)
        }
    }
}

pub fn load_config(path: Option<&Path>) -> Result<SandboxConfig> {
    let config = match path {
        Some(path) => SandboxConfig::load_from(path)?,
        None => SandboxConfig::load()?,
    };
    debug!(
        remote_enabled = config.remote.enabled,
        endpoint = %config.remote.endpoint,
        extra_languages = config.languages.len(),
        "Configuration loaded"
    );
    Ok(config)
}

/// Execute a program and print its `ExecutionResult` as JSON
pub async fn execute_run(
    config: SandboxConfig,
    language: &str,
    source: SourceInput,
    stdin: StdinInput,
    pretty: bool,
) -> Result<bool> {
    let code = source.read()?;
    let mut request = ExecutionRequest::new(code, language);
    if let Some(input) = stdin.read()? {
        request = request.with_stdin(input);
    }

    let service = SandboxService::new(config).context("Failed to initialise sandbox")?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling execution");
            on_interrupt.cancel();
        }
    });

    let result = service.execute_with_cancel(request, cancel).await;
    info!(
        success = result.success,
        execution_time = result.execution_time,
        "Done"
    );

    let json = if pretty {
        serde_json::to_string_pretty(&result)?
    } else {
        serde_json::to_string(&result)?
    };
    println!("{}", json);
    Ok(result.success)
}

/// Print the language catalog
pub fn execute_languages(config: SandboxConfig, json: bool) -> Result<bool> {
    let registry = config.registry()?;
    let catalog = registry.catalog();

    if json {
        println!("{}", serde_json::to_string_pretty(&catalog)?);
        return Ok(true);
    }

    println!("{:<12} {:<12} {:>8}  {}", "ID", "NAME", "TIMEOUT", "PREFERS");
    for info in &catalog {
        println!(
            "{:<12} {:<12} {:>7}s  {}",
            info.id,
            info.name,
            info.timeout,
            if info.remote_preferred { "remote" } else { "local" }
        );
    }
    Ok(true)
}

/// Run only the security prefilter and report the verdict
pub fn execute_check(config: SandboxConfig, language: &str, file: &Path) -> Result<bool> {
    let registry: LanguageRegistry = config.registry()?;
    let policy: SecurityPolicy = config.security.policy();
    let spec = registry.lookup(language)?;
    let code = read_path(file)?;

    match policy.scan(&code, &spec.id) {
        Some(violation) => {
            eprintln!("✗ {}", violation.message());
            Ok(false)
        }
        None => {
            println!("✓ No denylisted patterns found for {}", spec.name);
            Ok(true)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inline_code_wins() {
        let source = SourceInput::from_args(Some(PathBuf::from("a.py")), Some("print(1)".into()));
        assert!(matches!(source, SourceInput::Inline(code) if code == "print(1)"));
    }

    #[test]
    fn test_read_source_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hello.py");
        std::fs::write(&path, "print('hi')").unwrap();
        let code = SourceInput::File(path).read().unwrap();
        assert_eq!(code, "print('hi')");
    }

    #[test]
    fn test_missing_file_has_context() {
        let err = SourceInput::File(PathBuf::from("/nonexistent/x.py"))
            .read()
            .unwrap_err();
        assert!(err.to_string().contains("/nonexistent/x.py"));
    }

    #[test]
    fn test_stdin_text() {
        let input = StdinInput::from_args(None, Some("42".into())).read().unwrap();
        assert_eq!(input.as_deref(), Some("42"));
        assert!(StdinInput::None.read().unwrap().is_none());
    }

    #[test]
    fn test_check_flags_denylisted_code() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.py");
        std::fs::write(&path, "import subprocess").unwrap();
        let ok = execute_check(SandboxConfig::default(), "python", &path).unwrap();
        assert!(!ok);

        std::fs::write(&path, "print(sum(range(10)))").unwrap();
        let ok = execute_check(SandboxConfig::default(), "py", &path).unwrap();
        assert!(ok);
    }

    #[test]
    fn test_check_unknown_language() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.cob");
        std::fs::write(&path, "DISPLAY 'HI'").unwrap();
        assert!(execute_check(SandboxConfig::default(), "cobol", &path).is_err());
    }
}
