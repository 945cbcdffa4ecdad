//! Shared helpers for the sandbox integration tests
#![allow(dead_code)]

use polyrun_sandbox::{CommandTemplate, LanguageRegistry, LanguageSpec, ScriptMode, Toolchain};
use std::path::Path;
use std::time::Duration;

/// Setup logging for tests
pub fn setup_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init();
}

/// `sh` as an interpreted language, so process tests need no real toolchain
pub fn shell_spec(id: &str, timeout: Duration) -> LanguageSpec {
    LanguageSpec::new(
        id,
        "Shell",
        "sh",
        Toolchain::Interpreted {
            run: CommandTemplate::new(["sh", "{source}"]),
        },
        timeout,
    )
}

/// A "compiled" language whose compiler is `sh`: sources containing
/// `SYNTAX_ERROR` fail to compile, everything else is copied to `{output}`
/// and made executable.
pub fn fake_compiled_spec(id: &str) -> LanguageSpec {
    LanguageSpec::new(
        id,
        "Fake compiled",
        "fsh",
        Toolchain::Compiled {
            compile: CommandTemplate::new([
                "sh",
                "-c",
                "if grep -q SYNTAX_ERROR \"$0\"; then echo \"$0:1: syntax error\" >&2; exit 1; fi; \
                 cp \"$0\" \"$1\" && chmod +x \"$1\"",
                "{source}",
                "{output}",
            ]),
            run: CommandTemplate::new(["{output}"]),
        },
        Duration::from_secs(10),
    )
}

/// A class-based language: "compiling" drops `<Type>.class` into `{dir}`,
/// and the loader reports the class it was given and whether its file exists.
pub fn fake_class_spec(id: &str) -> LanguageSpec {
    LanguageSpec::new(
        id,
        "Fake class-based",
        "java",
        Toolchain::ClassBased {
            compile: CommandTemplate::new([
                "sh",
                "-c",
                "touch \"$1/$(basename \"$0\" .java).class\"",
                "{source}",
                "{dir}",
            ]),
            run: CommandTemplate::new([
                "sh",
                "-c",
                "echo \"loading $0\"; test -f \"$1/$0.class\" && echo found",
                "{class}",
                "{dir}",
            ]),
            default_class: "Main".to_string(),
        },
        Duration::from_secs(10),
    )
}

/// An archive-based language with a script mode. The compiler leaves a
/// `compiled` marker in the working directory and copies the source to
/// `{output}`; both runners print `compiled` when that marker exists.
pub fn fake_archive_spec(id: &str) -> LanguageSpec {
    LanguageSpec::new(
        id,
        "Fake archive-based",
        "kt",
        Toolchain::ArchiveBased {
            compile: CommandTemplate::new([
                "sh",
                "-c",
                "touch compiled; cp \"$0\" \"$1\"",
                "{source}",
                "{output}",
            ]),
            run: CommandTemplate::new([
                "sh",
                "-c",
                "[ -e compiled ] && echo compiled; sh \"$0\"",
                "{output}",
            ]),
            script: Some(ScriptMode {
                run: CommandTemplate::new([
                    "sh",
                    "-c",
                    "[ -e compiled ] && echo compiled; sh \"$0\"; basename \"$0\"",
                    "{source}",
                ]),
                extension: "kts".to_string(),
            }),
        },
        Duration::from_secs(10),
    )
}

/// A language whose interpreter does not exist on any machine
pub fn missing_toolchain_spec(id: &str) -> LanguageSpec {
    LanguageSpec::new(
        id,
        "Missing",
        "missing",
        Toolchain::Interpreted {
            run: CommandTemplate::new(["polyrun-test-no-such-interpreter", "{source}"]),
        },
        Duration::from_secs(10),
    )
}

pub fn registry(specs: Vec<LanguageSpec>) -> LanguageRegistry {
    LanguageRegistry::new(specs).unwrap()
}

/// Number of entries directly under `dir`
pub fn entries(dir: &Path) -> usize {
    std::fs::read_dir(dir).unwrap().count()
}

pub fn python3_available() -> bool {
    std::process::Command::new("python3")
        .arg("--version")
        .output()
        .map(|out| out.status.success())
        .unwrap_or(false)
}

pub fn setsid_available() -> bool {
    std::process::Command::new("sh")
        .args(["-c", "command -v setsid"])
        .output()
        .map(|out| out.status.success())
        .unwrap_or(false)
}

/// Whether `pid` still names a live (non-zombie) process
#[cfg(target_os = "linux")]
pub fn process_alive(pid: i32) -> bool {
    match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
        Ok(stat) => {
            // State is the first field after the parenthesised command name
            let state = stat
                .rsplit_once(')')
                .and_then(|(_, rest)| rest.split_whitespace().next())
                .unwrap_or("");
            state != "Z" && state != "X"
        }
        Err(_) => false,
    }
}
