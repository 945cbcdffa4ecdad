//! Exit status and log flushing of the `polyrun` binary

use std::path::Path;
use std::process::Command;

fn polyrun(dir: &Path, args: &[&str]) -> std::process::Output {
    let config = dir.join("config.toml");
    std::fs::write(&config, "[remote]\nenabled = false\n").unwrap();
    Command::new(env!("CARGO_BIN_EXE_polyrun"))
        .arg("--config")
        .arg(&config)
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .unwrap()
}

fn log_text(dir: &Path) -> String {
    std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| std::fs::read_to_string(entry.unwrap().path()).unwrap())
        .collect()
}

#[test]
fn test_failed_check_exits_nonzero_and_flushes_log() {
    let dir = tempfile::tempdir().unwrap();
    let logs = dir.path().join("logs");
    let source = dir.path().join("bad.py");
    std::fs::write(&source, "import os\nos.system('ls')\n").unwrap();

    let output = polyrun(
        dir.path(),
        &[
            "--verbose",
            "--log-dir",
            logs.to_str().unwrap(),
            "check",
            "python",
            source.to_str().unwrap(),
        ],
    );
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Potentially dangerous operation"));
    assert!(log_text(&logs).contains("Configuration loaded"));
}

#[test]
fn test_clean_check_exits_zero() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("ok.py");
    std::fs::write(&source, "print('hi')\n").unwrap();

    let output = polyrun(dir.path(), &["check", "python", source.to_str().unwrap()]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("No denylisted patterns found"));
}
