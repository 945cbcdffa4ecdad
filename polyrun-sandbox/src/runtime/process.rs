//! Process-based runtime: runs code with toolchains installed on the host

use super::workspace::Workspace;
use super::{Runtime, RuntimeError};
use crate::limits::ExecutionLimits;
use crate::registry::{CommandTemplate, LanguageSpec, Toolchain};
use crate::source::{self, PreparedSource};
use crate::types::{format_secs, ExecutionRequest, ExecutionResult, FailureReason};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// How long to wait for pipe readers once the process group is gone
const READER_GRACE: Duration = Duration::from_secs(2);

/// Process-based runtime - materializes the source in a private directory,
/// compiles it when the toolchain needs it, and runs it under a deadline.
pub struct ProcessRuntime {
    limits: ExecutionLimits,
    work_root: Option<PathBuf>,
    env: Vec<(String, String)>,
}

impl ProcessRuntime {
    pub fn new() -> Self {
        Self::with_limits(ExecutionLimits::default())
    }

    pub fn with_limits(limits: ExecutionLimits) -> Self {
        Self {
            limits,
            work_root: None,
            env: vec![("PYTHONDONTWRITEBYTECODE".to_string(), "1".to_string())],
        }
    }

    /// Parent directory for per-request workspaces (system temp dir otherwise)
    pub fn with_work_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.work_root = Some(root.into());
        self
    }

    /// Extra environment variable for every child
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn limits(&self) -> &ExecutionLimits {
        &self.limits
    }

    fn child_env(&self, spec: &LanguageSpec, dir: &Path) -> Vec<(String, String)> {
        let dir = dir.to_string_lossy();
        self.env
            .iter()
            .cloned()
            .chain(
                spec.env
                    .iter()
                    .map(|(key, value)| (key.clone(), value.replace("{dir}", &dir))),
            )
            .collect()
    }

    async fn run_in(
        &self,
        workspace: &Workspace,
        request: &ExecutionRequest,
        spec: &LanguageSpec,
        prepared: &PreparedSource,
        cancel: &CancellationToken,
    ) -> Result<ExecutionResult, RuntimeError> {
        let env = self.child_env(spec, workspace.path());

        let run = match &spec.toolchain {
            Toolchain::Interpreted { run } => run,
            Toolchain::ArchiveBased {
                script: Some(script),
                ..
            } if prepared.script => &script.run,
            Toolchain::Compiled { compile, run }
            | Toolchain::ClassBased { compile, run, .. }
            | Toolchain::ArchiveBased { compile, run, .. } => {
                if let Some(failed) = self.compile(compile, workspace, &env, cancel).await? {
                    return Ok(failed);
                }
                run
            }
        };

        let argv = run.render(&workspace.vars());
        tracing::debug!(command = ?argv, "Running program");
        let outcome = self
            .run_process(
                &argv,
                workspace,
                &env,
                request.stdin.as_deref(),
                spec.timeout,
                cancel,
            )
            .await?;

        Ok(match outcome {
            ProcessOutcome::Exited {
                status,
                stdout,
                stderr,
                elapsed,
            } => {
                let stdout = self.limits.truncate(&stdout);
                let stderr = self.limits.truncate(&stderr);
                match exit_code(&status) {
                    0 => ExecutionResult::succeeded(stdout, stderr, elapsed),
                    code => ExecutionResult::runtime_error(stdout, stderr, code, elapsed),
                }
            }
            ProcessOutcome::TimedOut => ExecutionResult::timed_out(spec.timeout),
            ProcessOutcome::Cancelled { elapsed } => {
                ExecutionResult::failed(FailureReason::Cancelled, "Execution cancelled", elapsed)
            }
            ProcessOutcome::SetupFailed { message, elapsed } => ExecutionResult::failed(
                FailureReason::InternalError,
                format!("Execution error: {}", message),
                elapsed,
            ),
        })
    }

    /// Run the compile step. `Some` means compilation failed and the program
    /// must not run.
    async fn compile(
        &self,
        template: &CommandTemplate,
        workspace: &Workspace,
        env: &[(String, String)],
        cancel: &CancellationToken,
    ) -> Result<Option<ExecutionResult>, RuntimeError> {
        let argv = template.render(&workspace.vars());
        tracing::debug!(command = ?argv, "Compiling");
        let timeout = self.limits.compile_timeout;
        let outcome = self
            .run_process(&argv, workspace, env, None, timeout, cancel)
            .await?;

        Ok(match outcome {
            ProcessOutcome::Exited {
                status,
                stdout,
                stderr,
                elapsed,
            } => match exit_code(&status) {
                0 => None,
                code => {
                    let diagnostic = if !stderr.trim().is_empty() {
                        stderr
                    } else if !stdout.trim().is_empty() {
                        stdout
                    } else {
                        format!("Compilation failed with exit code {}", code)
                    };
                    Some(ExecutionResult::failed(
                        FailureReason::CompileError,
                        self.limits.truncate(&diagnostic),
                        elapsed,
                    ))
                }
            },
            ProcessOutcome::TimedOut => Some(ExecutionResult::failed(
                FailureReason::CompileTimeout,
                format!("Compilation timed out after {} seconds", format_secs(timeout)),
                timeout,
            )),
            ProcessOutcome::Cancelled { elapsed } => Some(ExecutionResult::failed(
                FailureReason::Cancelled,
                "Execution cancelled",
                elapsed,
            )),
            ProcessOutcome::SetupFailed { message, elapsed } => Some(ExecutionResult::failed(
                FailureReason::InternalError,
                format!("Execution error: {}", message),
                elapsed,
            )),
        })
    }

    /// Spawn one process in its own group and wait for it, the deadline, or
    /// cancellation, whichever comes first. The group is killed before this
    /// returns on every path.
    async fn run_process(
        &self,
        argv: &[String],
        workspace: &Workspace,
        env: &[(String, String)],
        stdin: Option<&str>,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<ProcessOutcome, RuntimeError> {
        let start = Instant::now();
        let Some((program, args)) = argv.split_first() else {
            return Ok(ProcessOutcome::SetupFailed {
                message: "empty command".to_string(),
                elapsed: Duration::ZERO,
            });
        };

        let mut command = Command::new(program);
        command
            .args(args)
            .current_dir(workspace.path())
            .envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && !workspace.contains(program) => {
                return Err(RuntimeError::ToolchainUnavailable {
                    program: program.clone(),
                    source: e,
                });
            }
            Err(e) => {
                return Ok(ProcessOutcome::SetupFailed {
                    message: format!("Failed to spawn {}: {}", program, e),
                    elapsed: start.elapsed(),
                });
            }
        };
        let pid = child.id();

        // Dropping the pipe closes the child's stdin when there is no input
        if let Some(mut pipe) = child.stdin.take() {
            if let Some(input) = stdin {
                let input = input.to_string();
                tokio::spawn(async move {
                    let _ = pipe.write_all(input.as_bytes()).await;
                    let _ = pipe.shutdown().await;
                });
            }
        }

        let cap = self.limits.capture_bytes();
        let stdout = Capture::spawn(child.stdout.take(), cap);
        let stderr = Capture::spawn(child.stderr.take(), cap);

        let watched = tokio::select! {
            status = child.wait() => Watch::Exited(status),
            _ = tokio::time::sleep(timeout) => Watch::Deadline,
            _ = cancel.cancelled() => Watch::Cancelled,
        };
        let elapsed = start.elapsed();

        // Sweep the whole group: grandchildren must not outlive the request.
        // On the exit path the leader is already reaped, so an empty group's
        // id could in principle be reused. Linux hands out pids sequentially
        // up to pid_max before wrapping, so reuse within this window needs a
        // full pid cycle; that race is accepted.
        kill_process_group(pid);

        match watched {
            Watch::Exited(Ok(status)) => {
                let (stdout, stderr) = collect(stdout, stderr).await;
                Ok(ProcessOutcome::Exited {
                    status,
                    stdout,
                    stderr,
                    elapsed,
                })
            }
            Watch::Exited(Err(e)) => {
                stdout.abort();
                stderr.abort();
                Ok(ProcessOutcome::SetupFailed {
                    message: format!("Process wait error: {}", e),
                    elapsed,
                })
            }
            Watch::Deadline => {
                reap(&mut child, [stdout, stderr]).await;
                tracing::debug!(
                    ?pid,
                    timeout_ms = timeout.as_millis() as u64,
                    "Deadline reached, process group killed"
                );
                Ok(ProcessOutcome::TimedOut)
            }
            Watch::Cancelled => {
                reap(&mut child, [stdout, stderr]).await;
                tracing::debug!(?pid, "Cancelled, process group killed");
                Ok(ProcessOutcome::Cancelled { elapsed })
            }
        }
    }
}

/// Kill and wait for the direct child, dropping whatever output was read
async fn reap(child: &mut Child, captures: [Capture; 2]) {
    let _ = child.start_kill();
    let _ = child.wait().await;
    for capture in captures {
        capture.abort();
    }
}

impl Default for ProcessRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Runtime for ProcessRuntime {
    async fn execute(
        &self,
        request: &ExecutionRequest,
        spec: &LanguageSpec,
        cancel: &CancellationToken,
    ) -> Result<ExecutionResult, RuntimeError> {
        let prepared = source::prepare(spec, &request.code);
        let workspace = match Workspace::create(self.work_root.as_deref(), spec, &prepared) {
            Ok(workspace) => workspace,
            Err(e) => {
                return Ok(ExecutionResult::failed(
                    FailureReason::InternalError,
                    format!("Execution error: failed to prepare workspace: {}", e),
                    Duration::ZERO,
                ))
            }
        };

        let outcome = self.run_in(&workspace, request, spec, &prepared, cancel).await;
        workspace.cleanup();
        outcome
    }

    fn name(&self) -> &str {
        "local"
    }
}

enum Watch {
    Exited(std::io::Result<ExitStatus>),
    Deadline,
    Cancelled,
}

enum ProcessOutcome {
    Exited {
        status: ExitStatus,
        stdout: String,
        stderr: String,
        elapsed: Duration,
    },
    TimedOut,
    Cancelled {
        elapsed: Duration,
    },
    SetupFailed {
        message: String,
        elapsed: Duration,
    },
}

/// A pipe being drained in the background into a buffer this side keeps,
/// so whatever was read survives the reader task being stopped.
struct Capture {
    buffer: Arc<Mutex<Vec<u8>>>,
    task: JoinHandle<()>,
}

impl Capture {
    fn spawn<R>(reader: Option<R>, cap: usize) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let task = tokio::spawn(read_capped(reader, cap, buffer.clone()));
        Self { buffer, task }
    }

    fn abort(&self) {
        self.task.abort();
    }

    fn contents(&self) -> String {
        let bytes = self
            .buffer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let text = String::from_utf8_lossy(&bytes).into_owned();
        text
    }
}

/// Read a pipe to EOF, keeping at most `cap` bytes in `buffer`. The rest is
/// drained so the child never blocks on a full pipe.
async fn read_capped<R>(reader: Option<R>, cap: usize, buffer: Arc<Mutex<Vec<u8>>>)
where
    R: AsyncRead + Unpin,
{
    let Some(mut reader) = reader else {
        return;
    };
    let mut chunk = [0u8; 8192];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let Ok(mut kept) = buffer.lock() else {
                    break;
                };
                let room = cap.saturating_sub(kept.len());
                kept.extend_from_slice(&chunk[..n.min(room)]);
            }
        }
    }
}

/// Wait for both readers under one grace period. A pipe held open by a
/// process that escaped the group never reaches EOF; its reader is stopped
/// and the output read so far is kept.
async fn collect(mut stdout: Capture, mut stderr: Capture) -> (String, String) {
    let drained = tokio::time::timeout(READER_GRACE, async {
        let _ = tokio::join!(&mut stdout.task, &mut stderr.task);
    })
    .await;
    if drained.is_err() {
        tracing::debug!("Output pipes still open after exit, keeping partial capture");
        stdout.abort();
        stderr.abort();
    }
    (stdout.contents(), stderr.contents())
}

fn exit_code(status: &ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    1
}

#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) {
    if let Some(pid) = pid {
        // SAFETY: killpg has no memory-safety preconditions. The group was
        // created for this child; ESRCH (already gone) is ignored.
        unsafe {
            libc::killpg(pid as libc::pid_t, libc::SIGKILL);
        }
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: Option<u32>) {}
