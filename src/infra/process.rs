//! Subprocess execution
//!
//! Runs invocation steps with `tokio::process`, streaming each output line to
//! the log while capturing it. A step is killed when the invocation deadline
//! passes or the cancellation token fires.

use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::core::tool::{CommandRunner, Invocation, ToolCommand, ToolResult, ToolStatus};
use crate::error::ToolError;
use crate::infra::filesystem;

/// How long to keep reading output after a process was killed
const DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// [`CommandRunner`] spawning real processes
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    /// Create a runner
    pub fn new() -> Self {
        Self
    }
}

struct StepOutput {
    status: ToolStatus,
    stdout: String,
    stderr: String,
}

impl CommandRunner for ProcessRunner {
    async fn run(
        &self,
        invocation: &Invocation,
        cancel: &CancellationToken,
    ) -> Result<ToolResult, ToolError> {
        for script in &invocation.scripts {
            filesystem::write_file(&script.path, &script.content).map_err(|e| {
                ToolError::ScriptWrite {
                    path: script.path.clone(),
                    error: e.to_string(),
                }
            })?;
            tracing::debug!("Wrote script {}", script.path.display());
        }

        let start = Instant::now();
        let deadline = invocation.timeout.map(|t| start + t);
        let mut stdout = String::new();
        let mut stderr = String::new();
        let mut status = ToolStatus::Exited(0);

        for step in &invocation.steps {
            let output = run_step(step, deadline, cancel).await?;
            stdout.push_str(&output.stdout);
            stderr.push_str(&output.stderr);
            status = output.status;
            if status != ToolStatus::Exited(0) {
                break;
            }
        }

        let elapsed = start.elapsed();
        tracing::debug!("Invocation finished: {status:?} after {elapsed:?}");
        Ok(ToolResult {
            status,
            stdout,
            stderr,
            elapsed,
        })
    }
}

async fn run_step(
    step: &ToolCommand,
    deadline: Option<Instant>,
    cancel: &CancellationToken,
) -> Result<StepOutput, ToolError> {
    let invocation_error = |error: String| ToolError::Invocation {
        program: step.program.clone(),
        error,
    };

    filesystem::create_dir_all(&step.cwd).map_err(|e| invocation_error(e.to_string()))?;

    tracing::info!("Running: {}", step.display());
    tracing::debug!("  in {}", step.cwd.display());

    let mut child = Command::new(&step.program)
        .args(&step.args)
        .current_dir(&step.cwd)
        .envs(&step.env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| invocation_error(e.to_string()))?;

    let stdout_buf = Arc::new(Mutex::new(String::new()));
    let stderr_buf = Arc::new(Mutex::new(String::new()));
    let readers = [
        child
            .stdout
            .take()
            .map(|out| spawn_reader(out, step.program.clone(), "stdout", stdout_buf.clone())),
        child
            .stderr
            .take()
            .map(|err| spawn_reader(err, step.program.clone(), "stderr", stderr_buf.clone())),
    ];

    let expired = async {
        match deadline {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => std::future::pending::<()>().await,
        }
    };

    let status = tokio::select! {
        waited = child.wait() => {
            let exit = waited.map_err(|e| invocation_error(e.to_string()))?;
            ToolStatus::Exited(exit.code().unwrap_or(-1))
        }
        () = expired => {
            tracing::warn!("'{}' timed out; terminating", step.program);
            kill(&mut child, &step.program).await;
            ToolStatus::TimedOut
        }
        () = cancel.cancelled() => {
            tracing::warn!("'{}' cancelled; terminating", step.program);
            kill(&mut child, &step.program).await;
            ToolStatus::Cancelled
        }
    };

    let drain = async {
        for reader in readers.into_iter().flatten() {
            let _ = reader.await;
        }
    };
    if tokio::time::timeout(DRAIN_TIMEOUT, drain).await.is_err() {
        tracing::debug!("Output of '{}' still open after exit", step.program);
    }

    tracing::debug!("'{}' finished: {status:?}", step.program);
    Ok(StepOutput {
        status,
        stdout: take(&stdout_buf),
        stderr: take(&stderr_buf),
    })
}

async fn kill(child: &mut tokio::process::Child, program: &str) {
    if let Err(e) = child.kill().await {
        tracing::error!("Failed to kill '{program}': {e}");
    }
}

fn spawn_reader<R>(
    reader: R,
    program: String,
    stream: &'static str,
    sink: Arc<Mutex<String>>,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut raw = Vec::new();
        loop {
            raw.clear();
            match reader.read_until(b'\n', &mut raw).await {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!("Stopped reading {stream} of '{program}': {e}");
                    break;
                }
            }
            // Tools print in whatever encoding their locale uses
            let text = String::from_utf8_lossy(&raw);
            let line = text.trim_end_matches(['\n', '\r']);
            tracing::debug!(target: "hdlbuild::tool", "[{program} {stream}] {line}");
            if let Ok(mut buf) = sink.lock() {
                buf.push_str(line);
                buf.push('\n');
            }
        }
    })
}

fn take(buf: &Arc<Mutex<String>>) -> String {
    buf.lock().map(|mut b| std::mem::take(&mut *b)).unwrap_or_default()
}
