//! Command runner - the boundary to the shell and the tools it drives

use crate::core::step::{StepOutcome, StepResult};
use crate::execution::cancel::CancelSignal;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tracing::{debug, warn};

/// Exit code reported when the shell itself could not be started
pub const SPAWN_FAILURE_EXIT_CODE: i32 = 127;

/// Exit code reported for processes that were killed or ended by a signal
pub const KILLED_EXIT_CODE: i32 = -1;

/// How long to keep reading output after the process is gone
const DRAIN_GRACE: Duration = Duration::from_millis(500);

/// A fully rendered command, ready to execute
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandInvocation {
    pub command: String,
    pub workdir: Option<PathBuf>,
    pub env: HashMap<String, String>,
    pub timeout: Option<Duration>,
}

impl CommandInvocation {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Default::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Executes commands and reports how they ended.
///
/// Implementations never fail: a non-zero exit, a timeout or a spawn error
/// are all described by the returned [`StepResult`].
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn execute(&self, invocation: &CommandInvocation, cancel: CancelSignal) -> StepResult;
}

#[async_trait]
impl<R: CommandRunner + ?Sized> CommandRunner for Arc<R> {
    async fn execute(&self, invocation: &CommandInvocation, cancel: CancelSignal) -> StepResult {
        (**self).execute(invocation, cancel).await
    }
}

/// Runs commands through the platform shell (`sh -c` / `cmd /C`)
#[derive(Debug, Clone, Default)]
pub struct ShellRunner;

impl ShellRunner {
    pub fn new() -> Self {
        Self
    }

    fn shell() -> (&'static str, &'static [&'static str]) {
        if cfg!(target_os = "windows") {
            ("cmd", &["/C"])
        } else {
            ("sh", &["-c"])
        }
    }
}

enum Ending {
    Exited(Option<i32>),
    TimedOut,
    Cancelled,
}

/// Collect a child stream into a shared buffer, so partial output survives
/// even if the reader has to be abandoned.
fn capture<R>(stream: Option<R>) -> (Arc<Mutex<Vec<u8>>>, tokio::task::JoinHandle<()>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let buffer = Arc::new(Mutex::new(Vec::new()));
    let sink = buffer.clone();

    let handle = tokio::spawn(async move {
        let Some(mut stream) = stream else {
            return;
        };
        let mut chunk = [0u8; 8192];
        loop {
            match stream.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => sink
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .extend_from_slice(&chunk[..n]),
            }
        }
    });

    (buffer, handle)
}

async fn drain(buffer: Arc<Mutex<Vec<u8>>>, handle: tokio::task::JoinHandle<()>) -> String {
    if tokio::time::timeout(DRAIN_GRACE, handle).await.is_err() {
        debug!("Output stream still open after {:?}; keeping what was read", DRAIN_GRACE);
    }

    let bytes = buffer.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    String::from_utf8_lossy(&bytes).into_owned()
}

/// Kill the shell and every process in its group, then reap the shell
async fn kill_tree(child: &mut Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        // The group id equals the shell's pid, see `process_group(0)`
        // SAFETY: killpg only sends a signal and takes no pointers
        let rc = unsafe { libc::killpg(pid as libc::pid_t, libc::SIGKILL) };
        if rc != 0 {
            debug!(
                "killpg({}) failed: {}",
                pid,
                std::io::Error::last_os_error()
            );
        }
    }

    if let Err(e) = child.kill().await {
        debug!("Failed to kill step process: {}", e);
    }
}

async fn sleep_or_forever(timeout: Option<Duration>) {
    match timeout {
        Some(timeout) => tokio::time::sleep(timeout).await,
        None => std::future::pending().await,
    }
}

#[async_trait]
impl CommandRunner for ShellRunner {
    async fn execute(&self, invocation: &CommandInvocation, mut cancel: CancelSignal) -> StepResult {
        let started = Instant::now();
        let (shell, shell_args) = Self::shell();
        debug!("Running `{}`", invocation.command);

        let mut cmd = Command::new(shell);
        cmd.args(shell_args)
            .arg(&invocation.command)
            .envs(&invocation.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(workdir) = &invocation.workdir {
            cmd.current_dir(workdir);
        }
        // Own process group, so a kill reaches everything the step started
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!("Failed to spawn shell for `{}`: {}", invocation.command, e);
                return StepResult {
                    command: invocation.command.clone(),
                    exit_code: SPAWN_FAILURE_EXIT_CODE,
                    stdout: String::new(),
                    stderr: format!("failed to spawn '{}': {}", shell, e),
                    duration_ms: started.elapsed().as_millis() as u64,
                    outcome: StepOutcome::Exited,
                };
            }
        };

        let (stdout_buf, stdout_task) = capture(child.stdout.take());
        let (stderr_buf, stderr_task) = capture(child.stderr.take());

        let ending = tokio::select! {
            status = child.wait() => Ending::Exited(status.ok().and_then(|s| s.code())),
            _ = sleep_or_forever(invocation.timeout) => Ending::TimedOut,
            _ = cancel.cancelled() => Ending::Cancelled,
        };

        let (exit_code, outcome) = match ending {
            Ending::Exited(code) => (code.unwrap_or(KILLED_EXIT_CODE), StepOutcome::Exited),
            Ending::TimedOut => {
                warn!(
                    "`{}` timed out after {:?}; killing it",
                    invocation.command,
                    invocation.timeout.unwrap_or_default()
                );
                kill_tree(&mut child).await;
                (KILLED_EXIT_CODE, StepOutcome::TimedOut)
            }
            Ending::Cancelled => {
                debug!("`{}` cancelled; killing it", invocation.command);
                kill_tree(&mut child).await;
                (KILLED_EXIT_CODE, StepOutcome::Cancelled)
            }
        };

        // Background processes can hold the pipes open past the shell's exit
        let stdout = drain(stdout_buf, stdout_task).await;
        let mut stderr = drain(stderr_buf, stderr_task).await;

        if outcome == StepOutcome::TimedOut {
            if !stderr.is_empty() && !stderr.ends_with('\n') {
                stderr.push('\n');
            }
            stderr.push_str(&format!(
                "process timed out after {:?}",
                invocation.timeout.unwrap_or_default()
            ));
        }

        let duration_ms = started.elapsed().as_millis() as u64;
        debug!(
            "`{}` finished with exit code {} in {}ms ({} bytes stdout, {} bytes stderr)",
            invocation.command,
            exit_code,
            duration_ms,
            stdout.len(),
            stderr.len()
        );

        StepResult {
            command: invocation.command.clone(),
            exit_code,
            stdout,
            stderr,
            duration_ms,
            outcome,
        }
    }
}
