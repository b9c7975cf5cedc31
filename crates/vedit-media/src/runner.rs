//! FFmpeg process runner with cancellation and timeout.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::command::BuiltCommand;
use crate::error::{MediaError, MediaResult, RunError, RunResult};

/// Default number of trailing output bytes kept per stream.
pub const DEFAULT_CAPTURE_LIMIT: usize = 8 * 1024;

/// Captured result of a successful run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    pub exit_code: i32,
    /// Tail of stdout
    pub stdout: String,
    /// Tail of stderr
    pub stderr: String,
}

/// Runs built commands as child processes.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    /// Kill the process after this long
    timeout: Option<Duration>,
    /// Trailing bytes of stdout/stderr to keep
    capture_limit: usize,
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessRunner {
    /// Create a new runner.
    pub fn new() -> Self {
        Self {
            timeout: None,
            capture_limit: DEFAULT_CAPTURE_LIMIT,
        }
    }

    /// Set timeout.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set how many trailing bytes of output to keep.
    pub fn with_capture_limit(mut self, bytes: usize) -> Self {
        self.capture_limit = bytes;
        self
    }

    /// Run a command to completion.
    ///
    /// Flipping `cancel` to `true` kills the child and returns
    /// [`RunError::Canceled`]. A closed channel never cancels.
    pub async fn run(&self, command: BuiltCommand, mut cancel: watch::Receiver<bool>) -> RunResult<ProcessOutput> {
        if *cancel.borrow() {
            return Err(RunError::Canceled);
        }

        debug!("Running: {}", command.display());

        let mut child = Command::new(command.program())
            .args(command.args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| RunError::Spawn {
                program: command.program().to_path_buf(),
                source,
            })?;

        let stdout_task = child.stdout.take().map(|s| tokio::spawn(drain_tail(s, self.capture_limit)));
        let stderr_task = child.stderr.take().map(|s| tokio::spawn(drain_tail(s, self.capture_limit)));

        let status = tokio::select! {
            status = child.wait() => status?,
            _ = cancelled(&mut cancel) => {
                info!("Cancellation requested, killing {}", command.program().display());
                kill(&mut child).await;
                return Err(RunError::Canceled);
            }
            _ = deadline(self.timeout) => {
                let timeout = self.timeout.unwrap_or_default();
                warn!("{} timed out after {:?}, killing process", command.program().display(), timeout);
                kill(&mut child).await;
                return Err(RunError::Timeout(timeout));
            }
        };

        let stdout = collect(stdout_task).await;
        let stderr = collect(stderr_task).await;

        match status.code() {
            Some(0) => Ok(ProcessOutput {
                exit_code: 0,
                stdout,
                stderr,
            }),
            Some(code) => Err(RunError::NonZeroExit {
                code,
                stderr_tail: stderr,
            }),
            None => Err(RunError::Terminated { stderr_tail: stderr }),
        }
    }
}

/// Resolve the FFmpeg executable.
///
/// A configured path must exist; otherwise `ffmpeg` is looked up in `PATH`.
pub fn locate_ffmpeg(configured: Option<&str>) -> MediaResult<PathBuf> {
    match configured.map(str::trim).filter(|s| !s.is_empty()) {
        Some(path) => {
            let path = Path::new(path);
            if path.is_file() {
                Ok(path.to_path_buf())
            } else {
                Err(MediaError::FileNotFound(path.to_path_buf()))
            }
        }
        None => which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound),
    }
}

async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    if cancel.wait_for(|c| *c).await.is_err() {
        std::future::pending::<()>().await;
    }
}

async fn deadline(timeout: Option<Duration>) {
    match timeout {
        Some(t) => tokio::time::sleep(t).await,
        None => std::future::pending::<()>().await,
    }
}

/// Kill and reap the child.
async fn kill(child: &mut Child) {
    if let Err(e) = child.kill().await {
        warn!("Failed to kill child process: {}", e);
    }
}

async fn collect(task: Option<JoinHandle<Vec<u8>>>) -> String {
    match task {
        Some(handle) => handle
            .await
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
            .unwrap_or_default(),
        None => String::new(),
    }
}

/// Read a stream to EOF keeping only the last `limit` bytes.
async fn drain_tail<R: AsyncRead + Unpin>(mut reader: R, limit: usize) -> Vec<u8> {
    let mut tail = Vec::new();
    let mut chunk = [0u8; 4096];

    loop {
        match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                tail.extend_from_slice(&chunk[..n]);
                if tail.len() > limit {
                    let excess = tail.len() - limit;
                    tail.drain(..excess);
                }
            }
        }
    }

    tail
}
