//! Role backed by an external command.
//!
//! The command receives the [`RoleInput`] as one JSON document on stdin and
//! reports progress as JSONL on stdout (see [`crate::roles::protocol`]).
//! Stderr is logged; its last line is attached to the error when the process
//! exits unsuccessfully. The child is killed if the stream is dropped early.

use crate::domain::RoleId;
use crate::roles::protocol::parse_role_line;
use crate::roles::{Role, RoleError, RoleInput, RoleStream, RoleUpdate};
use anyhow::{Context, Result};
use futures::stream::{self, StreamExt};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdout, Command};
use tokio::task::JoinHandle;

/// Timeout for waiting for the process to exit after stdout closes.
pub const PROCESS_WAIT_TIMEOUT: Duration = Duration::from_secs(30);

/// Environment variable carrying the role id into the child process.
pub const ROLE_ID_ENV: &str = "DECISION_ENGINE_ROLE";

#[derive(Debug, Clone)]
pub struct ProcessRole {
    id: RoleId,
    command: String,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
}

impl ProcessRole {
    pub fn new(id: impl Into<RoleId>, command: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            command: command.into(),
            args: Vec::new(),
            working_dir: None,
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_working_dir(mut self, dir: PathBuf) -> Self {
        self.working_dir = Some(dir);
        self
    }

    async fn spawn(&self, input: &RoleInput) -> Result<RunningProcess> {
        let mut command = Command::new(&self.command);
        command
            .args(&self.args)
            .env(ROLE_ID_ENV, self.id.as_str())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }

        let mut child = command
            .spawn()
            .with_context(|| format!("Failed to spawn '{}' for role {}", self.command, self.id))?;

        tracing::debug!(role = %self.id, pid = ?child.id(), command = %self.command, "Role process started");

        let mut stdin = child
            .stdin
            .take()
            .context("Failed to get stdin from process")?;
        let stdout = child
            .stdout
            .take()
            .context("Failed to get stdout from process")?;
        let stderr = child
            .stderr
            .take()
            .context("Failed to get stderr from process")?;

        let mut document =
            serde_json::to_vec(input).context("Failed to serialize role input")?;
        document.push(b'\n');
        let role = self.id.clone();
        tokio::spawn(async move {
            if let Err(e) = stdin.write_all(&document).await {
                tracing::debug!(role = %role, error = %e, "Role process closed stdin early");
            }
            // stdin is dropped here, closing the pipe.
        });

        let role = self.id.clone();
        let stderr_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            let mut last = None;
            while let Ok(Some(line)) = lines.next_line().await {
                tracing::debug!(role = %role, "stderr: {}", line);
                if !line.trim().is_empty() {
                    last = Some(line);
                }
            }
            last
        });

        Ok(RunningProcess {
            role: self.id.clone(),
            command: self.command.clone(),
            child,
            stdout: BufReader::new(stdout).lines(),
            stderr_task,
        })
    }
}

struct RunningProcess {
    role: RoleId,
    command: String,
    child: Child,
    stdout: Lines<BufReader<ChildStdout>>,
    stderr_task: JoinHandle<Option<String>>,
}

impl RunningProcess {
    /// Next protocol update, or `None` once stdout is closed.
    async fn next_update(&mut self) -> Result<Option<RoleUpdate>> {
        loop {
            let line = self
                .stdout
                .next_line()
                .await
                .with_context(|| format!("Failed to read stdout of role {}", self.role))?;
            match line {
                Some(line) => {
                    if let Some(update) = parse_role_line(&self.role, &line) {
                        return Ok(Some(update));
                    }
                }
                None => return Ok(None),
            }
        }
    }

    async fn finish(mut self) -> Result<()> {
        let status = match tokio::time::timeout(PROCESS_WAIT_TIMEOUT, self.child.wait()).await {
            Ok(status) => status
                .with_context(|| format!("Failed to wait for {} process", self.command))?,
            Err(_) => {
                let _ = self.child.kill().await;
                anyhow::bail!(
                    "{} process did not exit within {:?} after stdout closed",
                    self.command,
                    PROCESS_WAIT_TIMEOUT
                );
            }
        };
        let last_stderr = self.stderr_task.await.ok().flatten();

        tracing::debug!(role = %self.role, %status, "Role process exited");

        if status.success() {
            return Ok(());
        }
        match last_stderr {
            Some(line) => anyhow::bail!("{} exited with {}: {}", self.command, status, line),
            None => anyhow::bail!("{} exited with {}", self.command, status),
        }
    }
}

enum ProcessState {
    Pending(ProcessRole, RoleInput),
    Running(Box<RunningProcess>),
    Done,
}

impl Role for ProcessRole {
    fn id(&self) -> &RoleId {
        &self.id
    }

    fn analyze(&self, input: RoleInput) -> RoleStream {
        let initial = ProcessState::Pending(self.clone(), input);
        stream::unfold(initial, |mut state| async move {
            loop {
                state = match state {
                    ProcessState::Pending(role, input) => match role.spawn(&input).await {
                        Ok(running) => ProcessState::Running(Box::new(running)),
                        Err(e) => return Some((Err(RoleError::from(e)), ProcessState::Done)),
                    },
                    ProcessState::Running(mut running) => match running.next_update().await {
                        Ok(Some(update)) => return Some((Ok(update), ProcessState::Running(running))),
                        Ok(None) => match running.finish().await {
                            Ok(()) => return None,
                            Err(e) => return Some((Err(RoleError::from(e)), ProcessState::Done)),
                        },
                        Err(e) => return Some((Err(RoleError::from(e)), ProcessState::Done)),
                    },
                    ProcessState::Done => return None,
                };
            }
        })
        .boxed()
    }
}

#[cfg(test)]
#[path = "tests/process_tests.rs"]
mod tests;
