//! Preview process spawning and control.
//!
//! This module provides a builder for configuring the command that runs a
//! generated project, along with control methods for the running child.
//! On Unix the child is placed in its own process group so termination
//! reaches the dev server it forks (e.g. `npm` → `node`).

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::process::{Child, ChildStderr, ChildStdout, Command};

/// Environment variable carrying the allocated port.
pub const PORT_ENV: &str = "PORT";

/// Error type for process spawning operations.
#[derive(thiserror::Error, Debug)]
pub enum SpawnError {
    /// The program was not found.
    #[error("Program not found: {0}")]
    NotFound(String),
    /// Permission denied when spawning.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
    /// Other I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SpawnError {
    /// Create a `SpawnError` from an I/O error, classifying common cases.
    fn from_io(program: &str, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(program.to_string()),
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(program.to_string()),
            _ => Self::Io(err),
        }
    }
}

/// Builder for configuring a preview process.
#[derive(Debug, Clone, Default)]
pub struct PreviewProcessBuilder {
    program: String,
    args: Vec<String>,
    port: Option<u16>,
    envs: Vec<(String, String)>,
    working_dir: Option<PathBuf>,
}

impl PreviewProcessBuilder {
    /// Create a new builder for the given program.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    /// Append arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set the port exported to the child via `PORT`.
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Add an extra environment variable.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Set the working directory for the process.
    #[must_use]
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Get the working directory, if set.
    #[must_use]
    pub fn get_working_dir(&self) -> Option<&PathBuf> {
        self.working_dir.as_ref()
    }

    /// Get the program name.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Get the configured port.
    #[must_use]
    pub fn get_port(&self) -> Option<u16> {
        self.port
    }

    /// Build the command-line arguments.
    #[must_use]
    pub fn build_args(&self) -> Vec<String> {
        self.args.clone()
    }

    /// Build the full environment overlay, `PORT` first.
    #[must_use]
    pub fn build_envs(&self) -> Vec<(String, String)> {
        let mut envs = Vec::with_capacity(self.envs.len() + 1);
        if let Some(port) = self.port {
            envs.push((PORT_ENV.to_string(), port.to_string()));
        }
        envs.extend(self.envs.iter().cloned());
        envs
    }
}

/// A running preview process.
#[derive(Debug)]
pub struct PreviewProcess {
    child: Child,
    pid: Option<u32>,
}

impl PreviewProcess {
    /// Spawn a process with the given builder configuration.
    ///
    /// # Errors
    ///
    /// Returns `SpawnError` if the process fails to spawn.
    pub fn spawn(builder: &PreviewProcessBuilder) -> Result<Self, SpawnError> {
        let mut cmd = Command::new(&builder.program);
        cmd.args(builder.build_args())
            .envs(builder.build_envs())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(ref dir) = builder.working_dir {
            cmd.current_dir(dir);
        }

        #[cfg(unix)]
        cmd.process_group(0);

        let child = cmd
            .spawn()
            .map_err(|e| SpawnError::from_io(&builder.program, e))?;

        let pid = child.id();
        Ok(Self { child, pid })
    }

    /// Take ownership of the stdout handle.
    ///
    /// This can only be called once; subsequent calls return `None`.
    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.child.stdout.take()
    }

    /// Take ownership of the stderr handle.
    ///
    /// This can only be called once; subsequent calls return `None`.
    pub fn take_stderr(&mut self) -> Option<ChildStderr> {
        self.child.stderr.take()
    }

    /// Get the process ID, if still running.
    #[must_use]
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Check if the process has exited without blocking.
    ///
    /// # Errors
    ///
    /// Returns an error if the process state cannot be queried.
    pub fn try_wait(&mut self) -> std::io::Result<Option<ExitStatus>> {
        self.child.try_wait()
    }

    /// Wait for the process to exit.
    ///
    /// # Errors
    ///
    /// Returns an error if waiting fails.
    pub async fn wait(&mut self) -> std::io::Result<ExitStatus> {
        self.child.wait().await
    }

    /// Forcefully kill the process and its group.
    ///
    /// # Errors
    ///
    /// Returns an error if the kill signal cannot be sent.
    pub async fn kill(&mut self) -> std::io::Result<()> {
        #[cfg(unix)]
        self.signal_group(nix::sys::signal::Signal::SIGKILL);

        self.child.kill().await
    }

    /// Attempt graceful termination with a timeout.
    ///
    /// On Unix, sends SIGTERM to the process group first, then SIGKILL after
    /// the timeout. On other platforms, falls back to immediate kill.
    ///
    /// Returns `true` if the process had to be force-killed.
    ///
    /// # Errors
    ///
    /// Returns an error if termination fails.
    pub async fn graceful_terminate(&mut self, timeout: Duration) -> std::io::Result<bool> {
        #[cfg(unix)]
        {
            self.graceful_terminate_unix(timeout).await
        }

        #[cfg(not(unix))]
        {
            let _ = timeout;
            self.kill().await.map(|()| true)
        }
    }

    #[cfg(unix)]
    async fn graceful_terminate_unix(&mut self, timeout: Duration) -> std::io::Result<bool> {
        use nix::sys::signal::Signal;

        if self.id().is_none() {
            // Process already exited
            return Ok(false);
        }

        self.signal_group(Signal::SIGTERM);

        match tokio::time::timeout(timeout, self.child.wait()).await {
            Ok(Ok(_)) => {
                // Reap stragglers left in the group by the leader.
                self.signal_group(Signal::SIGKILL);
                Ok(false)
            }
            Ok(Err(e)) => Err(e),
            Err(_) => {
                tracing::debug!(?timeout, "Graceful termination timed out, killing");
                self.kill().await.map(|()| true)
            }
        }
    }

    #[cfg(unix)]
    fn signal_group(&self, signal: nix::sys::signal::Signal) {
        use nix::sys::signal::killpg;
        use nix::unistd::Pid;

        if let Some(pid) = self.pid {
            let pgid = Pid::from_raw(i32::try_from(pid).unwrap_or(i32::MAX));
            if let Err(e) = killpg(pgid, signal) {
                tracing::trace!(pid, ?signal, error = %e, "Failed to signal process group");
            }
        }
    }
}
