//! Supervisor error types.

use std::time::Duration;

/// Why a start attempt failed.
///
/// Cloneable so every caller waiting on the same attempt receives it.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StartError {
    /// No free port in the configured range.
    #[error("Port exhaustion: {0}")]
    PortExhausted(#[from] crate::port::PortError),

    /// The launch manifest could not be patched.
    #[error("Manifest error: {0}")]
    Manifest(String),

    /// The OS refused to create the process.
    #[error("Failed to spawn process: {0}")]
    Spawn(String),

    /// The process reported that its port was already bound.
    #[error("Port {0} is already in use")]
    PortInUse(u16),

    /// No readiness signal arrived in time.
    #[error("Process did not become ready within {0:?}")]
    ReadinessTimeout(Duration),

    /// The process exited before becoming ready.
    #[error("Process exited before becoming ready ({})", describe_exit(*.0))]
    Exited(Option<i32>),

    /// `stop()` was called while the start was in progress.
    #[error("Stopped before becoming ready")]
    Cancelled,
}

/// Human-readable exit description.
#[must_use]
pub fn describe_exit(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "terminated by signal".to_string(),
    }
}

/// Errors returned by supervisor operations.
#[derive(thiserror::Error, Debug)]
pub enum SupervisorError {
    /// Starting the project failed.
    #[error(transparent)]
    Start(#[from] StartError),

    /// A file path in `save_files` escapes the project directory.
    #[error("Invalid file path: {0}")]
    InvalidPath(String),

    /// Filesystem error while saving files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A readiness pattern failed to compile.
    #[error("Invalid readiness pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// The HTTP probe client could not be built.
    #[error("HTTP probe setup failed: {0}")]
    Probe(#[from] reqwest::Error),

    /// The configured probe host is not an IP address.
    #[error("Invalid probe host: {0}")]
    InvalidHost(String),
}
