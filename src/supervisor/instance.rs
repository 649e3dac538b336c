//! Per-project instance record and its public snapshot.

use std::collections::VecDeque;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::error::StartError;
use super::settle::Settle;
use super::state::{InvalidTransition, ProjectState, ProjectStateMachine};

/// Number of log lines included in a status snapshot.
pub const STATUS_LOG_TAIL: usize = 50;

/// Bounded ring of recent output lines.
#[derive(Debug, Clone)]
pub struct LogBuffer {
    capacity: usize,
    lines: VecDeque<String>,
}

impl LogBuffer {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            lines: VecDeque::new(),
        }
    }

    /// Append a line, evicting the oldest once full.
    pub fn push_line(&mut self, line: String) {
        self.lines.push_back(line);
        while self.lines.len() > self.capacity {
            self.lines.pop_front();
        }
    }

    /// The most recent `limit` lines, oldest first.
    #[must_use]
    pub fn tail(&self, limit: usize) -> Vec<String> {
        let start = self.lines.len().saturating_sub(limit);
        self.lines.iter().skip(start).cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Serializable view of a project instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectStatus {
    pub id: String,
    pub instance_id: Uuid,
    pub state: ProjectState,
    pub port: Option<u16>,
    pub url: Option<String>,
    pub pid: Option<u32>,
    pub started_at: DateTime<Utc>,
    pub last_error: Option<String>,
    pub ephemeral: bool,
    pub logs: Vec<String>,
}

/// How the monitored process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCause {
    /// The process exited on its own.
    Natural,
    /// Terminated on request by `stop()`.
    Terminated,
    /// Killed after a failed start.
    Killed,
    /// No process was ever spawned.
    NotSpawned,
}

/// Exit notice published by the monitor task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitReport {
    pub cause: ExitCause,
    pub code: Option<i32>,
}

/// Outcome of a start attempt, shared by every caller awaiting it.
pub type StartOutcome = Result<ProjectStatus, StartError>;

/// Live record of one spawned (or spawning) preview process.
#[derive(Debug)]
pub(crate) struct ProjectInstance {
    pub instance_id: Uuid,
    pub project_id: String,
    machine: ProjectStateMachine,
    pub port: Option<u16>,
    pub pid: Option<u32>,
    pub url: Option<String>,
    pub working_dir: PathBuf,
    pub ephemeral: bool,
    pub started_at: DateTime<Utc>,
    pub last_error: Option<String>,
    pub logs: LogBuffer,
    pub readiness: Settle<StartOutcome>,
    pub exited: Settle<ExitReport>,
    pub terminate: CancellationToken,
    pub kill: CancellationToken,
}

impl ProjectInstance {
    pub fn new(
        project_id: &str,
        working_dir: PathBuf,
        ephemeral: bool,
        log_capacity: usize,
    ) -> Self {
        Self {
            instance_id: Uuid::new_v4(),
            project_id: project_id.to_string(),
            machine: ProjectStateMachine::new(),
            port: None,
            pid: None,
            url: None,
            working_dir,
            ephemeral,
            started_at: Utc::now(),
            last_error: None,
            logs: LogBuffer::new(log_capacity),
            readiness: Settle::new(),
            exited: Settle::new(),
            terminate: CancellationToken::new(),
            kill: CancellationToken::new(),
        }
    }

    pub fn state(&self) -> ProjectState {
        self.machine.state()
    }

    pub fn transition(&mut self, next: ProjectState) -> Result<(), InvalidTransition> {
        self.machine.transition(next)
    }

    pub fn status(&self) -> ProjectStatus {
        ProjectStatus {
            id: self.project_id.clone(),
            instance_id: self.instance_id,
            state: self.state(),
            port: self.port,
            url: self.url.clone(),
            pid: self.pid,
            started_at: self.started_at,
            last_error: self.last_error.clone(),
            ephemeral: self.ephemeral,
            logs: self.logs.tail(STATUS_LOG_TAIL),
        }
    }
}
