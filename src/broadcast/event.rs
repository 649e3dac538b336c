//! Status event types sent to subscribers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Kind of a status event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    /// Project state changed; payload is the full status snapshot.
    StatusChange,
    /// A line of process output.
    LogsUpdate,
    /// The preview URL changed.
    UrlChange,
    /// A failure was reported.
    Error,
    /// Heartbeat.
    Ping,
    /// Connection acknowledgement sent on subscribe.
    Connected,
}

impl EventKind {
    /// Wire name of the kind, as used in the `type` field.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::StatusChange => "status-change",
            Self::LogsUpdate => "logs-update",
            Self::UrlChange => "url-change",
            Self::Error => "error",
            Self::Ping => "ping",
            Self::Connected => "connected",
        }
    }
}

/// A single frame delivered to a subscriber.
///
/// Serializes as `{type, projectId, data, timestamp}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub project_id: String,
    pub data: Value,
    pub timestamp: DateTime<Utc>,
}

impl StatusEvent {
    /// Create a new event stamped with the current time.
    #[must_use]
    pub fn new(kind: EventKind, project_id: impl Into<String>, data: Value) -> Self {
        Self {
            kind,
            project_id: project_id.into(),
            data,
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn status_change(project_id: impl Into<String>, status: Value) -> Self {
        Self::new(EventKind::StatusChange, project_id, status)
    }

    #[must_use]
    pub fn logs(project_id: impl Into<String>, line: impl Into<String>) -> Self {
        Self::new(
            EventKind::LogsUpdate,
            project_id,
            json!({ "line": line.into() }),
        )
    }

    #[must_use]
    pub fn url(project_id: impl Into<String>, url: impl Into<String>) -> Self {
        Self::new(EventKind::UrlChange, project_id, json!({ "url": url.into() }))
    }

    #[must_use]
    pub fn error(project_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(
            EventKind::Error,
            project_id,
            json!({ "message": message.into() }),
        )
    }

    #[must_use]
    pub fn ping(project_id: impl Into<String>) -> Self {
        Self::new(EventKind::Ping, project_id, Value::Null)
    }

    #[must_use]
    pub fn connected(project_id: impl Into<String>, client_id: impl std::fmt::Display) -> Self {
        Self::new(
            EventKind::Connected,
            project_id,
            json!({ "clientId": client_id.to_string() }),
        )
    }
}
