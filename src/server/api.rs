//! Request and response bodies for the project endpoints.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::supervisor::ProjectStatus;

/// Response for command endpoints (start, stop, files).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResponse {
    /// Whether the command was successful.
    pub success: bool,
    /// Message describing the result.
    pub message: String,
    /// Optional error details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Project status after the command, when one exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ProjectStatus>,
}

impl CommandResponse {
    /// Create a success response.
    #[must_use]
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            error: None,
            status: None,
        }
    }

    /// Create an error response.
    #[must_use]
    pub fn error(message: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            error: Some(error.into()),
            status: None,
        }
    }

    /// Attach a status snapshot.
    #[must_use]
    pub fn with_status(mut self, status: Option<ProjectStatus>) -> Self {
        self.status = status;
        self
    }
}

/// Body of `PUT /api/projects/{id}/files`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SaveFilesRequest {
    /// Relative path to file content.
    pub files: BTreeMap<String, String>,
}
