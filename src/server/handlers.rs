//! HTTP handlers for the project API.

use std::convert::Infallible;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures_util::stream::StreamExt;

use super::api::{CommandResponse, SaveFilesRequest};
use crate::supervisor::{ProcessSupervisor, ProjectStatus, SupervisorError};

/// Application state shared across all handlers.
#[derive(Clone, Debug)]
pub struct AppState {
    pub supervisor: ProcessSupervisor,
}

impl AppState {
    #[must_use]
    pub fn new(supervisor: ProcessSupervisor) -> Self {
        Self { supervisor }
    }
}

fn error_status(error: &SupervisorError) -> StatusCode {
    match error {
        SupervisorError::InvalidPath(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// POST /api/projects/:id/start - Start the preview and wait until ready.
pub async fn post_start(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> (StatusCode, Json<CommandResponse>) {
    match state.supervisor.start(&id).await {
        Ok(status) => (
            StatusCode::OK,
            Json(CommandResponse::success("Preview running").with_status(Some(status))),
        ),
        Err(e) => (
            error_status(&e),
            Json(
                CommandResponse::error("Failed to start preview", e.to_string())
                    .with_status(state.supervisor.get_status(&id)),
            ),
        ),
    }
}

/// POST /api/projects/:id/stop - Stop the preview.
pub async fn post_stop(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Json<CommandResponse> {
    if state.supervisor.stop(&id).await {
        Json(CommandResponse::success("Preview stopped"))
    } else {
        Json(CommandResponse::success("Preview not running"))
    }
}

/// PUT /api/projects/:id/files - Write files into the project directory.
pub async fn put_files(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<SaveFilesRequest>,
) -> (StatusCode, Json<CommandResponse>) {
    match state.supervisor.save_files(&id, &request.files).await {
        Ok(count) => (
            StatusCode::OK,
            Json(CommandResponse::success(format!("Saved {count} files"))),
        ),
        Err(e) => (
            error_status(&e),
            Json(CommandResponse::error("Failed to save files", e.to_string())),
        ),
    }
}

/// GET /api/projects/:id/status - Current status snapshot, or `null`.
pub async fn get_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Json<Option<ProjectStatus>> {
    Json(state.supervisor.get_status(&id))
}

/// GET /api/projects/:id/events - SSE stream of project events.
pub async fn get_events_sse(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Sse<impl futures_core::Stream<Item = Result<Event, Infallible>>> {
    let subscription = state.supervisor.broadcaster().subscribe(&id);
    let stream = subscription.filter_map(|event| async move {
        let data = serde_json::to_string(&event).ok()?;
        Some(Ok(Event::default().event(event.kind.as_str()).data(data)))
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
