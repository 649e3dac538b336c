//! HTTP server exposing project control, status snapshots and SSE events.

mod api;
mod app;
mod error;
mod handlers;

pub use api::{CommandResponse, SaveFilesRequest};
pub use app::PreviewServer;
pub use error::ServerError;
pub use handlers::AppState;
