//! Supervisor module for preview process lifecycle and readiness detection.

mod error;
mod instance;
mod readiness;
mod runner;
mod settle;
mod state;

pub use error::*;
pub use instance::{ExitCause, ExitReport, LogBuffer, ProjectStatus, StartOutcome, STATUS_LOG_TAIL};
pub use readiness::*;
pub use runner::*;
pub use settle::*;
pub use state::*;
