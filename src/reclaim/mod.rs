//! Deferred deletion of ephemeral project workspaces.

mod error;
mod reclaimer;

pub use error::ReclaimError;
pub use reclaimer::{
    spawn_sweeper, SweepReport, WorkspaceReclaimer, DEFAULT_GRACE,
    DEFAULT_SWEEP_INTERVAL,
};
