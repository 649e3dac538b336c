//! Preview Supervisor - live-preview process lifecycle management.

pub mod broadcast;
pub mod config;
pub mod manifest;
pub mod port;
pub mod process;
pub mod reclaim;
pub mod server;
pub mod supervisor;
