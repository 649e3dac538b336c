//! TCP port allocation for preview processes.

mod allocator;
mod error;

pub use allocator::{PortAllocator, DEFAULT_SCAN_WIDTH, DEFAULT_START_PORT};
pub use error::PortError;
