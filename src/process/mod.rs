//! Preview process spawning and control.

mod child;

pub use child::*;
